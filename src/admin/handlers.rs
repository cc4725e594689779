use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::ha::HaSnapshot;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub roles: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        roles: state.provider.len(),
    })
}

pub async fn get_services(State(state): State<AdminState>) -> Json<Vec<HaSnapshot>> {
    Json(state.provider.snapshots())
}

/// Clear a role's failed set and point it back at its first candidate.
pub async fn reset_service(
    State(state): State<AdminState>,
    Path(role): Path<String>,
) -> Result<Json<HaSnapshot>, (StatusCode, String)> {
    let ha = state
        .provider
        .state(&role)
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))?;

    ha.reset();
    let snapshot = ha.snapshot();
    tracing::info!(role = %role, active = %snapshot.active, "HA state reset by operator");

    Ok(Json(snapshot))
}
