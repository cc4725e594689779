//! HA gateway binary.

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use ha_gateway::admin::{setup_admin_router, AdminState};
use ha_gateway::config::load_config;
use ha_gateway::http::HttpServer;
use ha_gateway::lifecycle::{signals, Shutdown};
use ha_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "ha-gateway")]
#[command(about = "Reverse proxy with standby-aware failover", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "ha-gateway.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        services = config.services.len(),
        request_timeout_secs = config.timeouts.request_secs,
        attempt_timeout_secs = config.timeouts.attempt_secs,
        "ha-gateway starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = HttpServer::new(&config)?;
    let shutdown = Shutdown::new();

    let admin_task = if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
        let app = setup_admin_router(AdminState::new(server.provider(), &config.admin.api_key));
        let mut admin_shutdown = shutdown.subscribe();
        Some(tokio::spawn(async move {
            let result = axum::serve(admin_listener, app)
                .with_graceful_shutdown(async move {
                    let _ = admin_shutdown.recv().await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "Admin API failed");
            }
        }))
    } else {
        None
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let gateway_shutdown = shutdown.subscribe();
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));

    server.run(listener, gateway_shutdown).await?;

    if let Some(task) = admin_task {
        let _ = task.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
