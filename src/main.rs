//! relayd daemon entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use relayd::config::loader::load_config;
use relayd::config::schema::BalancerConfig;
use relayd::engine::Engine;
use relayd::http::HttpServer;
use relayd::observability::{logging, metrics};

/// L4/L7 load balancer and reverse proxy.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => BalancerConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        pools = config.pools.len(),
        rules = config.rules.len(),
        "relayd starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_exporter(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "failed to parse metrics address"
            ),
        }
    }

    let engine = Engine::from_config(config)?;
    engine.clone().start_background_tasks();

    let shutdown = engine.shutdown_handle().clone();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown.listen_for_signals().await;
        });
    }

    if engine.config.admin.enabled {
        let admin_engine = engine.clone();
        let admin_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = relayd::admin::run_admin_server(admin_engine, admin_shutdown).await {
                tracing::error!(error = %e, "admin server failed");
            }
        });
    }

    let server = HttpServer::new(engine.clone());
    server.run(shutdown).await?;

    tracing::info!("shutdown complete");
    Ok(())
}
