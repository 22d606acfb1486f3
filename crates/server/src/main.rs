mod bootstrap;
mod health;
mod shop;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use storefront_core::config::{AppConfig, LoadOptions};
use tokio::{net::TcpListener, sync::Notify};
use tower_http::trace::TraceLayer;

#[derive(Debug, Parser)]
#[command(name = "storefront-server", version, about = "Serve the storefront over HTTP")]
struct ServerArgs {
    /// Configuration file; defaults to `storefront.toml` or `config/storefront.toml`.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn init_logging(config: &AppConfig) {
    use storefront_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let args = ServerArgs::parse();
    // Logging comes up before bootstrap so connection failures are reported.
    let config = AppConfig::load(LoadOptions::from_path(args.config))?;
    init_logging(&config);

    let app = bootstrap::bootstrap(config).await?;
    let address = app.config.listen_address();
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);

    let router = shop::router(app.shop.clone())
        .merge(health::router(app.db_pool.clone()))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        address = %address,
        "storefront listening"
    );

    let shutdown = Arc::new(Notify::new());
    let signal = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { signal.notified().await })
            .await
    });

    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = grace.as_secs(),
        "shutdown requested, draining connections"
    );
    shutdown.notify_one();

    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            "in-flight requests did not finish within the grace period"
        ),
    }

    app.db_pool.close().await;
    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "storefront stopped"
    );

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;

    use super::ServerArgs;

    #[test]
    fn config_flag_is_optional() {
        let args = ServerArgs::try_parse_from(["storefront-server"]).expect("parse");
        assert_eq!(args.config, None);

        let args = ServerArgs::try_parse_from(["storefront-server", "--config", "shop.toml"])
            .expect("parse");
        assert_eq!(args.config, Some(PathBuf::from("shop.toml")));
    }
}
