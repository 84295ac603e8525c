//! Crosswire server entrypoint.

use anyhow::Result;
use clap::Parser;
use crosswire::{Cli, Registry, SessionConfig, router};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(addr = %cli.addr, "starting crosswire");

    let registry = Registry::new(SessionConfig {
        idle_timeout: Duration::from_secs(cli.idle_timeout),
        reset_on_activity: cli.reset_timeout_on_activity,
    });
    let app = router(registry, &cli.static_dir);

    let listener = tokio::net::TcpListener::bind(&cli.addr).await?;
    info!(addr = %cli.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
