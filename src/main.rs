//! recall server entry point

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use recall::config::ServerConfig;
use recall::service;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = ServerConfig::from_env();
    service::run_server(config).await
}
