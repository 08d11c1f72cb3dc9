use anyhow::Result;
use token_aggregator::services::{ApiService, AppContext};
use token_aggregator::Config;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level())
        .init();
    info!("🔧 Starting standalone API service...");

    let context = AppContext::connect(config).await?;
    let api_service = ApiService::new(context);
    api_service.start().await?;

    Ok(())
}
