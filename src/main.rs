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
    info!("🔧 Starting token aggregator (sync + API)...");

    let context = AppContext::connect(config).await?;

    let sync = context.sync.clone();
    let sync_handle = tokio::spawn(async move {
        if let Err(e) = sync.start().await {
            tracing::error!("Sync service error: {}", e);
        }
    });

    let api_service = ApiService::new(context);
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api_service.start().await {
            tracing::error!("API service error: {}", e);
        }
    });

    tokio::try_join!(sync_handle, api_handle)?;

    Ok(())
}
