use crate::api::{create_router, ApiState};
use crate::services::AppContext;
use anyhow::Result;
use tracing::info;

pub struct ApiService {
    context: AppContext,
}

impl ApiService {
    pub fn new(context: AppContext) -> Self {
        Self { context }
    }

    pub async fn start(&self) -> Result<()> {
        info!("🚀 Starting API service...");

        let app = create_router(ApiState::from(&self.context));
        let address = format!("{}:{}", self.context.config.server.host, self.context.config.server.port);
        let listener = tokio::net::TcpListener::bind(&address).await?;

        info!("API Server listening on {}", address);
        axum::serve(listener, app).await?;

        Ok(())
    }
}
