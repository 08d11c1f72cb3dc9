pub mod handlers;
pub mod routes;

pub use routes::create_router;

use crate::services::{AppContext, DexService, TokenService};
use crate::sync::SyncService;
use std::sync::Arc;

#[derive(Clone)]
pub struct ApiState {
    pub tokens: Arc<TokenService>,
    pub dex: Arc<DexService>,
    pub sync: Arc<SyncService>,
}

impl From<&AppContext> for ApiState {
    fn from(context: &AppContext) -> Self {
        Self {
            tokens: context.tokens.clone(),
            dex: context.dex.clone(),
            sync: context.sync.clone(),
        }
    }
}
