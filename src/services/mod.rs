pub mod api_service;
pub mod context;
pub mod dex_service;
pub mod token_service;

pub use api_service::ApiService;
pub use context::{AppContext, Providers};
pub use dex_service::DexService;
pub use token_service::TokenService;
