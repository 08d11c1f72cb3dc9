pub mod api;
pub mod cache;
pub mod chains;
pub mod config;
pub mod database;
pub mod error;
pub mod fetch;
pub mod lock;
pub mod providers;
pub mod reconcile;
pub mod series;
pub mod services;
pub mod sync;
pub mod types;

pub use config::Config;
pub use database::{Database, Store};
pub use error::{AppError, AppResult};
