pub mod dex_handlers;
pub mod status_handlers;
pub mod token_handlers;

pub use dex_handlers::*;
pub use status_handlers::*;
pub use token_handlers::*;
