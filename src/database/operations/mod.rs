pub mod chain_operations;
pub mod exchange_operations;
pub mod pair_operations;
pub mod system_operations;
pub mod token_operations;

pub use chain_operations::*;
pub use exchange_operations::*;
pub use pair_operations::*;
pub use system_operations::*;
pub use token_operations::*;
