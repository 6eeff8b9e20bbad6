mod lock_manager;
mod transaction;

pub use lock_manager::*;
pub use transaction::*;
