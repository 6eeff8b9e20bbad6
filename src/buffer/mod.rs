mod buffer_pool;
mod page_table;

pub use buffer_pool::*;
pub use page_table::*;

use std::sync::Arc;

use parking_lot::RwLock;

use crate::storage::page::HeapPage;

/// Shared handle to a resident page. Latch it briefly; never across another pool call.
pub type PageRef = Arc<RwLock<HeapPage>>;
