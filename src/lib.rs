//! Strata - the page cache, lock manager and heap file layer of a small relational engine
//!
//! Tables are stored as heap files of fixed-size pages. Transactions reach those pages
//! only through the buffer pool, which locks every page it hands out and decides what
//! stays in memory.
//!
//! # Architecture
//!
//! - **Tuples** (`tuple`): fixed-width rows described by a `TupleDesc`
//!
//! - **Storage Layer** (`storage`): on-disk layout
//!   - `HeapPage`: slot bitmap plus fixed-size tuple slots, with a before-image
//!   - `HeapFile`: one table per file, page `n` at offset `n * page_size`
//!   - `HeapFileIterator`: page-by-page scan through the buffer pool
//!
//! - **Buffer Pool** (`buffer`): bounded page cache
//!   - NO-STEAL: dirty pages are never evicted, only clean ones
//!   - FORCE: commit writes every page the transaction dirtied
//!
//! - **Concurrency** (`concurrency`): strict two-phase page locking
//!   - `LockManager`: shared/exclusive page locks with a bounded, randomized wait
//!   - `Transaction`: scoped handle that aborts unless committed
//!
//! - **Catalog** (`catalog`): table id to heap file, name and primary key
//!
//! - **Recovery** (`recovery`): the log sink written ahead of every page flush
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata::buffer::BufferPool;
//! use strata::catalog::Catalog;
//! use strata::common::BufferPoolConfig;
//! use strata::concurrency::Transaction;
//! use strata::recovery::NoopLog;
//! use strata::storage::disk::HeapFile;
//! use strata::tuple::{FieldType, TupleBuilder, TupleDesc};
//!
//! let desc = TupleDesc::builder()
//!     .field("id", FieldType::Integer)
//!     .field("name", FieldType::Text(16))
//!     .build_arc();
//! let file = Arc::new(HeapFile::open("users.dat", desc.clone()).unwrap());
//!
//! let catalog = Arc::new(Catalog::new());
//! let table_id = catalog.add_table(file, "users", "id");
//! let pool = BufferPool::new(BufferPoolConfig::default(), catalog, Arc::new(NoopLog));
//!
//! let txn = Transaction::begin(&pool);
//! let mut row = TupleBuilder::new(desc).value(1).value("ada").build();
//! pool.insert_tuple(txn.id(), table_id, &mut row).unwrap();
//! txn.commit().unwrap();
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
pub mod concurrency;
pub mod recovery;
pub mod storage;
pub mod tuple;

// Re-export commonly used types at the crate root
pub use common::{PageId, Permissions, RecordId, Result, SlotId, StrataError, TransactionId};
