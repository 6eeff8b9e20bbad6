use thiserror::Error;

use super::types::{PageId, RecordId, TableId, TransactionId};

/// Storage engine error types
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{tid} aborted: lock on {page_id} not granted within the wait bound")]
    TransactionAborted {
        tid: TransactionId,
        page_id: PageId,
    },

    #[error("Buffer pool is full: all {max_pages} resident pages are dirty")]
    BufferPoolFull { max_pages: usize },

    #[error("Table {0} not found")]
    TableNotFound(TableId),

    #[error("Table named '{0}' not found")]
    TableNameNotFound(String),

    #[error("Tuple does not match the table's tuple descriptor")]
    TupleDescMismatch,

    #[error("Tuple could not be encoded: {0}")]
    TupleEncoding(String),

    #[error("Tuple has no record id")]
    MissingRecordId,

    #[error("Record {record_id} does not belong to table {table_id}")]
    WrongTable {
        record_id: RecordId,
        table_id: TableId,
    },

    #[error("Record {record_id} is not stored on {page_id}")]
    WrongPage {
        record_id: RecordId,
        page_id: PageId,
    },

    #[error("Invalid slot {slot} on {page_id}")]
    InvalidSlotId { page_id: PageId, slot: u16 },

    #[error("Slot {slot} on {page_id} is empty")]
    EmptySlot { page_id: PageId, slot: u16 },

    #[error("{0} has no free slot")]
    PageFull(PageId),

    #[error("Page size {page_size} gives {slots} slots; a page holds 1 to 65536")]
    UnsupportedPageSize { page_size: usize, slots: usize },

    #[error("Page image for {page_id} is {actual} bytes, expected {expected}")]
    InvalidPageImage {
        page_id: PageId,
        expected: usize,
        actual: usize,
    },
}

impl StrataError {
    /// True for the outcome a transaction must answer by aborting and retrying.
    pub fn is_abort(&self) -> bool {
        matches!(self, StrataError::TransactionAborted { .. })
    }
}

pub type Result<T> = std::result::Result<T, StrataError>;
