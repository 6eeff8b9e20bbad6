use bytes::Bytes;
use parking_lot::Mutex;

use crate::common::{PageId, Result, TransactionId};
use crate::storage::page::HeapPage;

/// Destination for page update records written ahead of each page flush.
///
/// The buffer pool calls [`log_write`](LogSink::log_write) with the page's before- and
/// after-images, then [`force`](LogSink::force), and only then writes the page itself.
pub trait LogSink: Send + Sync {
    fn log_write(&self, tid: TransactionId, before: &HeapPage, after: &HeapPage) -> Result<()>;

    fn force(&self) -> Result<()>;
}

/// Log sink that drops every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLog;

impl LogSink for NoopLog {
    fn log_write(&self, _tid: TransactionId, _before: &HeapPage, _after: &HeapPage) -> Result<()> {
        Ok(())
    }

    fn force(&self) -> Result<()> {
        Ok(())
    }
}

/// One logged page update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRecord {
    pub tid: TransactionId,
    pub page_id: PageId,
    pub before: Bytes,
    pub after: Bytes,
    /// Whether a force covered this record before the next one was appended
    pub forced: bool,
}

#[derive(Debug, Default)]
struct MemoryLogInner {
    records: Vec<UpdateRecord>,
    forces: usize,
}

/// In-memory log sink that keeps every record.
#[derive(Debug, Default)]
pub struct MemoryLog {
    inner: Mutex<MemoryLogInner>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<UpdateRecord> {
        self.inner.lock().records.clone()
    }

    pub fn force_count(&self) -> usize {
        self.inner.lock().forces
    }

    /// True when every record appended so far has been forced.
    pub fn all_forced(&self) -> bool {
        self.inner.lock().records.iter().all(|r| r.forced)
    }
}

impl LogSink for MemoryLog {
    fn log_write(&self, tid: TransactionId, before: &HeapPage, after: &HeapPage) -> Result<()> {
        let record = UpdateRecord {
            tid,
            page_id: after.page_id(),
            before: before.page_data()?,
            after: after.page_data()?,
            forced: false,
        };
        self.inner.lock().records.push(record);
        Ok(())
    }

    fn force(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.forces += 1;
        for record in inner.records.iter_mut() {
            record.forced = true;
        }
        Ok(())
    }
}
