use tracing::{debug, warn};

use crate::buffer::BufferPool;
use crate::common::{Result, TransactionId};

/// Scoped transaction over a [`BufferPool`].
///
/// Completes exactly once: through [`commit`](Self::commit), [`abort`](Self::abort), or
/// by being dropped, which aborts. Locks therefore never outlive the handle.
pub struct Transaction<'a> {
    pool: &'a BufferPool,
    tid: TransactionId,
    completed: bool,
}

impl<'a> Transaction<'a> {
    pub fn begin(pool: &'a BufferPool) -> Self {
        let tid = TransactionId::new();
        debug!(%tid, "transaction started");
        Self {
            pool,
            tid,
            completed: false,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.tid
    }

    pub fn commit(mut self) -> Result<()> {
        self.completed = true;
        self.pool.transaction_complete(self.tid, true)
    }

    pub fn abort(mut self) -> Result<()> {
        self.completed = true;
        self.pool.transaction_complete(self.tid, false)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        if let Err(e) = self.pool.transaction_complete(self.tid, false) {
            warn!(tid = %self.tid, error = %e, "abort on drop failed");
        }
    }
}
