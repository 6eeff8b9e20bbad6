use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rand::Rng;
use tracing::{debug, trace};

use crate::common::{LockWait, PageId, Permissions, Result, StrataError, TransactionId};

/// Holders of one page's lock: one writer or any number of readers.
#[derive(Debug, Default)]
struct LockState {
    readers: HashSet<TransactionId>,
    writer: Option<TransactionId>,
}

impl LockState {
    fn mode_of(&self, tid: TransactionId) -> Option<Permissions> {
        if self.writer == Some(tid) {
            Some(Permissions::ReadWrite)
        } else if self.readers.contains(&tid) {
            Some(Permissions::ReadOnly)
        } else {
            None
        }
    }

    /// Grants `perm` to `tid` if compatible with the current holders. A sole reader is
    /// upgraded in place; an exclusive holder already satisfies a shared request.
    fn try_grant(&mut self, tid: TransactionId, perm: Permissions) -> bool {
        match (perm, self.writer) {
            (_, Some(writer)) => writer == tid,
            (Permissions::ReadOnly, None) => {
                self.readers.insert(tid);
                true
            }
            (Permissions::ReadWrite, None) => {
                let sole_reader = self.readers.len() == 1 && self.readers.contains(&tid);
                if self.readers.is_empty() || sole_reader {
                    self.readers.clear();
                    self.writer = Some(tid);
                    true
                } else {
                    false
                }
            }
        }
    }

    fn release(&mut self, tid: TransactionId) -> bool {
        let was_writer = self.writer == Some(tid);
        if was_writer {
            self.writer = None;
        }
        self.readers.remove(&tid) || was_writer
    }

    fn holders(&self) -> Vec<TransactionId> {
        self.writer
            .iter()
            .chain(self.readers.iter())
            .copied()
            .collect()
    }
}

/// Lock record of one page plus the condition its waiters block on.
#[derive(Debug, Default)]
struct LockQueue {
    state: Mutex<LockState>,
    cvar: Condvar,
}

/// Page-granularity strict two-phase lock manager.
///
/// Any number of transactions may share a page; an exclusive lock excludes every other
/// transaction. A transaction that is the only reader of a page may upgrade to
/// exclusive in place. Waiting is bounded: each request draws a wait from the
/// configured [`LockWait`] interval and, once it elapses, fails with
/// [`StrataError::TransactionAborted`]. This avoids deadlock by timeout rather than
/// detecting cycles; the aborted transaction is expected to be retried by its caller.
///
/// Lock order inside the manager: the record map, then a page's lock record, then the
/// per-transaction index. Records are created on demand and dropped once idle.
pub struct LockManager {
    table: Mutex<HashMap<PageId, Arc<LockQueue>>>,
    /// Per-transaction index of held locks, used to release everything at the end
    held: Mutex<HashMap<TransactionId, HashMap<PageId, Permissions>>>,
    wait: LockWait,
}

impl LockManager {
    pub fn new(wait: LockWait) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            held: Mutex::new(HashMap::new()),
            wait,
        }
    }

    fn queue(&self, page_id: PageId) -> Arc<LockQueue> {
        self.table.lock().entry(page_id).or_default().clone()
    }

    fn existing_queue(&self, page_id: PageId) -> Option<Arc<LockQueue>> {
        self.table.lock().get(&page_id).cloned()
    }

    /// Drops the record of `page_id` once nobody holds or waits on it. The caller must
    /// not hold `queue.state`.
    fn reclaim(&self, page_id: PageId, queue: &Arc<LockQueue>) {
        let mut table = self.table.lock();
        // With the map locked, the map's reference and the caller's are the only ones
        // left unless a request is in flight.
        if Arc::strong_count(queue) > 2 {
            return;
        }
        let idle = {
            let state = queue.state.lock();
            state.writer.is_none() && state.readers.is_empty()
        };
        if idle && table.get(&page_id).is_some_and(|q| Arc::ptr_eq(q, queue)) {
            table.remove(&page_id);
        }
    }

    fn wait_bound(&self) -> Duration {
        if self.wait.min == self.wait.max {
            self.wait.min
        } else {
            rand::thread_rng().gen_range(self.wait.min..=self.wait.max)
        }
    }

    /// Acquires `perm` on `page_id` for `tid`, blocking until it is compatible or the
    /// wait bound elapses.
    pub fn lock(&self, tid: TransactionId, page_id: PageId, perm: Permissions) -> Result<()> {
        let queue = self.queue(page_id);
        let mut state = queue.state.lock();
        let mut deadline: Option<Instant> = None;

        loop {
            if state.try_grant(tid, perm) {
                let mode = state.mode_of(tid).unwrap_or(perm);
                self.held.lock().entry(tid).or_default().insert(page_id, mode);
                trace!(%tid, %page_id, ?mode, "lock granted");
                return Ok(());
            }

            let deadline = *deadline.get_or_insert_with(|| {
                let bound = self.wait_bound();
                trace!(%tid, %page_id, ?perm, ?bound, "waiting for lock");
                Instant::now() + bound
            });

            if queue.cvar.wait_until(&mut state, deadline).timed_out() && !state.try_grant(tid, perm) {
                debug!(%tid, %page_id, ?perm, holders = ?state.holders(), "lock wait timed out");
                drop(state);
                self.reclaim(page_id, &queue);
                return Err(StrataError::TransactionAborted { tid, page_id });
            }
        }
    }

    /// Releases whatever lock `tid` holds on `page_id`. No-op if it holds none.
    pub fn release_lock(&self, tid: TransactionId, page_id: PageId) {
        let Some(queue) = self.existing_queue(page_id) else {
            return;
        };

        let mut state = queue.state.lock();
        if state.release(tid) {
            let mut held = self.held.lock();
            if let Some(pages) = held.get_mut(&tid) {
                pages.remove(&page_id);
                if pages.is_empty() {
                    held.remove(&tid);
                }
            }
            drop(held);
            queue.cvar.notify_all();
            trace!(%tid, %page_id, "lock released");
        }
        drop(state);
        self.reclaim(page_id, &queue);
    }

    /// Releases every lock held by `tid` and returns the pages they covered.
    pub fn release_all(&self, tid: TransactionId) -> Vec<PageId> {
        let pages: Vec<PageId> = self.pages_locked_by(tid);
        for &page_id in &pages {
            self.release_lock(tid, page_id);
        }
        pages
    }

    /// Strips every holder of `page_id` and returns who they were.
    pub fn release_page(&self, page_id: PageId) -> Vec<TransactionId> {
        let Some(queue) = self.existing_queue(page_id) else {
            return Vec::new();
        };

        let mut state = queue.state.lock();
        let holders = state.holders();
        *state = LockState::default();

        let mut held = self.held.lock();
        for tid in &holders {
            if let Some(pages) = held.get_mut(tid) {
                pages.remove(&page_id);
                if pages.is_empty() {
                    held.remove(tid);
                }
            }
        }
        drop(held);
        queue.cvar.notify_all();
        drop(state);
        self.reclaim(page_id, &queue);
        holders
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_mode(tid, page_id).is_some()
    }

    /// The permission `tid` currently holds on `page_id`, if any.
    pub fn lock_mode(&self, tid: TransactionId, page_id: PageId) -> Option<Permissions> {
        self.held
            .lock()
            .get(&tid)
            .and_then(|pages| pages.get(&page_id).copied())
    }

    pub fn pages_locked_by(&self, tid: TransactionId) -> Vec<PageId> {
        self.held
            .lock()
            .get(&tid)
            .map(|pages| pages.keys().copied().collect())
            .unwrap_or_default()
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(LockWait::default())
    }
}
