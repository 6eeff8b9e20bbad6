use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use crate::catalog::Catalog;
use crate::common::{
    BufferPoolConfig, PageId, Permissions, Result, StrataError, TableId, TransactionId,
};
use crate::concurrency::LockManager;
use crate::recovery::LogSink;
use crate::storage::page::HeapPage;
use crate::tuple::Tuple;

use super::{PageRef, PageTable};

/// BufferPool caches at most `max_pages` heap pages and is the only way transactions
/// reach page contents.
///
/// Every `get_page` first takes a page lock through the [`LockManager`], so a page a
/// transaction sees is a page it has locked. The pool never writes a dirty page before
/// its transaction commits: eviction only picks clean pages, and a pool whose resident
/// pages are all dirty fails with [`StrataError::BufferPoolFull`]. Commit forces the
/// transaction's pages to disk, abort throws them away.
///
/// The page table is guarded by one mutex. Page locks are never requested while it is
/// held, since a lock request may block for the whole wait bound.
pub struct BufferPool {
    max_pages: usize,
    catalog: Arc<Catalog>,
    lock_manager: LockManager,
    log: Arc<dyn LogSink>,
    table: Mutex<PageTable>,
}

impl BufferPool {
    pub fn new(config: BufferPoolConfig, catalog: Arc<Catalog>, log: Arc<dyn LogSink>) -> Self {
        Self {
            max_pages: config.max_pages,
            catalog,
            lock_manager: LockManager::new(config.lock_wait),
            log,
            table: Mutex::new(PageTable::new()),
        }
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    pub fn resident_count(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.table.lock().contains(page_id)
    }

    /// Returns the page `page_id` locked for `tid` with `perm`, loading it from its
    /// table's heap file when it is not resident.
    ///
    /// Blocks while the lock is incompatible and fails with
    /// [`StrataError::TransactionAborted`] once the wait bound elapses. Loading into a
    /// full pool evicts the oldest clean page.
    pub fn get_page(
        &self,
        tid: TransactionId,
        page_id: PageId,
        perm: Permissions,
    ) -> Result<PageRef> {
        loop {
            self.lock_manager.lock(tid, page_id, perm)?;
            if let Some(page) = self.load_locked(tid, page_id, perm)? {
                return Ok(page);
            }
            trace!(%tid, %page_id, ?perm, "lock stripped by eviction before load, retrying");
        }
    }

    /// Returns the resident instance of `page_id`, loading it if needed, provided `tid`
    /// still holds a lock covering `perm`. An eviction between the grant and the pool
    /// mutex strips the lock, in which case nothing is loaded and `None` comes back.
    fn load_locked(
        &self,
        tid: TransactionId,
        page_id: PageId,
        perm: Permissions,
    ) -> Result<Option<PageRef>> {
        let mut table = self.table.lock();
        let covered = match self.lock_manager.lock_mode(tid, page_id) {
            Some(Permissions::ReadWrite) => true,
            Some(Permissions::ReadOnly) => perm == Permissions::ReadOnly,
            None => false,
        };
        if !covered {
            return Ok(None);
        }

        if let Some(page) = table.get(page_id).cloned() {
            table.relate(tid, page_id);
            return Ok(Some(page));
        }

        self.make_room(&mut table)?;
        let file = self.catalog.database_file(page_id.table_id)?;
        let page = Arc::new(parking_lot::RwLock::new(file.read_page(page_id)?));
        table.insert(page_id, page.clone());
        table.relate(tid, page_id);
        trace!(%tid, %page_id, resident = table.len(), "page loaded");
        Ok(Some(page))
    }

    /// Releases the lock `tid` holds on `page_id` before the transaction ends.
    ///
    /// Breaks two-phase locking; only safe when the caller knows the page was not used
    /// to decide anything.
    pub fn unsafe_release_page(&self, tid: TransactionId, page_id: PageId) {
        let mut table = self.table.lock();
        self.lock_manager.release_lock(tid, page_id);
        table.unrelate(tid, page_id);
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_manager.holds_lock(tid, page_id)
    }

    /// Adds `tuple` to table `table_id` on behalf of `tid`. On success the tuple
    /// carries its new record id and the receiving page is dirty.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: &mut Tuple,
    ) -> Result<()> {
        let file = self.catalog.database_file(table_id)?;
        let pages = file.insert_tuple(self, tid, tuple)?;
        self.register_dirty(tid, pages)
    }

    /// Removes `tuple` from the table named by its record id on behalf of `tid`.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &mut Tuple) -> Result<()> {
        let record_id = tuple.record_id().ok_or(StrataError::MissingRecordId)?;
        let file = self.catalog.database_file(record_id.page_id.table_id)?;
        let pages = file.delete_tuple(self, tid, tuple)?;
        self.register_dirty(tid, pages)
    }

    /// Makes sure each page a heap file mutated is resident and dirty under `tid`.
    ///
    /// The exclusive lock taken when the page was fetched must still be held. Losing it
    /// means the page was evicted after the fetch, and other transactions may have
    /// changed and committed it since, so the mutation is rejected with
    /// [`StrataError::TransactionAborted`].
    fn register_dirty(&self, tid: TransactionId, pages: Vec<PageRef>) -> Result<()> {
        for page in pages {
            let page_id = page.read().page_id();

            let mut table = self.table.lock();
            if self.lock_manager.lock_mode(tid, page_id) != Some(Permissions::ReadWrite) {
                warn!(%tid, %page_id, "exclusive lock lost before the mutation was registered");
                return Err(StrataError::TransactionAborted { tid, page_id });
            }

            let resident = table.get(page_id).cloned();
            match resident {
                Some(resident) if Arc::ptr_eq(&resident, &page) => {}
                Some(resident) => {
                    // The mutated copy was discarded and reloaded since. It can only
                    // replace the reloaded one if both start from the same image.
                    let stale = {
                        let current = resident.read();
                        current.is_dirty().is_some()
                            || current.before_image_data() != page.read().before_image_data()
                    };
                    if stale {
                        warn!(%tid, %page_id, "mutated page instance is stale");
                        return Err(StrataError::TransactionAborted { tid, page_id });
                    }
                    table.insert(page_id, page.clone());
                }
                None => {
                    // Discarded while locked; nobody else could have touched it.
                    self.make_room(&mut table)?;
                    table.insert(page_id, page.clone());
                }
            }
            table.relate(tid, page_id);
            page.write().mark_dirty(true, tid);
        }
        Ok(())
    }

    /// Ends `tid`. On commit every page it dirtied is logged, forced and written, then
    /// becomes the new clean image; on abort those pages are dropped from the pool so
    /// the next reader reloads them from disk. Either way all of `tid`'s locks are
    /// released.
    ///
    /// If writing a page fails during commit, the remaining dirty pages are discarded,
    /// locks are still released and the first error is returned.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> Result<()> {
        let mut table = self.table.lock();
        let dirty = table.dirtied_by(tid);
        let mut flushed = 0;
        let mut discarded = 0;
        let mut first_err = None;

        for (page_id, page) in dirty {
            if commit && first_err.is_none() {
                match self.commit_page(tid, &page) {
                    Ok(()) => {
                        flushed += 1;
                        continue;
                    }
                    Err(e) => {
                        warn!(%tid, %page_id, error = %e, "commit flush failed");
                        first_err = Some(e);
                    }
                }
            }
            table.remove(page_id);
            discarded += 1;
        }

        let released = self.lock_manager.release_all(tid);
        table.forget_transaction(tid);
        drop(table);

        debug!(%tid, commit, flushed, discarded, locks = released.len(), "transaction complete");
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn commit_page(&self, tid: TransactionId, page: &PageRef) -> Result<()> {
        let mut guard = page.write();
        self.write_through(tid, &guard)?;
        guard.set_before_image()?;
        guard.mark_dirty(false, tid);
        Ok(())
    }

    /// Logs and forces the update record for `page`, then writes it to its heap file.
    fn write_through(&self, tid: TransactionId, page: &HeapPage) -> Result<()> {
        let page_id = page.page_id();
        let file = self.catalog.database_file(page_id.table_id)?;
        let before = page.before_image()?;
        self.log.log_write(tid, &before, page)?;
        self.log.force()?;
        file.write_page(page)?;
        trace!(%tid, %page_id, "page written");
        Ok(())
    }

    /// Writes every dirty resident page to disk. Dirty markers are kept, so the pages
    /// stay ineligible for eviction until their transactions complete.
    pub fn flush_all_pages(&self) -> Result<()> {
        let table = self.table.lock();
        self.flush_each(table.dirty_pages())
    }

    /// Writes the resident pages dirtied by `tid`. Dirty markers are kept.
    pub fn flush_pages(&self, tid: TransactionId) -> Result<()> {
        let table = self.table.lock();
        self.flush_each(table.dirtied_by(tid))
    }

    fn flush_each(&self, pages: Vec<(PageId, PageRef)>) -> Result<()> {
        for (_, page) in pages {
            let guard = page.read();
            if let Some(dirtier) = guard.is_dirty() {
                self.write_through(dirtier, &guard)?;
            }
        }
        Ok(())
    }

    /// Drops `page_id` from the pool without writing it. Locks are untouched.
    pub fn discard_page(&self, page_id: PageId) {
        if self.table.lock().remove(page_id).is_some() {
            trace!(%page_id, "page discarded");
        }
    }

    fn make_room(&self, table: &mut MutexGuard<'_, PageTable>) -> Result<()> {
        while table.len() >= self.max_pages {
            self.evict_page(table)?;
        }
        Ok(())
    }

    /// Evicts the first clean page in load order, stripping every lock held on it.
    fn evict_page(&self, table: &mut MutexGuard<'_, PageTable>) -> Result<()> {
        let victim = table.choose_victim().ok_or(StrataError::BufferPoolFull {
            max_pages: self.max_pages,
        })?;

        table.remove(victim);
        table.unrelate_page(victim);
        let holders = self.lock_manager.release_page(victim);
        debug!(page_id = %victim, holders = holders.len(), "evicted page");
        Ok(())
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("max_pages", &self.max_pages)
            .field("resident", &self.resident_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::LockWait;
    use crate::recovery::NoopLog;
    use crate::storage::disk::HeapFile;
    use crate::tuple::{FieldType, TupleBuilder, TupleDesc};
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn setup(max_pages: usize) -> (BufferPool, Arc<HeapFile>, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let desc = TupleDesc::builder()
            .field("a", FieldType::Integer)
            .field("b", FieldType::Integer)
            .build_arc();
        let file = Arc::new(HeapFile::open_with_page_size(temp.path(), desc, 128).unwrap());
        let catalog = Arc::new(Catalog::new());
        catalog.add_table(file.clone(), "t", "a");

        let config = BufferPoolConfig::default()
            .with_max_pages(max_pages)
            .with_lock_wait(LockWait::fixed(Duration::from_millis(50)));
        let pool = BufferPool::new(config, catalog, Arc::new(NoopLog));
        (pool, file, temp)
    }

    fn row(file: &HeapFile, a: i32) -> Tuple {
        TupleBuilder::new(file.tuple_desc().clone())
            .value(a)
            .value(a * 10)
            .build()
    }

    #[test]
    fn test_get_page_locks_and_caches() {
        let (pool, file, _temp) = setup(4);
        let pid = file.allocate_page().unwrap();
        let tid = TransactionId::new();

        let first = pool.get_page(tid, pid, Permissions::ReadOnly).unwrap();
        let second = pool.get_page(tid, pid, Permissions::ReadOnly).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(pool.holds_lock(tid, pid));
        assert_eq!(file.get_num_reads(), 1);
    }

    #[test]
    fn test_unsafe_release_page() {
        let (pool, file, _temp) = setup(4);
        let pid = file.allocate_page().unwrap();
        let tid = TransactionId::new();

        pool.get_page(tid, pid, Permissions::ReadWrite).unwrap();
        pool.unsafe_release_page(tid, pid);
        assert!(!pool.holds_lock(tid, pid));
    }

    #[test]
    fn test_insert_marks_page_dirty() {
        let (pool, file, _temp) = setup(4);
        let tid = TransactionId::new();
        let mut tuple = row(&file, 1);

        pool.insert_tuple(tid, file.id(), &mut tuple).unwrap();

        let rid = tuple.record_id().unwrap();
        let page = pool.get_page(tid, rid.page_id, Permissions::ReadOnly).unwrap();
        assert_eq!(page.read().is_dirty(), Some(tid));
        assert_eq!(
            pool.lock_manager().lock_mode(tid, rid.page_id),
            Some(Permissions::ReadWrite)
        );
    }

    #[test]
    fn test_commit_cleans_pages() {
        let (pool, file, _temp) = setup(4);
        let tid = TransactionId::new();
        let mut tuple = row(&file, 7);
        pool.insert_tuple(tid, file.id(), &mut tuple).unwrap();
        let pid = tuple.record_id().unwrap().page_id;

        pool.transaction_complete(tid, true).unwrap();

        assert!(!pool.holds_lock(tid, pid));
        let on_disk = file.read_page(pid).unwrap();
        assert_eq!(on_disk.tuples().count(), 1);

        let reader = TransactionId::new();
        let page = pool.get_page(reader, pid, Permissions::ReadOnly).unwrap();
        let guard = page.read();
        assert_eq!(guard.is_dirty(), None);
        assert_eq!(guard.before_image_data(), &guard.page_data().unwrap());
    }

    #[test]
    fn test_abort_drops_pages() {
        let (pool, file, _temp) = setup(4);
        let tid = TransactionId::new();
        let mut tuple = row(&file, 7);
        pool.insert_tuple(tid, file.id(), &mut tuple).unwrap();
        let pid = tuple.record_id().unwrap().page_id;

        pool.transaction_complete(tid, false).unwrap();

        assert!(!pool.is_resident(pid));
        assert!(!pool.holds_lock(tid, pid));
        assert_eq!(file.read_page(pid).unwrap().tuples().count(), 0);
    }

    #[test]
    fn test_complete_without_work_is_ok() {
        let (pool, _file, _temp) = setup(4);
        let tid = TransactionId::new();
        pool.transaction_complete(tid, true).unwrap();
        pool.transaction_complete(tid, false).unwrap();
    }

    #[test]
    fn test_flush_all_keeps_dirty_marker() {
        let (pool, file, _temp) = setup(4);
        let tid = TransactionId::new();
        let mut tuple = row(&file, 3);
        pool.insert_tuple(tid, file.id(), &mut tuple).unwrap();
        let pid = tuple.record_id().unwrap().page_id;

        pool.flush_all_pages().unwrap();

        assert_eq!(file.read_page(pid).unwrap().tuples().count(), 1);
        let page = pool.get_page(tid, pid, Permissions::ReadOnly).unwrap();
        assert_eq!(page.read().is_dirty(), Some(tid));
    }

    #[test]
    fn test_discard_page_keeps_locks() {
        let (pool, file, _temp) = setup(4);
        let pid = file.allocate_page().unwrap();
        let tid = TransactionId::new();
        pool.get_page(tid, pid, Permissions::ReadOnly).unwrap();

        pool.discard_page(pid);

        assert!(!pool.is_resident(pid));
        assert!(pool.holds_lock(tid, pid));
    }

    #[test]
    fn test_full_of_dirty_pages() {
        let (pool, file, _temp) = setup(1);
        let p0 = file.allocate_page().unwrap();
        let p1 = file.allocate_page().unwrap();
        let tid = TransactionId::new();

        let page = pool.get_page(tid, p0, Permissions::ReadWrite).unwrap();
        page.write().mark_dirty(true, tid);

        let err = pool.get_page(tid, p1, Permissions::ReadOnly).unwrap_err();
        assert!(matches!(err, StrataError::BufferPoolFull { max_pages: 1 }));
        assert!(pool.is_resident(p0));
    }

    #[test]
    fn test_load_requires_surviving_lock() {
        let (pool, file, _temp) = setup(4);
        let pid = file.allocate_page().unwrap();
        let tid = TransactionId::new();

        pool.lock_manager().lock(tid, pid, Permissions::ReadWrite).unwrap();
        // An eviction strips the lock between the grant and the load
        pool.lock_manager().release_page(pid);

        assert!(pool.load_locked(tid, pid, Permissions::ReadOnly).unwrap().is_none());
        assert!(!pool.is_resident(pid));
        assert_eq!(file.get_num_reads(), 0);

        pool.lock_manager().lock(tid, pid, Permissions::ReadOnly).unwrap();
        assert!(pool.load_locked(tid, pid, Permissions::ReadWrite).unwrap().is_none());
        assert!(pool.load_locked(tid, pid, Permissions::ReadOnly).unwrap().is_some());
        assert!(pool.is_resident(pid));
    }

    #[test]
    fn test_mutation_after_lock_loss_is_rejected() {
        let (pool, file, _temp) = setup(1);
        let p0 = file.allocate_page().unwrap();
        let p1 = file.allocate_page().unwrap();
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        let stale = pool.get_page(t1, p0, Permissions::ReadWrite).unwrap();
        pool.get_page(TransactionId::new(), p1, Permissions::ReadOnly).unwrap();
        assert!(!pool.holds_lock(t1, p0));

        // Another transaction takes the page and commits a row into it
        let mut committed = row(&file, 111);
        pool.insert_tuple(t2, file.id(), &mut committed).unwrap();
        assert_eq!(committed.record_id().unwrap().page_id, p0);
        pool.transaction_complete(t2, true).unwrap();
        pool.get_page(TransactionId::new(), p1, Permissions::ReadOnly).unwrap();
        assert!(!pool.is_resident(p0));

        {
            let mut guard = stale.write();
            guard.insert_tuple(&mut row(&file, 222)).unwrap();
            guard.mark_dirty(true, t1);
        }
        let err = pool.register_dirty(t1, vec![stale]).unwrap_err();
        assert!(err.is_abort());
        assert!(!pool.is_resident(p0));

        pool.transaction_complete(t1, false).unwrap();
        let on_disk = file.read_page(p0).unwrap();
        let rows: Vec<_> = on_disk.tuples().map(|t| t.value(0).cloned()).collect();
        assert_eq!(rows, vec![Some(crate::tuple::Value::Integer(111))]);
    }
}
