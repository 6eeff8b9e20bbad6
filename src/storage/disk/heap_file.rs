use std::collections::hash_map::DefaultHasher;
use std::fs::{File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::buffer::{BufferPool, PageRef};
use crate::common::{
    PageId, Permissions, Result, StrataError, TableId, TransactionId, DEFAULT_PAGE_SIZE,
};
use crate::storage::page::HeapPage;
use crate::tuple::{Tuple, TupleDesc};

use super::HeapFileIterator;

/// HeapFile stores the tuples of one table, in no particular order, in a single file
/// made of fixed-size [`HeapPage`]s. Page `n` occupies bytes
/// `[n * page_size, (n + 1) * page_size)`.
///
/// Raw page I/O goes straight to the file. Tuple-level operations and scans fetch
/// pages through the [`BufferPool`] so that they are locked and cached.
pub struct HeapFile {
    /// The backing file
    file: Mutex<File>,
    /// Absolute path of the backing file
    path: PathBuf,
    table_id: TableId,
    desc: Arc<TupleDesc>,
    page_size: usize,
    /// Number of page reads performed
    num_reads: AtomicU32,
    /// Number of page writes performed
    num_writes: AtomicU32,
}

impl HeapFile {
    /// Opens (creating if needed) a heap file with the default page size.
    pub fn open<P: AsRef<Path>>(path: P, desc: Arc<TupleDesc>) -> Result<Self> {
        Self::open_with_page_size(path, desc, DEFAULT_PAGE_SIZE)
    }

    /// Opens a heap file whose pages are `page_size` bytes. The page size must stay
    /// the same for every handle on a given file.
    pub fn open_with_page_size<P: AsRef<Path>>(
        path: P,
        desc: Arc<TupleDesc>,
        page_size: usize,
    ) -> Result<Self> {
        HeapPage::check_slot_count(page_size, HeapPage::slots_per_page(&desc, page_size))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let path = path.as_ref().canonicalize()?;

        Ok(Self {
            file: Mutex::new(file),
            table_id: Self::table_id_for(&path),
            path,
            desc,
            page_size,
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// Stable table id derived from the absolute path of the backing file.
    fn table_id_for(path: &Path) -> TableId {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        let hash = hasher.finish();
        (hash ^ (hash >> 32)) as TableId
    }

    pub fn id(&self) -> TableId {
        self.table_id
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads one page from disk. Reading past the end of the file is an I/O error.
    pub fn read_page(&self, page_id: PageId) -> Result<HeapPage> {
        if page_id.table_id != self.table_id {
            return Err(StrataError::TableNotFound(page_id.table_id));
        }

        let mut data = vec![0u8; self.page_size];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(page_id.offset(self.page_size)))?;
            file.read_exact(&mut data)?;
        }
        self.num_reads.fetch_add(1, Ordering::Relaxed);
        trace!(%page_id, "read page");

        HeapPage::new(page_id, &data, self.desc.clone())
    }

    /// Overwrites the page's slot in the file.
    pub fn write_page(&self, page: &HeapPage) -> Result<()> {
        let page_id = page.page_id();
        if page_id.table_id != self.table_id {
            return Err(StrataError::TableNotFound(page_id.table_id));
        }
        if page.page_size() != self.page_size {
            return Err(StrataError::InvalidPageImage {
                page_id,
                expected: self.page_size,
                actual: page.page_size(),
            });
        }

        let data = page.page_data()?;
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(page_id.offset(self.page_size)))?;
            file.write_all(&data)?;
            file.flush()?;
        }
        self.num_writes.fetch_add(1, Ordering::Relaxed);
        trace!(%page_id, "wrote page");
        Ok(())
    }

    /// Number of whole pages in the backing file.
    pub fn num_pages(&self) -> Result<u32> {
        let len = self.file.lock().metadata()?.len();
        Ok((len / self.page_size as u64) as u32)
    }

    /// Appends an empty page to the file and returns its id. The growth is durable
    /// immediately; it does not go through the buffer pool.
    pub fn allocate_page(&self) -> Result<PageId> {
        let mut file = self.file.lock();
        let page_no = (file.metadata()?.len() / self.page_size as u64) as u32;
        let page_id = PageId::new(self.table_id, page_no);

        file.seek(SeekFrom::Start(page_id.offset(self.page_size)))?;
        file.write_all(&HeapPage::empty_page_data(self.page_size))?;
        file.flush()?;
        drop(file);

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        debug!(%page_id, table = %self.path.display(), "heap file grew by one page");
        Ok(page_id)
    }

    /// Inserts `tuple` into the lowest-numbered page with a free slot, appending a new
    /// page when every existing one is full. Pages are fetched through `pool` with
    /// `ReadWrite` permission. Returns the page that received the tuple.
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> Result<Vec<PageRef>> {
        if **tuple.tuple_desc() != *self.desc {
            return Err(StrataError::TupleDescMismatch);
        }

        let mut next_page = 0;
        loop {
            let num_pages = self.num_pages()?;
            for page_no in next_page..num_pages {
                let page_id = PageId::new(self.table_id, page_no);
                let page = pool.get_page(tid, page_id, Permissions::ReadWrite)?;
                {
                    let mut guard = page.write();
                    if guard.num_empty_slots() == 0 {
                        continue;
                    }
                    guard.insert_tuple(tuple)?;
                    guard.mark_dirty(true, tid);
                }
                return Ok(vec![page]);
            }
            next_page = num_pages;

            // Every page was full; another transaction may have appended meanwhile, in
            // which case the next pass scans its page before growing again.
            self.allocate_page()?;
        }
    }

    /// Removes `tuple` from the page named by its record id and clears the record id.
    pub fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> Result<Vec<PageRef>> {
        let record_id = tuple.record_id().ok_or(StrataError::MissingRecordId)?;
        if record_id.page_id.table_id != self.table_id {
            return Err(StrataError::WrongTable {
                record_id,
                table_id: self.table_id,
            });
        }

        let page = pool.get_page(tid, record_id.page_id, Permissions::ReadWrite)?;
        {
            let mut guard = page.write();
            guard.delete_tuple(tuple)?;
            guard.mark_dirty(true, tid);
        }
        tuple.set_record_id(None);
        Ok(vec![page])
    }

    /// Returns a scan over every live tuple, page by page. The iterator must be opened
    /// before it yields anything.
    pub fn iter<'a>(&'a self, pool: &'a BufferPool, tid: TransactionId) -> HeapFileIterator<'a> {
        HeapFileIterator::new(self, pool, tid)
    }

    /// Returns the number of page reads performed.
    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of page writes performed.
    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

}

impl std::fmt::Debug for HeapFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapFile")
            .field("table_id", &self.table_id)
            .field("path", &self.path)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl Drop for HeapFile {
    fn drop(&mut self) {
        // Ensure all data is flushed to disk
        let file = self.file.get_mut();
        let _ = file.sync_all();
    }
}
