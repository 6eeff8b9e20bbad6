use std::vec;

use crate::buffer::BufferPool;
use crate::common::{PageId, Permissions, Result, TransactionId};
use crate::tuple::Tuple;

use super::HeapFile;

/// Page-at-a-time scan over a [`HeapFile`].
///
/// Walks pages `0..num_pages()` in order, fetching each through the buffer pool with
/// `ReadOnly` permission, and yields the live tuples of a page in slot order. Tuples
/// are copied out of the page so no latch is held between calls to `next`.
///
/// A closed or never-opened iterator yields nothing. An error is yielded once and
/// closes the iterator.
pub struct HeapFileIterator<'a> {
    file: &'a HeapFile,
    pool: &'a BufferPool,
    tid: TransactionId,
    open: bool,
    next_page: u32,
    buffered: vec::IntoIter<Tuple>,
}

impl<'a> HeapFileIterator<'a> {
    pub(crate) fn new(file: &'a HeapFile, pool: &'a BufferPool, tid: TransactionId) -> Self {
        Self {
            file,
            pool,
            tid,
            open: false,
            next_page: 0,
            buffered: Vec::new().into_iter(),
        }
    }

    /// Positions the scan before the first tuple of page 0.
    pub fn open(&mut self) {
        self.open = true;
        self.next_page = 0;
        self.buffered = Vec::new().into_iter();
    }

    /// Restarts an open scan. No-op on an iterator that was never opened.
    pub fn rewind(&mut self) {
        if self.open {
            self.open();
        }
    }

    pub fn close(&mut self) {
        self.open = false;
        self.buffered = Vec::new().into_iter();
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    fn load_page(&mut self, page_no: u32) -> Result<()> {
        let page_id = PageId::new(self.file.id(), page_no);
        let page = self
            .pool
            .get_page(self.tid, page_id, Permissions::ReadOnly)?;
        let tuples: Vec<Tuple> = page.read().tuples().cloned().collect();
        self.buffered = tuples.into_iter();
        Ok(())
    }
}

impl Iterator for HeapFileIterator<'_> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.open {
            return None;
        }

        loop {
            if let Some(tuple) = self.buffered.next() {
                return Some(Ok(tuple));
            }
            let num_pages = match self.file.num_pages() {
                Ok(n) => n,
                Err(e) => {
                    self.close();
                    return Some(Err(e));
                }
            };
            if self.next_page >= num_pages {
                return None;
            }

            let page_no = self.next_page;
            self.next_page += 1;
            if let Err(e) = self.load_page(page_no) {
                self.close();
                return Some(Err(e));
            }
        }
    }
}
