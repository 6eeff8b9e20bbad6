use std::collections::{HashMap, HashSet};

use crate::common::{PageId, TransactionId};

use super::PageRef;

/// Resident pages of the buffer pool, in load order, plus the transaction<->page
/// associations recorded by `get_page`.
///
/// Not synchronized; the pool keeps it behind its mutex.
#[derive(Default)]
pub struct PageTable {
    /// Residency order; eviction scans it front to back
    order: Vec<PageId>,
    pages: HashMap<PageId, PageRef>,
    tx_pages: HashMap<TransactionId, HashSet<PageId>>,
    page_txs: HashMap<PageId, HashSet<TransactionId>>,
}

impl PageTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.pages.contains_key(&page_id)
    }

    pub fn get(&self, page_id: PageId) -> Option<&PageRef> {
        self.pages.get(&page_id)
    }

    /// Makes `page` the resident instance of `page_id`. Replacing an existing instance
    /// keeps its place in the residency order.
    pub fn insert(&mut self, page_id: PageId, page: PageRef) {
        if self.pages.insert(page_id, page).is_none() {
            self.order.push(page_id);
        }
    }

    /// Drops `page_id` from residency. Associations are left alone.
    pub fn remove(&mut self, page_id: PageId) -> Option<PageRef> {
        let page = self.pages.remove(&page_id)?;
        self.order.retain(|&p| p != page_id);
        Some(page)
    }

    pub fn relate(&mut self, tid: TransactionId, page_id: PageId) {
        self.tx_pages.entry(tid).or_default().insert(page_id);
        self.page_txs.entry(page_id).or_default().insert(tid);
    }

    /// Forgets every association of `page_id`.
    pub fn unrelate_page(&mut self, page_id: PageId) {
        let Some(tids) = self.page_txs.remove(&page_id) else {
            return;
        };
        for tid in tids {
            if let Some(pages) = self.tx_pages.get_mut(&tid) {
                pages.remove(&page_id);
                if pages.is_empty() {
                    self.tx_pages.remove(&tid);
                }
            }
        }
    }

    pub fn unrelate(&mut self, tid: TransactionId, page_id: PageId) {
        if let Some(pages) = self.tx_pages.get_mut(&tid) {
            pages.remove(&page_id);
            if pages.is_empty() {
                self.tx_pages.remove(&tid);
            }
        }
        if let Some(tids) = self.page_txs.get_mut(&page_id) {
            tids.remove(&tid);
            if tids.is_empty() {
                self.page_txs.remove(&page_id);
            }
        }
    }

    /// Forgets every association of `tid`.
    pub fn forget_transaction(&mut self, tid: TransactionId) {
        let Some(pages) = self.tx_pages.remove(&tid) else {
            return;
        };
        for page_id in pages {
            if let Some(tids) = self.page_txs.get_mut(&page_id) {
                tids.remove(&tid);
                if tids.is_empty() {
                    self.page_txs.remove(&page_id);
                }
            }
        }
    }

    /// Resident pages whose dirty marker names `tid`, in residency order.
    pub fn dirtied_by(&self, tid: TransactionId) -> Vec<(PageId, PageRef)> {
        self.resident()
            .filter(|(_, page)| page.read().is_dirty() == Some(tid))
            .collect()
    }

    /// Resident pages with any dirty marker, in residency order.
    pub fn dirty_pages(&self) -> Vec<(PageId, PageRef)> {
        self.resident()
            .filter(|(_, page)| page.read().is_dirty().is_some())
            .collect()
    }

    /// First clean page in residency order.
    pub fn choose_victim(&self) -> Option<PageId> {
        self.resident()
            .find(|(_, page)| page.read().is_dirty().is_none())
            .map(|(page_id, _)| page_id)
    }

    fn resident(&self) -> impl Iterator<Item = (PageId, PageRef)> + '_ {
        self.order
            .iter()
            .filter_map(|page_id| self.pages.get(page_id).map(|p| (*page_id, p.clone())))
    }
}
