use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::common::{PageId, RecordId, Result, SlotId, StrataError, TransactionId};
use crate::tuple::{Tuple, TupleDesc};

/// Largest slot count whose slot numbers all fit a [`SlotId`]
const MAX_SLOTS: usize = u16::MAX as usize + 1;

/// Heap page layout:
///
/// ```text
/// +------------------+
/// | Slot Bitmap      |  ceil(num_slots / 8) bytes, bit i set = slot i used
/// +------------------+
/// | Slot 0           |  tuple_size bytes each
/// | Slot 1           |
/// | ...              |
/// +------------------+
/// | Zero Padding     |  up to page_size
/// +------------------+
/// ```
///
/// `num_slots = floor(page_size * 8 / (tuple_size * 8 + 1))`: every slot costs its
/// tuple bytes plus one header bit.
///
/// Besides the decoded slots a resident page tracks which transaction dirtied it and
/// the image it had at its last clean point, which becomes the before-image of the
/// next log record.
#[derive(Debug)]
pub struct HeapPage {
    page_id: PageId,
    desc: Arc<TupleDesc>,
    page_size: usize,
    header: Vec<u8>,
    slots: Vec<Option<Tuple>>,
    dirtier: Option<TransactionId>,
    before_image: Bytes,
}

impl HeapPage {
    /// Decodes a page image. `data` must be exactly one page long.
    pub fn new(page_id: PageId, data: &[u8], desc: Arc<TupleDesc>) -> Result<Self> {
        let page_size = data.len();
        let num_slots = Self::slots_per_page(&desc, page_size);
        let header_size = Self::header_size(num_slots);
        if num_slots == 0 {
            return Err(StrataError::InvalidPageImage {
                page_id,
                expected: header_size + desc.tuple_size(),
                actual: page_size,
            });
        }
        Self::check_slot_count(page_size, num_slots)?;

        let header = data[..header_size].to_vec();
        let tuple_size = desc.tuple_size();
        let mut slots = Vec::with_capacity(num_slots);

        for slot in 0..num_slots {
            if header[slot / 8] & (1 << (slot % 8)) == 0 {
                slots.push(None);
                continue;
            }
            let start = header_size + slot * tuple_size;
            let mut tuple = Tuple::from_bytes(desc.clone(), &data[start..start + tuple_size])
                .ok_or_else(|| {
                    StrataError::TupleEncoding(format!("corrupt slot {} on {}", slot, page_id))
                })?;
            tuple.set_record_id(Some(RecordId::new(page_id, SlotId::new(slot as u16))));
            slots.push(Some(tuple));
        }

        Ok(Self {
            page_id,
            desc,
            page_size,
            header,
            slots,
            dirtier: None,
            before_image: Bytes::copy_from_slice(data),
        })
    }

    /// Creates a page with every slot free.
    pub fn empty(page_id: PageId, desc: Arc<TupleDesc>, page_size: usize) -> Result<Self> {
        Self::new(page_id, &Self::empty_page_data(page_size), desc)
    }

    /// An all-zero image, which decodes as a page with no used slots.
    pub fn empty_page_data(page_size: usize) -> Vec<u8> {
        vec![0u8; page_size]
    }

    /// Number of tuples of `desc` a page of `page_size` bytes can hold.
    pub fn slots_per_page(desc: &TupleDesc, page_size: usize) -> usize {
        (page_size * 8) / (desc.tuple_size() * 8 + 1)
    }

    /// Slot numbers are stored as `u16`, so a page may hold at most 65536 slots.
    pub(crate) fn check_slot_count(page_size: usize, num_slots: usize) -> Result<()> {
        if num_slots == 0 || num_slots > MAX_SLOTS {
            return Err(StrataError::UnsupportedPageSize {
                page_size,
                slots: num_slots,
            });
        }
        Ok(())
    }

    fn header_size(num_slots: usize) -> usize {
        num_slots.div_ceil(8)
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.slots.len() && self.header[slot / 8] & (1 << (slot % 8)) != 0
    }

    fn set_slot_used(&mut self, slot: usize, used: bool) {
        if used {
            self.header[slot / 8] |= 1 << (slot % 8);
        } else {
            self.header[slot / 8] &= !(1 << (slot % 8));
        }
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.slots.len())
            .filter(|&slot| !self.is_slot_used(slot))
            .count()
    }

    /// Stores `tuple` in the lowest free slot and assigns its record id.
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> Result<RecordId> {
        if **tuple.tuple_desc() != *self.desc {
            return Err(StrataError::TupleDescMismatch);
        }
        if tuple.to_bytes().is_none() {
            return Err(StrataError::TupleEncoding(tuple.to_string()));
        }

        let slot = (0..self.slots.len())
            .find(|&slot| !self.is_slot_used(slot))
            .ok_or(StrataError::PageFull(self.page_id))?;

        let record_id = RecordId::new(self.page_id, SlotId::new(slot as u16));
        tuple.set_record_id(Some(record_id));
        self.set_slot_used(slot, true);
        self.slots[slot] = Some(tuple.clone());
        Ok(record_id)
    }

    /// Frees the slot named by the tuple's record id.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        let record_id = tuple.record_id().ok_or(StrataError::MissingRecordId)?;
        if record_id.page_id != self.page_id {
            return Err(StrataError::WrongPage {
                record_id,
                page_id: self.page_id,
            });
        }

        let slot = record_id.slot_id.as_usize();
        if slot >= self.slots.len() {
            return Err(StrataError::InvalidSlotId {
                page_id: self.page_id,
                slot: record_id.slot_id.as_u16(),
            });
        }
        if !self.is_slot_used(slot) {
            return Err(StrataError::EmptySlot {
                page_id: self.page_id,
                slot: record_id.slot_id.as_u16(),
            });
        }

        self.set_slot_used(slot, false);
        self.slots[slot] = None;
        Ok(())
    }

    /// Returns the tuple stored in `slot`, if any.
    pub fn tuple(&self, slot: SlotId) -> Option<&Tuple> {
        self.slots.get(slot.as_usize()).and_then(Option::as_ref)
    }

    /// Live tuples in slot order.
    pub fn tuples(&self) -> impl Iterator<Item = &Tuple> + '_ {
        self.slots.iter().flatten()
    }

    /// Encodes the page into exactly `page_size` bytes.
    pub fn page_data(&self) -> Result<Bytes> {
        let tuple_size = self.desc.tuple_size();
        let mut buf = BytesMut::with_capacity(self.page_size);
        buf.extend_from_slice(&self.header);

        for slot in &self.slots {
            match slot {
                Some(tuple) => {
                    let bytes = tuple
                        .to_bytes()
                        .ok_or_else(|| StrataError::TupleEncoding(tuple.to_string()))?;
                    buf.extend_from_slice(&bytes);
                }
                None => buf.resize(buf.len() + tuple_size, 0),
            }
        }

        buf.resize(self.page_size, 0);
        Ok(buf.freeze())
    }

    /// Marks the page dirty on behalf of `tid`, or clean when `dirty` is false.
    pub fn mark_dirty(&mut self, dirty: bool, tid: TransactionId) {
        self.dirtier = if dirty { Some(tid) } else { None };
    }

    /// The transaction that dirtied this page, None when clean.
    pub fn is_dirty(&self) -> Option<TransactionId> {
        self.dirtier
    }

    /// The page as it was at its last clean point.
    pub fn before_image(&self) -> Result<HeapPage> {
        HeapPage::new(self.page_id, &self.before_image, self.desc.clone())
    }

    pub fn before_image_data(&self) -> &Bytes {
        &self.before_image
    }

    /// Takes the current contents as the new before-image; called once they are durable.
    pub fn set_before_image(&mut self) -> Result<()> {
        self.before_image = self.page_data()?;
        Ok(())
    }
}
