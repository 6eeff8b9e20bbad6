use std::fmt;
use std::sync::Arc;

use bytes::BytesMut;

use crate::common::RecordId;

use super::{TupleDesc, Value};

/// Represents a single row of a table.
///
/// A tuple holds one value per field of its descriptor and, once stored, the
/// [`RecordId`] of the slot it lives in.
///
/// ## Tuple Binary Format
///
/// ```text
/// +----------------+---------+---------+-----+---------+
/// | Null Bitmap    | Field 0 | Field 1 | ... | Field n |
/// | (N bytes)      |         |         |     |         |
/// +----------------+---------+---------+-----+---------+
/// ```
///
/// The null bitmap has one bit per field (1 = NULL). Each field occupies exactly
/// `FieldType::width()` bytes, so every tuple of a descriptor encodes to
/// `TupleDesc::tuple_size()` bytes.
#[derive(Debug, Clone)]
pub struct Tuple {
    desc: Arc<TupleDesc>,
    values: Vec<Value>,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Creates a new tuple with the given descriptor and values.
    ///
    /// # Panics
    /// Panics if the number of values doesn't match the descriptor's field count.
    pub fn new(desc: Arc<TupleDesc>, values: Vec<Value>) -> Self {
        assert_eq!(
            values.len(),
            desc.field_count(),
            "Value count must match field count"
        );
        Self {
            desc,
            values,
            record_id: None,
        }
    }

    /// Decodes a tuple from its fixed-width encoding.
    pub fn from_bytes(desc: Arc<TupleDesc>, data: &[u8]) -> Option<Self> {
        if data.len() < desc.tuple_size() {
            return None;
        }

        let bitmap = &data[..desc.null_bitmap_size()];
        let mut offset = desc.null_bitmap_size();
        let mut values = Vec::with_capacity(desc.field_count());

        for (i, field) in desc.fields().enumerate() {
            let width = field.field_type().width();
            if bitmap[i / 8] & (1 << (i % 8)) != 0 {
                values.push(Value::Null);
            } else {
                values.push(Value::decode(
                    &data[offset..offset + width],
                    field.field_type(),
                )?);
            }
            offset += width;
        }

        Some(Self {
            desc,
            values,
            record_id: None,
        })
    }

    /// Encodes the tuple; None if a value does not fit its field.
    pub fn to_bytes(&self) -> Option<BytesMut> {
        let mut buf = BytesMut::with_capacity(self.desc.tuple_size());

        let mut bitmap = vec![0u8; self.desc.null_bitmap_size()];
        for (i, value) in self.values.iter().enumerate() {
            if value.is_null() {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        buf.extend_from_slice(&bitmap);

        for (field, value) in self.desc.fields().zip(&self.values) {
            if (value.is_null() && !field.is_nullable()) || !value.fits(field.field_type()) {
                return None;
            }
            value.encode(field.field_type(), &mut buf)?;
        }

        Some(buf)
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn value_by_name(&self, name: &str) -> Option<&Value> {
        self.desc
            .field_index(name)
            .and_then(|i| self.values.get(i))
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Sets the value at the given field index.
    pub fn set_value(&mut self, index: usize, value: Value) -> bool {
        match self.values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }
}

/// Equality compares descriptors and values; where the tuple is stored is ignored.
impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.desc == other.desc && self.values == other.values
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for value in &self.values {
            if !first {
                write!(f, "\t")?;
            }
            write!(f, "{}", value)?;
            first = false;
        }
        Ok(())
    }
}

/// Builder for constructing tuples fluently.
pub struct TupleBuilder {
    desc: Arc<TupleDesc>,
    values: Vec<Value>,
    current_index: usize,
}

impl TupleBuilder {
    pub fn new(desc: Arc<TupleDesc>) -> Self {
        let count = desc.field_count();
        Self {
            desc,
            values: vec![Value::Null; count],
            current_index: 0,
        }
    }

    /// Sets the value at the current position and advances.
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        if self.current_index < self.values.len() {
            self.values[self.current_index] = value.into();
            self.current_index += 1;
        }
        self
    }

    /// Sets a null value at the current position and advances.
    pub fn null(self) -> Self {
        self.value(Value::Null)
    }

    /// Sets the value for a specific field by name.
    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        if let Some(index) = self.desc.field_index(name) {
            self.values[index] = value.into();
        }
        self
    }

    pub fn build(self) -> Tuple {
        Tuple::new(self.desc, self.values)
    }
}
