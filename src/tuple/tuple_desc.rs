use std::collections::HashMap;
use std::sync::Arc;

use super::FieldType;

/// Describes one field of a tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDesc {
    name: String,
    field_type: FieldType,
    nullable: bool,
}

impl FieldDesc {
    pub fn new(name: impl Into<String>, field_type: FieldType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}

/// Ordered list of fields shared by every tuple of a table.
///
/// Equality is structural: two descriptors are equal when their field lists are.
#[derive(Debug, Clone)]
pub struct TupleDesc {
    fields: Vec<FieldDesc>,
    name_to_index: HashMap<String, usize>,
    /// Size of the null bitmap in bytes (ceiling of field_count / 8)
    null_bitmap_size: usize,
    tuple_size: usize,
}

impl TupleDesc {
    pub fn new(fields: Vec<FieldDesc>) -> Self {
        let mut name_to_index = HashMap::new();
        for (i, field) in fields.iter().enumerate() {
            // First occurrence wins, like a left-to-right lookup
            name_to_index.entry(field.name.clone()).or_insert(i);
        }

        let null_bitmap_size = fields.len().div_ceil(8);
        let tuple_size =
            null_bitmap_size + fields.iter().map(|f| f.field_type.width()).sum::<usize>();

        Self {
            fields,
            name_to_index,
            null_bitmap_size,
            tuple_size,
        }
    }

    pub fn builder() -> TupleDescBuilder {
        TupleDescBuilder::new()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, index: usize) -> Option<&FieldDesc> {
        self.fields.get(index)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDesc> {
        self.fields.iter()
    }

    pub fn null_bitmap_size(&self) -> usize {
        self.null_bitmap_size
    }

    /// Encoded size in bytes of every tuple with this descriptor.
    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }

    /// Concatenates two descriptors, `self`'s fields first.
    pub fn merge(&self, other: &TupleDesc) -> TupleDesc {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.iter().cloned());
        TupleDesc::new(fields)
    }
}

impl PartialEq for TupleDesc {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for TupleDesc {}

/// Builder for constructing tuple descriptors fluently.
#[derive(Default)]
pub struct TupleDescBuilder {
    fields: Vec<FieldDesc>,
}

impl TupleDescBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a non-nullable field.
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldDesc::new(name, field_type, false));
        self
    }

    /// Adds a nullable field.
    pub fn nullable_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldDesc::new(name, field_type, true));
        self
    }

    pub fn build(self) -> TupleDesc {
        TupleDesc::new(self.fields)
    }

    pub fn build_arc(self) -> Arc<TupleDesc> {
        Arc::new(self.build())
    }
}
