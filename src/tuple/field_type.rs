use std::fmt;

/// Type of a tuple field.
///
/// Every type encodes to a fixed number of bytes so that all tuples of a table have the
/// same width and a heap page can be cut into equally sized slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// 1 byte (0 = false, 1 = true)
    Boolean,

    /// 32-bit signed integer: 4 bytes, little-endian
    Integer,

    /// 64-bit signed integer: 8 bytes, little-endian
    BigInt,

    /// 64-bit floating point: 8 bytes, IEEE 754
    Double,

    /// String of at most n bytes.
    /// Stored as: length (2 bytes) + data, zero padded to n bytes
    Text(u16),
}

impl FieldType {
    /// Returns the encoded width of this type in bytes.
    pub fn width(&self) -> usize {
        match self {
            FieldType::Boolean => 1,
            FieldType::Integer => 4,
            FieldType::BigInt | FieldType::Double => 8,
            FieldType::Text(n) => 2 + *n as usize,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Boolean => write!(f, "BOOLEAN"),
            FieldType::Integer => write!(f, "INTEGER"),
            FieldType::BigInt => write!(f, "BIGINT"),
            FieldType::Double => write!(f, "DOUBLE"),
            FieldType::Text(n) => write!(f, "TEXT({})", n),
        }
    }
}
