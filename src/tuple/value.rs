use std::fmt;

use bytes::{Buf, BufMut};

use super::FieldType;

/// Represents a typed value that can be stored in a tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value - can be any type
    Null,
    Boolean(bool),
    Integer(i32),
    BigInt(i64),
    Double(f64),
    Text(String),
}

impl Value {
    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true if this value can be stored in a field of the given type.
    pub fn fits(&self, field_type: &FieldType) -> bool {
        match (self, field_type) {
            (Value::Null, _) => true,
            (Value::Boolean(_), FieldType::Boolean) => true,
            (Value::Integer(_), FieldType::Integer | FieldType::BigInt) => true,
            (Value::BigInt(_), FieldType::BigInt) => true,
            (Value::Double(_), FieldType::Double) => true,
            (Value::Text(s), FieldType::Text(n)) => s.len() <= *n as usize,
            _ => false,
        }
    }

    /// Appends exactly `field_type.width()` bytes encoding this value.
    /// Null encodes as zeros; the tuple's null bitmap records it.
    /// Returns None if the value does not fit the type.
    pub fn encode<B: BufMut>(&self, field_type: &FieldType, buf: &mut B) -> Option<()> {
        match (self, field_type) {
            (Value::Null, ft) => buf.put_bytes(0, ft.width()),
            (Value::Boolean(b), FieldType::Boolean) => buf.put_u8(u8::from(*b)),
            (Value::Integer(v), FieldType::Integer) => buf.put_i32_le(*v),
            (Value::Integer(v), FieldType::BigInt) => buf.put_i64_le(*v as i64),
            (Value::BigInt(v), FieldType::BigInt) => buf.put_i64_le(*v),
            (Value::Double(v), FieldType::Double) => buf.put_f64_le(*v),
            (Value::Text(s), FieldType::Text(n)) => {
                let max = *n as usize;
                if s.len() > max {
                    return None;
                }
                buf.put_u16_le(s.len() as u16);
                buf.put_slice(s.as_bytes());
                buf.put_bytes(0, max - s.len());
            }
            _ => return None,
        }
        Some(())
    }

    /// Decodes a value of the given type from the front of `data`.
    /// `data` must hold at least `field_type.width()` bytes.
    pub fn decode(mut data: &[u8], field_type: &FieldType) -> Option<Self> {
        if data.len() < field_type.width() {
            return None;
        }
        let value = match field_type {
            FieldType::Boolean => Value::Boolean(data.get_u8() != 0),
            FieldType::Integer => Value::Integer(data.get_i32_le()),
            FieldType::BigInt => Value::BigInt(data.get_i64_le()),
            FieldType::Double => Value::Double(data.get_f64_le()),
            FieldType::Text(n) => {
                let len = data.get_u16_le() as usize;
                if len > *n as usize {
                    return None;
                }
                Value::Text(String::from_utf8_lossy(&data[..len]).into_owned())
            }
        };
        Some(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}
