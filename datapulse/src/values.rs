use indexmap::IndexMap;

use crate::{ColumnType, Timestamp};

/// A single dynamically typed sample value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    Boolean(bool),

    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),

    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),

    Float32(f32),
    Float64(f64),

    String(String),
    Timestamp(Timestamp),
    Bytes(Vec<u8>),

    Array(Vec<Value>),
    Structure(IndexMap<String, Value>),
    Image(ImageValue),

    Null,
}

/// An encoded image sample: a format tag plus the raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageValue {
    pub format: String,
    pub data: Vec<u8>,
}

impl Value {
    /// Guesses the element type from the value alone.
    pub fn guess_type(&self) -> ColumnType {
        match self {
            Value::Boolean(_) => ColumnType::Boolean,
            Value::Int8(_) => ColumnType::Int8,
            Value::Int16(_) => ColumnType::Int16,
            Value::Int32(_) => ColumnType::Int32,
            Value::Int64(_) => ColumnType::Int64,
            Value::UInt8(_) => ColumnType::UInt8,
            Value::UInt16(_) => ColumnType::UInt16,
            Value::UInt32(_) => ColumnType::UInt32,
            Value::UInt64(_) => ColumnType::UInt64,
            Value::Float32(_) => ColumnType::Float32,
            Value::Float64(_) => ColumnType::Float64,
            Value::String(_) => ColumnType::String,
            Value::Timestamp(_) => ColumnType::Timestamp,
            Value::Bytes(_) => ColumnType::Bytes,
            Value::Array(_) => ColumnType::Array,
            Value::Structure(_) => ColumnType::Structure,
            Value::Image(_) => ColumnType::Image,
            Value::Null => ColumnType::Unsupported,
        }
    }

    /// Measured in-memory payload size, used for allocation estimates of
    /// variable-width columns.
    pub fn allocation(&self) -> usize {
        match self {
            Value::String(s) => s.len(),
            Value::Bytes(b) => b.len(),
            Value::Array(values) => values.iter().map(Value::allocation).sum::<usize>() + 8,
            Value::Structure(members) => members
                .iter()
                .map(|(name, value)| name.len() + value.allocation())
                .sum::<usize>(),
            Value::Image(image) => image.format.len() + image.data.len(),
            Value::Null => 0,
            other => other.guess_type().fixed_width().unwrap_or(0),
        }
    }
}

macro_rules! sized_column_accessors {
    ($($variant:ident, $accessor:ident, $elem:ty;)*) => {
        $(
            pub fn $accessor(&self) -> Option<&[$elem]> {
                match self {
                    ColumnValues::$variant(values) => Some(values),
                    _ => None,
                }
            }
        )*
    };
}

/// The typed buffer behind a data column: one variant per element type, each
/// an ordered homogeneous sequence.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ColumnValues {
    Boolean(Vec<bool>),

    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),

    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),

    Float32(Vec<f32>),
    Float64(Vec<f64>),

    String(Vec<String>),
    Timestamp(Vec<Timestamp>),
    Bytes(Vec<Vec<u8>>),

    Array(Vec<Vec<Value>>),
    Structure(Vec<IndexMap<String, Value>>),
    Image(Vec<ImageValue>),

    /// A column whose element type the platform does not model. Only the
    /// sample count is retained.
    Unsupported { len: usize },
}

impl ColumnValues {
    pub fn element_type(&self) -> ColumnType {
        match self {
            ColumnValues::Boolean(_) => ColumnType::Boolean,
            ColumnValues::Int8(_) => ColumnType::Int8,
            ColumnValues::Int16(_) => ColumnType::Int16,
            ColumnValues::Int32(_) => ColumnType::Int32,
            ColumnValues::Int64(_) => ColumnType::Int64,
            ColumnValues::UInt8(_) => ColumnType::UInt8,
            ColumnValues::UInt16(_) => ColumnType::UInt16,
            ColumnValues::UInt32(_) => ColumnType::UInt32,
            ColumnValues::UInt64(_) => ColumnType::UInt64,
            ColumnValues::Float32(_) => ColumnType::Float32,
            ColumnValues::Float64(_) => ColumnType::Float64,
            ColumnValues::String(_) => ColumnType::String,
            ColumnValues::Timestamp(_) => ColumnType::Timestamp,
            ColumnValues::Bytes(_) => ColumnType::Bytes,
            ColumnValues::Array(_) => ColumnType::Array,
            ColumnValues::Structure(_) => ColumnType::Structure,
            ColumnValues::Image(_) => ColumnType::Image,
            ColumnValues::Unsupported { .. } => ColumnType::Unsupported,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Boolean(v) => v.len(),
            ColumnValues::Int8(v) => v.len(),
            ColumnValues::Int16(v) => v.len(),
            ColumnValues::Int32(v) => v.len(),
            ColumnValues::Int64(v) => v.len(),
            ColumnValues::UInt8(v) => v.len(),
            ColumnValues::UInt16(v) => v.len(),
            ColumnValues::UInt32(v) => v.len(),
            ColumnValues::UInt64(v) => v.len(),
            ColumnValues::Float32(v) => v.len(),
            ColumnValues::Float64(v) => v.len(),
            ColumnValues::String(v) => v.len(),
            ColumnValues::Timestamp(v) => v.len(),
            ColumnValues::Bytes(v) => v.len(),
            ColumnValues::Array(v) => v.len(),
            ColumnValues::Structure(v) => v.len(),
            ColumnValues::Image(v) => v.len(),
            ColumnValues::Unsupported { len } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dynamic access to one sample.
    pub fn get(&self, index: usize) -> Option<Value> {
        if index >= self.len() {
            return None;
        }
        Some(match self {
            ColumnValues::Boolean(v) => Value::Boolean(v[index]),
            ColumnValues::Int8(v) => Value::Int8(v[index]),
            ColumnValues::Int16(v) => Value::Int16(v[index]),
            ColumnValues::Int32(v) => Value::Int32(v[index]),
            ColumnValues::Int64(v) => Value::Int64(v[index]),
            ColumnValues::UInt8(v) => Value::UInt8(v[index]),
            ColumnValues::UInt16(v) => Value::UInt16(v[index]),
            ColumnValues::UInt32(v) => Value::UInt32(v[index]),
            ColumnValues::UInt64(v) => Value::UInt64(v[index]),
            ColumnValues::Float32(v) => Value::Float32(v[index]),
            ColumnValues::Float64(v) => Value::Float64(v[index]),
            ColumnValues::String(v) => Value::String(v[index].clone()),
            ColumnValues::Timestamp(v) => Value::Timestamp(v[index]),
            ColumnValues::Bytes(v) => Value::Bytes(v[index].clone()),
            ColumnValues::Array(v) => Value::Array(v[index].clone()),
            ColumnValues::Structure(v) => Value::Structure(v[index].clone()),
            ColumnValues::Image(v) => Value::Image(v[index].clone()),
            ColumnValues::Unsupported { .. } => Value::Null,
        })
    }

    /// Estimated in-memory size of the buffer in bytes: per-type width times
    /// length for fixed-width types, measured content for the rest.
    pub fn allocation(&self) -> usize {
        if let Some(width) = self.element_type().fixed_width() {
            return width * self.len();
        }
        match self {
            ColumnValues::String(v) => v.iter().map(|s| s.len() + 8).sum(),
            ColumnValues::Bytes(v) => v.iter().map(|b| b.len() + 8).sum(),
            ColumnValues::Array(v) => v
                .iter()
                .map(|a| a.iter().map(Value::allocation).sum::<usize>() + 8)
                .sum(),
            ColumnValues::Structure(v) => v
                .iter()
                .map(|members| {
                    members
                        .iter()
                        .map(|(name, value)| name.len() + value.allocation())
                        .sum::<usize>()
                        + 8
                })
                .sum(),
            ColumnValues::Image(v) => v
                .iter()
                .map(|image| image.format.len() + image.data.len() + 8)
                .sum(),
            _ => unreachable!("fixed-width handled above"),
        }
    }

    /// A copy of rows `offset..offset + len`.
    pub fn slice_rows(&self, offset: usize, len: usize) -> ColumnValues {
        let end = (offset + len).min(self.len());
        let offset = offset.min(end);
        match self {
            ColumnValues::Boolean(v) => ColumnValues::Boolean(v[offset..end].to_vec()),
            ColumnValues::Int8(v) => ColumnValues::Int8(v[offset..end].to_vec()),
            ColumnValues::Int16(v) => ColumnValues::Int16(v[offset..end].to_vec()),
            ColumnValues::Int32(v) => ColumnValues::Int32(v[offset..end].to_vec()),
            ColumnValues::Int64(v) => ColumnValues::Int64(v[offset..end].to_vec()),
            ColumnValues::UInt8(v) => ColumnValues::UInt8(v[offset..end].to_vec()),
            ColumnValues::UInt16(v) => ColumnValues::UInt16(v[offset..end].to_vec()),
            ColumnValues::UInt32(v) => ColumnValues::UInt32(v[offset..end].to_vec()),
            ColumnValues::UInt64(v) => ColumnValues::UInt64(v[offset..end].to_vec()),
            ColumnValues::Float32(v) => ColumnValues::Float32(v[offset..end].to_vec()),
            ColumnValues::Float64(v) => ColumnValues::Float64(v[offset..end].to_vec()),
            ColumnValues::String(v) => ColumnValues::String(v[offset..end].to_vec()),
            ColumnValues::Timestamp(v) => ColumnValues::Timestamp(v[offset..end].to_vec()),
            ColumnValues::Bytes(v) => ColumnValues::Bytes(v[offset..end].to_vec()),
            ColumnValues::Array(v) => ColumnValues::Array(v[offset..end].to_vec()),
            ColumnValues::Structure(v) => ColumnValues::Structure(v[offset..end].to_vec()),
            ColumnValues::Image(v) => ColumnValues::Image(v[offset..end].to_vec()),
            ColumnValues::Unsupported { .. } => ColumnValues::Unsupported { len: end - offset },
        }
    }

    sized_column_accessors! {
        Boolean, as_boolean, bool;
        Int8, as_i8, i8;
        Int16, as_i16, i16;
        Int32, as_i32, i32;
        Int64, as_i64, i64;
        UInt8, as_u8, u8;
        UInt16, as_u16, u16;
        UInt32, as_u32, u32;
        UInt64, as_u64, u64;
        Float32, as_f32, f32;
        Float64, as_f64, f64;
        String, as_string, String;
        Timestamp, as_timestamp, Timestamp;
    }
}
