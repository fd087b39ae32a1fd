use std::fmt;

/// Element type of a data column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ColumnType {
    Boolean,

    Int8,
    Int16,
    Int32,
    Int64,

    UInt8,
    UInt16,
    UInt32,
    UInt64,

    Float32,
    Float64,

    String,
    Timestamp,
    Bytes,

    Array,
    Structure,
    Image,

    Unsupported,
}

impl ColumnType {
    /// Per-element width in bytes for fixed-width types. Variable-width types
    /// (`String`, `Bytes`, `Array`, `Structure`, `Image`) return `None` and
    /// are sized by measured content instead.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            ColumnType::Boolean | ColumnType::Int8 | ColumnType::UInt8 => Some(1),
            ColumnType::Int16 | ColumnType::UInt16 => Some(2),
            ColumnType::Int32 | ColumnType::UInt32 | ColumnType::Float32 => Some(4),
            ColumnType::Int64 | ColumnType::UInt64 | ColumnType::Float64 => Some(8),
            // second + nanosecond pair
            ColumnType::Timestamp => Some(12),
            ColumnType::String
            | ColumnType::Bytes
            | ColumnType::Array
            | ColumnType::Structure
            | ColumnType::Image => None,
            ColumnType::Unsupported => Some(0),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Boolean => "Boolean",
            ColumnType::Int8 => "Int8",
            ColumnType::Int16 => "Int16",
            ColumnType::Int32 => "Int32",
            ColumnType::Int64 => "Int64",
            ColumnType::UInt8 => "UInt8",
            ColumnType::UInt16 => "UInt16",
            ColumnType::UInt32 => "UInt32",
            ColumnType::UInt64 => "UInt64",
            ColumnType::Float32 => "Float32",
            ColumnType::Float64 => "Float64",
            ColumnType::String => "String",
            ColumnType::Timestamp => "Timestamp",
            ColumnType::Bytes => "Bytes",
            ColumnType::Array => "Array",
            ColumnType::Structure => "Structure",
            ColumnType::Image => "Image",
            ColumnType::Unsupported => "Unsupported",
        };
        f.write_str(name)
    }
}
