use crate::{ColumnType, ColumnValues};

/// A named, homogeneously typed sequence of sample values. One column
/// corresponds to one source in a frame or bucket.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataColumn {
    pub name: String,
    pub values: ColumnValues,
}

impl DataColumn {
    pub fn new(name: impl Into<String>, values: ColumnValues) -> Self {
        DataColumn {
            name: name.into(),
            values,
        }
    }

    pub fn element_type(&self) -> ColumnType {
        self.values.element_type()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Estimated in-memory size, including the name.
    pub fn allocation(&self) -> usize {
        self.name.len() + self.values.allocation()
    }

    /// A copy of this column restricted to rows `offset..offset + len`.
    pub fn slice_rows(&self, offset: usize, len: usize) -> DataColumn {
        DataColumn {
            name: self.name.clone(),
            values: self.values.slice_rows(offset, len),
        }
    }
}
