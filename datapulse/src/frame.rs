use indexmap::IndexMap;

use crate::table::DataTable;
use crate::{DataColumn, DataPlatformError, Result, Schedule, TimeInterval, Timestamp};

/// A client-authored tabular unit presented to the ingestion pipeline: one
/// timestamp schedule plus one or more same-size columns.
///
/// Invariants enforced at construction: at least one column, every column
/// sized to the schedule's sample count, and unique column names. After
/// submission to a processor the frame must not be mutated by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionFrame {
    label: Option<String>,
    timestamp: Option<Timestamp>,
    attributes: IndexMap<String, String>,
    schedule: Schedule,
    columns: Vec<DataColumn>,
}

impl IngestionFrame {
    pub fn new(schedule: Schedule, columns: Vec<DataColumn>) -> Result<Self> {
        if columns.is_empty() {
            return Err(DataPlatformError::Input(
                "ingestion frame: no data columns".to_string(),
            ));
        }
        let expected = schedule.sample_count();
        let mut seen = IndexMap::with_capacity(columns.len());
        for column in &columns {
            if column.len() != expected {
                return Err(DataPlatformError::Input(format!(
                    "ingestion frame: column '{}' has {} samples, schedule has {expected}",
                    column.name,
                    column.len()
                )));
            }
            if seen.insert(column.name.clone(), ()).is_some() {
                return Err(DataPlatformError::Input(format!(
                    "ingestion frame: duplicate column name '{}'",
                    column.name
                )));
            }
        }
        Ok(IngestionFrame {
            label: None,
            timestamp: None,
            attributes: IndexMap::new(),
            schedule,
            columns,
        })
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }

    pub fn attributes(&self) -> &IndexMap<String, String> {
        &self.attributes
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn columns(&self) -> &[DataColumn] {
        &self.columns
    }

    pub fn sample_count(&self) -> usize {
        self.schedule.sample_count()
    }

    pub fn time_domain(&self) -> Option<TimeInterval> {
        self.schedule.time_domain()
    }

    /// Estimated in-memory size of the frame.
    pub fn allocation(&self) -> usize {
        let columns: usize = self.columns.iter().map(DataColumn::allocation).sum();
        let attributes: usize = self
            .attributes
            .iter()
            .map(|(key, value)| key.len() + value.len())
            .sum();
        columns + attributes + self.schedule.encoded_size()
    }

    /// Surrenders the schedule and columns, dropping the metadata.
    pub fn into_schedule_columns(self) -> (Schedule, Vec<DataColumn>) {
        (self.schedule, self.columns)
    }

    /// A copy restricted to rows `offset..offset + len`, preserving the
    /// schedule identity of the retained rows.
    pub fn slice_rows(&self, offset: usize, len: usize) -> Result<IngestionFrame> {
        Ok(IngestionFrame {
            label: self.label.clone(),
            timestamp: self.timestamp,
            attributes: self.attributes.clone(),
            schedule: self.schedule.slice_rows(offset, len)?,
            columns: self
                .columns
                .iter()
                .map(|column| column.slice_rows(offset, len))
                .collect(),
        })
    }
}

impl DataTable for IngestionFrame {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_at(&self, index: usize) -> Option<&DataColumn> {
        self.columns.get(index)
    }

    fn column_by_name(&self, name: &str) -> Option<&DataColumn> {
        self.columns.iter().find(|column| column.name == name)
    }

    fn timestamps(&self) -> &Schedule {
        &self.schedule
    }
}

/// A contiguous row range of a parent frame, produced by decomposition.
/// `row_offset` locates the piece within the originally submitted frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SubFrame {
    pub row_offset: usize,
    frame: IngestionFrame,
}

impl SubFrame {
    /// Wraps a whole frame as the root piece at row offset zero.
    pub fn root(frame: IngestionFrame) -> Self {
        SubFrame {
            row_offset: 0,
            frame,
        }
    }

    pub fn frame(&self) -> &IngestionFrame {
        &self.frame
    }

    pub fn into_frame(self) -> IngestionFrame {
        self.frame
    }

    pub fn sample_count(&self) -> usize {
        self.frame.sample_count()
    }

    pub fn allocation(&self) -> usize {
        self.frame.allocation()
    }

    /// Splits at row `at`, yielding the leading and trailing pieces with
    /// their offsets adjusted relative to the original frame.
    pub fn split_rows(self, at: usize) -> Result<(SubFrame, SubFrame)> {
        let total = self.frame.sample_count();
        if at == 0 || at >= total {
            return Err(DataPlatformError::Input(format!(
                "sub-frame: split point {at} outside 1..{total}"
            )));
        }
        let head = self.frame.slice_rows(0, at)?;
        let tail = self.frame.slice_rows(at, total - at)?;
        Ok((
            SubFrame {
                row_offset: self.row_offset,
                frame: head,
            },
            SubFrame {
                row_offset: self.row_offset + at,
                frame: tail,
            },
        ))
    }
}
