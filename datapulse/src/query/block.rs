use std::cmp::Ordering;

use indexmap::IndexMap;

use crate::table::DataTable;
use crate::{
    DataColumn, DataPlatformError, Result, SampleBucket, Schedule, TimeInterval, Timestamp,
};

/// A group of same-schedule buckets merged into one multi-column table: a
/// single normative timestamp schedule plus one data column per source.
///
/// Invariants: every column's size equals the schedule's sample count, and
/// source names are unique within the block.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatedBlock {
    schedule: Schedule,
    columns: IndexMap<String, DataColumn>,
}

impl CorrelatedBlock {
    /// Seeds a block from its first bucket.
    pub fn from_bucket(bucket: SampleBucket) -> Result<Self> {
        if bucket.timestamps.is_empty() {
            return Err(DataPlatformError::Data(format!(
                "correlated block: source '{}' arrived with an empty schedule",
                bucket.column.name
            )));
        }
        if bucket.column.len() != bucket.timestamps.sample_count() {
            return Err(DataPlatformError::Data(format!(
                "correlated block: source '{}' has {} samples, schedule has {}",
                bucket.column.name,
                bucket.column.len(),
                bucket.timestamps.sample_count()
            )));
        }
        let mut columns = IndexMap::new();
        columns.insert(bucket.column.name.clone(), bucket.column);
        Ok(CorrelatedBlock {
            schedule: bucket.timestamps,
            columns,
        })
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn sample_count(&self) -> usize {
        self.schedule.sample_count()
    }

    /// First instant of the schedule. Blocks are never built from empty
    /// schedules, so this is present on any constructed block.
    pub fn start(&self) -> Option<Timestamp> {
        self.schedule.timestamp_at(0)
    }

    pub fn time_domain(&self) -> Option<TimeInterval> {
        self.schedule.time_domain()
    }

    pub fn contains_source(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Source names in arrival order.
    pub fn source_names(&self) -> Vec<&str> {
        self.columns.keys().map(String::as_str).collect()
    }

    fn sorted_sources(&self) -> Vec<&str> {
        let mut names = self.source_names();
        names.sort_unstable();
        names
    }

    pub fn columns(&self) -> impl Iterator<Item = &DataColumn> {
        self.columns.values()
    }

    /// Merges one more bucket into the block. The bucket must carry exactly
    /// this block's schedule, a matching column size, and a new source name.
    pub fn insert_bucket(&mut self, bucket: SampleBucket) -> Result<()> {
        if bucket.timestamps != self.schedule {
            return Err(DataPlatformError::Data(format!(
                "correlated block: source '{}' carries a different schedule",
                bucket.column.name
            )));
        }
        if bucket.column.len() != self.sample_count() {
            return Err(DataPlatformError::Data(format!(
                "correlated block: source '{}' has {} samples, block has {}",
                bucket.column.name,
                bucket.column.len(),
                self.sample_count()
            )));
        }
        if self.columns.contains_key(&bucket.column.name) {
            return Err(DataPlatformError::Data(format!(
                "correlated block: duplicate source '{}'",
                bucket.column.name
            )));
        }
        self.columns.insert(bucket.column.name.clone(), bucket.column);
        Ok(())
    }

    /// Total ordering for the output set: ascending start instant, ties by
    /// sample count, further ties by lexicographic comparison of the sorted
    /// source-name sequences.
    pub fn cmp_blocks(&self, other: &CorrelatedBlock) -> Ordering {
        self.start()
            .cmp(&other.start())
            .then_with(|| self.sample_count().cmp(&other.sample_count()))
            .then_with(|| self.sorted_sources().cmp(&other.sorted_sources()))
    }
}

impl DataTable for CorrelatedBlock {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_at(&self, index: usize) -> Option<&DataColumn> {
        self.columns.get_index(index).map(|(_, column)| column)
    }

    fn column_by_name(&self, name: &str) -> Option<&DataColumn> {
        self.columns.get(name)
    }

    fn timestamps(&self) -> &Schedule {
        &self.schedule
    }
}
