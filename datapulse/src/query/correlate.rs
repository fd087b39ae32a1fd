use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use log::warn;
use tokio::sync::mpsc;

use crate::buffer::MessageBuffer;
use crate::query::block::CorrelatedBlock;
use crate::{DataPlatformError, QueryFragment, Result, SampleBucket, Schedule};

/// Counters for server-side data anomalies observed during correlation.
/// Anomalous buckets are dropped and tallied; correlation never halts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelationStats {
    pub rejected_duplicates: usize,
    pub size_mismatches: usize,
    pub empty_schedules: usize,
}

impl CorrelationStats {
    pub fn merge(&mut self, other: CorrelationStats) {
        self.rejected_duplicates += other.rejected_duplicates;
        self.size_mismatches += other.size_mismatches;
        self.empty_schedules += other.empty_schedules;
    }

    pub fn anomaly_count(&self) -> usize {
        self.rejected_duplicates + self.size_mismatches + self.empty_schedules
    }
}

/// Groups streamed sample buckets into correlated blocks keyed by schedule
/// identity. The produced set is fully determined by schedule values and
/// source names: two runs over the same input yield identical sets no matter
/// the arrival order.
#[derive(Default)]
pub struct Correlator {
    blocks: IndexMap<Schedule, CorrelatedBlock>,
    stats: CorrelationStats,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest_fragment(&mut self, fragment: QueryFragment) {
        for bucket in fragment.buckets {
            self.ingest_bucket(bucket);
        }
    }

    pub fn ingest_bucket(&mut self, bucket: SampleBucket) {
        if bucket.timestamps.is_empty() {
            warn!(
                "correlator: dropping source '{}' with an empty schedule",
                bucket.column.name
            );
            self.stats.empty_schedules += 1;
            return;
        }
        if bucket.column.len() != bucket.timestamps.sample_count() {
            warn!(
                "correlator: dropping source '{}' with {} samples against a schedule of {}",
                bucket.column.name,
                bucket.column.len(),
                bucket.timestamps.sample_count()
            );
            self.stats.size_mismatches += 1;
            return;
        }
        if let Some(block) = self.blocks.get_mut(&bucket.timestamps) {
            if block.contains_source(&bucket.column.name) {
                warn!(
                    "correlator: duplicate source '{}' on an already correlated schedule",
                    bucket.column.name
                );
                self.stats.rejected_duplicates += 1;
                return;
            }
            if let Err(error) = block.insert_bucket(bucket) {
                warn!("correlator: bucket dropped: {error}");
                self.stats.size_mismatches += 1;
            }
            return;
        }
        match CorrelatedBlock::from_bucket(bucket) {
            Ok(block) => {
                self.blocks.insert(block.schedule().clone(), block);
            }
            Err(error) => {
                warn!("correlator: bucket dropped: {error}");
                self.stats.size_mismatches += 1;
            }
        }
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn stats(&self) -> CorrelationStats {
        self.stats
    }

    pub fn rejected_duplicates(&self) -> usize {
        self.stats.rejected_duplicates
    }

    /// The current result set, sorted under the block comparator.
    pub fn snapshot(&self) -> Vec<CorrelatedBlock> {
        let mut blocks: Vec<CorrelatedBlock> = self.blocks.values().cloned().collect();
        blocks.sort_by(|a, b| a.cmp_blocks(b));
        blocks
    }

    /// Surrenders the sorted result set.
    pub fn into_blocks(self) -> Vec<CorrelatedBlock> {
        let mut blocks: Vec<CorrelatedBlock> = self.blocks.into_values().collect();
        blocks.sort_by(|a, b| a.cmp_blocks(b));
        blocks
    }

    /// Clears all state and counters; the correlator is reusable afterwards.
    pub fn reset(&mut self) {
        self.blocks.clear();
        self.stats = CorrelationStats::default();
    }

    /// Midstream consumption: keeps taking fragments while recovery runs
    /// concurrently, returning once the buffer is shut down and empty.
    pub async fn drain(&mut self, buffer: &MessageBuffer<QueryFragment>) {
        while let Some(fragment) = buffer.take().await {
            self.ingest_fragment(fragment);
        }
    }

    /// Post-recovery consumption of everything already buffered.
    pub fn drain_available(&mut self, buffer: &MessageBuffer<QueryFragment>) {
        while let Some(fragment) = buffer.poll() {
            self.ingest_fragment(fragment);
        }
    }
}

/// Concurrent correlation: `workers` tasks each own a private correlator and
/// receive the buckets whose schedule fingerprint routes to them, so blocks
/// never span workers and no cross-worker locking is needed. The final merge
/// concatenates the per-worker sets and sorts.
///
/// Consumes the buffer until it is shut down and empty, so it can run
/// midstream against a live recovery or over a finished one.
pub async fn correlate_sharded(
    buffer: Arc<MessageBuffer<QueryFragment>>,
    workers: usize,
) -> Result<(Vec<CorrelatedBlock>, CorrelationStats)> {
    if workers <= 1 {
        let mut correlator = Correlator::new();
        correlator.drain(&buffer).await;
        let stats = correlator.stats();
        return Ok((correlator.into_blocks(), stats));
    }

    let mut routes = Vec::with_capacity(workers);
    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let (route_tx, mut route_rx) = mpsc::unbounded_channel::<SampleBucket>();
        routes.push(route_tx);
        handles.push(tokio::spawn(async move {
            let mut correlator = Correlator::new();
            while let Some(bucket) = route_rx.recv().await {
                correlator.ingest_bucket(bucket);
            }
            correlator
        }));
    }

    while let Some(fragment) = buffer.take().await {
        for bucket in fragment.buckets {
            let shard = (bucket.timestamps.fingerprint() % workers as u64) as usize;
            if routes[shard].send(bucket).is_err() {
                return Err(DataPlatformError::Interrupted(
                    "correlator: worker task ended early".to_string(),
                ));
            }
        }
    }
    drop(routes);

    let mut blocks = Vec::new();
    let mut stats = CorrelationStats::default();
    for handle in handles {
        let correlator = handle.await.map_err(|error| {
            DataPlatformError::Interrupted(format!("correlator: worker task failed: {error}"))
        })?;
        stats.merge(correlator.stats());
        blocks.extend(correlator.into_blocks());
    }
    blocks.sort_by(|a, b| a.cmp_blocks(b));
    Ok((blocks, stats))
}

/// Confirms the set is sorted under the block comparator.
pub fn verify_ordering(blocks: &[CorrelatedBlock]) -> Result<()> {
    for (index, pair) in blocks.windows(2).enumerate() {
        if pair[0].cmp_blocks(&pair[1]) == Ordering::Greater {
            return Err(DataPlatformError::Data(format!(
                "correlated set: blocks {index} and {} out of order",
                index + 1
            )));
        }
    }
    Ok(())
}

/// Confirms every column's size equals its block's sample count.
pub fn verify_column_sizes(blocks: &[CorrelatedBlock]) -> Result<()> {
    for (index, block) in blocks.iter().enumerate() {
        for column in block.columns() {
            if column.len() != block.sample_count() {
                return Err(DataPlatformError::Data(format!(
                    "correlated set: block {index} column '{}' has {} samples, expected {}",
                    column.name,
                    column.len(),
                    block.sample_count()
                )));
            }
        }
    }
    Ok(())
}

/// Confirms no block carries two columns with the same source name.
pub fn verify_source_uniqueness(blocks: &[CorrelatedBlock]) -> Result<()> {
    for (index, block) in blocks.iter().enumerate() {
        let mut seen = HashSet::new();
        for column in block.columns() {
            if !seen.insert(column.name.as_str()) {
                return Err(DataPlatformError::Data(format!(
                    "correlated set: block {index} repeats source '{}'",
                    column.name
                )));
            }
        }
    }
    Ok(())
}

/// Confirms every column spans exactly its block's schedule domain.
pub fn verify_time_domains(blocks: &[CorrelatedBlock]) -> Result<()> {
    for (index, block) in blocks.iter().enumerate() {
        let domain = block.time_domain();
        for column in block.columns() {
            let spanned = block
                .schedule()
                .slice_rows(0, column.len())
                .ok()
                .and_then(|schedule| schedule.time_domain());
            if spanned != domain {
                return Err(DataPlatformError::Data(format!(
                    "correlated set: block {index} column '{}' spans {spanned:?}, schedule covers {domain:?}",
                    column.name
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{ColumnValues, DataColumn, SamplingClock, Timestamp};

    fn clock(start: i64, count: usize, period_ms: u64) -> Schedule {
        Schedule::Clock(
            SamplingClock::new(
                Timestamp::new(start, 0),
                count,
                Duration::from_millis(period_ms),
            )
            .unwrap(),
        )
    }

    fn bucket(name: &str, schedule: &Schedule) -> SampleBucket {
        let count = schedule.sample_count();
        SampleBucket::new(
            schedule.clone(),
            DataColumn::new(
                name,
                ColumnValues::Float64((0..count).map(|i| i as f64).collect()),
            ),
        )
    }

    fn verify_all(blocks: &[CorrelatedBlock]) {
        verify_ordering(blocks).unwrap();
        verify_column_sizes(blocks).unwrap();
        verify_source_uniqueness(blocks).unwrap();
        verify_time_domains(blocks).unwrap();
    }

    #[test]
    fn same_schedule_buckets_share_a_block() {
        let schedule = clock(0, 100, 1);
        let mut correlator = Correlator::new();
        correlator.ingest_bucket(bucket("A", &schedule));
        correlator.ingest_bucket(bucket("B", &schedule));

        let blocks = correlator.snapshot();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].schedule(), &schedule);
        assert_eq!(blocks[0].source_names(), vec!["A", "B"]);
        assert_eq!(blocks[0].sample_count(), 100);
        verify_all(&blocks);
    }

    #[test]
    fn split_schedules_and_duplicate_rejection() {
        let clock1 = clock(0, 10, 1);
        let clock2 = clock(0, 20, 1);
        let mut correlator = Correlator::new();
        correlator.ingest_bucket(bucket("A", &clock1));
        correlator.ingest_bucket(bucket("B", &clock2));
        correlator.ingest_bucket(bucket("A", &clock1));

        assert_eq!(correlator.rejected_duplicates(), 1);
        let blocks = correlator.snapshot();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].source_names(), vec!["A"]);
        assert_eq!(blocks[0].schedule(), &clock1);
        assert_eq!(blocks[1].source_names(), vec!["B"]);
        assert_eq!(blocks[1].schedule(), &clock2);
        verify_all(&blocks);
    }

    #[test]
    fn anomalies_are_tallied_not_fatal() {
        let mut correlator = Correlator::new();
        correlator.ingest_bucket(SampleBucket::new(
            clock(0, 0, 1),
            DataColumn::new("A", ColumnValues::Float64(vec![])),
        ));
        correlator.ingest_bucket(SampleBucket::new(
            clock(0, 5, 1),
            DataColumn::new("B", ColumnValues::Float64(vec![1.0])),
        ));
        correlator.ingest_bucket(bucket("C", &clock(0, 5, 1)));

        let stats = correlator.stats();
        assert_eq!(stats.empty_schedules, 1);
        assert_eq!(stats.size_mismatches, 1);
        assert_eq!(stats.anomaly_count(), 2);
        assert_eq!(correlator.block_count(), 1);
    }

    #[test]
    fn output_is_independent_of_arrival_order() {
        let schedules = [clock(0, 10, 1), clock(5, 10, 1), clock(0, 20, 1)];
        let mut forward = Correlator::new();
        for schedule in &schedules {
            forward.ingest_bucket(bucket("A", schedule));
            forward.ingest_bucket(bucket("B", schedule));
        }
        let mut backward = Correlator::new();
        for schedule in schedules.iter().rev() {
            backward.ingest_bucket(bucket("B", schedule));
            backward.ingest_bucket(bucket("A", schedule));
        }
        assert_eq!(forward.snapshot(), backward.snapshot());
        verify_all(&forward.snapshot());
    }

    #[test]
    fn reset_makes_runs_repeatable() {
        let schedule = clock(3, 7, 2);
        let mut correlator = Correlator::new();
        correlator.ingest_bucket(bucket("A", &schedule));
        correlator.ingest_bucket(bucket("A", &schedule));
        let first = correlator.snapshot();
        assert_eq!(correlator.rejected_duplicates(), 1);

        correlator.reset();
        assert_eq!(correlator.block_count(), 0);
        assert_eq!(correlator.stats(), CorrelationStats::default());

        correlator.ingest_bucket(bucket("A", &schedule));
        correlator.ingest_bucket(bucket("A", &schedule));
        assert_eq!(correlator.snapshot(), first);
    }

    #[tokio::test]
    async fn sharded_correlation_matches_single_threaded() {
        let schedules: Vec<Schedule> = (0..8).map(|i| clock(i, 10 + i as usize, 1)).collect();

        let buffer = Arc::new(MessageBuffer::unbounded());
        let mut reference = Correlator::new();
        for schedule in &schedules {
            for name in ["A", "B", "C"] {
                reference.ingest_bucket(bucket(name, schedule));
                buffer
                    .enqueue(QueryFragment::new(vec![bucket(name, schedule)]))
                    .await
                    .unwrap();
            }
        }
        buffer.shutdown();

        let (blocks, stats) = correlate_sharded(buffer, 4).await.unwrap();
        assert_eq!(blocks, reference.snapshot());
        assert_eq!(stats, reference.stats());
        verify_all(&blocks);
    }
}
