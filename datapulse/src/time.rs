use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::{DataPlatformError, Result};

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// A point in time with second and nanosecond components, anchored to the
/// Unix epoch. `nanos` is always in `[0, 1_000_000_000)`, so derived ordering
/// is the temporal ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timestamp {
    secs: i64,
    nanos: u32,
}

impl Timestamp {
    /// Builds a timestamp, carrying nanosecond overflow into the seconds.
    pub fn new(secs: i64, nanos: u32) -> Self {
        let carry = (nanos as i128) / NANOS_PER_SEC;
        Timestamp {
            secs: secs.wrapping_add(carry as i64),
            nanos: ((nanos as i128) % NANOS_PER_SEC) as u32,
        }
    }

    pub fn from_datetime(instant: DateTime<Utc>) -> Self {
        Timestamp {
            secs: instant.timestamp(),
            nanos: instant.timestamp_subsec_nanos().min(999_999_999),
        }
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.secs, self.nanos).single()
    }

    pub fn secs(&self) -> i64 {
        self.secs
    }

    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    pub(crate) fn total_nanos(&self) -> i128 {
        self.secs as i128 * NANOS_PER_SEC + self.nanos as i128
    }

    pub(crate) fn try_from_total_nanos(total: i128) -> Option<Self> {
        let secs = total.div_euclid(NANOS_PER_SEC);
        let nanos = total.rem_euclid(NANOS_PER_SEC) as u32;
        Some(Timestamp {
            secs: i64::try_from(secs).ok()?,
            nanos,
        })
    }

    pub fn checked_add(&self, duration: Duration) -> Option<Self> {
        Self::try_from_total_nanos(self.total_nanos() + duration.as_nanos() as i128)
    }

    pub fn checked_sub(&self, duration: Duration) -> Option<Self> {
        Self::try_from_total_nanos(self.total_nanos() - duration.as_nanos() as i128)
    }

    /// Duration from `earlier` to `self`, or `None` if `earlier` is later.
    pub fn duration_since(&self, earlier: Timestamp) -> Option<Duration> {
        let diff = self.total_nanos() - earlier.total_nanos();
        if diff < 0 {
            return None;
        }
        Some(Duration::new(
            (diff / NANOS_PER_SEC) as u64,
            (diff % NANOS_PER_SEC) as u32,
        ))
    }

    /// The latest instant strictly before this one, at nanosecond resolution.
    pub fn prev(&self) -> Option<Self> {
        Self::try_from_total_nanos(self.total_nanos() - 1)
    }

    /// The earliest instant strictly after this one, at nanosecond resolution.
    pub fn next(&self) -> Option<Self> {
        Self::try_from_total_nanos(self.total_nanos() + 1)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(instant) => write!(f, "{}", instant.to_rfc3339()),
            None => write!(f, "{}.{:09}s", self.secs, self.nanos),
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(instant: DateTime<Utc>) -> Self {
        Timestamp::from_datetime(instant)
    }
}

/// A closed interval `[begin, end]` with `begin <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeInterval {
    begin: Timestamp,
    end: Timestamp,
}

impl TimeInterval {
    pub fn new(begin: Timestamp, end: Timestamp) -> Result<Self> {
        if begin > end {
            return Err(DataPlatformError::Input(format!(
                "time interval: begin {begin} is after end {end}"
            )));
        }
        Ok(TimeInterval { begin, end })
    }

    /// The degenerate interval containing a single instant.
    pub fn instant(at: Timestamp) -> Self {
        TimeInterval { begin: at, end: at }
    }

    pub fn begin(&self) -> Timestamp {
        self.begin
    }

    pub fn end(&self) -> Timestamp {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end.duration_since(self.begin).unwrap_or_default()
    }

    /// Closed membership: `begin <= at <= end`.
    pub fn contains(&self, at: Timestamp) -> bool {
        self.begin <= at && at <= self.end
    }

    /// Open membership: `begin < at < end`.
    pub fn contains_open(&self, at: Timestamp) -> bool {
        self.begin < at && at < self.end
    }

    /// True if `other` lies entirely within this interval.
    pub fn encloses(&self, other: &TimeInterval) -> bool {
        self.begin <= other.begin && other.end <= self.end
    }

    /// Intersection of the closed intervals; `None` when disjoint.
    pub fn intersect(&self, other: &TimeInterval) -> Option<TimeInterval> {
        let begin = self.begin.max(other.begin);
        let end = self.end.min(other.end);
        (begin <= end).then_some(TimeInterval { begin, end })
    }

    /// Intersection of the open interiors; `None` unless they strictly overlap.
    pub fn intersect_open(&self, other: &TimeInterval) -> Option<TimeInterval> {
        let begin = self.begin.max(other.begin);
        let end = self.end.min(other.end);
        (begin < end).then_some(TimeInterval { begin, end })
    }

    /// Union of the closed intervals, defined when they share at least one
    /// instant or abut at nanosecond resolution.
    pub fn union(&self, other: &TimeInterval) -> Option<TimeInterval> {
        let meets = self.intersect(other).is_some()
            || self.end.next() == Some(other.begin)
            || other.end.next() == Some(self.begin);
        meets.then_some(self.support(other))
    }

    /// Union of the open interiors, defined only when they strictly overlap.
    pub fn union_open(&self, other: &TimeInterval) -> Option<TimeInterval> {
        self.intersect_open(other).map(|_| self.support(other))
    }

    /// Set difference `self \ other` as 0, 1, or 2 disjoint closed intervals.
    pub fn difference(&self, other: &TimeInterval) -> Vec<TimeInterval> {
        if self.intersect(other).is_none() {
            return vec![*self];
        }
        let mut pieces = Vec::with_capacity(2);
        if other.begin > self.begin {
            if let Some(end) = other.begin.prev() {
                if end >= self.begin {
                    pieces.push(TimeInterval {
                        begin: self.begin,
                        end,
                    });
                }
            }
        }
        if other.end < self.end {
            if let Some(begin) = other.end.next() {
                if begin <= self.end {
                    pieces.push(TimeInterval {
                        begin,
                        end: self.end,
                    });
                }
            }
        }
        pieces
    }

    /// Smallest interval enclosing both.
    pub fn support(&self, other: &TimeInterval) -> TimeInterval {
        TimeInterval {
            begin: self.begin.min(other.begin),
            end: self.end.max(other.end),
        }
    }

    pub fn cmp_by_begin(a: &TimeInterval, b: &TimeInterval) -> Ordering {
        a.begin.cmp(&b.begin).then(a.end.cmp(&b.end))
    }

    pub fn cmp_by_duration(a: &TimeInterval, b: &TimeInterval) -> Ordering {
        a.duration().cmp(&b.duration())
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.begin, self.end)
    }
}

/// A uniform timestamp schedule: `t_i = start + i * period` for
/// `i in [0, count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SamplingClock {
    start: Timestamp,
    count: usize,
    period: Duration,
}

impl SamplingClock {
    pub fn new(start: Timestamp, count: usize, period: Duration) -> Result<Self> {
        if count > 1 && period.is_zero() {
            return Err(DataPlatformError::Input(format!(
                "sampling clock: zero period with {count} samples"
            )));
        }
        Ok(SamplingClock {
            start,
            count,
            period,
        })
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn sample_count(&self) -> usize {
        self.count
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn timestamp_at(&self, index: usize) -> Option<Timestamp> {
        if index >= self.count {
            return None;
        }
        Timestamp::try_from_total_nanos(
            self.start.total_nanos() + self.period.as_nanos() as i128 * index as i128,
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = Timestamp> + '_ {
        (0..self.count).map_while(move |i| self.timestamp_at(i))
    }

    /// Closed time domain `[start, start + (count - 1) * period]`; empty
    /// clocks have no domain.
    pub fn time_domain(&self) -> Option<TimeInterval> {
        if self.count == 0 {
            return None;
        }
        let end = self.timestamp_at(self.count - 1)?;
        Some(TimeInterval {
            begin: self.start,
            end,
        })
    }

    /// A clock covering `len` samples beginning at row `offset`, with the
    /// start recomputed so sample identity is preserved.
    pub fn slice_rows(&self, offset: usize, len: usize) -> Result<SamplingClock> {
        if offset + len > self.count {
            return Err(DataPlatformError::Input(format!(
                "sampling clock: slice {offset}..{} out of {} samples",
                offset + len,
                self.count
            )));
        }
        let start = Timestamp::try_from_total_nanos(
            self.start.total_nanos() + self.period.as_nanos() as i128 * offset as i128,
        )
        .ok_or_else(|| {
            DataPlatformError::Input("sampling clock: slice start out of range".to_string())
        })?;
        Ok(SamplingClock {
            start,
            count: len,
            period: self.period,
        })
    }
}

/// An explicit ordered sequence of instants, for irregular sampling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimestampList(Vec<Timestamp>);

impl TimestampList {
    pub fn new(timestamps: Vec<Timestamp>) -> Result<Self> {
        for pair in timestamps.windows(2) {
            if pair[0] > pair[1] {
                return Err(DataPlatformError::Input(format!(
                    "timestamp list: {} precedes {} out of order",
                    pair[1], pair[0]
                )));
            }
        }
        Ok(TimestampList(timestamps))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Timestamp> {
        self.0.get(index).copied()
    }

    pub fn as_slice(&self) -> &[Timestamp] {
        &self.0
    }

    pub fn time_domain(&self) -> Option<TimeInterval> {
        Some(TimeInterval {
            begin: *self.0.first()?,
            end: *self.0.last()?,
        })
    }

    pub fn slice_rows(&self, offset: usize, len: usize) -> Result<TimestampList> {
        if offset + len > self.0.len() {
            return Err(DataPlatformError::Input(format!(
                "timestamp list: slice {offset}..{} out of {} samples",
                offset + len,
                self.0.len()
            )));
        }
        Ok(TimestampList(self.0[offset..offset + len].to_vec()))
    }
}

/// The timing axis of a frame or bucket: a uniform clock or an explicit list,
/// never both. Equality is structural, which matches the wire representation
/// bytewise: clocks are equal iff start, count and period match; lists iff
/// the sequences are pointwise equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Schedule {
    Clock(SamplingClock),
    List(TimestampList),
}

impl Schedule {
    pub fn sample_count(&self) -> usize {
        match self {
            Schedule::Clock(clock) => clock.sample_count(),
            Schedule::List(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count() == 0
    }

    pub fn timestamp_at(&self, index: usize) -> Option<Timestamp> {
        match self {
            Schedule::Clock(clock) => clock.timestamp_at(index),
            Schedule::List(list) => list.get(index),
        }
    }

    pub fn time_domain(&self) -> Option<TimeInterval> {
        match self {
            Schedule::Clock(clock) => clock.time_domain(),
            Schedule::List(list) => list.time_domain(),
        }
    }

    pub fn slice_rows(&self, offset: usize, len: usize) -> Result<Schedule> {
        Ok(match self {
            Schedule::Clock(clock) => Schedule::Clock(clock.slice_rows(offset, len)?),
            Schedule::List(list) => Schedule::List(list.slice_rows(offset, len)?),
        })
    }

    /// Hash of the canonical byte encoding. Buckets with equal schedules
    /// always land on the same fingerprint, so sharded correlation can route
    /// by `fingerprint % workers` without cross-worker coordination.
    pub fn fingerprint(&self) -> u64 {
        let mut bytes = Vec::with_capacity(32);
        match self {
            Schedule::Clock(clock) => {
                bytes.push(0u8);
                bytes.extend_from_slice(&clock.start().secs().to_le_bytes());
                bytes.extend_from_slice(&clock.start().nanos().to_le_bytes());
                bytes.extend_from_slice(&(clock.sample_count() as u64).to_le_bytes());
                bytes.extend_from_slice(&(clock.period().as_nanos() as u64).to_le_bytes());
            }
            Schedule::List(list) => {
                bytes.push(1u8);
                for instant in list.as_slice() {
                    bytes.extend_from_slice(&instant.secs().to_le_bytes());
                    bytes.extend_from_slice(&instant.nanos().to_le_bytes());
                }
            }
        }
        cityhash_rs::cityhash_102_128(&bytes) as u64
    }

    /// Rough wire size of the schedule in bytes.
    pub fn encoded_size(&self) -> usize {
        match self {
            Schedule::Clock(_) => 28,
            Schedule::List(list) => 12 * list.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::new(secs, 0)
    }

    fn interval(begin: i64, end: i64) -> TimeInterval {
        TimeInterval::new(ts(begin), ts(end)).unwrap()
    }

    #[test]
    fn timestamp_normalizes_nanos() {
        let t = Timestamp::new(10, 2_500_000_000);
        assert_eq!(t.secs(), 12);
        assert_eq!(t.nanos(), 500_000_000);
    }

    #[test]
    fn timestamp_ordering_is_temporal() {
        assert!(Timestamp::new(-1, 500_000_000) < Timestamp::new(0, 0));
        assert!(Timestamp::new(5, 1) > Timestamp::new(5, 0));
    }

    #[test]
    fn interval_rejects_inverted_bounds() {
        assert!(TimeInterval::new(ts(10), ts(5)).is_err());
    }

    #[test]
    fn interval_membership() {
        let i = interval(10, 20);
        assert!(i.contains(ts(10)));
        assert!(i.contains(ts(20)));
        assert!(!i.contains_open(ts(10)));
        assert!(i.contains_open(ts(15)));
        assert!(!i.contains(ts(21)));
    }

    #[test]
    fn interval_intersection_and_union() {
        let a = interval(0, 10);
        let b = interval(5, 15);
        let c = interval(20, 30);
        assert_eq!(a.intersect(&b), Some(interval(5, 10)));
        assert_eq!(a.intersect(&c), None);
        assert_eq!(a.union(&b), Some(interval(0, 15)));
        assert_eq!(a.union(&c), None);
        // Touching at a single instant: closed intersects, open does not.
        let d = interval(10, 12);
        assert_eq!(a.intersect(&d), Some(TimeInterval::instant(ts(10))));
        assert_eq!(a.intersect_open(&d), None);
        assert_eq!(a.union_open(&d), None);
    }

    #[test]
    fn interval_difference_splits() {
        let outer = interval(0, 100);
        let inner = interval(40, 60);
        let pieces = outer.difference(&inner);
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].begin(), ts(0));
        assert_eq!(pieces[0].end(), Timestamp::new(39, 999_999_999));
        assert_eq!(pieces[1].begin(), Timestamp::new(60, 1));
        assert_eq!(pieces[1].end(), ts(100));

        assert_eq!(outer.difference(&interval(0, 100)).len(), 0);
        assert_eq!(outer.difference(&interval(200, 300)), vec![outer]);
        assert_eq!(outer.difference(&interval(0, 50)).len(), 1);
    }

    #[test]
    fn interval_support_and_comparators() {
        let a = interval(0, 2);
        let b = interval(10, 11);
        assert_eq!(a.support(&b), interval(0, 11));
        assert_eq!(TimeInterval::cmp_by_begin(&a, &b), Ordering::Less);
        assert_eq!(TimeInterval::cmp_by_duration(&b, &a), Ordering::Less);
    }

    #[test]
    fn clock_domain_and_slicing() {
        let clock = SamplingClock::new(ts(100), 10, Duration::from_secs(1)).unwrap();
        assert_eq!(clock.time_domain(), Some(interval(100, 109)));

        let tail = clock.slice_rows(6, 4).unwrap();
        assert_eq!(tail.start(), ts(106));
        assert_eq!(tail.sample_count(), 4);
        assert_eq!(tail.time_domain(), Some(interval(106, 109)));

        assert!(clock.slice_rows(8, 4).is_err());
        assert!(SamplingClock::new(ts(0), 0, Duration::from_secs(1))
            .unwrap()
            .time_domain()
            .is_none());
    }

    #[test]
    fn clock_rejects_zero_period() {
        assert!(SamplingClock::new(ts(0), 2, Duration::ZERO).is_err());
        assert!(SamplingClock::new(ts(0), 1, Duration::ZERO).is_ok());
    }

    #[test]
    fn list_enforces_order() {
        assert!(TimestampList::new(vec![ts(2), ts(1)]).is_err());
        let list = TimestampList::new(vec![ts(1), ts(1), ts(5)]).unwrap();
        assert_eq!(list.time_domain(), Some(interval(1, 5)));
        let mid = list.slice_rows(1, 2).unwrap();
        assert_eq!(mid.as_slice(), &[ts(1), ts(5)]);
    }

    #[test]
    fn schedule_fingerprint_tracks_equality() {
        let a = Schedule::Clock(SamplingClock::new(ts(0), 10, Duration::from_millis(1)).unwrap());
        let b = Schedule::Clock(SamplingClock::new(ts(0), 10, Duration::from_millis(1)).unwrap());
        let c = Schedule::Clock(SamplingClock::new(ts(0), 11, Duration::from_millis(1)).unwrap());
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a, c);
        assert_ne!(a.fingerprint(), c.fingerprint());

        let list = Schedule::List(TimestampList::new(vec![ts(0), ts(1)]).unwrap());
        assert_ne!(list.fingerprint(), a.fingerprint());
    }

    #[test]
    fn schedule_slice_preserves_identity() {
        let clock = SamplingClock::new(ts(0), 100, Duration::from_secs(1)).unwrap();
        let schedule = Schedule::Clock(clock);
        let head = schedule.slice_rows(0, 50).unwrap();
        let tail = schedule.slice_rows(50, 50).unwrap();
        assert_eq!(head.sample_count() + tail.sample_count(), 100);
        assert_eq!(tail.timestamp_at(0), Some(ts(50)));
    }
}
