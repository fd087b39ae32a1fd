use crate::{DataPlatformError, Result, TimeInterval, Timestamp};

/// A logical data recovery request: a set of sources over a time interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryRequest {
    pub sources: Vec<String>,
    pub interval: TimeInterval,
}

impl QueryRequest {
    pub fn new(sources: Vec<String>, interval: TimeInterval) -> Result<Self> {
        if sources.is_empty() {
            return Err(DataPlatformError::Input(
                "query request: empty source set".to_string(),
            ));
        }
        for (index, source) in sources.iter().enumerate() {
            if sources[..index].contains(source) {
                return Err(DataPlatformError::Input(format!(
                    "query request: duplicate source '{source}'"
                )));
            }
        }
        Ok(QueryRequest { sources, interval })
    }
}

/// How a logical request is decomposed into a composite of sub-requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecompositionStrategy {
    /// One sub-request covering the whole domain.
    #[default]
    None,
    /// Partition the source set into up to `n` disjoint subsets.
    Horizontal(usize),
    /// Partition the time interval into up to `n` contiguous sub-intervals.
    Vertical(usize),
    /// Cartesian product of a horizontal and a vertical partition.
    Grid { horizontal: usize, vertical: usize },
}

/// Decomposes a request into a composite list whose domains partition the
/// original exactly once: horizontal partitions are disjoint source subsets,
/// vertical partitions abut at nanosecond resolution. Partition counts are
/// clamped to what the request can actually support, so every sub-request is
/// non-empty.
pub fn decompose_request(
    request: &QueryRequest,
    strategy: DecompositionStrategy,
) -> Result<Vec<QueryRequest>> {
    match strategy {
        DecompositionStrategy::None => Ok(vec![request.clone()]),
        DecompositionStrategy::Horizontal(n) => {
            let groups = partition_sources(&request.sources, n)?;
            Ok(groups
                .into_iter()
                .map(|sources| QueryRequest {
                    sources,
                    interval: request.interval,
                })
                .collect())
        }
        DecompositionStrategy::Vertical(n) => {
            let intervals = partition_interval(&request.interval, n)?;
            Ok(intervals
                .into_iter()
                .map(|interval| QueryRequest {
                    sources: request.sources.clone(),
                    interval,
                })
                .collect())
        }
        DecompositionStrategy::Grid {
            horizontal,
            vertical,
        } => {
            let groups = partition_sources(&request.sources, horizontal)?;
            let intervals = partition_interval(&request.interval, vertical)?;
            let mut out = Vec::with_capacity(groups.len() * intervals.len());
            for sources in &groups {
                for interval in &intervals {
                    out.push(QueryRequest {
                        sources: sources.clone(),
                        interval: *interval,
                    });
                }
            }
            Ok(out)
        }
    }
}

fn partition_sources(sources: &[String], n: usize) -> Result<Vec<Vec<String>>> {
    if n == 0 {
        return Err(DataPlatformError::Config(
            "request decomposer: zero horizontal partitions".to_string(),
        ));
    }
    let n = n.min(sources.len()).max(1);
    let base = sources.len() / n;
    let remainder = sources.len() % n;
    let mut out = Vec::with_capacity(n);
    let mut offset = 0;
    for index in 0..n {
        let size = base + usize::from(index < remainder);
        out.push(sources[offset..offset + size].to_vec());
        offset += size;
    }
    Ok(out)
}

fn partition_interval(interval: &TimeInterval, n: usize) -> Result<Vec<TimeInterval>> {
    if n == 0 {
        return Err(DataPlatformError::Config(
            "request decomposer: zero vertical partitions".to_string(),
        ));
    }
    let total = interval
        .end()
        .duration_since(interval.begin())
        .unwrap_or_default()
        .as_nanos() as i128;
    let n = (n as i128).min(total.max(1)) as usize;
    if n == 1 {
        return Ok(vec![*interval]);
    }
    let begin = interval.begin();
    let mut out = Vec::with_capacity(n);
    for index in 0..n {
        let from = offset_instant(begin, total * index as i128 / n as i128)?;
        let to = if index + 1 == n {
            interval.end()
        } else {
            offset_instant(begin, total * (index + 1) as i128 / n as i128 - 1)?
        };
        out.push(TimeInterval::new(from, to)?);
    }
    Ok(out)
}

fn offset_instant(begin: Timestamp, offset_nanos: i128) -> Result<Timestamp> {
    Timestamp::try_from_total_nanos(begin.total_nanos() + offset_nanos).ok_or_else(|| {
        DataPlatformError::Input("request decomposer: instant out of range".to_string())
    })
}
