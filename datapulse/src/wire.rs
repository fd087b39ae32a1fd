use crate::{DataColumn, Schedule};

/// Hard transport cap on a single serialized message. The default gRPC
/// message-size limit on Data Platform deployments.
pub const TRANSPORT_MESSAGE_CAP: usize = 4 * 1024 * 1024;

/// Upper bound on the fixed envelope of an ingest request (provider uid,
/// client request id, framing) on top of its payload. The processor's
/// `max_frame_size` bounds the payload; payload plus envelope stays within
/// the transport cap because `max_frame_size` must sit below it.
pub const REQUEST_ENVELOPE_MAX: usize = 64;

/// One ingestion request as it goes on the wire: a size-bounded slice of a
/// frame stamped with the provider and a unique client request id.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IngestRequest {
    pub provider_uid: u64,
    pub client_request_id: String,
    pub timestamps: Schedule,
    pub columns: Vec<DataColumn>,
    pub attributes: Vec<(String, String)>,
}

impl IngestRequest {
    pub fn sample_count(&self) -> usize {
        self.timestamps.sample_count()
    }

    /// Estimated serialized size in bytes; must stay at or below
    /// [`TRANSPORT_MESSAGE_CAP`].
    pub fn encoded_size(&self) -> usize {
        let columns: usize = self.columns.iter().map(DataColumn::allocation).sum();
        let attributes: usize = self
            .attributes
            .iter()
            .map(|(key, value)| key.len() + value.len())
            .sum();
        // provider uid + framing overhead
        16 + self.client_request_id.len() + self.timestamps.encoded_size() + columns + attributes
    }
}

/// Per-request outcome reported by the ingestion service.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IngestResult {
    Ack,
    Error {
        message: String,
        cause: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IngestResponse {
    pub provider_uid: u64,
    pub client_request_id: String,
    pub result: IngestResult,
}

/// One (schedule, column) pair arriving on the query stream.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SampleBucket {
    pub timestamps: Schedule,
    pub column: DataColumn,
}

impl SampleBucket {
    pub fn new(timestamps: Schedule, column: DataColumn) -> Self {
        SampleBucket { timestamps, column }
    }
}

/// One streamed response message: zero or more sample buckets.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QueryFragment {
    pub buckets: Vec<SampleBucket>,
}

impl QueryFragment {
    pub fn new(buckets: Vec<SampleBucket>) -> Self {
        QueryFragment { buckets }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
