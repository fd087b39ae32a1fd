use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use indexmap::IndexMap;
use tokio::sync::mpsc;

use crate::query::QueryRequest;
use crate::{IngestRequest, IngestResponse, QueryFragment, Result};

/// Inbound half of a query stream.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<QueryFragment>> + Send>>;

/// Inbound half of an ingestion stream: per-request acknowledgements, in
/// whatever order the service produces them.
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<IngestResponse>> + Send>>;

/// Outbound messages on a bidirectional query stream.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryControl {
    /// Opens the cursor for one sub-request.
    Request(QueryRequest),
    /// Flow-control credit: release the next response fragment.
    NextBatch,
}

/// Query-side connection capability, supplied by the environment. The wire
/// codec and channel management live behind this trait; the SDK only drives
/// it.
#[async_trait]
pub trait QueryConnection: Send + Sync + 'static {
    /// One-shot request: the whole result in a single fragment.
    async fn unary_query(&self, request: QueryRequest) -> Result<QueryFragment>;

    /// Server-streamed request: fragments arrive until the stream ends.
    async fn server_stream_query(&self, request: QueryRequest) -> Result<FragmentStream>;

    /// Bidirectional cursor: the caller sends [`QueryControl`] messages and
    /// reads fragments, one per credit.
    async fn bidi_query(&self) -> Result<(mpsc::Sender<QueryControl>, FragmentStream)>;

    async fn shutdown_soft(&self) -> Result<()>;

    async fn await_termination(&self) -> Result<()>;
}

/// Outcome of provider registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderRegistration {
    pub uid: u64,
    pub is_new: bool,
}

/// Ingestion-side connection capability, supplied by the environment.
#[async_trait]
pub trait IngestionConnection: Send + Sync + 'static {
    async fn register_provider(
        &self,
        name: &str,
        attributes: &IndexMap<String, String>,
    ) -> Result<ProviderRegistration>;

    /// Client-streamed ingestion: requests go out, acknowledgements come
    /// back on the paired stream.
    async fn ingest_stream(&self)
        -> Result<(mpsc::Sender<IngestRequest>, ResponseStream)>;

    /// Bidirectional ingestion; acknowledgements may interleave arbitrarily
    /// with outgoing requests.
    async fn ingest_bidi(&self) -> Result<(mpsc::Sender<IngestRequest>, ResponseStream)>;

    async fn shutdown_soft(&self) -> Result<()>;

    async fn await_termination(&self) -> Result<()>;
}
