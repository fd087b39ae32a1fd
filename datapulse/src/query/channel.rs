use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{stream, StreamExt};
use log::{debug, warn};

use crate::buffer::MessageBuffer;
use crate::connection::{QueryConnection, QueryControl};
use crate::query::block::CorrelatedBlock;
use crate::query::correlate::{correlate_sharded, CorrelationStats, Correlator};
use crate::query::request::{decompose_request, DecompositionStrategy, QueryRequest};
use crate::{DataPlatformError, QueryFragment, Result};

/// How sub-request data travels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    /// One request, one response message.
    Forward,
    /// Server-streamed responses, no flow control.
    Backward,
    /// Bidirectional cursor paced by per-fragment credits.
    Bidirectional,
}

#[derive(Debug, Clone)]
pub struct QueryChannelConfig {
    pub stream_type: StreamType,
    /// Upper bound on concurrently open streams.
    pub stream_count: usize,
    pub strategy: DecompositionStrategy,
    /// Abort sibling streams on the first sub-request error.
    pub fail_fast: bool,
    /// Per-sub-request deadline.
    pub request_timeout: Option<Duration>,
    /// Requests whose domain is shorter than this are forced onto a single
    /// stream regardless of the configured strategy.
    pub multi_stream_domain_threshold: Option<Duration>,
    /// Correlate concurrently with recovery instead of afterwards.
    pub correlate_while_streaming: bool,
    /// Worker count for sharded correlation; `None` correlates on one task.
    pub correlation_concurrency: Option<usize>,
}

impl Default for QueryChannelConfig {
    fn default() -> Self {
        QueryChannelConfig {
            stream_type: StreamType::Backward,
            stream_count: 4,
            strategy: DecompositionStrategy::None,
            fail_fast: false,
            request_timeout: None,
            multi_stream_domain_threshold: None,
            correlate_while_streaming: false,
            correlation_concurrency: None,
        }
    }
}

/// Drives one data recovery: decomposes the logical request, runs the
/// sub-requests over parallel streams, and concentrates the response
/// fragments into a shared message buffer. One channel serves one recovery;
/// the buffer is shut down when the recovery finishes, successfully or not,
/// leaving whatever fragments did arrive available to consumers.
pub struct QueryChannel<C> {
    connection: Arc<C>,
    config: QueryChannelConfig,
    buffer: Arc<MessageBuffer<QueryFragment>>,
}

impl<C: QueryConnection> QueryChannel<C> {
    pub fn new(connection: Arc<C>, config: QueryChannelConfig) -> Self {
        QueryChannel {
            connection,
            config,
            buffer: Arc::new(MessageBuffer::unbounded()),
        }
    }

    pub fn config(&self) -> &QueryChannelConfig {
        &self.config
    }

    /// The buffer receiving recovered fragments; consumers may take from it
    /// concurrently with recovery.
    pub fn buffer(&self) -> Arc<MessageBuffer<QueryFragment>> {
        self.buffer.clone()
    }

    fn effective_strategy(&self, request: &QueryRequest) -> DecompositionStrategy {
        if let Some(threshold) = self.config.multi_stream_domain_threshold {
            if request.interval.duration() < threshold {
                debug!(
                    "query channel: domain {:?} under threshold {threshold:?}, forcing a single stream",
                    request.interval.duration()
                );
                return DecompositionStrategy::None;
            }
        }
        self.config.strategy
    }

    /// Recovers the wire data for `request`, returning the number of
    /// fragments pushed onto the buffer. Dropping the returned future
    /// cancels the in-flight sub-streams; fragments already buffered remain.
    pub async fn recover(&self, request: &QueryRequest) -> Result<usize> {
        let result = self.recover_inner(request).await;
        self.buffer.shutdown();
        result
    }

    async fn recover_inner(&self, request: &QueryRequest) -> Result<usize> {
        let sub_requests = decompose_request(request, self.effective_strategy(request))?;
        debug!(
            "query channel: recovering {} sub-requests over {:?} streams",
            sub_requests.len(),
            self.config.stream_type
        );
        let recovered = AtomicUsize::new(0);
        let mut in_flight = stream::iter(
            sub_requests
                .into_iter()
                .map(|sub| self.run_sub_request(sub, &recovered)),
        )
        .buffer_unordered(self.config.stream_count.max(1));

        if self.config.fail_fast {
            // The early return drops the stream, cancelling the siblings.
            while let Some(result) = in_flight.next().await {
                result?;
            }
        } else {
            let mut first_error = None;
            while let Some(result) = in_flight.next().await {
                if let Err(error) = result {
                    warn!("query channel: sub-request failed: {error}");
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
            if let Some(error) = first_error {
                return Err(error);
            }
        }
        drop(in_flight);
        Ok(recovered.load(Ordering::SeqCst))
    }

    async fn run_sub_request(&self, sub: QueryRequest, recovered: &AtomicUsize) -> Result<()> {
        match self.config.request_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.stream_sub_request(sub, recovered)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(DataPlatformError::transport(format!(
                        "query channel: sub-request exceeded {limit:?}"
                    ))),
                }
            }
            None => self.stream_sub_request(sub, recovered).await,
        }
    }

    async fn stream_sub_request(
        &self,
        sub: QueryRequest,
        recovered: &AtomicUsize,
    ) -> Result<()> {
        match self.config.stream_type {
            StreamType::Forward => {
                let fragment = self.connection.unary_query(sub).await?;
                recovered.fetch_add(1, Ordering::SeqCst);
                self.buffer.enqueue(fragment).await?;
            }
            StreamType::Backward => {
                let mut fragments = self.connection.server_stream_query(sub).await?;
                while let Some(fragment) = fragments.next().await {
                    let fragment = fragment?;
                    recovered.fetch_add(1, Ordering::SeqCst);
                    self.buffer.enqueue(fragment).await?;
                }
            }
            StreamType::Bidirectional => {
                let (control, mut fragments) = self.connection.bidi_query().await?;
                control
                    .send(QueryControl::Request(sub))
                    .await
                    .map_err(|_| {
                        DataPlatformError::transport(
                            "query channel: bidirectional control stream closed",
                        )
                    })?;
                while let Some(fragment) = fragments.next().await {
                    let fragment = fragment?;
                    recovered.fetch_add(1, Ordering::SeqCst);
                    self.buffer.enqueue(fragment).await?;
                    // Credit the server for the next fragment; a closed
                    // control half means the stream is done server-side.
                    if control.send(QueryControl::NextBatch).await.is_err() {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Recovers and correlates, honoring `correlate_while_streaming` and
    /// `correlation_concurrency`. Returns the sorted correlated set with the
    /// anomaly counters.
    pub async fn recover_correlated(
        &self,
        request: &QueryRequest,
    ) -> Result<(Vec<CorrelatedBlock>, CorrelationStats)> {
        if self.config.correlate_while_streaming {
            let workers = self.config.correlation_concurrency.unwrap_or(1);
            let consumer = tokio::spawn(correlate_sharded(self.buffer(), workers));
            let recovered = self.recover(request).await;
            let correlated = consumer.await.map_err(|error| {
                DataPlatformError::Interrupted(format!(
                    "query channel: correlation task failed: {error}"
                ))
            })?;
            recovered?;
            correlated
        } else {
            match self.config.correlation_concurrency {
                Some(workers) if workers > 1 => {
                    self.recover(request).await?;
                    correlate_sharded(self.buffer(), workers).await
                }
                _ => {
                    self.recover(request).await?;
                    let mut correlator = Correlator::new();
                    correlator.drain_available(&self.buffer);
                    let stats = correlator.stats();
                    Ok((correlator.into_blocks(), stats))
                }
            }
        }
    }
}
