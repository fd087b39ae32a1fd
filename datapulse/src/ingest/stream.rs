use std::collections::HashSet;

use futures_util::StreamExt;
use log::warn;
use tokio::sync::mpsc;

use crate::connection::{IngestionConnection, ResponseStream};
use crate::ingest::IngestionFrameProcessor;
use crate::{DataPlatformError, IngestRequest, IngestResult, Result};

/// Pumps a processor's output over a client-streamed ingestion connection
/// until the processor drains, then reads acknowledgements to completion.
/// Returns the number of requests sent; the first error acknowledgement is
/// surfaced as a `Transport` error.
pub async fn drive_ingest_stream<C: IngestionConnection>(
    connection: &C,
    processor: &IngestionFrameProcessor,
) -> Result<usize> {
    let (sender, responses) = connection.ingest_stream().await?;
    pump(processor, sender, responses).await
}

/// As [`drive_ingest_stream`], over the bidirectional ingestion stream.
/// Acknowledgements may interleave with outgoing requests in arbitrary
/// order; they are matched by client request id either way.
pub async fn drive_ingest_bidi<C: IngestionConnection>(
    connection: &C,
    processor: &IngestionFrameProcessor,
) -> Result<usize> {
    let (sender, responses) = connection.ingest_bidi().await?;
    pump(processor, sender, responses).await
}

async fn pump(
    processor: &IngestionFrameProcessor,
    sender: mpsc::Sender<IngestRequest>,
    mut responses: ResponseStream,
) -> Result<usize> {
    let mut outstanding: HashSet<String> = HashSet::new();
    let mut sent = 0usize;
    loop {
        match processor.take().await {
            Ok(request) => {
                outstanding.insert(request.client_request_id.clone());
                sender.send(request).await.map_err(|_| {
                    DataPlatformError::transport(
                        "ingest stream: send half closed by the connection",
                    )
                })?;
                sent += 1;
            }
            // Drained: the processor terminated with an empty queue.
            Err(DataPlatformError::State(_)) => break,
            Err(error) => return Err(error),
        }
    }
    drop(sender);

    while let Some(response) = responses.next().await {
        let response = response?;
        outstanding.remove(&response.client_request_id);
        if let IngestResult::Error { message, cause } = response.result {
            let cause = cause.map(|c| format!(" (caused by: {c})")).unwrap_or_default();
            return Err(DataPlatformError::transport(format!(
                "ingest request {} rejected: {message}{cause}",
                response.client_request_id
            )));
        }
    }
    if !outstanding.is_empty() {
        warn!(
            "ingest stream ended with {} unacknowledged requests",
            outstanding.len()
        );
    }
    Ok(sent)
}
