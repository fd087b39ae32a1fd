use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::buffer::MessageBuffer;
use crate::ingest::convert::{sub_frame_to_request, RequestIdMinter};
use crate::ingest::decompose::decompose_frame;
use crate::wire::TRANSPORT_MESSAGE_CAP;
use crate::{DataPlatformError, IngestRequest, IngestionFrame, Result, SubFrame};

/// Processor knobs. All fields may be set independently before activation;
/// mutation while the processor is supplying is rejected.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Stamped on every emitted request.
    pub provider_uid: u64,
    /// Worker tasks per stage, or `None` for single-threaded inline
    /// processing within `submit`.
    pub concurrency: Option<usize>,
    /// Whether oversized frames are split along the row axis.
    pub decomposition: bool,
    /// Split threshold in bytes; must be below the transport message cap.
    pub max_frame_size: usize,
    /// Output queue capacity; `None` leaves the queue unbounded.
    pub backpressure: Option<usize>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig {
            provider_uid: 0,
            concurrency: None,
            decomposition: true,
            max_frame_size: TRANSPORT_MESSAGE_CAP / 2,
            backpressure: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Supplying,
    Draining,
    Terminated,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Supplying => "supplying",
            State::Draining => "draining",
            State::Terminated => "terminated",
        }
    }
}

struct Pipeline {
    input_tx: mpsc::UnboundedSender<IngestionFrame>,
    workers: Vec<JoinHandle<()>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Accepts ingestion frames from any number of producer tasks and emits a
/// size-bounded sequence of wire requests on a pull interface.
///
/// Lifecycle: `Idle` → `activate` → `Supplying` → `shutdown` → `Draining` →
/// `Terminated` once the request queue empties. `shutdown_now` abandons
/// pending work and jumps straight to `Terminated`.
pub struct IngestionFrameProcessor {
    config: Mutex<ProcessorConfig>,
    state: Mutex<State>,
    pipeline: Mutex<Option<Pipeline>>,
    output: Mutex<Option<Arc<MessageBuffer<IngestRequest>>>>,
    ids: Mutex<Option<Arc<RequestIdMinter>>>,
    pending: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
    fatal: Arc<Mutex<Option<DataPlatformError>>>,
}

impl IngestionFrameProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        IngestionFrameProcessor {
            config: Mutex::new(config),
            state: Mutex::new(State::Idle),
            pipeline: Mutex::new(None),
            output: Mutex::new(None),
            ids: Mutex::new(None),
            pending: Arc::new(AtomicUsize::new(0)),
            failures: Arc::new(AtomicUsize::new(0)),
            fatal: Arc::new(Mutex::new(None)),
        }
    }

    fn effective_state(&self) -> State {
        let mut state = lock(&self.state);
        if *state == State::Draining {
            if let Some(output) = lock(&self.output).as_ref() {
                if output.is_drained() {
                    *state = State::Terminated;
                }
            }
        }
        *state
    }

    fn ensure_configurable(&self, operation: &str) -> Result<()> {
        match self.effective_state() {
            State::Idle | State::Terminated => Ok(()),
            state => Err(DataPlatformError::State(format!(
                "ingestion frame processor: {operation} while {}",
                state.name()
            ))),
        }
    }

    pub fn set_provider_uid(&self, provider_uid: u64) -> Result<()> {
        self.ensure_configurable("set_provider_uid")?;
        lock(&self.config).provider_uid = provider_uid;
        Ok(())
    }

    pub fn set_concurrency(&self, concurrency: Option<usize>) -> Result<()> {
        self.ensure_configurable("set_concurrency")?;
        lock(&self.config).concurrency = concurrency;
        Ok(())
    }

    pub fn set_decomposition(&self, decomposition: bool) -> Result<()> {
        self.ensure_configurable("set_decomposition")?;
        lock(&self.config).decomposition = decomposition;
        Ok(())
    }

    pub fn set_max_frame_size(&self, max_frame_size: usize) -> Result<()> {
        self.ensure_configurable("set_max_frame_size")?;
        lock(&self.config).max_frame_size = max_frame_size;
        Ok(())
    }

    pub fn set_backpressure(&self, backpressure: Option<usize>) -> Result<()> {
        self.ensure_configurable("set_backpressure")?;
        lock(&self.config).backpressure = backpressure;
        Ok(())
    }

    pub fn config(&self) -> ProcessorConfig {
        lock(&self.config).clone()
    }

    /// Validates the configuration and starts supplying. With concurrency
    /// enabled this spawns the decomposition and conversion worker pools.
    pub fn activate(&self) -> Result<()> {
        {
            let state = lock(&self.state);
            if *state != State::Idle {
                return Err(DataPlatformError::State(format!(
                    "ingestion frame processor: activate while {}",
                    state.name()
                )));
            }
        }
        let config = self.config();
        if config.max_frame_size == 0 {
            return Err(DataPlatformError::Config(
                "ingestion frame processor: max frame size is zero".to_string(),
            ));
        }
        if config.max_frame_size >= TRANSPORT_MESSAGE_CAP {
            return Err(DataPlatformError::Config(format!(
                "ingestion frame processor: max frame size {} is not below the {} byte transport cap",
                config.max_frame_size, TRANSPORT_MESSAGE_CAP
            )));
        }
        if config.concurrency == Some(0) {
            return Err(DataPlatformError::Config(
                "ingestion frame processor: zero worker concurrency".to_string(),
            ));
        }
        if config.backpressure == Some(0) {
            return Err(DataPlatformError::Config(
                "ingestion frame processor: zero backpressure capacity".to_string(),
            ));
        }

        let output = Arc::new(match config.backpressure {
            Some(capacity) => MessageBuffer::bounded(capacity),
            None => MessageBuffer::unbounded(),
        });
        let ids = Arc::new(RequestIdMinter::new());
        *lock(&self.output) = Some(output.clone());
        *lock(&self.ids) = Some(ids.clone());

        if let Some(workers) = config.concurrency {
            let (input_tx, input_rx) = mpsc::unbounded_channel();
            let (piece_tx, piece_rx) = mpsc::unbounded_channel();
            let input_rx = Arc::new(AsyncMutex::new(input_rx));
            let piece_rx = Arc::new(AsyncMutex::new(piece_rx));

            let mut handles = Vec::with_capacity(workers * 2);
            for worker in 0..workers {
                handles.push(tokio::spawn(decompose_worker(
                    worker,
                    input_rx.clone(),
                    piece_tx.clone(),
                    config.decomposition,
                    config.max_frame_size,
                    self.pending.clone(),
                    self.failures.clone(),
                )));
                handles.push(tokio::spawn(convert_worker(
                    worker,
                    piece_rx.clone(),
                    output.clone(),
                    config.provider_uid,
                    ids.clone(),
                    self.pending.clone(),
                    self.failures.clone(),
                    self.fatal.clone(),
                )));
            }
            *lock(&self.pipeline) = Some(Pipeline {
                input_tx,
                workers: handles,
            });
        }

        *lock(&self.state) = State::Supplying;
        debug!(
            "ingestion frame processor activated: provider {}, concurrency {:?}",
            config.provider_uid, config.concurrency
        );
        Ok(())
    }

    fn ensure_supplying(&self, operation: &str) -> Result<()> {
        let state = self.effective_state();
        if state != State::Supplying {
            return Err(DataPlatformError::State(format!(
                "ingestion frame processor: {operation} while {}",
                state.name()
            )));
        }
        Ok(())
    }

    /// Enqueues one frame for processing. In single-threaded mode the frame
    /// is decomposed and converted inline, so this call blocks while the
    /// output queue is full; with workers it returns as soon as the frame is
    /// on the input queue.
    pub async fn submit(&self, frame: IngestionFrame) -> Result<()> {
        self.ensure_supplying("submit")?;
        let frame = {
            let pipeline = lock(&self.pipeline);
            match pipeline.as_ref() {
                Some(pipeline) => {
                    self.pending.fetch_add(1, Ordering::SeqCst);
                    if pipeline.input_tx.send(frame).is_err() {
                        self.pending.fetch_sub(1, Ordering::SeqCst);
                        return Err(DataPlatformError::State(
                            "ingestion frame processor: submit after worker shutdown"
                                .to_string(),
                        ));
                    }
                    return Ok(());
                }
                None => frame,
            }
        };
        self.pending.fetch_add(1, Ordering::SeqCst);
        let result = self.process_inline(frame).await;
        self.pending.fetch_sub(1, Ordering::SeqCst);
        result
    }

    /// Enqueues a batch in order. Frames before a failing submission remain
    /// accepted; the error reports how many were taken.
    pub async fn submit_all(&self, frames: Vec<IngestionFrame>) -> Result<()> {
        self.ensure_supplying("submit_all")?;
        let total = frames.len();
        for (accepted, frame) in frames.into_iter().enumerate() {
            if let Err(error) = self.submit(frame).await {
                return Err(DataPlatformError::State(format!(
                    "ingestion frame processor: submit_all accepted {accepted} of {total} frames: {error}"
                )));
            }
        }
        Ok(())
    }

    async fn process_inline(&self, frame: IngestionFrame) -> Result<()> {
        let config = self.config();
        let (output, ids) = self.channel_parts("submit")?;

        let root = SubFrame::root(frame);
        let pieces = if config.decomposition {
            match decompose_frame(root, config.max_frame_size) {
                Ok(pieces) => pieces,
                Err(error) => {
                    warn!("frame decomposition failed, frame dropped: {error}");
                    self.failures.fetch_add(1, Ordering::SeqCst);
                    return Ok(());
                }
            }
        } else {
            vec![root]
        };

        for piece in pieces {
            let request = sub_frame_to_request(config.provider_uid, ids.mint(), piece);
            if request.encoded_size() > TRANSPORT_MESSAGE_CAP {
                record_cap_violation(&self.failures, &self.fatal, &request);
                continue;
            }
            output.enqueue(request).await?;
        }
        Ok(())
    }

    fn channel_parts(
        &self,
        operation: &str,
    ) -> Result<(Arc<MessageBuffer<IngestRequest>>, Arc<RequestIdMinter>)> {
        let output = lock(&self.output).clone().ok_or_else(|| {
            DataPlatformError::State(format!(
                "ingestion frame processor: {operation} before activation"
            ))
        })?;
        let ids = lock(&self.ids).clone().ok_or_else(|| {
            DataPlatformError::State(format!(
                "ingestion frame processor: {operation} before activation"
            ))
        })?;
        Ok((output, ids))
    }

    fn output_buffer(&self, operation: &str) -> Result<Arc<MessageBuffer<IngestRequest>>> {
        lock(&self.output).clone().ok_or_else(|| {
            DataPlatformError::State(format!(
                "ingestion frame processor: {operation} before activation"
            ))
        })
    }

    fn take_fatal(&self) -> Option<DataPlatformError> {
        lock(&self.fatal).take()
    }

    /// Removes the next request if one is ready.
    pub fn poll(&self) -> Result<Option<IngestRequest>> {
        if let Some(fatal) = self.take_fatal() {
            return Err(fatal);
        }
        Ok(self.output_buffer("poll")?.poll())
    }

    /// Removes the next request, waiting up to `timeout` for one to arrive.
    pub async fn poll_timeout(&self, timeout: Duration) -> Result<Option<IngestRequest>> {
        if let Some(fatal) = self.take_fatal() {
            return Err(fatal);
        }
        Ok(self.output_buffer("poll")?.poll_timeout(timeout).await)
    }

    /// Removes the next request, waiting for one. Fails with `State` once
    /// the processor has terminated with an empty request queue.
    pub async fn take(&self) -> Result<IngestRequest> {
        if let Some(fatal) = self.take_fatal() {
            return Err(fatal);
        }
        match self.output_buffer("take")?.take().await {
            Some(request) => Ok(request),
            None => Err(DataPlatformError::State(
                "ingestion frame processor: take after termination with empty request queue"
                    .to_string(),
            )),
        }
    }

    /// True while requests can still appear or remain on the output queue.
    pub fn is_supplying(&self) -> bool {
        match self.effective_state() {
            State::Supplying => true,
            State::Draining => self
                .output_buffer("is_supplying")
                .map(|output| !output.is_empty())
                .unwrap_or(false),
            _ => false,
        }
    }

    /// True while decomposition or conversion work is in flight.
    pub fn has_pending_tasks(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }

    pub fn has_shutdown(&self) -> bool {
        matches!(
            self.effective_state(),
            State::Draining | State::Terminated
        )
    }

    pub fn has_processing_failure(&self) -> bool {
        self.failures.load(Ordering::SeqCst) > 0 || lock(&self.fatal).is_some()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn request_queue_size(&self) -> usize {
        lock(&self.output)
            .as_ref()
            .map(|output| output.len())
            .unwrap_or(0)
    }

    /// Soft shutdown: rejects further submissions, waits for the input and
    /// decomposition queues to empty, then closes the output queue so
    /// consumers can drain what remains.
    pub async fn shutdown(&self) -> Result<()> {
        {
            let mut state = lock(&self.state);
            match *state {
                State::Idle => {
                    return Err(DataPlatformError::State(
                        "ingestion frame processor: shutdown while idle".to_string(),
                    ))
                }
                State::Draining | State::Terminated => return Ok(()),
                State::Supplying => *state = State::Draining,
            }
        }
        let pipeline = lock(&self.pipeline).take();
        if let Some(pipeline) = pipeline {
            drop(pipeline.input_tx);
            for worker in pipeline.workers {
                if let Err(error) = worker.await {
                    if !error.is_cancelled() {
                        warn!("ingestion worker ended abnormally: {error}");
                    }
                }
            }
        }
        if let Some(output) = lock(&self.output).as_ref() {
            output.shutdown();
        }
        Ok(())
    }

    /// Hard shutdown: aborts in-flight work at its next suspension point and
    /// discards every queued frame and request.
    pub async fn shutdown_now(&self) {
        let pipeline = lock(&self.pipeline).take();
        if let Some(pipeline) = pipeline {
            drop(pipeline.input_tx);
            for worker in &pipeline.workers {
                worker.abort();
            }
            for worker in pipeline.workers {
                if let Err(error) = worker.await {
                    if !error.is_cancelled() {
                        warn!("ingestion worker ended abnormally: {error}");
                    }
                }
            }
        }
        if let Some(output) = lock(&self.output).as_ref() {
            let dropped = output.shutdown_now();
            if dropped > 0 {
                debug!("shutdown_now discarded {dropped} queued requests");
            }
        }
        self.pending.store(0, Ordering::SeqCst);
        *lock(&self.state) = State::Terminated;
    }
}

async fn decompose_worker(
    worker: usize,
    input: Arc<AsyncMutex<mpsc::UnboundedReceiver<IngestionFrame>>>,
    pieces: mpsc::UnboundedSender<Vec<SubFrame>>,
    decomposition: bool,
    max_frame_size: usize,
    pending: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
) {
    loop {
        let frame = { input.lock().await.recv().await };
        let Some(frame) = frame else { break };
        let root = SubFrame::root(frame);
        let batch = if decomposition {
            match decompose_frame(root, max_frame_size) {
                Ok(batch) => batch,
                Err(error) => {
                    warn!("decomposer {worker}: frame dropped: {error}");
                    failures.fetch_add(1, Ordering::SeqCst);
                    pending.fetch_sub(1, Ordering::SeqCst);
                    continue;
                }
            }
        } else {
            vec![root]
        };
        if pieces.send(batch).is_err() {
            pending.fetch_sub(1, Ordering::SeqCst);
            break;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn convert_worker(
    worker: usize,
    pieces: Arc<AsyncMutex<mpsc::UnboundedReceiver<Vec<SubFrame>>>>,
    output: Arc<MessageBuffer<IngestRequest>>,
    provider_uid: u64,
    ids: Arc<RequestIdMinter>,
    pending: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
    fatal: Arc<Mutex<Option<DataPlatformError>>>,
) {
    'frames: loop {
        let batch = { pieces.lock().await.recv().await };
        let Some(batch) = batch else { break };
        // One frame's pieces are converted by one worker, in row order, so
        // messages derived from the same frame stay ordered on the output.
        for piece in batch {
            let request = sub_frame_to_request(provider_uid, ids.mint(), piece);
            if request.encoded_size() > TRANSPORT_MESSAGE_CAP {
                debug!("converter {worker}: dropping request {}", request.client_request_id);
                record_cap_violation(&failures, &fatal, &request);
                continue;
            }
            if output.enqueue(request).await.is_err() {
                pending.fetch_sub(1, Ordering::SeqCst);
                break 'frames;
            }
        }
        pending.fetch_sub(1, Ordering::SeqCst);
    }
}

fn record_cap_violation(
    failures: &AtomicUsize,
    fatal: &Mutex<Option<DataPlatformError>>,
    request: &IngestRequest,
) {
    warn!(
        "request {} is {} bytes, over the transport cap; max frame size is misconfigured",
        request.client_request_id,
        request.encoded_size()
    );
    failures.fetch_add(1, Ordering::SeqCst);
    *lock(fatal) = Some(DataPlatformError::Config(format!(
        "ingestion frame processor: converted request of {} bytes exceeds the {} byte transport cap",
        request.encoded_size(),
        TRANSPORT_MESSAGE_CAP
    )));
}
