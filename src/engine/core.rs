//! Engine handle and event loop.
//!
//! [`Engine`] is a cheap cloneable handle. All state lives in a single
//! spawned task that owns the request queue, the document, the in-flight
//! transport handle and the delay timers.
//!
//! # Event Loop
//!
//! The loop selects over:
//!
//! - Commands from engine handles (enqueue, manual response, cancel, ...)
//! - Delay timer expiries
//! - Signals from the in-flight transport handle
//!
//! Parsing and patching run to completion inside one loop iteration, so a
//! response is never interleaved with another.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::dispatch::{Dispatcher, Listeners};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::identifiers::{RequestId, SourceId};
use crate::protocol::{
    AjaxRequest, ErrorEvent, ErrorKind, EventStatus, LifecycleEvent, RequestOptions, TriggerEvent,
};
use crate::queue::{Admission, RequestEntry, RequestQueue};
use crate::transport::{RawResponse, Stage, TransportAdapter, TransportHandle, TransportSignal};

use super::builder::EngineBuilder;
use super::config::EngineConfig;
use super::response::{ProcessSummary, ResponseContext, ResponseProcessor};

// ============================================================================
// Types
// ============================================================================

/// Delay timer expiry: source and generation.
type TimerFired = (SourceId, u64);

/// Commands sent from engine handles to the loop.
enum EngineCommand {
    /// Admit a request.
    Enqueue(RequestEntry),

    /// Process an externally obtained response.
    Response {
        response: RawResponse,
        context: ResponseContext,
        reply: oneshot::Sender<ProcessSummary>,
    },

    /// Drop every pending and deferred request.
    CancelAll,

    /// Change the maximum pending size.
    SetQueueSize(Option<usize>),

    /// Report queue state.
    Status(oneshot::Sender<QueueStatus>),

    /// Stop the loop.
    Shutdown(oneshot::Sender<()>),
}

// ============================================================================
// QueueStatus
// ============================================================================

/// Snapshot of the request queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatus {
    /// In-flight request.
    pub current: Option<RequestId>,
    /// Pending request ids, oldest first.
    pub pending: Vec<RequestId>,
    /// Number of deferred requests.
    pub delayed: usize,
    /// Maximum pending size.
    pub max_size: Option<usize>,
}

impl QueueStatus {
    /// Returns `true` if nothing is in flight, pending or deferred.
    #[inline]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.pending.is_empty() && self.delayed == 0
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Handle to a running ajax engine.
///
/// Cloning is cheap. The loop stops when [`shutdown`](Self::shutdown) is
/// called or the last handle is dropped.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    endpoint: Url,
    config: EngineConfig,
    command_tx: mpsc::UnboundedSender<EngineCommand>,
    listeners: Arc<Listeners>,
    view_state: Arc<RwLock<Option<String>>>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("transport", &self.inner.config.transport)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Engine - Constructors
// ============================================================================

impl Engine {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Spawns the loop on `runtime` and returns its handle.
    pub(crate) fn spawn(
        runtime: &tokio::runtime::Handle,
        endpoint: Url,
        config: EngineConfig,
        adapter: TransportAdapter,
        document: Box<dyn Document>,
        processor: ResponseProcessor,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        let listeners = Arc::clone(processor.dispatcher().listeners());
        let view_state = Arc::new(RwLock::new(config.view_state.clone()));

        let event_loop = EngineLoop {
            queue: RequestQueue::new(config.queue_size),
            document,
            adapter,
            processor,
            view_state: Arc::clone(&view_state),
            in_flight: None,
            timers: FxHashMap::default(),
            timer_tx,
        };
        runtime.spawn(event_loop.run(command_rx, timer_rx));

        info!(
            endpoint = %endpoint,
            transport = ?config.transport,
            queue_size = ?config.queue_size,
            "Engine started"
        );

        Self {
            inner: Arc::new(EngineInner {
                endpoint,
                config,
                command_tx,
                listeners,
                view_state,
            }),
        }
    }
}

// ============================================================================
// Engine - Requests
// ============================================================================

impl Engine {
    /// Issues a logical request for `source`.
    ///
    /// The request is sent immediately if nothing is in flight, otherwise
    /// queued. Returns the id its events will carry.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `source` is empty
    /// - [`Error::EngineClosed`] if the loop has stopped
    pub fn request(
        &self,
        source: impl Into<SourceId>,
        event: Option<&TriggerEvent>,
        options: RequestOptions,
    ) -> Result<RequestId> {
        let source = source.into();
        if source.as_str().is_empty() {
            return Err(Error::invalid_argument("request source must not be empty"));
        }

        let request = AjaxRequest::build(
            self.inner.endpoint.clone(),
            source,
            event,
            &options,
            self.inner.config.timeout,
        );
        let request_id = request.id;

        let RequestOptions {
            delay,
            queue_size,
            callbacks,
            ..
        } = options;

        let mut entry = RequestEntry::new(request);
        entry.delay = delay;
        entry.queue_size = queue_size;
        entry.callbacks = callbacks;

        trace!(%request_id, source = %entry.source(), "Request issued");
        self.send(EngineCommand::Enqueue(entry))?;
        Ok(request_id)
    }

    /// Parses and applies a response obtained outside the queue.
    ///
    /// Raises `success` or an error event to the context's listeners and
    /// the process-wide ones. The queue is not touched.
    ///
    /// # Errors
    ///
    /// [`Error::EngineClosed`] or [`Error::ChannelClosed`] if the loop has
    /// stopped.
    pub async fn response(
        &self,
        response: RawResponse,
        context: ResponseContext,
    ) -> Result<ProcessSummary> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Response {
            response,
            context,
            reply,
        })?;
        Ok(rx.await?)
    }
}

// ============================================================================
// Engine - Listeners
// ============================================================================

impl Engine {
    /// Registers a process-wide lifecycle listener.
    pub fn add_on_event<F>(&self, listener: F)
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.add_on_event(Arc::new(listener));
    }

    /// Registers a process-wide error listener.
    pub fn add_on_error<F>(&self, listener: F)
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.add_on_error(Arc::new(listener));
    }
}

// ============================================================================
// Engine - Queue Control
// ============================================================================

impl Engine {
    /// Drops every pending and deferred request.
    ///
    /// The in-flight request is unaffected.
    ///
    /// # Errors
    ///
    /// [`Error::EngineClosed`] if the loop has stopped.
    pub fn cancel_all(&self) -> Result<()> {
        self.send(EngineCommand::CancelAll)
    }

    /// Changes the maximum pending size, trimming the oldest entries.
    ///
    /// # Errors
    ///
    /// [`Error::EngineClosed`] if the loop has stopped.
    pub fn set_queue_size(&self, size: Option<usize>) -> Result<()> {
        self.send(EngineCommand::SetQueueSize(size))
    }

    /// Returns a snapshot of the queue.
    ///
    /// # Errors
    ///
    /// [`Error::EngineClosed`] or [`Error::ChannelClosed`] if the loop has
    /// stopped.
    pub async fn queue_status(&self) -> Result<QueueStatus> {
        let (tx, rx) = oneshot::channel();
        self.send(EngineCommand::Status(tx))?;
        Ok(rx.await?)
    }

    /// Returns the current view-state token.
    #[must_use]
    pub fn view_state(&self) -> Option<String> {
        self.inner.view_state.read().clone()
    }

    /// Returns the endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Returns the configuration the engine was built with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Stops the loop.
    ///
    /// The in-flight exchange is aborted without raising events and every
    /// pending or deferred request is dropped. Idempotent.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.send(EngineCommand::Shutdown(tx)).is_err() {
            return;
        }
        let _ = rx.await;
    }

    fn send(&self, command: EngineCommand) -> Result<()> {
        self.inner
            .command_tx
            .send(command)
            .map_err(|_| Error::EngineClosed)
    }
}

// ============================================================================
// EngineLoop
// ============================================================================

/// The request currently on the wire.
struct InFlight {
    handle: TransportHandle,
    entry: RequestEntry,
}

/// State owned by the loop task.
struct EngineLoop {
    queue: RequestQueue,
    document: Box<dyn Document>,
    adapter: TransportAdapter,
    processor: ResponseProcessor,
    view_state: Arc<RwLock<Option<String>>>,
    in_flight: Option<InFlight>,
    timers: FxHashMap<SourceId, (u64, AbortHandle)>,
    timer_tx: mpsc::UnboundedSender<TimerFired>,
}

impl EngineLoop {
    async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<EngineCommand>,
        mut timer_rx: mpsc::UnboundedReceiver<TimerFired>,
    ) {
        let ack = loop {
            tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        Some(EngineCommand::Shutdown(ack)) => break Some(ack),
                        Some(command) => self.handle_command(command),
                        None => {
                            debug!("All engine handles dropped");
                            break None;
                        }
                    }
                }

                Some((source, generation)) = timer_rx.recv() => {
                    self.handle_timer(source, generation);
                }

                signal = next_signal(&mut self.in_flight) => {
                    match signal {
                        Some(signal) => self.handle_signal(signal),
                        None => self.in_flight = None,
                    }
                }
            }
        };

        drop(command_rx);
        self.teardown();

        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Enqueue(entry) => {
                let admission = self.queue.enqueue(entry);
                self.handle_admission(admission);
            }

            EngineCommand::Response {
                response,
                context,
                reply,
            } => {
                let summary = self
                    .processor
                    .process(&response, &context, self.document.as_mut());
                self.record(&summary);
                let _ = reply.send(summary);
            }

            EngineCommand::CancelAll => {
                let timers = self.timers.len();
                for (_, (_, timer)) in self.timers.drain() {
                    timer.abort();
                }
                let dropped = self.queue.cancel_all();
                debug!(dropped, timers, "Cancelled queued requests");
            }

            EngineCommand::SetQueueSize(size) => {
                for evicted in self.queue.set_max_size(size) {
                    log_eviction(&evicted);
                }
            }

            EngineCommand::Status(reply) => {
                let _ = reply.send(QueueStatus {
                    current: self.queue.current(),
                    pending: self.queue.pending_ids(),
                    delayed: self.queue.delayed_len(),
                    max_size: self.queue.max_size(),
                });
            }

            EngineCommand::Shutdown(_) => {}
        }
    }

    fn handle_admission(&mut self, admission: Admission) {
        match admission {
            Admission::Dispatch(entry) => self.dispatch(entry),

            Admission::Queued { evicted } => {
                for entry in &evicted {
                    log_eviction(entry);
                }
                trace!(pending = self.queue.len(), "Request queued");
            }

            Admission::Deferred {
                source,
                generation,
                delay,
                replaced,
            } => {
                if let Some(replaced) = replaced {
                    debug!(
                        request_id = %replaced.id(),
                        source = %source,
                        "Deferred request replaced"
                    );
                }
                self.start_timer(source, generation, delay);
            }
        }
    }

    fn start_timer(&mut self, source: SourceId, generation: u64, delay: Duration) {
        let timer_tx = self.timer_tx.clone();
        let key = source.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = timer_tx.send((key, generation));
        });

        trace!(source = %source, generation, delay_ms = delay.as_millis() as u64, "Delay timer started");

        if let Some((_, previous)) = self.timers.insert(source, (generation, task.abort_handle())) {
            previous.abort();
        }
    }

    fn handle_timer(&mut self, source: SourceId, generation: u64) {
        if self
            .timers
            .get(&source)
            .is_some_and(|(current, _)| *current == generation)
        {
            self.timers.remove(&source);
        }

        match self.queue.release_delayed(&source, generation) {
            Some(admission) => self.handle_admission(admission),
            None => trace!(source = %source, generation, "Stale delay timer ignored"),
        }
    }

    /// Sends `entry`, which the queue has already made current.
    fn dispatch(&mut self, mut entry: RequestEntry) {
        if entry.request.view_state.is_none() {
            entry.request.view_state = self.view_state.read().clone();
        }

        let begin = LifecycleEvent::new(EventStatus::Begin, entry.source().clone(), entry.id());
        self.dispatcher().send_event(&entry.callbacks, &begin);

        let handle = self.adapter.send(entry.request.clone());
        debug!(request_id = %entry.id(), source = %entry.source(), "Request dispatched");

        self.in_flight = Some(InFlight { handle, entry });
    }

    fn handle_signal(&mut self, signal: TransportSignal) {
        match signal {
            TransportSignal::Stage(event) if event.stage == Stage::Done => {
                let Some(InFlight { entry, .. }) = self.in_flight.take() else {
                    return;
                };
                match event.into_response() {
                    Some(response) => self.complete(entry, response),
                    None => self.fail(entry, Error::transport("done without a response").to_string()),
                }
            }

            TransportSignal::Stage(event) => {
                trace!(stage = %event.stage, progress = ?event.progress, "Transport stage");
            }

            TransportSignal::Timeout { timeout_ms } => {
                let Some(InFlight { entry, .. }) = self.in_flight.take() else {
                    return;
                };
                let description = Error::request_timeout(entry.id(), timeout_ms).to_string();
                self.fail(entry, description);
            }

            TransportSignal::Failed { message } => {
                let Some(InFlight { entry, .. }) = self.in_flight.take() else {
                    return;
                };
                self.fail(entry, message);
            }

            TransportSignal::Aborted => {
                if let Some(InFlight { entry, .. }) = self.in_flight.take() {
                    debug!(request_id = %entry.id(), "Request aborted");
                    self.finish(entry.id());
                }
            }
        }
    }

    /// Transport reached `done`: raise `complete`, then parse and apply.
    fn complete(&mut self, entry: RequestEntry, response: RawResponse) {
        let request_id = entry.id();
        let context = ResponseContext {
            source: entry.request.source,
            request_id,
            callbacks: entry.callbacks,
        };

        let complete = LifecycleEvent::new(EventStatus::Complete, context.source.clone(), request_id)
            .with_response(response.status, response.body.clone());
        self.dispatcher().send_event(&context.callbacks, &complete);

        let summary = self
            .processor
            .process(&response, &context, self.document.as_mut());
        self.record(&summary);

        self.finish(request_id);
    }

    /// Transport never reached `done`.
    fn fail(&mut self, entry: RequestEntry, description: String) {
        let request_id = entry.id();
        warn!(%request_id, source = %entry.source(), %description, "Request failed");

        let event = ErrorEvent::new(
            ErrorKind::HttpError,
            description,
            entry.source().clone(),
            request_id,
        );
        self.dispatcher().send_error(&entry.callbacks, &event);

        self.finish(request_id);
    }

    fn finish(&mut self, request_id: RequestId) {
        if let Some(next) = self.queue.complete_current(request_id) {
            self.dispatch(next);
        }
    }

    fn record(&self, summary: &ProcessSummary) {
        if let Some(ref token) = summary.view_state {
            trace!("View state updated");
            *self.view_state.write() = Some(token.clone());
        }
        if let Some(ref url) = summary.redirect {
            debug!(url = %url, "Response redirected");
        }
    }

    fn teardown(&mut self) {
        if let Some(mut flight) = self.in_flight.take() {
            flight.handle.abort();
            debug!(request_id = %flight.entry.id(), "In-flight request abandoned");
        }
        for (_, (_, timer)) in self.timers.drain() {
            timer.abort();
        }
        let dropped = self.queue.cancel_all();
        info!(dropped, "Engine stopped");
    }

    #[inline]
    fn dispatcher(&self) -> &Dispatcher {
        self.processor.dispatcher()
    }
}

/// Next signal of the in-flight request; pending forever when idle.
async fn next_signal(in_flight: &mut Option<InFlight>) -> Option<TransportSignal> {
    match in_flight {
        Some(flight) => flight.handle.next().await,
        None => std::future::pending().await,
    }
}

fn log_eviction(entry: &RequestEntry) {
    debug!(
        request_id = %entry.id(),
        source = %entry.source(),
        "Oldest pending request evicted"
    );
}
