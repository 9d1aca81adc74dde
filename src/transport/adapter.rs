//! Transport adapter.
//!
//! Wraps an [`Exchange`] and turns it into a per-request signal stream.
//! Each [`TransportAdapter::send`] spawns a task that runs the exchange
//! under the request's deadline and reports stages over an mpsc channel.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use futures_util::Stream;
use futures_util::stream;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::identifiers::RequestId;
use crate::protocol::AjaxRequest;

use super::{Exchange, Stage, TransportEvent, TransportKind, TransportSignal};

// ============================================================================
// StageReporter
// ============================================================================

/// Reports intermediate stages from inside an [`Exchange`].
///
/// Stages never go backwards; an out-of-order report is dropped. A
/// buffered transport's reporter drops every intermediate stage.
pub struct StageReporter {
    tx: mpsc::UnboundedSender<TransportSignal>,
    kind: TransportKind,
    last: Stage,
    status: Option<u16>,
}

impl StageReporter {
    fn new(tx: mpsc::UnboundedSender<TransportSignal>, kind: TransportKind) -> Self {
        Self {
            tx,
            kind,
            last: Stage::Opened,
            status: None,
        }
    }

    /// Reports that the status line and headers arrived.
    pub fn headers_received(&mut self, status: u16) {
        self.status = Some(status);
        if self.last >= Stage::HeadersReceived {
            return;
        }
        let mut event = TransportEvent::new(Stage::HeadersReceived);
        event.status = Some(status);
        self.report(event);
    }

    /// Reports body progress. May be called repeatedly.
    pub fn loading(&mut self, progress: Option<u8>) {
        if self.last > Stage::Loading {
            return;
        }
        let mut event = TransportEvent::new(Stage::Loading);
        event.status = self.status;
        event.progress = progress.map(|p| p.min(100));
        self.report(event);
    }

    /// Returns the last stage reported.
    #[inline]
    #[must_use]
    pub fn last_stage(&self) -> Stage {
        self.last
    }

    fn report(&mut self, event: TransportEvent) {
        self.last = event.stage;
        if self.kind == TransportKind::Buffered {
            return;
        }
        let _ = self.tx.send(TransportSignal::Stage(event));
    }
}

impl fmt::Debug for StageReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageReporter")
            .field("kind", &self.kind)
            .field("last", &self.last)
            .finish()
    }
}

// ============================================================================
// TransportAdapter
// ============================================================================

/// Sends requests through one [`Exchange`].
#[derive(Clone)]
pub struct TransportAdapter {
    exchange: Arc<dyn Exchange>,
    kind: TransportKind,
}

impl TransportAdapter {
    /// Creates an adapter.
    #[must_use]
    pub fn new(exchange: Arc<dyn Exchange>, kind: TransportKind) -> Self {
        Self { exchange, kind }
    }

    /// Returns the capability level.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Sends a request.
    ///
    /// `opened` is queued before this returns. Must be called from within a
    /// tokio runtime.
    pub fn send(&self, request: AjaxRequest) -> TransportHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let request_id = request.id;

        let _ = tx.send(TransportSignal::Stage(TransportEvent::new(Stage::Opened)));
        trace!(%request_id, "Transport opened");

        let exchange = Arc::clone(&self.exchange);
        let kind = self.kind;

        let task = tokio::spawn(async move {
            let mut reporter = StageReporter::new(tx.clone(), kind);
            let deadline = request.timeout;

            let outcome = if deadline.is_zero() {
                Ok(exchange.exchange(&request, &mut reporter).await)
            } else {
                timeout(deadline, exchange.exchange(&request, &mut reporter)).await
            };

            let signal = match outcome {
                Ok(Ok(response)) => {
                    debug!(%request_id, status = response.status, "Transport done");
                    TransportSignal::Stage(TransportEvent::done(response))
                }
                Ok(Err(e)) => {
                    debug!(%request_id, error = %e, "Transport failed");
                    TransportSignal::Failed {
                        message: e.to_string(),
                    }
                }
                Err(_) => {
                    let timeout_ms = deadline.as_millis() as u64;
                    debug!(%request_id, timeout_ms, "Transport timed out");
                    TransportSignal::Timeout { timeout_ms }
                }
            };

            let _ = tx.send(signal);
        });

        TransportHandle {
            request_id,
            rx,
            abort: task.abort_handle(),
            state: HandleState::Open,
        }
    }
}

impl fmt::Debug for TransportAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportAdapter")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TransportHandle
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleState {
    Open,
    Aborting,
    Finished,
}

/// Signal stream of one in-flight request.
///
/// Yields `opened`, optional intermediate stages, then exactly one terminal
/// signal, then `None`. Dropping the handle aborts the exchange.
pub struct TransportHandle {
    request_id: RequestId,
    rx: mpsc::UnboundedReceiver<TransportSignal>,
    abort: AbortHandle,
    state: HandleState,
}

impl TransportHandle {
    /// Returns the request id.
    #[inline]
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns `true` once the terminal signal has been yielded.
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state == HandleState::Finished
    }

    /// Receives the next signal.
    ///
    /// Cancel safe.
    pub async fn next(&mut self) -> Option<TransportSignal> {
        match self.state {
            HandleState::Finished => None,
            HandleState::Aborting => {
                self.state = HandleState::Finished;
                Some(TransportSignal::Aborted)
            }
            HandleState::Open => {
                let signal = match self.rx.recv().await {
                    Some(signal) => signal,
                    // Task gone without a terminal signal (panicked exchange).
                    None => TransportSignal::Failed {
                        message: "transport task ended unexpectedly".to_string(),
                    },
                };
                if signal.is_terminal() {
                    self.state = HandleState::Finished;
                }
                Some(signal)
            }
        }
    }

    /// Aborts the exchange.
    ///
    /// The next call to [`next`](Self::next) yields
    /// [`TransportSignal::Aborted`] and nothing follows it. No effect once
    /// finished.
    pub fn abort(&mut self) {
        if self.state != HandleState::Open {
            return;
        }
        self.abort.abort();
        self.rx.close();
        self.state = HandleState::Aborting;
        debug!(request_id = %self.request_id, "Transport aborted");
    }

    /// Converts the handle into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = TransportSignal> {
        stream::unfold(self, |mut handle| async move {
            handle.next().await.map(|signal| (signal, handle))
        })
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandle")
            .field("request_id", &self.request_id)
            .field("state", &self.state)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
