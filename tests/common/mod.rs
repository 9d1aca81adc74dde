//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use partial_ajax::protocol::AjaxRequest;
use partial_ajax::transport::StageReporter;
use partial_ajax::{Engine, Error, Exchange, MemoryDocument, RawResponse, Result};
use tokio::sync::Semaphore;

// ============================================================================
// Tracing
// ============================================================================

/// Installs a test subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Reply
// ============================================================================

/// What the scripted server answers.
#[derive(Debug, Clone)]
pub enum Reply {
    /// A response with status and body.
    Respond(u16, String),
    /// A transport failure.
    Fail(String),
    /// Never answers.
    Hang,
}

impl Reply {
    /// 200 with the given body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::Respond(200, body.into())
    }

    /// 200 with an empty change-set.
    pub fn empty() -> Self {
        Self::ok("<partial-response><changes/></partial-response>")
    }
}

// ============================================================================
// Server
// ============================================================================

type Responder = Box<dyn Fn(&AjaxRequest) -> Reply + Send + Sync>;

struct ServerState {
    requests: Mutex<Vec<AjaxRequest>>,
    replies: Mutex<VecDeque<Reply>>,
    fallback: Responder,
    gate: Option<Semaphore>,
}

/// In-process server behind an [`Exchange`].
///
/// Replies are taken from a script first, then from the fallback
/// responder. A gated server holds every exchange until
/// [`release`](Self::release) is called.
#[derive(Clone)]
pub struct Server {
    state: Arc<ServerState>,
}

impl Server {
    /// Answers every request with `responder`.
    pub fn new(responder: impl Fn(&AjaxRequest) -> Reply + Send + Sync + 'static) -> Self {
        Self::build(Box::new(responder), None)
    }

    /// Answers every request with an empty change-set.
    pub fn empty() -> Self {
        Self::new(|_| Reply::empty())
    }

    /// Like [`new`](Self::new) but holds exchanges until released.
    pub fn gated(responder: impl Fn(&AjaxRequest) -> Reply + Send + Sync + 'static) -> Self {
        Self::build(Box::new(responder), Some(Semaphore::new(0)))
    }

    fn build(fallback: Responder, gate: Option<Semaphore>) -> Self {
        Self {
            state: Arc::new(ServerState {
                requests: Mutex::new(Vec::new()),
                replies: Mutex::new(VecDeque::new()),
                fallback,
                gate,
            }),
        }
    }

    /// Queues a reply for the next request.
    pub fn script(&self, reply: Reply) -> &Self {
        self.state.replies.lock().push_back(reply);
        self
    }

    /// Lets `count` held exchanges answer.
    pub fn release(&self, count: usize) {
        if let Some(ref gate) = self.state.gate {
            gate.add_permits(count);
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<AjaxRequest> {
        self.state.requests.lock().clone()
    }

    /// Sources of the requests received so far.
    pub fn sources(&self) -> Vec<String> {
        self.state
            .requests
            .lock()
            .iter()
            .map(|r| r.source.to_string())
            .collect()
    }

    /// Returns an exchange bound to this server.
    pub fn exchange(&self) -> ScriptedExchange {
        ScriptedExchange {
            state: Arc::clone(&self.state),
        }
    }
}

/// [`Exchange`] answering from a [`Server`].
pub struct ScriptedExchange {
    state: Arc<ServerState>,
}

#[async_trait]
impl Exchange for ScriptedExchange {
    async fn exchange(
        &self,
        request: &AjaxRequest,
        reporter: &mut StageReporter,
    ) -> Result<RawResponse> {
        self.state.requests.lock().push(request.clone());

        if let Some(ref gate) = self.state.gate {
            gate.acquire()
                .await
                .map_err(|e| Error::transport(e.to_string()))?
                .forget();
        }

        let scripted = self.state.replies.lock().pop_front();
        let reply = scripted.unwrap_or_else(|| (self.state.fallback)(request));

        match reply {
            Reply::Respond(status, body) => {
                reporter.headers_received(status);
                reporter.loading(Some(100));
                Ok(RawResponse::new(status, body))
            }
            Reply::Fail(message) => Err(Error::transport(message)),
            Reply::Hang => std::future::pending().await,
        }
    }
}

// ============================================================================
// Recorder
// ============================================================================

/// Records every event the engine raises as `source:status`.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    /// Registers process-wide listeners on `engine`.
    pub fn attach(engine: &Engine) -> Self {
        let recorder = Self::default();

        let events = Arc::clone(&recorder.events);
        engine.add_on_event(move |event| {
            events.lock().push(format!("{}:{}", event.source, event.status));
        });

        let events = Arc::clone(&recorder.events);
        engine.add_on_error(move |event| {
            events.lock().push(format!("{}:{}", event.source, event.status));
        });

        recorder
    }

    /// Events recorded so far.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Events recorded for one source.
    pub fn events_for(&self, source: &str) -> Vec<String> {
        let prefix = format!("{source}:");
        self.events()
            .into_iter()
            .filter(|e| e.starts_with(&prefix))
            .map(|e| e[prefix.len()..].to_string())
            .collect()
    }

    /// Waits until `count` events have been recorded.
    pub async fn wait_for(&self, count: usize) -> Vec<String> {
        eventually(|| self.events.lock().len() >= count).await;
        self.events()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Polls `condition` until it holds, failing after five seconds.
pub async fn eventually(condition: impl Fn() -> bool) {
    let wait = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    if tokio::time::timeout(Duration::from_secs(5), wait).await.is_err() {
        panic!("condition not reached in time");
    }
}

/// Runs `future` with a five second limit.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("operation timed out")
}

/// Builds an engine over `server` and `document`.
pub fn engine(server: &Server, document: &MemoryDocument) -> Engine {
    Engine::builder()
        .endpoint("http://localhost:8080/app/page.xhtml")
        .exchange(server.exchange())
        .document(document.clone())
        .build()
        .expect("engine")
}

/// Wraps `changes` in a partial-response.
pub fn partial(changes: &str) -> String {
    format!("<partial-response id=\"j_id1\"><changes>{changes}</changes></partial-response>")
}
