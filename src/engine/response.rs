//! Response processing pipeline.
//!
//! [`ResponseProcessor`] takes one finished exchange through the response
//! state machine:
//!
//! ```text
//! received ──► parsed ──► patch-applied ──► dispatched ──► terminal
//!    │            │                            ▲
//!    │            └──────► error-path ─────────┤
//!    └───────────────────► error-path ─────────┘   (http status only)
//! ```
//!
//! Every path ends in exactly one `success` or one error event.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tracing::{debug, trace};

use crate::applier::PatchApplier;
use crate::dispatch::{Dispatcher, RequestCallbacks};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::identifiers::{RequestId, SourceId};
use crate::parser::ResponseParser;
use crate::protocol::{ErrorEvent, ErrorKind, EventStatus, LifecycleEvent};
use crate::transport::RawResponse;

// ============================================================================
// ResponseState
// ============================================================================

/// Processing state of one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseState {
    /// Body received, nothing inspected yet.
    Received,
    /// Parsing attempted.
    Parsed,
    /// Failing; an error event will be raised.
    ErrorPath,
    /// Change-set applied.
    PatchApplied,
    /// Outcome raised to listeners.
    Dispatched,
    /// Done.
    Terminal,
}

impl ResponseState {
    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`] for a transition the state machine does not have.
    pub fn advance(self, next: Self) -> Result<Self> {
        use ResponseState::{Dispatched, ErrorPath, Parsed, PatchApplied, Received, Terminal};

        let legal = matches!(
            (self, next),
            (Received, Parsed | ErrorPath)
                | (Parsed, ErrorPath | PatchApplied)
                | (ErrorPath | PatchApplied, Dispatched)
                | (Dispatched, Terminal)
        );

        if legal {
            Ok(next)
        } else {
            Err(Error::protocol(format!(
                "illegal response transition {self} -> {next}"
            )))
        }
    }
}

impl fmt::Display for ResponseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => f.write_str("received"),
            Self::Parsed => f.write_str("parsed"),
            Self::ErrorPath => f.write_str("error-path"),
            Self::PatchApplied => f.write_str("patch-applied"),
            Self::Dispatched => f.write_str("dispatched"),
            Self::Terminal => f.write_str("terminal"),
        }
    }
}

// ============================================================================
// ResponseContext
// ============================================================================

/// Who a response belongs to.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    /// Triggering element.
    pub source: SourceId,
    /// Request id.
    pub request_id: RequestId,
    /// Request-scoped listeners.
    pub callbacks: RequestCallbacks,
}

impl ResponseContext {
    /// Creates a context with a fresh request id and no listeners.
    #[must_use]
    pub fn new(source: impl Into<SourceId>) -> Self {
        Self {
            source: source.into(),
            request_id: RequestId::generate(),
            callbacks: RequestCallbacks::default(),
        }
    }

    /// Sets the request-scoped listeners.
    #[inline]
    #[must_use]
    pub fn with_callbacks(mut self, callbacks: RequestCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }
}

// ============================================================================
// ProcessSummary
// ============================================================================

/// What processing a response produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Final state (always [`ResponseState::Terminal`] on return).
    pub state: ResponseState,
    /// Error kind raised, or `None` if `success` was raised.
    pub error: Option<ErrorKind>,
    /// Operations applied.
    pub applied: usize,
    /// Operations skipped as non-fatal.
    pub skipped: usize,
    /// New view-state token.
    pub view_state: Option<String>,
    /// Redirect target.
    pub redirect: Option<String>,
}

impl ProcessSummary {
    fn new() -> Self {
        Self {
            state: ResponseState::Received,
            error: None,
            applied: 0,
            skipped: 0,
            view_state: None,
            redirect: None,
        }
    }

    /// Returns `true` if `success` was raised.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

// ============================================================================
// ResponseProcessor
// ============================================================================

/// Parses, applies and reports one response.
#[derive(Debug)]
pub struct ResponseProcessor {
    parser: ResponseParser,
    applier: PatchApplier,
    dispatcher: Dispatcher,
}

impl ResponseProcessor {
    /// Creates a processor.
    #[must_use]
    pub fn new(parser: ResponseParser, applier: PatchApplier, dispatcher: Dispatcher) -> Self {
        Self {
            parser,
            applier,
            dispatcher,
        }
    }

    /// Returns the dispatcher.
    #[inline]
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Processes a finished exchange.
    ///
    /// Raises exactly one of `success` or an error event.
    pub fn process(
        &self,
        response: &RawResponse,
        context: &ResponseContext,
        document: &mut dyn Document,
    ) -> ProcessSummary {
        let mut summary = ProcessSummary::new();

        let outcome = self.run(response, context, document, &mut summary);
        if let Err(e) = outcome {
            // Only reachable if the transition table is missing an edge.
            debug!(error = %e, "Response pipeline violated its state machine");
            let event = ErrorEvent::new(
                ErrorKind::ClientError,
                e.to_string(),
                context.source.clone(),
                context.request_id,
            )
            .with_response(response.status, response.body.clone());
            self.raise_error(&mut summary, context, event);
        }
        summary
    }

    fn run(
        &self,
        response: &RawResponse,
        context: &ResponseContext,
        document: &mut dyn Document,
        summary: &mut ProcessSummary,
    ) -> Result<()> {
        let source = context.source.clone();
        let request_id = context.request_id;

        if !response.is_success() {
            summary.state = summary.state.advance(ResponseState::ErrorPath)?;
            let event = ErrorEvent::new(
                ErrorKind::HttpError,
                format!("HTTP status {}", response.status),
                source,
                request_id,
            )
            .with_response(response.status, response.body.clone());
            return self.finish_error(summary, context, event);
        }

        let parsed = self.parser.parse(&response.body);
        summary.state = summary.state.advance(ResponseState::Parsed)?;

        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(failure) => {
                summary.state = summary.state.advance(ResponseState::ErrorPath)?;
                let event =
                    ErrorEvent::new(ErrorKind::MalformedXml, failure.description, source, request_id)
                        .with_response(response.status, response.body.clone());
                return self.finish_error(summary, context, event);
            }
        };

        let outcome = match self.applier.apply(&parsed.changes, document) {
            Ok(outcome) => outcome,
            Err(e) => {
                summary.state = summary.state.advance(ResponseState::ErrorPath)?;
                let event = ErrorEvent::new(ErrorKind::ClientError, e.to_string(), source, request_id)
                    .with_response(response.status, response.body.clone())
                    .with_xml();
                return self.finish_error(summary, context, event);
            }
        };

        summary.applied = outcome.applied;
        summary.skipped = outcome.skipped.len();

        if let Some((name, message)) = outcome.server_error {
            summary.state = summary.state.advance(ResponseState::ErrorPath)?;
            let description = if message.is_empty() { name.clone() } else { message.clone() };
            let event = ErrorEvent::new(ErrorKind::ServerError, description, source, request_id)
                .with_response(response.status, response.body.clone())
                .with_xml()
                .with_server_error(name, message);
            return self.finish_error(summary, context, event);
        }

        summary.view_state = outcome.view_state;
        summary.redirect = outcome.redirect;
        summary.state = summary.state.advance(ResponseState::PatchApplied)?;

        let event = LifecycleEvent::new(EventStatus::Success, source, request_id)
            .with_response(response.status, response.body.clone());
        self.dispatcher.send_event(&context.callbacks, &event);
        trace!(%request_id, applied = summary.applied, "Response applied");

        summary.state = summary.state.advance(ResponseState::Dispatched)?;
        summary.state = summary.state.advance(ResponseState::Terminal)?;
        Ok(())
    }

    fn finish_error(
        &self,
        summary: &mut ProcessSummary,
        context: &ResponseContext,
        event: ErrorEvent,
    ) -> Result<()> {
        self.raise_error(summary, context, event);
        summary.state = summary.state.advance(ResponseState::Dispatched)?;
        summary.state = summary.state.advance(ResponseState::Terminal)?;
        Ok(())
    }

    fn raise_error(
        &self,
        summary: &mut ProcessSummary,
        context: &ResponseContext,
        event: ErrorEvent,
    ) {
        debug!(
            request_id = %event.request_id,
            status = %event.status,
            description = %event.description,
            "Response failed"
        );
        summary.error = Some(event.status);
        self.dispatcher.send_error(&context.callbacks, &event);
    }
}

// ============================================================================
// Tests
// ============================================================================
