//! Transport layer.
//!
//! A transport sends one [`AjaxRequest`] and reports its progress as a
//! normalized stage sequence, regardless of how much the underlying
//! mechanism can observe.
//!
//! # Stage Sequence
//!
//! ```text
//! opened ──► headers-received ──► loading* ──► done
//!    │                                          ▲
//!    └──────── (coarse transports) ─────────────┘
//!
//! any stage ──► timeout | failed | aborted   (terminal)
//! ```
//!
//! `opened` is always reported first and exactly one terminal signal is
//! always reported last. A [`TransportKind::Buffered`] transport skips the
//! intermediate stages.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `adapter` | Stage normalization, timeout and abort |
//! | `http` | `reqwest` POST exchange |

// ============================================================================
// Submodules
// ============================================================================

/// Stage normalization, timeout and abort.
pub mod adapter;

/// HTTP exchange backed by `reqwest`.
pub mod http;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::AjaxRequest;

// ============================================================================
// Re-exports
// ============================================================================

pub use adapter::{StageReporter, TransportAdapter, TransportHandle};
pub use http::HttpExchange;

// ============================================================================
// Stage
// ============================================================================

/// Transport progress stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Request sent.
    Opened,
    /// Status line and headers received.
    HeadersReceived,
    /// Body bytes arriving.
    Loading,
    /// Exchange finished.
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opened => f.write_str("opened"),
            Self::HeadersReceived => f.write_str("headers-received"),
            Self::Loading => f.write_str("loading"),
            Self::Done => f.write_str("done"),
        }
    }
}

// ============================================================================
// TransportEvent
// ============================================================================

/// One stage transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    /// Stage reached.
    pub stage: Stage,
    /// HTTP status, once known.
    pub status: Option<u16>,
    /// Response body, only on [`Stage::Done`].
    pub body: Option<String>,
    /// Response content type, only on [`Stage::Done`].
    pub content_type: Option<String>,
    /// Advisory percent complete.
    pub progress: Option<u8>,
}

impl TransportEvent {
    /// Creates an event with no payload.
    #[inline]
    #[must_use]
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            status: None,
            body: None,
            content_type: None,
            progress: None,
        }
    }

    /// Creates the terminal event for a finished exchange.
    #[must_use]
    pub fn done(response: RawResponse) -> Self {
        Self {
            stage: Stage::Done,
            status: Some(response.status),
            body: Some(response.body),
            content_type: response.content_type,
            progress: Some(100),
        }
    }

    /// Returns the response, if this is the terminal event.
    #[must_use]
    pub fn into_response(self) -> Option<RawResponse> {
        if self.stage != Stage::Done {
            return None;
        }
        Some(RawResponse {
            status: self.status.unwrap_or_default(),
            body: self.body.unwrap_or_default(),
            content_type: self.content_type,
        })
    }
}

// ============================================================================
// TransportSignal
// ============================================================================

/// Item of a transport event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    /// Stage transition.
    Stage(TransportEvent),
    /// Deadline elapsed before `done`.
    Timeout {
        /// Configured deadline in milliseconds.
        timeout_ms: u64,
    },
    /// Exchange failed before `done`.
    Failed {
        /// Failure description.
        message: String,
    },
    /// Exchange was aborted locally.
    Aborted,
}

impl TransportSignal {
    /// Returns `true` if no further signal follows this one.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Stage(event) => event.stage == Stage::Done,
            Self::Timeout { .. } | Self::Failed { .. } | Self::Aborted => true,
        }
    }
}

// ============================================================================
// RawResponse
// ============================================================================

/// A completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body text.
    pub body: String,
    /// `Content-Type` header value.
    pub content_type: Option<String>,
}

impl RawResponse {
    /// Creates a response.
    #[inline]
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            content_type: None,
        }
    }

    /// Returns `true` for a 2xx status.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ============================================================================
// TransportKind
// ============================================================================

/// Capability level of the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportKind {
    /// Reports every stage as it is observed.
    #[default]
    Streaming,
    /// Reports only `opened` and `done`.
    Buffered,
}

// ============================================================================
// Exchange
// ============================================================================

/// One concrete request mechanism.
///
/// Implementations perform the exchange and report intermediate stages
/// through the [`StageReporter`]. `opened`, `done`, timeout and abort are
/// handled by [`TransportAdapter`].
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Performs the exchange.
    ///
    /// # Errors
    ///
    /// Any error is reported as a transport failure.
    async fn exchange(
        &self,
        request: &AjaxRequest,
        reporter: &mut StageReporter,
    ) -> Result<RawResponse>;
}

// ============================================================================
// Tests
// ============================================================================
