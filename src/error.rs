//! Error types for the partial-response engine.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use partial_ajax::{Engine, RequestOptions, Result};
//!
//! async fn example(engine: &Engine) -> Result<()> {
//!     engine.request("saveButton", None, RequestOptions::new().render("form"))?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidArgument`] |
//! | Transport | [`Error::Transport`], [`Error::RequestTimeout`], [`Error::EngineClosed`] |
//! | Response | [`Error::MalformedResponse`], [`Error::Structural`], [`Error::Protocol`] |
//! | Document | [`Error::ElementNotFound`], [`Error::AnchorNotFound`], [`Error::ScriptError`] |
//! | External | [`Error::Http`], [`Error::Url`], [`Error::Json`], [`Error::ChannelClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;

use crate::identifiers::RequestId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when engine configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument passed to a public operation.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Transport-level failure (connection refused, reset, body read error).
    #[error("Transport failed: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// Request did not reach the `done` stage before its deadline.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The engine event loop is no longer running.
    #[error("Engine closed")]
    EngineClosed,

    // ========================================================================
    // Response Errors
    // ========================================================================
    /// Payload could not be parsed by any strategy.
    #[error("Malformed response: {message}")]
    MalformedResponse {
        /// Description of the parse failure.
        message: String,
    },

    /// Payload parsed but is internally inconsistent.
    ///
    /// `operation` names the faulty operation (usually its element id).
    #[error("Structural error in {operation}: {message}")]
    Structural {
        /// Identifier of the faulty operation.
        operation: String,
        /// Description of the inconsistency.
        message: String,
    },

    /// Protocol violation, such as an illegal response state transition.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Document Errors
    // ========================================================================
    /// No element with the given id exists in the document.
    #[error("Element not found: {id}")]
    ElementNotFound {
        /// The missing element id.
        id: String,
    },

    /// Insert anchor could not be resolved.
    #[error("Insert anchor not found: {anchor} (inserting {operation})")]
    AnchorNotFound {
        /// The anchor id that was missing.
        anchor: String,
        /// Identifier of the insert operation.
        operation: String,
    },

    /// Script evaluation failed in the host document.
    #[error("Script error: {message}")]
    ScriptError {
        /// Error message from script execution.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }

    /// Creates a malformed response error.
    #[inline]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Creates a structural error.
    #[inline]
    pub fn structural(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Structural {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an element not found error.
    #[inline]
    pub fn element_not_found(id: impl Into<String>) -> Self {
        Self::ElementNotFound { id: id.into() }
    }

    /// Creates an anchor not found error.
    #[inline]
    pub fn anchor_not_found(anchor: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::AnchorNotFound {
            anchor: anchor.into(),
            operation: operation.into(),
        }
    }

    /// Creates a script error.
    #[inline]
    pub fn script_error(message: impl Into<String>) -> Self {
        Self::ScriptError {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. })
    }

    /// Returns `true` if this error originates in the transport layer.
    #[inline]
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::RequestTimeout { .. } | Self::Http(_)
        )
    }

    /// Returns `true` if a well-formed payload describes an invalid
    /// operation.
    #[inline]
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Structural { .. })
    }

    /// Returns `true` if the response payload itself was at fault.
    #[inline]
    #[must_use]
    pub fn is_response_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedResponse { .. } | Self::Structural { .. }
        )
    }

    /// Returns `true` if this error should not stop processing of the
    /// remaining operations in a change-set.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ElementNotFound { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
