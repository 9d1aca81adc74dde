//! Lifecycle and error event types.
//!
//! Events are delivered to request-scoped and process-wide listeners.
//! Both serialize to the outward event shape:
//!
//! ```json
//! { "type": "event", "status": "begin", "source": "save", ... }
//! { "type": "error", "status": "serverError", "serverErrorName": "E1", ... }
//! ```
//!
//! # Event Status
//!
//! | Status | Raised |
//! |--------|--------|
//! | `begin` | immediately before the transport send |
//! | `complete` | when the transport reaches `done` |
//! | `success` | after the change-set has been fully applied |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::identifiers::{RequestId, SourceId};

// ============================================================================
// EventStatus
// ============================================================================

/// Lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventStatus {
    /// Request is about to be sent.
    Begin,
    /// Transport reached `done`.
    Complete,
    /// Response applied.
    Success,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Begin => f.write_str("begin"),
            Self::Complete => f.write_str("complete"),
            Self::Success => f.write_str("success"),
        }
    }
}

// ============================================================================
// LifecycleEvent
// ============================================================================

/// Lifecycle notification for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    /// Always `"event"`.
    #[serde(rename = "type")]
    pub event_type: &'static str,
    /// Lifecycle status.
    pub status: EventStatus,
    /// Triggering element.
    pub source: SourceId,
    /// Request the event belongs to.
    pub request_id: RequestId,
    /// HTTP status, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_code: Option<u16>,
    /// Raw response text, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,
}

impl LifecycleEvent {
    /// Creates a lifecycle event without response data.
    #[inline]
    #[must_use]
    pub fn new(status: EventStatus, source: SourceId, request_id: RequestId) -> Self {
        Self {
            event_type: "event",
            status,
            source,
            request_id,
            response_code: None,
            response_text: None,
        }
    }

    /// Attaches response data.
    #[inline]
    #[must_use]
    pub fn with_response(mut self, code: u16, text: impl Into<String>) -> Self {
        self.response_code = Some(code);
        self.response_text = Some(text.into());
        self
    }

    /// Serializes to the outward JSON shape.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

// ============================================================================
// ErrorKind
// ============================================================================

/// Error event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Transport status outside the success range, timeout or transport failure.
    #[serde(rename = "httpError")]
    HttpError,
    /// Response carried an `error` container.
    #[serde(rename = "serverError")]
    ServerError,
    /// Response could not be parsed.
    #[serde(rename = "malformedXML")]
    MalformedXml,
    /// Response could not be applied on the client.
    #[serde(rename = "clientError")]
    ClientError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HttpError => f.write_str("httpError"),
            Self::ServerError => f.write_str("serverError"),
            Self::MalformedXml => f.write_str("malformedXML"),
            Self::ClientError => f.write_str("clientError"),
        }
    }
}

// ============================================================================
// ErrorEvent
// ============================================================================

/// Error notification for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    /// Always `"error"`.
    #[serde(rename = "type")]
    pub event_type: &'static str,
    /// Error kind.
    pub status: ErrorKind,
    /// Human readable description.
    pub description: String,
    /// Error name reported by the server.
    pub server_error_name: Option<String>,
    /// Error message reported by the server.
    pub server_error_message: Option<String>,
    /// Triggering element.
    pub source: SourceId,
    /// Request the error belongs to.
    pub request_id: RequestId,
    /// HTTP status, 0 when the transport never produced one.
    pub response_code: u16,
    /// Raw response text.
    pub response_text: Option<String>,
    /// Raw response text, when it parsed as a structured payload.
    #[serde(rename = "responseXML")]
    pub response_xml: Option<String>,
}

impl ErrorEvent {
    /// Creates an error event with no response data.
    #[must_use]
    pub fn new(
        status: ErrorKind,
        description: impl Into<String>,
        source: SourceId,
        request_id: RequestId,
    ) -> Self {
        Self {
            event_type: "error",
            status,
            description: description.into(),
            server_error_name: None,
            server_error_message: None,
            source,
            request_id,
            response_code: 0,
            response_text: None,
            response_xml: None,
        }
    }

    /// Attaches the raw response.
    #[inline]
    #[must_use]
    pub fn with_response(mut self, code: u16, text: impl Into<String>) -> Self {
        self.response_code = code;
        self.response_text = Some(text.into());
        self
    }

    /// Marks the raw response as structurally parsed.
    #[inline]
    #[must_use]
    pub fn with_xml(mut self) -> Self {
        self.response_xml = self.response_text.clone();
        self
    }

    /// Attaches the server-reported name and message.
    #[inline]
    #[must_use]
    pub fn with_server_error(mut self, name: impl Into<String>, message: impl Into<String>) -> Self {
        self.server_error_name = Some(name.into());
        self.server_error_message = Some(message.into());
        self
    }

    /// Serializes to the outward JSON shape.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_event_shape() {
        let id = RequestId::generate();
        let event = LifecycleEvent::new(EventStatus::Complete, SourceId::from("save"), id)
            .with_response(200, "<partial-response/>");
        let value = event.to_value().expect("serialize");

        assert_eq!(value["type"], "event");
        assert_eq!(value["status"], "complete");
        assert_eq!(value["source"], "save");
        assert_eq!(value["responseCode"], 200);
    }

    #[test]
    fn test_begin_event_omits_response() {
        let event =
            LifecycleEvent::new(EventStatus::Begin, SourceId::from("save"), RequestId::generate());
        let value = event.to_value().expect("serialize");
        assert!(value.get("responseCode").is_none());
    }

    #[test]
    fn test_error_event_shape() {
        let event = ErrorEvent::new(
            ErrorKind::ServerError,
            "server reported an error",
            SourceId::from("save"),
            RequestId::generate(),
        )
        .with_response(200, "<partial-response/>")
        .with_xml()
        .with_server_error("E1", "boom");
        let value = event.to_value().expect("serialize");

        assert_eq!(value["type"], "error");
        assert_eq!(value["status"], "serverError");
        assert_eq!(value["serverErrorName"], "E1");
        assert_eq!(value["serverErrorMessage"], "boom");
        assert_eq!(value["responseXML"], "<partial-response/>");
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::MalformedXml.to_string(), "malformedXML");
        assert_eq!(ErrorKind::HttpError.to_string(), "httpError");
    }
}
