//! Engine configuration.
//!
//! # Example
//!
//! ```ignore
//! use partial_ajax::{EngineConfig, TransportKind};
//!
//! let config = EngineConfig::new()
//!     .with_transport(TransportKind::Buffered)
//!     .with_timeout(Duration::from_secs(10))
//!     .with_queue_size(3);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::protocol::ReservedIds;
use crate::transport::TransportKind;

// ============================================================================
// EngineConfig
// ============================================================================

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Endpoint every request is posted to.
    pub endpoint: Option<Url>,

    /// Transport capability level.
    pub transport: TransportKind,

    /// Default per-request timeout. Zero disables the deadline.
    pub timeout: Duration,

    /// Maximum pending requests. `None` is unbounded.
    pub queue_size: Option<usize>,

    /// Reserved update targets.
    pub reserved: ReservedIds,

    /// View-state token sent until the server issues a new one.
    pub view_state: Option<String>,
}

// ============================================================================
// Constructors
// ============================================================================

impl EngineConfig {
    /// Creates a configuration with default settings.
    ///
    /// No endpoint, streaming transport, no timeout, unbounded queue.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            endpoint: None,
            transport: TransportKind::Streaming,
            timeout: Duration::ZERO,
            queue_size: None,
            reserved: ReservedIds::default(),
            view_state: None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl EngineConfig {
    /// Sets the endpoint.
    #[inline]
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Sets the transport capability level.
    #[inline]
    #[must_use]
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// Sets the default per-request timeout.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Caps the number of pending requests.
    #[inline]
    #[must_use]
    pub fn with_queue_size(mut self, size: usize) -> Self {
        self.queue_size = Some(size);
        self
    }

    /// Removes the pending request cap.
    #[inline]
    #[must_use]
    pub fn with_unbounded_queue(mut self) -> Self {
        self.queue_size = None;
        self
    }

    /// Sets the reserved update targets.
    #[inline]
    #[must_use]
    pub fn with_reserved_ids(mut self, reserved: ReservedIds) -> Self {
        self.reserved = reserved;
        self
    }

    /// Sets the initial view-state token.
    #[inline]
    #[must_use]
    pub fn with_view_state(mut self, token: impl Into<String>) -> Self {
        self.view_state = Some(token.into());
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl EngineConfig {
    /// Validates the configuration and returns the endpoint.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the endpoint is missing or not http(s), or if a
    /// reserved id is empty.
    pub fn validate(&self) -> Result<&Url> {
        let endpoint = self.endpoint.as_ref().ok_or_else(|| {
            Error::config(
                "Endpoint is required. Use .endpoint() to set it.\n\
                 Example: Engine::builder().endpoint(\"http://localhost:8080/app/page.xhtml\")",
            )
        })?;

        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "Endpoint must be http or https, got: {endpoint}"
            )));
        }

        let reserved = &self.reserved;
        if [&reserved.head, &reserved.body, &reserved.root, &reserved.view_state]
            .iter()
            .any(|id| id.is_empty())
        {
            return Err(Error::config("Reserved ids must not be empty"));
        }

        Ok(endpoint)
    }
}

// ============================================================================
// Tests
// ============================================================================
