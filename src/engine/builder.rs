//! Builder pattern for engine configuration.
//!
//! Provides a fluent API for configuring and starting an [`Engine`].
//!
//! # Example
//!
//! ```no_run
//! use partial_ajax::Engine;
//!
//! # async fn example() -> partial_ajax::Result<()> {
//! let engine = Engine::builder()
//!     .endpoint("http://localhost:8080/app/page.xhtml")
//!     .queue_size(5)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use url::Url;

use crate::applier::PatchApplier;
use crate::dispatch::{Dispatcher, Listeners};
use crate::document::{Document, MemoryDocument};
use crate::error::{Error, Result};
use crate::parser::ResponseParser;
use crate::protocol::ReservedIds;
use crate::transport::{Exchange, HttpExchange, TransportAdapter, TransportKind};

use super::config::EngineConfig;
use super::core::Engine;
use super::response::ResponseProcessor;

// ============================================================================
// EngineBuilder
// ============================================================================

/// Builder for configuring an [`Engine`].
///
/// Use [`Engine::builder()`] to create a new builder.
#[derive(Default)]
pub struct EngineBuilder {
    /// Settings.
    config: EngineConfig,
    /// Endpoint as given, parsed in `build`.
    endpoint: Option<String>,
    /// Exchange; defaults to [`HttpExchange`].
    exchange: Option<Arc<dyn Exchange>>,
    /// Document; defaults to an empty [`MemoryDocument`].
    document: Option<Box<dyn Document>>,
    /// Parser; defaults to the structured strategy with section fallback.
    parser: Option<ResponseParser>,
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("endpoint", &self.endpoint)
            .field("has_exchange", &self.exchange.is_some())
            .field("has_document", &self.document.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// EngineBuilder Implementation
// ============================================================================

impl EngineBuilder {
    /// Creates a new builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the endpoint requests are posted to.
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute http(s) URL of the page
    #[inline]
    #[must_use]
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    /// Replaces every setting with `config`.
    ///
    /// An endpoint set with [`endpoint`](Self::endpoint) still takes
    /// precedence.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the transport capability level.
    #[inline]
    #[must_use]
    pub fn transport(mut self, kind: TransportKind) -> Self {
        self.config.transport = kind;
        self
    }

    /// Sets the default per-request timeout. Zero disables it.
    #[inline]
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Caps the number of pending requests.
    #[inline]
    #[must_use]
    pub fn queue_size(mut self, size: usize) -> Self {
        self.config.queue_size = Some(size);
        self
    }

    /// Sets the initial view-state token.
    #[inline]
    #[must_use]
    pub fn view_state(mut self, token: impl Into<String>) -> Self {
        self.config.view_state = Some(token.into());
        self
    }

    /// Sets the reserved update targets.
    #[inline]
    #[must_use]
    pub fn reserved_ids(mut self, reserved: ReservedIds) -> Self {
        self.config.reserved = reserved;
        self
    }

    /// Sets the exchange requests go through.
    #[must_use]
    pub fn exchange(mut self, exchange: impl Exchange + 'static) -> Self {
        self.exchange = Some(Arc::new(exchange));
        self
    }

    /// Sets the document responses are applied to.
    #[must_use]
    pub fn document(mut self, document: impl Document + 'static) -> Self {
        self.document = Some(Box::new(document));
        self
    }

    /// Sets the response parser.
    #[must_use]
    pub fn parser(mut self, parser: ResponseParser) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Validates the configuration and starts the engine.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the endpoint is missing or unparsable
    /// - [`Error::Config`] if called outside a tokio runtime
    /// - [`Error::Http`] if the default HTTP client cannot be created
    pub fn build(mut self) -> Result<Engine> {
        let runtime = Self::validate_runtime()?;
        self.resolve_endpoint()?;
        let endpoint = self.config.validate()?.clone();

        let exchange: Arc<dyn Exchange> = match self.exchange {
            Some(exchange) => exchange,
            None => Arc::new(HttpExchange::new()?),
        };
        let document = self
            .document
            .unwrap_or_else(|| Box::new(MemoryDocument::new()));
        let parser = self
            .parser
            .unwrap_or_else(|| ResponseParser::new(self.config.reserved.clone()));

        let processor = ResponseProcessor::new(
            parser,
            PatchApplier::new(self.config.reserved.clone()),
            Dispatcher::new(Arc::new(Listeners::new())),
        );
        let adapter = TransportAdapter::new(exchange, self.config.transport);

        Ok(Engine::spawn(
            &runtime,
            endpoint,
            self.config,
            adapter,
            document,
            processor,
        ))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl EngineBuilder {
    /// Parses the endpoint string into the configuration.
    fn resolve_endpoint(&mut self) -> Result<()> {
        let Some(ref raw) = self.endpoint else {
            return Ok(());
        };

        let url = Url::parse(raw)
            .map_err(|e| Error::config(format!("Invalid endpoint '{raw}': {e}")))?;
        self.config.endpoint = Some(url);
        Ok(())
    }

    /// Returns the current tokio runtime.
    fn validate_runtime() -> Result<Handle> {
        Handle::try_current().map_err(|_| {
            Error::config("Engine must be built from within a tokio runtime")
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
