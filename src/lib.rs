//! Partial Ajax - client-side engine for the partial-response ajax protocol.
//!
//! This library issues partial-page requests to a server, keeps them in a
//! single-flight queue, parses the `partial-response` payload the server
//! returns and applies the resulting change-set to a document.
//!
//! # Architecture
//!
//! The engine follows an actor model:
//!
//! - **Handle ([`Engine`])**: Cheap, cloneable; sends commands to the loop
//! - **Loop**: One tokio task owns the queue, the document, the in-flight
//!   transport handle and delay timers
//!
//! Key design principles:
//!
//! - At most one request is on the wire at any time (FIFO, single-flight)
//! - Operations of one response apply in payload order, without yielding
//! - Exactly one of `success` or an error event per request (none on abort)
//! - Parse strategies are an ordered list; the first success wins
//!
//! # Quick Start
//!
//! ```no_run
//! use partial_ajax::{Engine, RequestOptions, Result, TriggerEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let engine = Engine::builder()
//!         .endpoint("http://localhost:8080/app/page.xhtml")
//!         .queue_size(5)
//!         .build()?;
//!
//!     engine.add_on_event(|event| println!("{} {}", event.source, event.status));
//!
//!     let change = TriggerEvent::new("change");
//!     engine.request(
//!         "form:country",
//!         Some(&change),
//!         RequestOptions::new().execute("@this").render("form:cities"),
//!     )?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`engine`] | [`Engine`] handle, builder, configuration, response pipeline |
//! | [`queue`] | Single-flight request queue with delay and backpressure |
//! | [`transport`] | Exchange seam, stage normalization, HTTP exchange |
//! | [`parser`] | `partial-response` parsing with strategy fallback |
//! | [`applier`] | Applies change-sets to a [`Document`] |
//! | [`document`] | Document mutation surface and in-memory document |
//! | [`markup`] | HTML fragment parsing and script collection |
//! | [`dispatch`] | Lifecycle and error listeners |
//! | [`protocol`] | Request, change-set and event types |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |

// ============================================================================
// Modules
// ============================================================================

/// Change-set application.
///
/// Applies operations to a [`Document`] in payload order.
pub mod applier;

/// Listener registries and event dispatch.
pub mod dispatch;

/// Document mutation surface.
///
/// - [`Document`] - Trait the applier mutates through
/// - [`MemoryDocument`] - `kuchiki`-backed in-memory implementation
pub mod document;

/// Engine handle and event loop.
///
/// Use [`Engine::builder()`] to create a configured engine.
pub mod engine;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// HTML fragment parsing, serialization and script collection.
pub mod markup;

/// Response parsing.
pub mod parser;

/// Protocol types: requests, change-sets, events.
pub mod protocol;

/// Single-flight request queue.
pub mod queue;

/// Transport layer.
///
/// Normalizes exchanges into a fixed stage sequence.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Engine types
pub use engine::{
    ChainStep, Engine, EngineBuilder, EngineConfig, ProcessSummary, QueueStatus,
    ResponseContext, ResponseState, chain,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{RequestId, SourceId};

// Protocol types
pub use protocol::{
    ChangeSet, ErrorEvent, ErrorKind, EventStatus, InsertPosition, LifecycleEvent, Operation,
    RequestOptions, ReservedIds, TriggerEvent,
};

// Document types
pub use document::{Document, MemoryDocument};

// Transport types
pub use transport::{Exchange, HttpExchange, RawResponse, TransportKind};

// Dispatch types
pub use dispatch::RequestCallbacks;
