//! Ajax engine.
//!
//! Ties the queue, transport, parser, applier and dispatcher together
//! behind the [`Engine`] handle.
//!
//! # Example
//!
//! ```no_run
//! use partial_ajax::{Engine, RequestOptions, TriggerEvent};
//!
//! # async fn example() -> partial_ajax::Result<()> {
//! let engine = Engine::builder()
//!     .endpoint("http://localhost:8080/app/page.xhtml")
//!     .build()?;
//!
//! engine.add_on_error(|event| eprintln!("{}: {}", event.status, event.description));
//!
//! let click = TriggerEvent::new("click");
//! engine.request(
//!     "form:save",
//!     Some(&click),
//!     RequestOptions::new().execute("@form").render("form:messages"),
//! )?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Engine builder.
pub mod builder;

/// Handler chaining.
pub mod chain;

/// Engine configuration.
pub mod config;

/// Engine handle and event loop.
pub mod core;

/// Response pipeline.
pub mod response;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::EngineBuilder;
pub use chain::{ChainStep, chain};
pub use config::EngineConfig;
pub use core::{Engine, QueueStatus};
pub use response::{ProcessSummary, ResponseContext, ResponseProcessor, ResponseState};
