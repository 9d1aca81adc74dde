//! Wire and event types.
//!
//! This module defines the outbound request format, the change-set parsed
//! from a partial response, and the events delivered to listeners.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `AjaxRequest` | Client → Server | Form-encoded partial request |
//! | `ChangeSet` | Server → Client | Parsed `partial-response` payload |
//! | `LifecycleEvent` | Engine → Listener | begin / complete / success |
//! | `ErrorEvent` | Engine → Listener | typed failure |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `change` | Change-set operations and reserved ids |
//! | `event` | Lifecycle and error events |
//! | `request` | Request options and encoding |

// ============================================================================
// Submodules
// ============================================================================

/// Change-set operations.
pub mod change;

/// Lifecycle and error events.
pub mod event;

/// Request options and encoding.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use change::{ChangeSet, InsertPosition, Operation, ReservedIds, UpdateTarget};
pub use event::{ErrorEvent, ErrorKind, EventStatus, LifecycleEvent};
pub use request::{AjaxRequest, RequestOptions, TriggerEvent, keywords, params};
