//! Event and error dispatch.
//!
//! Two listener lists receive every event: the request-scoped callbacks
//! passed with [`RequestOptions`](crate::RequestOptions), and the
//! process-wide [`Listeners`] registry owned by the engine.
//!
//! # Ordering
//!
//! The request-scoped listener is always invoked first, then process-wide
//! listeners in registration order. Listeners may rely on this, e.g. to
//! snapshot view state before a global handler re-renders.
//!
//! A panicking listener is logged and skipped; it never unwinds into the
//! engine loop.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, trace, warn};

use crate::protocol::{ErrorEvent, LifecycleEvent};

// ============================================================================
// Types
// ============================================================================

/// Lifecycle listener callback.
pub type EventListener = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Error listener callback.
pub type ErrorListener = Arc<dyn Fn(&ErrorEvent) + Send + Sync>;

// ============================================================================
// RequestCallbacks
// ============================================================================

/// Listeners scoped to a single request.
#[derive(Clone, Default)]
pub struct RequestCallbacks {
    /// Lifecycle listener.
    pub on_event: Option<EventListener>,
    /// Error listener.
    pub on_error: Option<ErrorListener>,
}

impl fmt::Debug for RequestCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCallbacks")
            .field("on_event", &self.on_event.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

// ============================================================================
// Listeners
// ============================================================================

/// Process-wide listener registry.
///
/// Shared between every [`Engine`](crate::Engine) handle and the engine loop.
#[derive(Default)]
pub struct Listeners {
    events: RwLock<Vec<EventListener>>,
    errors: RwLock<Vec<ErrorListener>>,
}

impl Listeners {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a lifecycle listener.
    pub fn add_on_event(&self, listener: EventListener) {
        self.events.write().push(listener);
    }

    /// Registers an error listener.
    pub fn add_on_error(&self, listener: ErrorListener) {
        self.errors.write().push(listener);
    }

    /// Returns the number of registered lifecycle listeners.
    #[inline]
    #[must_use]
    pub fn event_listener_count(&self) -> usize {
        self.events.read().len()
    }

    /// Returns the number of registered error listeners.
    #[inline]
    #[must_use]
    pub fn error_listener_count(&self) -> usize {
        self.errors.read().len()
    }

    // Snapshots release the lock before any listener runs, so a listener
    // may register further listeners.
    fn event_snapshot(&self) -> Vec<EventListener> {
        self.events.read().clone()
    }

    fn error_snapshot(&self) -> Vec<ErrorListener> {
        self.errors.read().clone()
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("events", &self.event_listener_count())
            .field("errors", &self.error_listener_count())
            .finish()
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Raises events to request-scoped and process-wide listeners.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    global: Arc<Listeners>,
}

impl Dispatcher {
    /// Creates a dispatcher over a process-wide registry.
    #[inline]
    #[must_use]
    pub fn new(global: Arc<Listeners>) -> Self {
        Self { global }
    }

    /// Returns the process-wide registry.
    #[inline]
    #[must_use]
    pub fn listeners(&self) -> &Arc<Listeners> {
        &self.global
    }

    /// Raises a lifecycle event.
    pub fn send_event(&self, local: &RequestCallbacks, event: &LifecycleEvent) {
        trace!(
            request_id = %event.request_id,
            status = %event.status,
            "Dispatching lifecycle event"
        );

        if let Some(ref listener) = local.on_event {
            invoke("onevent", || listener(event));
        }
        for listener in self.global.event_snapshot() {
            invoke("onevent", || listener(event));
        }
    }

    /// Raises an error event.
    ///
    /// With no listener registered at either level, the error is logged.
    pub fn send_error(&self, local: &RequestCallbacks, event: &ErrorEvent) {
        let global = self.global.error_snapshot();

        if local.on_error.is_none() && global.is_empty() {
            error!(
                request_id = %event.request_id,
                source = %event.source,
                status = %event.status,
                description = %event.description,
                server_error_name = ?event.server_error_name,
                "Unhandled ajax error"
            );
            return;
        }

        if let Some(ref listener) = local.on_error {
            invoke("onerror", || listener(event));
        }
        for listener in global {
            invoke("onerror", || listener(event));
        }
    }
}

/// Runs a listener, containing any panic.
fn invoke(kind: &str, call: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(call)).is_err() {
        warn!(listener = kind, "Listener panicked");
    }
}

// ============================================================================
// Tests
// ============================================================================
