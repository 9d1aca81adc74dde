//! Sequenced event handlers.
//!
//! A component often carries several handlers for one event, for example
//! a user `onclick` followed by an ajax behavior. [`chain`] runs them in
//! order and stops at the first one that returns `false`.

// ============================================================================
// Imports
// ============================================================================

use tracing::trace;

use crate::identifiers::SourceId;
use crate::protocol::TriggerEvent;

// ============================================================================
// Types
// ============================================================================

/// One step of a chain.
pub type ChainStep<'a> = Box<dyn FnOnce(&SourceId, Option<&TriggerEvent>) -> bool + 'a>;

// ============================================================================
// chain
// ============================================================================

/// Runs `steps` in order.
///
/// Returns `false` as soon as a step returns `false`; later steps do not
/// run. An empty chain returns `true`.
pub fn chain<'a>(
    source: &SourceId,
    event: Option<&TriggerEvent>,
    steps: impl IntoIterator<Item = ChainStep<'a>>,
) -> bool {
    for (index, step) in steps.into_iter().enumerate() {
        if !step(source, event) {
            trace!(source = %source, step = index, "Chain short-circuited");
            return false;
        }
    }
    true
}

// ============================================================================
// Tests
// ============================================================================
