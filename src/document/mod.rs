//! Document mutation surface.
//!
//! The engine never touches a concrete document model. Everything it needs
//! is expressed by the [`Document`] trait: element lookup by id,
//! replacement, adjacent insertion, removal, attribute mutation, script
//! execution and navigation.
//!
//! Markup is handed over as an HTML fragment; each implementation
//! materializes it in its own node model. Scripts are collected from
//! incoming markup by the applier and run through [`Document::run_script`]
//! / [`Document::load_script`]; implementations must not execute
//! `<script>` elements they materialize.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `memory` | `kuchiki`-backed in-memory document |

// ============================================================================
// Submodules
// ============================================================================

/// `kuchiki`-backed in-memory document.
pub mod memory;

// ============================================================================
// Imports
// ============================================================================

use tracing::debug;

use crate::error::Result;
use crate::protocol::InsertPosition;

// ============================================================================
// Re-exports
// ============================================================================

pub use memory::{MemoryDocument, ScriptHook};

// ============================================================================
// Document
// ============================================================================

/// A mutable document addressed by element id.
pub trait Document: Send {
    /// Returns `true` if an element with this id is attached.
    fn contains(&self, id: &str) -> bool;

    /// Replaces the element itself with `markup`.
    ///
    /// # Errors
    ///
    /// [`Error::ElementNotFound`](crate::Error::ElementNotFound) if `id` is
    /// not attached.
    fn replace_element(&mut self, id: &str, markup: &str) -> Result<()>;

    /// Replaces the element's children with `markup`.
    ///
    /// # Errors
    ///
    /// [`Error::ElementNotFound`](crate::Error::ElementNotFound) if `id` is
    /// not attached.
    fn replace_content(&mut self, id: &str, markup: &str) -> Result<()>;

    /// Inserts the nodes of `markup` as siblings immediately before or
    /// after `anchor`, preserving their order.
    ///
    /// # Errors
    ///
    /// [`Error::ElementNotFound`](crate::Error::ElementNotFound) if `anchor`
    /// is not attached.
    fn insert_adjacent(
        &mut self,
        anchor: &str,
        position: InsertPosition,
        markup: &str,
    ) -> Result<()>;

    /// Removes the element. Returns `false` if it was not attached.
    fn remove(&mut self, id: &str) -> bool;

    /// Sets one attribute.
    ///
    /// # Errors
    ///
    /// [`Error::ElementNotFound`](crate::Error::ElementNotFound) if `id` is
    /// not attached.
    fn set_attribute(&mut self, id: &str, name: &str, value: &str) -> Result<()>;

    /// Discards the head's children and installs `markup`.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn replace_head(&mut self, attrs: &[(String, String)], markup: &str) -> Result<()>;

    /// Discards the body's children and installs `markup`.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn replace_body(&mut self, attrs: &[(String, String)], markup: &str) -> Result<()>;

    /// Executes script in global scope.
    ///
    /// # Errors
    ///
    /// [`Error::ScriptError`](crate::Error::ScriptError) if evaluation fails.
    fn run_script(&mut self, code: &str) -> Result<()>;

    /// Loads and executes an external script.
    ///
    /// # Errors
    ///
    /// [`Error::ScriptError`](crate::Error::ScriptError) if loading fails.
    fn load_script(&mut self, src: &str) -> Result<()> {
        debug!(src, "External script ignored by document");
        Ok(())
    }

    /// Navigates away from the current document.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn navigate(&mut self, url: &str) -> Result<()>;

    /// Receives a new view-state token.
    fn update_view_state(&mut self, _token: &str) {}
}

impl<D: Document + ?Sized> Document for Box<D> {
    fn contains(&self, id: &str) -> bool {
        (**self).contains(id)
    }

    fn replace_element(&mut self, id: &str, markup: &str) -> Result<()> {
        (**self).replace_element(id, markup)
    }

    fn replace_content(&mut self, id: &str, markup: &str) -> Result<()> {
        (**self).replace_content(id, markup)
    }

    fn insert_adjacent(
        &mut self,
        anchor: &str,
        position: InsertPosition,
        markup: &str,
    ) -> Result<()> {
        (**self).insert_adjacent(anchor, position, markup)
    }

    fn remove(&mut self, id: &str) -> bool {
        (**self).remove(id)
    }

    fn set_attribute(&mut self, id: &str, name: &str, value: &str) -> Result<()> {
        (**self).set_attribute(id, name, value)
    }

    fn replace_head(&mut self, attrs: &[(String, String)], markup: &str) -> Result<()> {
        (**self).replace_head(attrs, markup)
    }

    fn replace_body(&mut self, attrs: &[(String, String)], markup: &str) -> Result<()> {
        (**self).replace_body(attrs, markup)
    }

    fn run_script(&mut self, code: &str) -> Result<()> {
        (**self).run_script(code)
    }

    fn load_script(&mut self, src: &str) -> Result<()> {
        (**self).load_script(src)
    }

    fn navigate(&mut self, url: &str) -> Result<()> {
        (**self).navigate(url)
    }

    fn update_view_state(&mut self, token: &str) {
        (**self).update_view_state(token);
    }
}
