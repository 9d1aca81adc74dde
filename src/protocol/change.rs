//! Change-set types parsed from a partial response.
//!
//! # Wire Format
//!
//! ```xml
//! <partial-response id="j_id1">
//!   <changes>
//!     <update id="panel"><![CDATA[<div id="panel">...</div>]]></update>
//!     <insert id="row3" after="row2"><![CDATA[<tr id="row3">...</tr>]]></insert>
//!     <delete id="row1"/>
//!     <attributes id="input"><attribute name="disabled" value="true"/></attributes>
//!     <eval><![CDATA[highlight('panel')]]></eval>
//!   </changes>
//! </partial-response>
//! ```
//!
//! or, for a server-side failure:
//!
//! ```xml
//! <partial-response>
//!   <error>
//!     <error-name>java.lang.IllegalStateException</error-name>
//!     <error-message><![CDATA[...]]></error-message>
//!   </error>
//! </partial-response>
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tracing::debug;

// ============================================================================
// Constants
// ============================================================================

/// Separator between naming-container segments in element ids.
pub const ID_SEPARATOR: char = ':';

// ============================================================================
// InsertPosition
// ============================================================================

/// Where an insert places its markup relative to the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    /// Immediately before the anchor element.
    Before,
    /// Immediately after the anchor element.
    After,
}

impl fmt::Display for InsertPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Before => f.write_str("before"),
            Self::After => f.write_str("after"),
        }
    }
}

// ============================================================================
// Operation
// ============================================================================

/// A single change-set operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Replace an element (or its content) with new markup.
    Update {
        /// Target element id, possibly a reserved id.
        target: String,
        /// Replacement markup.
        markup: String,
    },

    /// Insert new markup next to an anchor element.
    Insert {
        /// Id of the inserted element, when given on the wire.
        id: Option<String>,
        /// Position relative to the anchor.
        position: InsertPosition,
        /// Existing element id to insert next to.
        anchor: String,
        /// Markup to materialize.
        markup: String,
    },

    /// Remove an element.
    Delete {
        /// Target element id.
        target: String,
    },

    /// Set one attribute on an element.
    Attribute {
        /// Target element id.
        target: String,
        /// Attribute name.
        name: String,
        /// Attribute value.
        value: String,
    },

    /// Evaluate script in global scope.
    Eval {
        /// Script source.
        code: String,
    },

    /// Navigate away.
    Redirect {
        /// Destination URL.
        url: String,
    },

    /// Server-side failure report.
    Error {
        /// Error name (usually an exception class).
        name: String,
        /// Error message.
        message: String,
    },
}

impl Operation {
    /// Returns the operation kind as it appears on the wire.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Update { .. } => "update",
            Self::Insert { .. } => "insert",
            Self::Delete { .. } => "delete",
            Self::Attribute { .. } => "attributes",
            Self::Eval { .. } => "eval",
            Self::Redirect { .. } => "redirect",
            Self::Error { .. } => "error",
        }
    }

    /// Returns `true` if applying this operation mutates the document.
    #[must_use]
    pub fn mutates_document(&self) -> bool {
        matches!(
            self,
            Self::Update { .. } | Self::Insert { .. } | Self::Delete { .. } | Self::Attribute { .. }
        )
    }
}

// ============================================================================
// ChangeSet
// ============================================================================

/// Ordered operations parsed from one partial response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Optional `id` attribute of the `partial-response` root.
    pub response_id: Option<String>,
    operations: Vec<Operation>,
}

impl ChangeSet {
    /// Creates an empty change-set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an operation.
    ///
    /// A second `Error` operation is ignored: a response carries at most one.
    pub fn push(&mut self, operation: Operation) {
        if matches!(operation, Operation::Error { .. }) && self.error().is_some() {
            debug!("Ignoring additional error container");
            return;
        }
        self.operations.push(operation);
    }

    /// Returns the operations in declaration order.
    #[inline]
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Returns the number of operations.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns `true` if there are no operations.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns the error name and message if the response carried an error.
    #[must_use]
    pub fn error(&self) -> Option<(&str, &str)> {
        self.operations.iter().find_map(|op| match op {
            Operation::Error { name, message } => Some((name.as_str(), message.as_str())),
            _ => None,
        })
    }
}

impl FromIterator<Operation> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        let mut changes = Self::new();
        for op in iter {
            changes.push(op);
        }
        changes
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

// ============================================================================
// ReservedIds
// ============================================================================

/// Target identifiers with whole-region semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedIds {
    /// Replaces the document head.
    pub head: String,
    /// Replaces the document body.
    pub body: String,
    /// Replaces the entire document.
    pub root: String,
    /// Carries a new view-state token.
    pub view_state: String,
}

impl Default for ReservedIds {
    fn default() -> Self {
        Self {
            head: "javax.faces.ViewHead".to_string(),
            body: "javax.faces.ViewBody".to_string(),
            root: "javax.faces.ViewRoot".to_string(),
            view_state: "javax.faces.ViewState".to_string(),
        }
    }
}

/// Classification of an update target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateTarget {
    /// Document head.
    Head,
    /// Document body.
    Body,
    /// Whole document.
    Root,
    /// View-state token.
    ViewState,
    /// Regular element.
    Element,
}

impl ReservedIds {
    /// Classifies an update target id.
    ///
    /// The view-state id also matches as one `:`-separated segment of a
    /// namespaced id, e.g. `j_id1:javax.faces.ViewState:0`.
    #[must_use]
    pub fn classify(&self, target: &str) -> UpdateTarget {
        if target == self.head {
            UpdateTarget::Head
        } else if target == self.body {
            UpdateTarget::Body
        } else if target == self.root {
            UpdateTarget::Root
        } else if target
            .split(ID_SEPARATOR)
            .any(|segment| segment == self.view_state)
        {
            UpdateTarget::ViewState
        } else {
            UpdateTarget::Element
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_first_error_is_kept() {
        let changes: ChangeSet = [
            Operation::Error {
                name: "E1".into(),
                message: "first".into(),
            },
            Operation::Error {
                name: "E2".into(),
                message: "second".into(),
            },
        ]
        .into_iter()
        .collect();

        assert_eq!(changes.len(), 1);
        assert_eq!(changes.error(), Some(("E1", "first")));
    }

    #[test]
    fn test_classify_reserved_targets() {
        let reserved = ReservedIds::default();
        assert_eq!(reserved.classify("javax.faces.ViewHead"), UpdateTarget::Head);
        assert_eq!(reserved.classify("javax.faces.ViewBody"), UpdateTarget::Body);
        assert_eq!(reserved.classify("javax.faces.ViewRoot"), UpdateTarget::Root);
        assert_eq!(
            reserved.classify("j_id1:javax.faces.ViewState:0"),
            UpdateTarget::ViewState
        );
        assert_eq!(reserved.classify("form:panel"), UpdateTarget::Element);
    }

    #[test]
    fn test_mutates_document() {
        assert!(Operation::Delete { target: "x".into() }.mutates_document());
        assert!(!Operation::Eval { code: "x".into() }.mutates_document());
        assert!(
            !Operation::Error {
                name: "E".into(),
                message: String::new()
            }
            .mutates_document()
        );
    }
}
