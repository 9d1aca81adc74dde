//! Section fallback strategy.
//!
//! Servers routinely emit whole-page updates whose markup is not well
//! formed XML (unclosed `<br>`, bare `&`, ...). Those payloads fail the
//! structured strategy. This strategy scans the raw text for `update`
//! nodes that target the head, body or root reserved ids and returns just
//! those; every other operation in such a payload is lost.

// ============================================================================
// Imports
// ============================================================================

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{ChangeSet, Operation, ReservedIds, UpdateTarget};

use super::ParseStrategy;

// ============================================================================
// Constants
// ============================================================================

static UPDATE_NODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<update\s+id\s*=\s*["']([^"']+)["']\s*>(.*?)</update\s*>"#)
        .expect("valid regex")
});

// ============================================================================
// SectionFallback
// ============================================================================

/// Fallback strategy for full-region replacements.
#[derive(Debug, Clone, Copy, Default)]
pub struct SectionFallback;

impl ParseStrategy for SectionFallback {
    fn name(&self) -> &'static str {
        "section-fallback"
    }

    fn parse(&self, raw: &str, reserved: &ReservedIds) -> Result<ChangeSet> {
        let mut changes = ChangeSet::new();

        for capture in UPDATE_NODE.captures_iter(raw) {
            let target = &capture[1];
            match reserved.classify(target) {
                UpdateTarget::Head | UpdateTarget::Body | UpdateTarget::Root => {
                    changes.push(Operation::Update {
                        target: target.to_string(),
                        markup: strip_cdata(&capture[2]),
                    });
                }
                _ => debug!(target, "Fallback skipping non-section update"),
            }
        }

        if changes.is_empty() {
            return Err(Error::malformed("no head, body or root update found"));
        }
        Ok(changes)
    }
}

/// Removes CDATA delimiters.
///
/// A literal `]]>` inside content is split by servers as
/// `]]]]><![CDATA[>`; removing both delimiters restores it.
fn strip_cdata(content: &str) -> String {
    content.replace("<![CDATA[", "").replace("]]>", "")
}

// ============================================================================
// Tests
// ============================================================================
