//! Change-set application.
//!
//! [`PatchApplier`] executes a [`ChangeSet`] against a [`Document`],
//! strictly in declaration order.
//!
//! # Failure Policy
//!
//! | Condition | Effect |
//! |-----------|--------|
//! | Response carries an `error` | Nothing applied |
//! | Update / attribute target missing | Logged, skipped, processing continues |
//! | Delete target missing | No-op |
//! | Insert anchor missing | Fatal, [`Error::AnchorNotFound`] |
//! | Script fails | Fatal, [`Error::ScriptError`] |
//! | Redirect | Navigates, remaining operations dropped |
//!
//! Fatal errors stop processing; earlier operations stay applied.
//!
//! # Scripts
//!
//! Scripts are collected from each incoming markup fragment and executed
//! once, after the fragment is in the document. The document itself never
//! runs scripts it materializes, so markup that is later moved or
//! re-serialized does not run them again.

// ============================================================================
// Imports
// ============================================================================

use tracing::{debug, trace, warn};

use crate::document::Document;
use crate::error::{Error, Result};
use crate::markup::{self, Script, SectionTag};
use crate::protocol::{ChangeSet, InsertPosition, Operation, ReservedIds, UpdateTarget};

// ============================================================================
// ApplyOutcome
// ============================================================================

/// Result of applying a change-set.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    /// Operations that changed something.
    pub applied: usize,
    /// Non-fatal problems, in encounter order.
    pub skipped: Vec<Error>,
    /// New view-state token, if the response carried one.
    pub view_state: Option<String>,
    /// Redirect target, if the response navigated away.
    pub redirect: Option<String>,
    /// Server error name and message; nothing else was applied.
    pub server_error: Option<(String, String)>,
}

impl ApplyOutcome {
    /// Returns `true` if the response was a server error.
    #[inline]
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.server_error.is_some()
    }
}

// ============================================================================
// PatchApplier
// ============================================================================

/// Applies change-sets.
#[derive(Debug, Clone, Default)]
pub struct PatchApplier {
    reserved: ReservedIds,
}

impl PatchApplier {
    /// Creates an applier.
    #[inline]
    #[must_use]
    pub fn new(reserved: ReservedIds) -> Self {
        Self { reserved }
    }

    /// Applies every operation in order.
    ///
    /// # Errors
    ///
    /// - [`Error::AnchorNotFound`] if an insert anchor is missing
    /// - [`Error::ScriptError`] if a script fails
    /// - any other error reported by the document
    pub fn apply(&self, changes: &ChangeSet, document: &mut dyn Document) -> Result<ApplyOutcome> {
        let mut outcome = ApplyOutcome::default();

        if let Some((name, message)) = changes.error() {
            debug!(error_name = name, "Response carries a server error");
            outcome.server_error = Some((name.to_string(), message.to_string()));
            return Ok(outcome);
        }

        for operation in changes {
            trace!(kind = operation.kind(), "Applying operation");
            match operation {
                Operation::Update { target, markup } => {
                    self.apply_update(target, markup, document, &mut outcome)?;
                }
                Operation::Insert {
                    id,
                    position,
                    anchor,
                    markup,
                } => {
                    apply_insert(id.as_deref(), *position, anchor, markup, document)?;
                    outcome.applied += 1;
                }
                Operation::Delete { target } => {
                    if document.remove(target) {
                        outcome.applied += 1;
                    } else {
                        trace!(target, "Delete target already absent");
                    }
                }
                Operation::Attribute {
                    target,
                    name,
                    value,
                } => match document.set_attribute(target, name, value) {
                    Ok(()) => outcome.applied += 1,
                    Err(e) if e.is_recoverable() => skip(&mut outcome, e),
                    Err(e) => return Err(e),
                },
                Operation::Eval { code } => {
                    document.run_script(code)?;
                    outcome.applied += 1;
                }
                Operation::Redirect { url } => {
                    debug!(url, "Redirecting");
                    document.navigate(url)?;
                    outcome.redirect = Some(url.clone());
                    outcome.applied += 1;
                    break;
                }
                // Already handled above.
                Operation::Error { .. } => {}
            }
        }

        Ok(outcome)
    }

    fn apply_update(
        &self,
        target: &str,
        markup: &str,
        document: &mut dyn Document,
        outcome: &mut ApplyOutcome,
    ) -> Result<()> {
        match self.reserved.classify(target) {
            UpdateTarget::ViewState => {
                let token = markup.trim();
                document.update_view_state(token);
                outcome.view_state = Some(token.to_string());
            }
            UpdateTarget::Head => {
                let (attrs, inner) = section(markup, SectionTag::Head);
                document.replace_head(&attrs, &inner)?;
                run_scripts(&inner, document)?;
            }
            UpdateTarget::Body => {
                let (attrs, inner) = section(markup, SectionTag::Body);
                document.replace_body(&attrs, &inner)?;
                run_scripts(&inner, document)?;
            }
            UpdateTarget::Root => {
                let head = markup::extract_section(markup, SectionTag::Head);
                let has_head = head.is_some();
                if let Some(head) = head {
                    document.replace_head(&head.attrs, &head.inner)?;
                    run_scripts(&head.inner, document)?;
                }
                // A bare fragment is body content; a head-only document leaves the body alone.
                if !has_head || markup::extract_section(markup, SectionTag::Body).is_some() {
                    let (attrs, inner) = section(markup, SectionTag::Body);
                    document.replace_body(&attrs, &inner)?;
                    run_scripts(&inner, document)?;
                }
            }
            UpdateTarget::Element => {
                if !document.contains(target) {
                    skip(outcome, Error::element_not_found(target));
                    return Ok(());
                }
                let fragment = markup::parse_fragment(markup);
                if markup::sole_element_id(&fragment).as_deref() == Some(target) {
                    document.replace_element(target, markup)?;
                } else {
                    document.replace_content(target, markup)?;
                }
                execute(markup::collect_scripts(&fragment), document)?;
            }
        }
        outcome.applied += 1;
        Ok(())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn apply_insert(
    id: Option<&str>,
    position: InsertPosition,
    anchor: &str,
    markup: &str,
    document: &mut dyn Document,
) -> Result<()> {
    match document.insert_adjacent(anchor, position, markup) {
        Ok(()) => run_scripts(markup, document),
        Err(Error::ElementNotFound { .. }) => Err(Error::anchor_not_found(
            anchor,
            id.unwrap_or("insert"),
        )),
        Err(e) => Err(e),
    }
}

fn skip(outcome: &mut ApplyOutcome, error: Error) {
    warn!(error = %error, "Skipping operation");
    outcome.skipped.push(error);
}

/// Section attributes and inner markup of a whole-region update.
///
/// Without an enclosing tag the markup is taken as the section's content.
fn section(markup: &str, tag: SectionTag) -> (Vec<(String, String)>, String) {
    match markup::extract_section(markup, tag) {
        Some(section) => (section.attrs, section.inner),
        None => (Vec::new(), markup.to_string()),
    }
}

/// Runs the scripts embedded in freshly materialized markup.
fn run_scripts(markup: &str, document: &mut dyn Document) -> Result<()> {
    execute(markup::collect_scripts(&markup::parse_fragment(markup)), document)
}

fn execute(scripts: Vec<Script>, document: &mut dyn Document) -> Result<()> {
    for script in scripts {
        match script {
            Script::Inline(code) => document.run_script(&code)?,
            Script::External(src) => document.load_script(&src)?,
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::document::MemoryDocument;

    fn apply(doc: &MemoryDocument, ops: Vec<Operation>) -> Result<ApplyOutcome> {
        let changes: ChangeSet = ops.into_iter().collect();
        PatchApplier::default().apply(&changes, &mut doc.clone())
    }

    fn update(target: &str, markup: &str) -> Operation {
        Operation::Update {
            target: target.into(),
            markup: markup.into(),
        }
    }

    #[test]
    fn test_update_then_insert_around_it() {
        let doc = MemoryDocument::from_html(r#"<div id="wrap"><div id="changesArea">old</div></div>"#);
        apply(
            &doc,
            vec![
                update("changesArea", "X"),
                Operation::Insert {
                    id: Some("i1".into()),
                    position: InsertPosition::Before,
                    anchor: "changesArea".into(),
                    markup: "Y".into(),
                },
                Operation::Insert {
                    id: Some("i2".into()),
                    position: InsertPosition::After,
                    anchor: "changesArea".into(),
                    markup: "Z".into(),
                },
            ],
        )
        .expect("apply");

        assert_eq!(
            doc.inner_html("wrap").as_deref(),
            Some(r#"Y<div id="changesArea">X</div>Z"#)
        );
    }

    #[test]
    fn test_update_with_own_element_replaces_it() {
        let doc = MemoryDocument::from_html(r#"<div id="p" class="old">a</div>"#);
        apply(&doc, vec![update("p", r#"<div id="p" class="new">b</div>"#)]).expect("apply");
        assert_eq!(doc.attribute("p", "class").as_deref(), Some("new"));
        assert_eq!(doc.body_html(), r#"<div class="new" id="p">b</div>"#);
    }

    #[test]
    fn test_missing_update_target_is_skipped() {
        let doc = MemoryDocument::from_html(r#"<div id="a"></div>"#);
        let outcome = apply(&doc, vec![update("ghost", "x"), update("a", "y")]).expect("apply");
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(doc.inner_html("a").as_deref(), Some("y"));
    }

    #[test]
    fn test_missing_anchor_is_fatal() {
        let doc = MemoryDocument::new();
        let err = apply(
            &doc,
            vec![Operation::Insert {
                id: Some("n".into()),
                position: InsertPosition::After,
                anchor: "ghost".into(),
                markup: "x".into(),
            }],
        )
        .expect_err("fatal");
        assert!(matches!(err, Error::AnchorNotFound { ref operation, .. } if operation == "n"));
    }

    #[test]
    fn test_attributes_apply_cumulatively() {
        let doc = MemoryDocument::from_html(r#"<input id="i">"#);
        let attr = |name: &str, value: &str| Operation::Attribute {
            target: "i".into(),
            name: name.into(),
            value: value.into(),
        };
        apply(&doc, vec![attr("a", "1"), attr("b", "2"), attr("a", "3")]).expect("apply");
        assert_eq!(doc.attribute("i", "a").as_deref(), Some("3"));
        assert_eq!(doc.attribute("i", "b").as_deref(), Some("2"));
    }

    #[test]
    fn test_error_blocks_everything() {
        let doc = MemoryDocument::from_html(r#"<div id="a"></div>"#);
        let outcome = apply(
            &doc,
            vec![
                Operation::Delete { target: "a".into() },
                Operation::Error {
                    name: "E1".into(),
                    message: String::new(),
                },
            ],
        )
        .expect("apply");
        assert!(outcome.is_server_error());
        assert_eq!(doc.mutation_count(), 0);
        assert!(doc.contains("a"));
    }

    #[test]
    fn test_embedded_script_runs_once() {
        let doc = MemoryDocument::from_html(r#"<div id="p"></div>"#);
        let op = update("p", "<span>x</span><script>count++</script>");
        apply(&doc, vec![op.clone()]).expect("apply");
        assert_eq!(doc.executed_scripts(), vec!["count++"]);

        // Later mutations around the materialized markup do not re-run it.
        apply(
            &doc,
            vec![Operation::Insert {
                id: None,
                position: InsertPosition::After,
                anchor: "p".into(),
                markup: "<hr>".into(),
            }],
        )
        .expect("apply");
        assert_eq!(doc.executed_scripts().len(), 1);
    }

    #[test]
    fn test_eval_sees_earlier_mutations() {
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let slot = Arc::clone(&seen);
        let doc = MemoryDocument::from_html(r#"<div id="p">old</div>"#).with_script_hook(Arc::new(
            move |_: &str, doc: &MemoryDocument| -> Result<()> {
                *slot.lock() = doc.inner_html("p");
                Ok(())
            },
        ));

        apply(
            &doc,
            vec![update("p", "new"), Operation::Eval { code: "check()".into() }],
        )
        .expect("apply");
        assert_eq!(seen.lock().as_deref(), Some("new"));
    }

    #[test]
    fn test_redirect_stops_processing() {
        let doc = MemoryDocument::from_html(r#"<div id="a"></div>"#);
        let outcome = apply(
            &doc,
            vec![
                Operation::Redirect { url: "/next".into() },
                Operation::Delete { target: "a".into() },
            ],
        )
        .expect("apply");
        assert_eq!(outcome.redirect.as_deref(), Some("/next"));
        assert_eq!(doc.location().as_deref(), Some("/next"));
        assert!(doc.contains("a"));
    }

    #[test]
    fn test_body_replacement_runs_scripts_once() {
        let doc = MemoryDocument::from_html(r#"<div id="old"></div>"#);
        apply(
            &doc,
            vec![update(
                "javax.faces.ViewBody",
                r#"<body class="b"><div id="new"></div><script>init()</script><script src="/a.js"></script></body>"#,
            )],
        )
        .expect("apply");
        assert!(!doc.contains("old"));
        assert!(doc.contains("new"));
        assert_eq!(doc.body_attribute("class").as_deref(), Some("b"));
        assert_eq!(doc.executed_scripts(), vec!["init()"]);
        assert_eq!(doc.loaded_scripts(), vec!["/a.js"]);
    }

    #[test]
    fn test_root_replacement_covers_head_and_body() {
        let doc = MemoryDocument::from_html("<head><title>a</title></head><body><p id=\"p\"></p></body>");
        apply(
            &doc,
            vec![update(
                "javax.faces.ViewRoot",
                "<html><head><title>b</title></head><body><p id=\"q\"></p></body></html>",
            )],
        )
        .expect("apply");
        assert_eq!(doc.head_html(), "<title>b</title>");
        assert!(doc.contains("q"));
        assert!(!doc.contains("p"));
    }

    #[test]
    fn test_view_state_update() {
        let doc = MemoryDocument::new();
        let outcome = apply(&doc, vec![update("j_id1:javax.faces.ViewState:0", " token-2 ")])
            .expect("apply");
        assert_eq!(outcome.view_state.as_deref(), Some("token-2"));
        assert_eq!(doc.view_state().as_deref(), Some("token-2"));
    }

    #[test]
    fn test_script_failure_is_fatal() {
        let doc = MemoryDocument::new().with_script_hook(Arc::new(
            |code: &str, _: &MemoryDocument| -> Result<()> { Err(Error::script_error(code)) },
        ));
        let err = apply(&doc, vec![Operation::Eval { code: "boom()".into() }]).expect_err("fatal");
        assert!(matches!(err, Error::ScriptError { .. }));
    }
}
