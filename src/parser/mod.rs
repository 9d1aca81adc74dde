//! Response parsing.
//!
//! A raw response body is turned into a [`ChangeSet`] by an ordered chain
//! of [`ParseStrategy`] implementations. The first strategy that succeeds
//! wins. A payload that is not well formed moves on to the next strategy;
//! a structural error (well formed, but an operation is invalid) ends the
//! chain. Either way a failed parse is a [`ParseFailure`] and the response
//! is treated as inert.
//!
//! # Default Chain
//!
//! | Order | Strategy | Handles |
//! |-------|----------|---------|
//! | 1 | [`StructuredStrategy`] | Well-formed `partial-response` payloads |
//! | 2 | [`SectionFallback`] | Head/body/root updates with markup that is not well formed |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `structured` | `quick-xml` tree mapping |
//! | `fallback` | Section extraction from raw text |

// ============================================================================
// Submodules
// ============================================================================

/// Section extraction from raw text.
pub mod fallback;

/// Structured tree mapping.
pub mod structured;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use thiserror::Error;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::{ChangeSet, ReservedIds};

// ============================================================================
// Re-exports
// ============================================================================

pub use fallback::SectionFallback;
pub use structured::StructuredStrategy;

// ============================================================================
// ParseStrategy
// ============================================================================

/// One way of turning a payload into a change-set.
pub trait ParseStrategy: Send + Sync {
    /// Strategy name, for logs and [`ParsedResponse::strategy`].
    fn name(&self) -> &'static str;

    /// Parses a payload.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedResponse`] if this strategy cannot read the
    /// payload, [`Error::Structural`] if it reads it but an operation is
    /// invalid. Only the former falls through to the next strategy.
    fn parse(&self, raw: &str, reserved: &ReservedIds) -> Result<ChangeSet>;
}

// ============================================================================
// ParsedResponse
// ============================================================================

/// Successful parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Parsed operations.
    pub changes: ChangeSet,
    /// Name of the strategy that produced them.
    pub strategy: &'static str,
}

// ============================================================================
// ParseFailure
// ============================================================================

/// Every strategy failed.
#[derive(Debug, Error)]
#[error("{description}")]
pub struct ParseFailure {
    /// Description of the first strategy's failure.
    pub description: String,
    /// Failure of each strategy, in chain order.
    pub attempts: Vec<(&'static str, Error)>,
}

impl ParseFailure {
    fn empty() -> Self {
        Self {
            description: "empty response".to_string(),
            attempts: Vec::new(),
        }
    }

    /// Converts into a crate error.
    #[must_use]
    pub fn into_error(self) -> Error {
        Error::malformed(self.description)
    }
}

// ============================================================================
// ResponseParser
// ============================================================================

/// Ordered strategy chain.
pub struct ResponseParser {
    strategies: Vec<Box<dyn ParseStrategy>>,
    reserved: ReservedIds,
}

impl ResponseParser {
    /// Creates the default chain: structured, then section fallback.
    #[must_use]
    pub fn new(reserved: ReservedIds) -> Self {
        Self::with_strategies(
            reserved,
            vec![Box::new(StructuredStrategy), Box::new(SectionFallback)],
        )
    }

    /// Creates a parser over a custom chain.
    #[must_use]
    pub fn with_strategies(reserved: ReservedIds, strategies: Vec<Box<dyn ParseStrategy>>) -> Self {
        Self {
            strategies,
            reserved,
        }
    }

    /// Returns the reserved identifiers.
    #[inline]
    #[must_use]
    pub fn reserved(&self) -> &ReservedIds {
        &self.reserved
    }

    /// Parses a payload.
    ///
    /// # Errors
    ///
    /// [`ParseFailure`] if the payload is empty or every strategy fails.
    pub fn parse(&self, raw: &str) -> std::result::Result<ParsedResponse, ParseFailure> {
        if raw.trim().is_empty() {
            debug!("Empty response body");
            return Err(ParseFailure::empty());
        }

        let mut attempts = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            match strategy.parse(raw, &self.reserved) {
                Ok(changes) => {
                    trace!(
                        strategy = strategy.name(),
                        operations = changes.len(),
                        "Response parsed"
                    );
                    return Ok(ParsedResponse {
                        changes,
                        strategy: strategy.name(),
                    });
                }
                Err(e) => {
                    debug!(strategy = strategy.name(), error = %e, "Parse strategy failed");
                    let terminal = e.is_structural();
                    attempts.push((strategy.name(), e));
                    if terminal {
                        break;
                    }
                }
            }
        }

        let description = attempts
            .first()
            .map_or_else(|| "no parse strategy configured".to_string(), |(_, e)| e.to_string());
        Err(ParseFailure {
            description,
            attempts,
        })
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new(ReservedIds::default())
    }
}

impl fmt::Debug for ResponseParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("ResponseParser")
            .field("strategies", &names)
            .field("reserved", &self.reserved)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::Operation;

    #[test]
    fn test_structured_wins() {
        let parsed = ResponseParser::default()
            .parse("<partial-response><changes><eval>go()</eval></changes></partial-response>")
            .expect("parse");
        assert_eq!(parsed.strategy, "structured");
        assert_eq!(
            parsed.changes.operations(),
            &[Operation::Eval { code: "go()".into() }]
        );
    }

    #[test]
    fn test_fallback_rescues_unescaped_body() {
        let raw = r#"<partial-response><changes><update id="javax.faces.ViewBody"><body><div>unclosed<br></body></update></changes></partial-response>"#;
        let parsed = ResponseParser::default().parse(raw).expect("parse");
        assert_eq!(parsed.strategy, "section-fallback");
        assert_eq!(parsed.changes.len(), 1);
    }

    #[test]
    fn test_garbage_is_parse_failure() {
        let failure = ResponseParser::default()
            .parse(">>>> xxxx >YYYY-!->>>")
            .expect_err("garbage");
        assert_eq!(failure.attempts.len(), 2);
        assert!(failure.into_error().is_response_error());
    }

    #[test]
    fn test_empty_response() {
        let failure = ResponseParser::default().parse("  \n").expect_err("empty");
        assert_eq!(failure.description, "empty response");
        assert!(failure.attempts.is_empty());
    }

    #[test]
    fn test_missing_anchor_names_operation() {
        let raw = r#"<partial-response><changes><insert id="row9"><![CDATA[<tr/>]]></insert></changes></partial-response>"#;
        let failure = ResponseParser::default().parse(raw).expect_err("no anchor");
        assert!(failure.description.contains("row9"));
    }

    #[test]
    fn test_structural_error_skips_fallback() {
        let raw = concat!(
            "<partial-response><changes>",
            r#"<update id="javax.faces.ViewBody"><![CDATA[<body><p>x</p></body>]]></update>"#,
            r#"<insert id="row9"><![CDATA[<tr id="row9"></tr>]]></insert>"#,
            "</changes></partial-response>"
        );
        let failure = ResponseParser::default().parse(raw).expect_err("no anchor");
        assert_eq!(failure.attempts.len(), 1);
        assert_eq!(failure.attempts[0].0, "structured");
        assert!(failure.attempts[0].1.is_structural());
        assert!(failure.description.contains("row9"));
    }
}
