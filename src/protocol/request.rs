//! Outbound request types.
//!
//! A logical request issued by a caller is turned into an [`AjaxRequest`]:
//! the endpoint, the form-encoded body and the protocol header.
//!
//! # Wire Format
//!
//! ```text
//! POST /app/page.xhtml
//! Faces-Request: partial/ajax
//! Content-Type: application/x-www-form-urlencoded;charset=UTF-8
//!
//! javax.faces.source=save&javax.faces.partial.event=click&
//! javax.faces.partial.execute=save&javax.faces.partial.render=panel&
//! javax.faces.partial.ajax=true&javax.faces.ViewState=...
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tracing::warn;
use url::Url;

use crate::dispatch::{ErrorListener, EventListener, RequestCallbacks};
use crate::identifiers::{RequestId, SourceId};

// ============================================================================
// Constants
// ============================================================================

/// Header flagging a request as a partial/ajax exchange.
pub const PARTIAL_REQUEST_HEADER: &str = "Faces-Request";

/// Value of [`PARTIAL_REQUEST_HEADER`].
pub const PARTIAL_REQUEST_VALUE: &str = "partial/ajax";

/// Content type of the request body.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=UTF-8";

/// Request parameter names.
pub mod params {
    /// Id of the element that triggered the request.
    pub const SOURCE: &str = "javax.faces.source";
    /// Name of the triggering event.
    pub const PARTIAL_EVENT: &str = "javax.faces.partial.event";
    /// Name of the behavior event.
    pub const BEHAVIOR_EVENT: &str = "javax.faces.behavior.event";
    /// Space separated ids to execute.
    pub const EXECUTE: &str = "javax.faces.partial.execute";
    /// Space separated ids to render.
    pub const RENDER: &str = "javax.faces.partial.render";
    /// Marks the request as partial.
    pub const AJAX: &str = "javax.faces.partial.ajax";
    /// Requests a reset of submitted values.
    pub const RESET_VALUES: &str = "javax.faces.partial.resetValues";
    /// View-state token.
    pub const VIEW_STATE: &str = "javax.faces.ViewState";
}

/// Identifier-list keywords.
pub mod keywords {
    /// Every component in the view.
    pub const ALL: &str = "@all";
    /// No component.
    pub const NONE: &str = "@none";
    /// The source element.
    pub const THIS: &str = "@this";
    /// The enclosing form.
    pub const FORM: &str = "@form";
}

// ============================================================================
// TriggerEvent
// ============================================================================

/// The user-interface event that caused a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent {
    /// Event name, e.g. `click` or `change`.
    pub name: String,
}

impl TriggerEvent {
    /// Creates a trigger event.
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

// ============================================================================
// RequestOptions
// ============================================================================

/// Per-request options.
///
/// # Example
///
/// ```ignore
/// let options = RequestOptions::new()
///     .execute("@this input")
///     .render("panel messages")
///     .delay(Duration::from_millis(300))
///     .param("page", "2");
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Identifiers to execute (space separated, keywords allowed).
    pub execute: Option<String>,
    /// Identifiers to render (space separated, keywords allowed).
    pub render: Option<String>,
    /// Debounce delay before the request is admitted to the queue.
    pub delay: Option<Duration>,
    /// Per-request timeout. Zero disables the deadline.
    pub timeout: Option<Duration>,
    /// Queue size override, applied when the request is enqueued.
    pub queue_size: Option<usize>,
    /// Send `javax.faces.partial.resetValues=true`.
    pub reset_values: bool,
    /// Id of the enclosing form, used for `@form`.
    pub form: Option<String>,
    /// Pass-through parameters (already serialized form fields included).
    pub params: Vec<(String, String)>,
    /// Request-scoped listeners.
    pub callbacks: RequestCallbacks,
}

impl RequestOptions {
    /// Creates empty options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the execute list.
    #[inline]
    #[must_use]
    pub fn execute(mut self, ids: impl Into<String>) -> Self {
        self.execute = Some(ids.into());
        self
    }

    /// Sets the render list.
    #[inline]
    #[must_use]
    pub fn render(mut self, ids: impl Into<String>) -> Self {
        self.render = Some(ids.into());
        self
    }

    /// Sets a debounce delay.
    #[inline]
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sets a per-request timeout.
    #[inline]
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Overrides the maximum queue size.
    #[inline]
    #[must_use]
    pub fn queue_size(mut self, size: usize) -> Self {
        self.queue_size = Some(size);
        self
    }

    /// Requests a reset of submitted values.
    #[inline]
    #[must_use]
    pub fn reset_values(mut self) -> Self {
        self.reset_values = true;
        self
    }

    /// Sets the enclosing form id.
    #[inline]
    #[must_use]
    pub fn form(mut self, form: impl Into<String>) -> Self {
        self.form = Some(form.into());
        self
    }

    /// Adds a pass-through parameter.
    #[inline]
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Sets the request-scoped lifecycle listener.
    #[inline]
    #[must_use]
    pub fn on_event(mut self, listener: EventListener) -> Self {
        self.callbacks.on_event = Some(listener);
        self
    }

    /// Sets the request-scoped error listener.
    #[inline]
    #[must_use]
    pub fn on_error(mut self, listener: ErrorListener) -> Self {
        self.callbacks.on_error = Some(listener);
        self
    }
}

// ============================================================================
// AjaxRequest
// ============================================================================

/// A fully resolved outbound request.
#[derive(Debug, Clone)]
pub struct AjaxRequest {
    /// Request id.
    pub id: RequestId,
    /// Target endpoint.
    pub url: Url,
    /// Triggering element.
    pub source: SourceId,
    /// Triggering event name.
    pub event: Option<String>,
    /// Resolved execute ids.
    pub execute: Vec<String>,
    /// Resolved render ids.
    pub render: Vec<String>,
    /// View-state token, filled in at dispatch time when absent.
    pub view_state: Option<String>,
    /// Reset submitted values.
    pub reset_values: bool,
    /// Pass-through parameters.
    pub params: Vec<(String, String)>,
    /// Deadline for the exchange. Zero disables it.
    pub timeout: Duration,
}

impl AjaxRequest {
    /// Resolves options into a request.
    ///
    /// Execute defaults to `@this`, render to `@none`.
    #[must_use]
    pub fn build(
        url: Url,
        source: SourceId,
        event: Option<&TriggerEvent>,
        options: &RequestOptions,
        default_timeout: Duration,
    ) -> Self {
        let form = options.form.as_deref();
        let execute = resolve_ids(
            options.execute.as_deref().unwrap_or(keywords::THIS),
            &source,
            form,
        );
        let render = resolve_ids(
            options.render.as_deref().unwrap_or(keywords::NONE),
            &source,
            form,
        );

        let view_state = options
            .params
            .iter()
            .find(|(name, _)| name == params::VIEW_STATE)
            .map(|(_, value)| value.clone());

        let params = options
            .params
            .iter()
            .filter(|(name, _)| name != params::VIEW_STATE)
            .cloned()
            .collect();

        Self {
            id: RequestId::generate(),
            url,
            source,
            event: event.map(|e| e.name.clone()),
            execute,
            render,
            view_state,
            reset_values: options.reset_values,
            params,
            timeout: options.timeout.unwrap_or(default_timeout),
        }
    }

    /// Returns the headers sent with this request.
    #[inline]
    #[must_use]
    pub fn headers(&self) -> [(&'static str, &'static str); 2] {
        [
            (PARTIAL_REQUEST_HEADER, PARTIAL_REQUEST_VALUE),
            ("Content-Type", FORM_CONTENT_TYPE),
        ]
    }

    /// Encodes the request body.
    ///
    /// Empty execute/render lists are omitted.
    #[must_use]
    pub fn form_body(&self) -> String {
        let mut pairs: Vec<(&str, String)> = Vec::with_capacity(8 + self.params.len());

        pairs.push((params::SOURCE, self.source.to_string()));
        if let Some(ref event) = self.event {
            pairs.push((params::PARTIAL_EVENT, event.clone()));
            pairs.push((params::BEHAVIOR_EVENT, event.clone()));
        }
        if !self.execute.is_empty() {
            pairs.push((params::EXECUTE, self.execute.join(" ")));
        }
        if !self.render.is_empty() {
            pairs.push((params::RENDER, self.render.join(" ")));
        }
        pairs.push((params::AJAX, "true".to_string()));
        if self.reset_values {
            pairs.push((params::RESET_VALUES, "true".to_string()));
        }
        if let Some(ref token) = self.view_state {
            pairs.push((params::VIEW_STATE, token.clone()));
        }
        for (name, value) in &self.params {
            pairs.push((name.as_str(), value.clone()));
        }

        pairs
            .iter()
            .map(|(name, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(name),
                    urlencoding::encode(value)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Expands identifier keywords in a space separated list.
///
/// `@none` anywhere empties the list and `@all` anywhere collapses it to
/// `@all`. Duplicates are dropped, first occurrence wins.
pub(crate) fn resolve_ids(raw: &str, source: &SourceId, form: Option<&str>) -> Vec<String> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();

    if tokens.contains(&keywords::NONE) {
        return Vec::new();
    }
    if tokens.contains(&keywords::ALL) {
        return vec![keywords::ALL.to_string()];
    }

    let mut ids: Vec<String> = Vec::with_capacity(tokens.len());
    for token in tokens {
        let id = match token {
            keywords::THIS => source.to_string(),
            keywords::FORM => match form {
                Some(form) => form.to_string(),
                None => {
                    warn!(source = %source, "@form used without a form id, ignored");
                    continue;
                }
            },
            other => other.to_string(),
        };
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

// ============================================================================
// Tests
// ============================================================================
