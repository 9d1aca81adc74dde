//! HTML fragment handling.
//!
//! The markup carried by `update` and `insert` operations is HTML, not XML,
//! and is frequently not well formed. Fragments go through `kuchiki`
//! (html5ever's tree builder), which never fails: malformed input is
//! repaired the way a browser repairs it.
//!
//! Fragments are parsed in a `template` context, so table rows and cells
//! survive on their own instead of being dropped for lacking a table.
//!
//! Section extraction (`head`, `body`) from whole-document payloads works on
//! the raw text, since a full parse would synthesize the sections.

// ============================================================================
// Imports
// ============================================================================

use std::sync::LazyLock;

use html5ever::{LocalName, Namespace, QualName};
use kuchiki::NodeRef;
use kuchiki::traits::{NodeIterator, TendrilSink};
use regex::Regex;

// ============================================================================
// Constants
// ============================================================================

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Context element for fragment parsing.
const FRAGMENT_CONTEXT: &str = "template";

/// Script `type` values that are executed.
const SCRIPT_TYPES: &[&str] = &[
    "",
    "text/javascript",
    "application/javascript",
    "text/ecmascript",
    "application/ecmascript",
    "module",
];

static HEAD_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<head(?:\s[^>]*)?>").expect("valid regex"));
static HEAD_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)</head\s*>").expect("valid regex"));
static BODY_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<body(?:\s[^>]*)?>").expect("valid regex"));
static BODY_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)</body\s*>").expect("valid regex"));

// ============================================================================
// Parsing
// ============================================================================

/// Parses a markup fragment into detached top-level nodes.
#[must_use]
pub fn parse_fragment(html: &str) -> Vec<NodeRef> {
    let context = QualName::new(
        None,
        Namespace::from(HTML_NAMESPACE),
        LocalName::from(FRAGMENT_CONTEXT),
    );
    let document = kuchiki::parse_fragment(context, Vec::new()).one(html);

    // Fragment content sits under a synthetic <html> root.
    let root = document.first_child().unwrap_or(document);
    let nodes: Vec<NodeRef> = root.children().collect();
    for node in &nodes {
        node.detach();
    }
    nodes
}

/// Parses a whole document.
#[must_use]
pub fn parse_document(html: &str) -> NodeRef {
    kuchiki::parse_html().one(html)
}

/// Serializes nodes back to markup.
#[must_use]
pub fn to_html<'a>(nodes: impl IntoIterator<Item = &'a NodeRef>) -> String {
    nodes.into_iter().map(NodeRef::to_string).collect()
}

/// Returns the id of the only significant node, if that node is an element.
///
/// Comments and whitespace-only text are not significant.
#[must_use]
pub fn sole_element_id(nodes: &[NodeRef]) -> Option<String> {
    let mut significant = nodes.iter().filter(|node| match node.as_text() {
        Some(text) => !text.borrow().trim().is_empty(),
        None => node.as_element().is_some(),
    });

    let only = significant.next()?;
    if significant.next().is_some() {
        return None;
    }
    let element = only.as_element()?;
    let attributes = element.attributes.borrow();
    attributes.get("id").map(str::to_string)
}

// ============================================================================
// Scripts
// ============================================================================

/// A script found in markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    /// Inline script source.
    Inline(String),
    /// External script URL.
    External(String),
}

/// Collects executable scripts in document order.
#[must_use]
pub fn collect_scripts(nodes: &[NodeRef]) -> Vec<Script> {
    let mut scripts = Vec::new();

    for script in nodes
        .iter()
        .flat_map(|node| node.inclusive_descendants().elements())
        .filter(|element| &*element.name.local == "script")
    {
        let attributes = script.attributes.borrow();
        let kind = attributes
            .get("type")
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if !SCRIPT_TYPES.contains(&kind.as_str()) {
            continue;
        }

        if let Some(src) = attributes
            .get("src")
            .map(str::trim)
            .filter(|src| !src.is_empty())
        {
            scripts.push(Script::External(src.to_string()));
            continue;
        }

        drop(attributes);
        let code = script.text_contents();
        let code = strip_comment_wrapper(&code);
        if !code.trim().is_empty() {
            scripts.push(Script::Inline(code.to_string()));
        }
    }

    scripts
}

/// Strips a legacy `<!-- ... -->` or CDATA wrapper around inline script.
fn strip_comment_wrapper(code: &str) -> &str {
    let trimmed = code.trim();
    for (open, close) in [("<!--", "-->"), ("<![CDATA[", "]]>")] {
        if let Some(inner) = trimmed
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
        {
            return inner;
        }
    }
    code
}

// ============================================================================
// Section Extraction
// ============================================================================

/// Named document section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionTag {
    /// `<head>`.
    Head,
    /// `<body>`.
    Body,
}

impl SectionTag {
    /// Tag name.
    #[inline]
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Head => "head",
            Self::Body => "body",
        }
    }
}

/// A section extracted from whole-document markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Attributes of the section's start tag, sorted by name.
    pub attrs: Vec<(String, String)>,
    /// Raw markup between start and end tag.
    pub inner: String,
}

/// Extracts `<head>` or `<body>` from a whole-document payload.
///
/// Tolerates arbitrary surrounding and nested markup: the first start tag
/// and the last end tag delimit the section. A missing end tag extends the
/// section to the end of input.
#[must_use]
pub fn extract_section(markup: &str, tag: SectionTag) -> Option<Section> {
    let (start_re, end_re) = match tag {
        SectionTag::Head => (&*HEAD_START, &*HEAD_END),
        SectionTag::Body => (&*BODY_START, &*BODY_END),
    };

    let start = start_re.find(markup)?;
    let inner_start = start.end();
    let inner_end = end_re
        .find_iter(&markup[inner_start..])
        .last()
        .map_or(markup.len(), |m| inner_start + m.start());

    Some(Section {
        attrs: start_tag_attributes(start.as_str(), tag),
        inner: markup[inner_start..inner_end].to_string(),
    })
}

/// Reads the attributes of a lone `<head ...>` / `<body ...>` start tag.
fn start_tag_attributes(start_tag: &str, tag: SectionTag) -> Vec<(String, String)> {
    let document = parse_document(start_tag);
    let Some(element) = document
        .descendants()
        .elements()
        .find(|element| &*element.name.local == tag.name())
    else {
        return Vec::new();
    };

    let attributes = element.attributes.borrow();
    attributes
        .map
        .iter()
        .map(|(name, attribute)| (name.local.to_string(), attribute.value.clone()))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(node: &NodeRef) -> String {
        node.as_element()
            .map(|element| element.name.local.to_string())
            .unwrap_or_default()
    }

    #[test]
    fn test_parse_nested_elements() {
        let nodes = parse_fragment(r#"<div id="a" class='x'><span>hi</span><br>there</div>"#);
        assert_eq!(nodes.len(), 1);
        assert_eq!(tag(&nodes[0]), "div");
        assert!(nodes[0].parent().is_none());

        let children: Vec<NodeRef> = nodes[0].children().collect();
        assert_eq!(children.len(), 3);
        assert_eq!(tag(&children[1]), "br");
        assert_eq!(children[2].text_contents(), "there");
    }

    #[test]
    fn test_unclosed_and_stray_tags() {
        let nodes = parse_fragment("<div><p>one</span>two");
        assert_eq!(to_html(&nodes), "<div><p>onetwo</p></div>");
    }

    #[test]
    fn test_table_rows_parse_standalone() {
        let nodes = parse_fragment(r#"<tr id="row1"><td>1</td></tr>"#);
        assert_eq!(sole_element_id(&nodes).as_deref(), Some("row1"));
        assert_eq!(to_html(&nodes), r#"<tr id="row1"><td>1</td></tr>"#);
    }

    #[test]
    fn test_script_body_is_raw() {
        let nodes = parse_fragment("<script>if (a < b && c) { x = '</div>'; }</script>");
        assert_eq!(
            collect_scripts(&nodes),
            vec![Script::Inline("if (a < b && c) { x = '</div>'; }".into())]
        );
    }

    #[test]
    fn test_collect_scripts() {
        let nodes = parse_fragment(concat!(
            "<div><script>a()</script>",
            "<script type=\"text/template\">skip</script>",
            "<script src=\"/lib.js\"></script>",
            "<p><script><!-- b() --></script></p></div>"
        ));
        assert_eq!(
            collect_scripts(&nodes),
            vec![
                Script::Inline("a()".into()),
                Script::External("/lib.js".into()),
                Script::Inline(" b() ".into()),
            ]
        );
    }

    #[test]
    fn test_sole_element_id() {
        assert_eq!(
            sole_element_id(&parse_fragment("  <!-- c --><div id=\"p\">x</div>\n")).as_deref(),
            Some("p")
        );
        assert_eq!(sole_element_id(&parse_fragment("<div id=\"p\"></div>text")), None);
        assert_eq!(sole_element_id(&parse_fragment("plain")), None);
    }

    #[test]
    fn test_round_trip_serialization() {
        let html = r#"<ul id="list"><li class="a">1 &amp; 2</li><li>x<br></li></ul>"#;
        assert_eq!(to_html(&parse_fragment(html)), html);
    }

    #[test]
    fn test_entities_decoded() {
        let nodes = parse_fragment("a &lt;b&gt; &#65;&#x42;");
        assert_eq!(nodes[0].text_contents(), "a <b> AB");
    }

    #[test]
    fn test_extract_body_from_malformed_document() {
        let markup = "<html><head><title>t</title></head><body class=\"main\" onload='init()'>\
                      <div>unclosed<p>para</body></html>";
        let section = extract_section(markup, SectionTag::Body).expect("body");
        assert_eq!(section.inner, "<div>unclosed<p>para");
        assert_eq!(
            section.attrs,
            vec![
                ("class".to_string(), "main".to_string()),
                ("onload".to_string(), "init()".to_string())
            ]
        );

        let head = extract_section(markup, SectionTag::Head).expect("head");
        assert_eq!(head.inner, "<title>t</title>");
    }

    #[test]
    fn test_extract_missing_section() {
        assert!(extract_section("<div>no body</div>", SectionTag::Body).is_none());
    }

    #[test]
    fn test_body_start_does_not_match_bodyguard() {
        assert!(extract_section("<bodyguard>x</bodyguard>", SectionTag::Body).is_none());
    }
}
