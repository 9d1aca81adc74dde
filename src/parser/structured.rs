//! Structured strategy.
//!
//! Reads the payload with `quick-xml` into a small element tree, then maps
//! the top-level containers of `partial-response` to operations in
//! declaration order.

// ============================================================================
// Imports
// ============================================================================

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{ChangeSet, InsertPosition, Operation, ReservedIds};

use super::ParseStrategy;

// ============================================================================
// Constants
// ============================================================================

const ROOT: &str = "partial-response";

/// HTML elements whose text is not entity-decoded by an HTML parser.
const RAW_TEXT: &[&str] = &["script", "style"];

/// HTML elements without an end tag.
const VOID: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

// ============================================================================
// XmlElement
// ============================================================================

#[derive(Debug, Clone)]
enum XmlChild {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug, Clone)]
struct XmlElement {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<XmlChild>,
}

impl XmlElement {
    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| Error::malformed(format!("bad attribute in <{name}>: {e}")))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = match attr.unescape_value() {
                Ok(value) => value.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            attrs.push((key, value));
        }
        Ok(Self {
            name,
            attrs,
            children: Vec::new(),
        })
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|child| match child {
            XmlChild::Element(element) => Some(element),
            XmlChild::Text(_) => None,
        })
    }

    fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.name == name)
    }

    /// Character content, with nested elements re-serialized as markup.
    fn content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                XmlChild::Text(text) => out.push_str(text),
                XmlChild::Element(element) => element.write_markup(&mut out),
            }
        }
        out
    }

    /// Writes the element as HTML.
    ///
    /// Text inside raw-text elements is written as is; HTML would not
    /// decode entities there.
    fn write_markup(&self, out: &mut String) {
        let is = |tags: &[&str]| tags.iter().any(|tag| self.name.eq_ignore_ascii_case(tag));

        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attrs {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&value.replace('&', "&amp;").replace('"', "&quot;"));
            out.push('"');
        }
        out.push('>');
        if is(VOID) && self.children.is_empty() {
            return;
        }

        let raw_text = is(RAW_TEXT);
        for child in &self.children {
            match child {
                XmlChild::Text(text) if raw_text => out.push_str(text),
                XmlChild::Text(text) => out.push_str(
                    &text
                        .replace('&', "&amp;")
                        .replace('<', "&lt;")
                        .replace('>', "&gt;"),
                ),
                XmlChild::Element(element) => element.write_markup(out),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    fn required_id(&self) -> Result<&str> {
        self.attr("id")
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::structural(self.name.clone(), format!("<{}> without id", self.name)))
    }
}

// ============================================================================
// Tree Reading
// ============================================================================

fn read_tree(raw: &str) -> Result<XmlElement> {
    let mut reader = Reader::from_str(raw);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(XmlElement::from_start(&start)?),
            Ok(Event::Empty(start)) => {
                let element = XmlElement::from_start(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| Error::malformed("unexpected end tag"))?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(text)) => {
                let text = match text.unescape() {
                    Ok(text) => text.into_owned(),
                    Err(_) => String::from_utf8_lossy(&text).into_owned(),
                };
                push_text(&mut stack, text)?;
            }
            Ok(Event::CData(data)) => {
                push_text(&mut stack, String::from_utf8_lossy(&data).into_owned())?;
            }
            Ok(Event::Eof) => break,
            // Declarations, comments, processing instructions, doctype.
            Ok(_) => {}
            Err(e) => {
                return Err(Error::malformed(format!(
                    "{e} at position {}",
                    reader.error_position()
                )));
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(Error::malformed(format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| Error::malformed("no root element"))
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlChild::Element(element));
        return Ok(());
    }
    if root.is_some() {
        return Err(Error::malformed("multiple root elements"));
    }
    *root = Some(element);
    Ok(())
}

fn push_text(stack: &mut [XmlElement], text: String) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            if let Some(XmlChild::Text(prev)) = parent.children.last_mut() {
                prev.push_str(&text);
            } else {
                parent.children.push(XmlChild::Text(text));
            }
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(Error::malformed("content outside the root element")),
    }
}

// ============================================================================
// Mapping
// ============================================================================

fn map_changes(changes: &XmlElement, out: &mut ChangeSet) -> Result<()> {
    for node in changes.elements() {
        match node.name.as_str() {
            "update" => out.push(Operation::Update {
                target: node.required_id()?.to_string(),
                markup: node.content(),
            }),
            "insert" => out.push(map_insert(node)?),
            "delete" => out.push(Operation::Delete {
                target: node.required_id()?.to_string(),
            }),
            "attributes" => {
                let target = node.required_id()?;
                for attribute in node.elements().filter(|e| e.name == "attribute") {
                    let name = attribute.attr("name").ok_or_else(|| {
                        Error::structural("attributes", format!("attribute without name on {target}"))
                    })?;
                    out.push(Operation::Attribute {
                        target: target.to_string(),
                        name: name.to_string(),
                        value: attribute.attr("value").unwrap_or_default().to_string(),
                    });
                }
            }
            "eval" => out.push(Operation::Eval {
                code: node.content(),
            }),
            "extension" => {}
            other => debug!(element = other, "Ignoring unknown change element"),
        }
    }
    Ok(())
}

/// Maps both insert forms.
///
/// Short: `<insert id="new" before="anchor">markup</insert>`.
/// Long: `<insert><after id="anchor">markup</after></insert>`.
fn map_insert(node: &XmlElement) -> Result<Operation> {
    let id = node.attr("id").filter(|id| !id.is_empty()).map(str::to_string);

    for (key, position) in [("before", InsertPosition::Before), ("after", InsertPosition::After)] {
        if let Some(anchor) = node.attr(key).filter(|a| !a.is_empty()) {
            return Ok(Operation::Insert {
                id,
                position,
                anchor: anchor.to_string(),
                markup: node.content(),
            });
        }
    }

    for (key, position) in [("before", InsertPosition::Before), ("after", InsertPosition::After)] {
        if let Some(child) = node.child(key)
            && let Some(anchor) = child.attr("id").filter(|a| !a.is_empty())
        {
            return Ok(Operation::Insert {
                id,
                position,
                anchor: anchor.to_string(),
                markup: child.content(),
            });
        }
    }

    Err(Error::structural(
        id.unwrap_or_else(|| "insert".to_string()),
        "insert has neither a before nor an after anchor",
    ))
}

fn map_error(node: &XmlElement) -> Operation {
    let text = |name: &str| node.child(name).map(XmlElement::content).unwrap_or_default();
    Operation::Error {
        name: text("error-name").trim().to_string(),
        message: text("error-message"),
    }
}

// ============================================================================
// StructuredStrategy
// ============================================================================

/// Primary strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredStrategy;

impl ParseStrategy for StructuredStrategy {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn parse(&self, raw: &str, _reserved: &ReservedIds) -> Result<ChangeSet> {
        let root = read_tree(raw)?;
        if root.name != ROOT {
            return Err(Error::malformed(format!(
                "expected <{ROOT}> root, found <{}>",
                root.name
            )));
        }

        let mut changes = ChangeSet::new();
        changes.response_id = root.attr("id").map(str::to_string);

        for node in root.elements() {
            match node.name.as_str() {
                "changes" => map_changes(node, &mut changes)?,
                "error" => changes.push(map_error(node)),
                "redirect" => {
                    let url = node.attr("url").filter(|u| !u.is_empty()).ok_or_else(|| {
                        Error::structural("redirect", "redirect without url")
                    })?;
                    changes.push(Operation::Redirect {
                        url: url.to_string(),
                    });
                }
                "extension" => {}
                other => debug!(element = other, "Ignoring unknown response element"),
            }
        }

        Ok(changes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<ChangeSet> {
        StructuredStrategy.parse(raw, &ReservedIds::default())
    }

    #[test]
    fn test_operations_keep_declaration_order() {
        let changes = parse(concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<partial-response id="j_id1"><changes>"#,
            r#"<update id="changesArea"><![CDATA[X]]></update>"#,
            r#"<insert id="i1" before="changesArea"><![CDATA[Y]]></insert>"#,
            r#"<insert id="i2" after="changesArea"><![CDATA[Z]]></insert>"#,
            r#"<delete id="gone"/>"#,
            r#"<attributes id="in"><attribute name="a" value="1"/><attribute name="a" value="2"/></attributes>"#,
            r#"<extension ln="x">ignored</extension>"#,
            r#"<eval><![CDATA[done()]]></eval>"#,
            r#"</changes></partial-response>"#
        ))
        .expect("parse");

        assert_eq!(changes.response_id.as_deref(), Some("j_id1"));
        let kinds: Vec<_> = changes.operations().iter().map(Operation::kind).collect();
        assert_eq!(
            kinds,
            vec!["update", "insert", "insert", "delete", "attributes", "attributes", "eval"]
        );
        assert_eq!(
            changes.operations()[1],
            Operation::Insert {
                id: Some("i1".into()),
                position: InsertPosition::Before,
                anchor: "changesArea".into(),
                markup: "Y".into(),
            }
        );
    }

    #[test]
    fn test_long_form_insert() {
        let changes = parse(
            r#"<partial-response><changes><insert><after id="row2"><![CDATA[<tr id="row3"/>]]></after></insert></changes></partial-response>"#,
        )
        .expect("parse");
        assert_eq!(
            changes.operations(),
            &[Operation::Insert {
                id: None,
                position: InsertPosition::After,
                anchor: "row2".into(),
                markup: r#"<tr id="row3"/>"#.into(),
            }]
        );
    }

    #[test]
    fn test_insert_without_anchor_is_structural() {
        let err = parse(r#"<partial-response><changes><insert id="x">m</insert></changes></partial-response>"#)
            .expect_err("no anchor");
        assert!(matches!(err, Error::Structural { .. }));
        assert_eq!(
            err.to_string(),
            "Structural error in x: insert has neither a before nor an after anchor"
        );
    }

    #[test]
    fn test_error_container() {
        let changes = parse(concat!(
            "<partial-response><error><error-name>E1</error-name>",
            "<error-message><![CDATA[boom]]></error-message></error>",
            "<error><error-name>E2</error-name></error></partial-response>"
        ))
        .expect("parse");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.error(), Some(("E1", "boom")));
    }

    #[test]
    fn test_redirect() {
        let changes = parse(r#"<partial-response><redirect url="/login.xhtml"/></partial-response>"#)
            .expect("parse");
        assert_eq!(
            changes.operations(),
            &[Operation::Redirect {
                url: "/login.xhtml".into()
            }]
        );
    }

    #[test]
    fn test_nested_well_formed_markup_is_reserialized() {
        let changes = parse(
            r#"<partial-response><changes><update id="p"><div id="p" class="a">x &amp; y</div></update></changes></partial-response>"#,
        )
        .expect("parse");
        assert_eq!(
            changes.operations()[0],
            Operation::Update {
                target: "p".into(),
                markup: r#"<div id="p" class="a">x &amp; y</div>"#.into(),
            }
        );
    }

    #[test]
    fn test_nested_script_text_is_not_escaped() {
        let changes = parse(concat!(
            r#"<partial-response><changes><update id="p">"#,
            "<div><script>if (a &amp;&amp; b &lt; c) go()</script><br/><span/></div>",
            "</update></changes></partial-response>"
        ))
        .expect("parse");
        assert_eq!(
            changes.operations()[0],
            Operation::Update {
                target: "p".into(),
                markup: "<div><script>if (a && b < c) go()</script><br><span></span></div>".into(),
            }
        );
    }

    #[test]
    fn test_wrong_root() {
        assert!(parse("<html><body/></html>").is_err());
    }

    #[test]
    fn test_mismatched_tags() {
        assert!(parse("<partial-response><changes></partial-response>").is_err());
    }

    #[test]
    fn test_text_outside_root() {
        assert!(parse(">>>> xxxx >YYYY-!->>>").is_err());
    }
}
