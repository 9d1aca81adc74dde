//! In-memory document backed by a `kuchiki` tree.
//!
//! Markup is materialized with html5ever's tree builder. Removed and
//! replaced subtrees are released as soon as they are detached. An id index
//! over attached elements is rebuilt after every structural mutation.
//!
//! [`MemoryDocument`] is a cheap handle: clones share the same tree, so a
//! caller can keep one while the engine owns another.
//!
//! There is no script engine. Executed scripts are recorded in order and
//! optionally passed to a [`ScriptHook`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use kuchiki::NodeRef;
use kuchiki::traits::NodeIterator;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::{Error, Result};
use crate::markup;
use crate::protocol::InsertPosition;
use crate::protocol::request::params;

use super::Document;

// ============================================================================
// Types
// ============================================================================

/// Callback invoked for each executed inline script.
///
/// Receives the script source and the document it runs against. The
/// document lock is not held during the call.
pub type ScriptHook = Arc<dyn Fn(&str, &MemoryDocument) -> Result<()> + Send + Sync>;

// ============================================================================
// Tree
// ============================================================================

struct Tree {
    document: NodeRef,
    head: NodeRef,
    body: NodeRef,
    id_index: FxHashMap<String, NodeRef>,
    executed: Vec<String>,
    loaded: Vec<String>,
    location: Option<String>,
    view_state: Option<String>,
    mutations: usize,
}

// SAFETY: `NodeRef` is `Rc`-based. Every node reachable from a `Tree` is
// owned by it and only touched through the `Mutex` in `MemoryDocument`.
// No `NodeRef` is ever handed out of the lock, and nodes parsed for an
// operation are created and attached while the lock is held.
unsafe impl Send for Tree {}

impl Tree {
    fn parse(html: &str) -> Self {
        let document = markup::parse_document(html);
        let head = region(&document, "head");
        let body = region(&document, "body");

        let mut tree = Self {
            document,
            head,
            body,
            id_index: FxHashMap::default(),
            executed: Vec::new(),
            loaded: Vec::new(),
            location: None,
            view_state: None,
            mutations: 0,
        };
        tree.rebuild_id_index();
        tree
    }

    fn lookup(&self, id: &str) -> Result<NodeRef> {
        self.id_index
            .get(id)
            .cloned()
            .ok_or_else(|| Error::element_not_found(id))
    }

    /// First element in document order wins.
    fn rebuild_id_index(&mut self) {
        let mut next = FxHashMap::default();
        for element in self.document.descendants().elements() {
            let attributes = element.attributes.borrow();
            if let Some(id) = attributes.get("id").filter(|id| !id.is_empty()) {
                next.entry(id.to_string())
                    .or_insert_with(|| element.as_node().clone());
            }
        }
        self.id_index = next;
    }

    fn mutated(&mut self) {
        self.mutations += 1;
        self.rebuild_id_index();
    }

    fn replace_region(&mut self, region: &NodeRef, attrs: &[(String, String)], html: &str) {
        clear_children(region);
        if let Some(element) = region.as_element() {
            let mut attributes = element.attributes.borrow_mut();
            attributes.map.clear();
            for (name, value) in attrs {
                attributes.insert(name.as_str(), value.clone());
            }
        }
        for node in markup::parse_fragment(html) {
            region.append(node);
        }
        self.mutated();
    }
}

/// Finds `<head>` or `<body>`. The tree builder always creates both.
fn region(document: &NodeRef, name: &str) -> NodeRef {
    document
        .descendants()
        .elements()
        .find(|element| &*element.name.local == name)
        .map_or_else(|| document.clone(), |element| element.as_node().clone())
}

fn clear_children(node: &NodeRef) {
    while let Some(child) = node.first_child() {
        child.detach();
    }
}

fn attribute_of(node: &NodeRef, name: &str) -> Option<String> {
    let element = node.as_element()?;
    let attributes = element.attributes.borrow();
    attributes.get(name).map(str::to_string)
}

// ============================================================================
// MemoryDocument
// ============================================================================

/// In-memory [`Document`].
///
/// # Example
///
/// ```ignore
/// let doc = MemoryDocument::from_html(r#"<div id="panel">old</div>"#);
/// doc.clone().replace_content("panel", "new")?;
/// assert_eq!(doc.inner_html("panel").as_deref(), Some("new"));
/// ```
#[derive(Clone)]
pub struct MemoryDocument {
    tree: Arc<Mutex<Tree>>,
    script_hook: Option<ScriptHook>,
}

impl MemoryDocument {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::from_html("")
    }

    /// Parses a document. Fragments are placed in the body.
    #[must_use]
    pub fn from_html(html: &str) -> Self {
        Self {
            tree: Arc::new(Mutex::new(Tree::parse(html))),
            script_hook: None,
        }
    }

    /// Sets the callback invoked for executed inline scripts.
    #[inline]
    #[must_use]
    pub fn with_script_hook(mut self, hook: ScriptHook) -> Self {
        self.script_hook = Some(hook);
        self
    }

    /// Returns the markup of the element's children.
    #[must_use]
    pub fn inner_html(&self, id: &str) -> Option<String> {
        let tree = self.tree.lock();
        let node = tree.lookup(id).ok()?;
        Some(markup::to_html(&node.children().collect::<Vec<_>>()))
    }

    /// Returns the element's markup.
    #[must_use]
    pub fn outer_html(&self, id: &str) -> Option<String> {
        let tree = self.tree.lock();
        tree.lookup(id).ok().map(|node| node.to_string())
    }

    /// Returns an attribute of the element.
    #[must_use]
    pub fn attribute(&self, id: &str, name: &str) -> Option<String> {
        let tree = self.tree.lock();
        let node = tree.lookup(id).ok()?;
        attribute_of(&node, name)
    }

    /// Returns the ids of the element's child elements, in order.
    #[must_use]
    pub fn child_ids(&self, id: &str) -> Vec<String> {
        let tree = self.tree.lock();
        let Ok(node) = tree.lookup(id) else {
            return Vec::new();
        };
        node.children()
            .filter_map(|child| attribute_of(&child, "id"))
            .collect()
    }

    /// Returns the head's inner markup.
    #[must_use]
    pub fn head_html(&self) -> String {
        let tree = self.tree.lock();
        markup::to_html(&tree.head.children().collect::<Vec<_>>())
    }

    /// Returns the body's inner markup.
    #[must_use]
    pub fn body_html(&self) -> String {
        let tree = self.tree.lock();
        markup::to_html(&tree.body.children().collect::<Vec<_>>())
    }

    /// Returns an attribute of the body element.
    #[must_use]
    pub fn body_attribute(&self, name: &str) -> Option<String> {
        let tree = self.tree.lock();
        attribute_of(&tree.body, name)
    }

    /// Returns the whole document's markup.
    #[must_use]
    pub fn html(&self) -> String {
        self.tree.lock().document.to_string()
    }

    /// Returns executed inline scripts, in execution order.
    #[must_use]
    pub fn executed_scripts(&self) -> Vec<String> {
        self.tree.lock().executed.clone()
    }

    /// Returns loaded external script URLs, in load order.
    #[must_use]
    pub fn loaded_scripts(&self) -> Vec<String> {
        self.tree.lock().loaded.clone()
    }

    /// Returns the URL navigated to, if any.
    #[must_use]
    pub fn location(&self) -> Option<String> {
        self.tree.lock().location.clone()
    }

    /// Returns the last view-state token received.
    #[must_use]
    pub fn view_state(&self) -> Option<String> {
        self.tree.lock().view_state.clone()
    }

    /// Returns the number of structural mutations applied.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.tree.lock().mutations
    }

    /// Returns the number of nodes attached to the document.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.tree.lock().document.descendants().count()
    }
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tree = self.tree.lock();
        f.debug_struct("MemoryDocument")
            .field("nodes", &tree.document.descendants().count())
            .field("ids", &tree.id_index.len())
            .field("mutations", &tree.mutations)
            .finish()
    }
}

impl Document for MemoryDocument {
    fn contains(&self, id: &str) -> bool {
        self.tree.lock().id_index.contains_key(id)
    }

    fn replace_element(&mut self, id: &str, markup: &str) -> Result<()> {
        let mut tree = self.tree.lock();
        let target = tree.lookup(id)?;
        if target.parent().is_none() {
            return Err(Error::element_not_found(id));
        }

        for node in markup::parse_fragment(markup) {
            target.insert_before(node);
        }
        target.detach();
        tree.mutated();
        trace!(id, "Element replaced");
        Ok(())
    }

    fn replace_content(&mut self, id: &str, markup: &str) -> Result<()> {
        let mut tree = self.tree.lock();
        let target = tree.lookup(id)?;

        clear_children(&target);
        for node in markup::parse_fragment(markup) {
            target.append(node);
        }
        tree.mutated();
        trace!(id, "Content replaced");
        Ok(())
    }

    fn insert_adjacent(&mut self, anchor: &str, position: InsertPosition, markup: &str) -> Result<()> {
        let mut tree = self.tree.lock();
        let target = tree.lookup(anchor)?;
        if target.parent().is_none() {
            return Err(Error::element_not_found(anchor));
        }

        let nodes = markup::parse_fragment(markup);
        match position {
            InsertPosition::Before => {
                for node in nodes {
                    target.insert_before(node);
                }
            }
            InsertPosition::After => {
                let mut cursor = target;
                for node in nodes {
                    cursor.insert_after(node.clone());
                    cursor = node;
                }
            }
        }
        tree.mutated();
        trace!(anchor, %position, "Markup inserted");
        Ok(())
    }

    fn remove(&mut self, id: &str) -> bool {
        let mut tree = self.tree.lock();
        let Ok(target) = tree.lookup(id) else {
            return false;
        };
        target.detach();
        tree.mutated();
        trace!(id, "Element removed");
        true
    }

    fn set_attribute(&mut self, id: &str, name: &str, value: &str) -> Result<()> {
        let mut tree = self.tree.lock();
        let target = tree.lookup(id)?;
        let name = name.to_ascii_lowercase();

        if let Some(element) = target.as_element() {
            element
                .attributes
                .borrow_mut()
                .insert(name.as_str(), value.to_string());
        }
        tree.mutated();
        Ok(())
    }

    fn replace_head(&mut self, attrs: &[(String, String)], markup: &str) -> Result<()> {
        let mut tree = self.tree.lock();
        let head = tree.head.clone();
        tree.replace_region(&head, attrs, markup);
        trace!("Head replaced");
        Ok(())
    }

    fn replace_body(&mut self, attrs: &[(String, String)], markup: &str) -> Result<()> {
        let mut tree = self.tree.lock();
        let body = tree.body.clone();
        tree.replace_region(&body, attrs, markup);
        trace!("Body replaced");
        Ok(())
    }

    fn run_script(&mut self, code: &str) -> Result<()> {
        self.tree.lock().executed.push(code.to_string());
        match self.script_hook {
            Some(ref hook) => hook(code, self),
            None => Ok(()),
        }
    }

    fn load_script(&mut self, src: &str) -> Result<()> {
        self.tree.lock().loaded.push(src.to_string());
        Ok(())
    }

    fn navigate(&mut self, url: &str) -> Result<()> {
        self.tree.lock().location = Some(url.to_string());
        Ok(())
    }

    /// Also rewrites the value of every view-state hidden field.
    fn update_view_state(&mut self, token: &str) {
        let mut tree = self.tree.lock();
        tree.view_state = Some(token.to_string());

        for element in tree.document.descendants().elements() {
            let mut attributes = element.attributes.borrow_mut();
            if attributes.get("name") == Some(params::VIEW_STATE) {
                attributes.insert("value", token.to_string());
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
