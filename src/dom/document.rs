//! Document - arena of live nodes.
//!
//! Manages the lifecycle of live nodes:
//! - Slot allocation with a free pool for O(1) reuse
//! - Generation bump on release, so stale `NodeId`s are detected
//! - Parent/child links with DOM-like insert, remove and replace
//! - Per-node attributes, styles, properties and listeners
//!
//! Every tree mutation reconciliation needs goes through here, so the whole
//! engine can be tested against the document without a browser.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::rc::Rc;

use tracing::trace;

use super::error::{DomError, DomResult};
use super::events::{DispatchContext, Listener};
use crate::types::{NodeId, normalize_namespace};

// =============================================================================
// Node Data
// =============================================================================

/// Value of a DOM property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Number(value)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::String(value.to_owned())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::String(value)
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Null => f.write_str("null"),
            PropValue::Bool(b) => write!(f, "{b}"),
            PropValue::Number(n) => write!(f, "{n}"),
            PropValue::String(s) => f.write_str(s),
        }
    }
}

/// What kind of node a slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Text,
    Element,
    Fragment,
}

#[derive(Default)]
struct ElementData {
    tag: String,
    namespace: Option<String>,
    attributes: BTreeMap<String, String>,
    /// Keyed by local name; the value carries its namespace.
    ns_attributes: BTreeMap<String, (String, String)>,
    styles: BTreeMap<String, String>,
    properties: BTreeMap<String, PropValue>,
    listeners: BTreeMap<String, Listener>,
}

enum NodeData {
    Text(String),
    Element(Box<ElementData>),
    Fragment,
}

struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
    dispatch: Option<Rc<DispatchContext>>,
    slot: Option<Rc<dyn Any>>,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            data,
            dispatch: None,
            slot: None,
        }
    }

    fn kind(&self) -> NodeKind {
        match self.data {
            NodeData::Text(_) => NodeKind::Text,
            NodeData::Element(_) => NodeKind::Element,
            NodeData::Fragment => NodeKind::Fragment,
        }
    }
}

struct Entry {
    generation: u32,
    node: Option<Node>,
}

// =============================================================================
// Document
// =============================================================================

/// Arena-backed live node tree.
///
/// Nodes are created detached. A node without a parent is a root; a
/// document may hold any number of roots at once.
#[derive(Default)]
pub struct Document {
    entries: Vec<Entry>,
    free: Vec<u32>,
    live: usize,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("live", &self.live)
            .field("capacity", &self.entries.len())
            .finish()
    }
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    // -------------------------------------------------------------------------
    // Allocation
    // -------------------------------------------------------------------------

    fn allocate(&mut self, data: NodeData) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.node = Some(Node::new(data));
            return NodeId::new(index, entry.generation);
        }
        let index = self.entries.len() as u32;
        self.entries.push(Entry {
            generation: 0,
            node: Some(Node::new(data)),
        });
        NodeId::new(index, 0)
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.allocate(NodeData::Text(text.into()))
    }

    /// Create an element. The XHTML namespace is stored as `None`.
    pub fn create_element(&mut self, tag: &str, namespace: Option<&str>) -> NodeId {
        self.allocate(NodeData::Element(Box::new(ElementData {
            tag: tag.to_owned(),
            namespace: normalize_namespace(namespace).map(str::to_owned),
            ..ElementData::default()
        })))
    }

    /// Create a fragment. Inserting a fragment moves its children instead.
    pub fn create_fragment(&mut self) -> NodeId {
        self.allocate(NodeData::Fragment)
    }

    /// Whether `id` still refers to a live node.
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.entries
            .get(id.index())
            .is_some_and(|e| e.generation == id.generation() && e.node.is_some())
    }

    fn node(&self, id: NodeId) -> DomResult<&Node> {
        match self.entries.get(id.index()) {
            Some(Entry {
                generation,
                node: Some(node),
            }) if *generation == id.generation() => Ok(node),
            _ => Err(DomError::StaleNode(id)),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> DomResult<&mut Node> {
        match self.entries.get_mut(id.index()) {
            Some(Entry {
                generation,
                node: Some(node),
            }) if *generation == id.generation() => Ok(node),
            _ => Err(DomError::StaleNode(id)),
        }
    }

    fn element(&self, id: NodeId) -> DomResult<&ElementData> {
        match &self.node(id)?.data {
            NodeData::Element(el) => Ok(el),
            _ => Err(DomError::WrongKind {
                node: id,
                expected: "an element",
            }),
        }
    }

    fn element_mut(&mut self, id: NodeId) -> DomResult<&mut ElementData> {
        match &mut self.node_mut(id)?.data {
            NodeData::Element(el) => Ok(el),
            _ => Err(DomError::WrongKind {
                node: id,
                expected: "an element",
            }),
        }
    }

    /// Detach `id` and release it together with its whole subtree.
    ///
    /// Every handle into the subtree becomes stale.
    pub fn discard(&mut self, id: NodeId) -> DomResult<()> {
        self.detach(id)?;
        self.release(id);
        Ok(())
    }

    fn release(&mut self, id: NodeId) {
        let Some(entry) = self.entries.get_mut(id.index()) else {
            return;
        };
        if entry.generation != id.generation() {
            return;
        }
        let Some(node) = entry.node.take() else {
            return;
        };
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(id.index() as u32);
        self.live -= 1;
        trace!(node = %id, "released");

        // Recursively release children
        for child in node.children {
            self.release(child);
        }
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn kind(&self, id: NodeId) -> DomResult<NodeKind> {
        Ok(self.node(id)?.kind())
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Ok(NodeKind::Text))
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Ok(NodeKind::Element))
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).ok().map(|el| el.tag.as_str())
    }

    pub fn namespace(&self, id: NodeId) -> Option<&str> {
        self.element(id).ok().and_then(|el| el.namespace.as_deref())
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).ok()?.data {
            NodeData::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) -> DomResult<()> {
        match &mut self.node_mut(id)?.data {
            NodeData::Text(current) => {
                *current = text.into();
                Ok(())
            }
            _ => Err(DomError::WrongKind {
                node: id,
                expected: "a text node",
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Navigation
    // -------------------------------------------------------------------------

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok()?.parent
    }

    /// Children of `id`, empty for stale nodes.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn child_at(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.children(id).get(index).copied()
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).first().copied()
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).last().copied()
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let at = siblings.iter().position(|&c| c == id)?;
        siblings.get(at + 1).copied()
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let at = siblings.iter().position(|&c| c == id)?;
        at.checked_sub(1).and_then(|i| siblings.get(i).copied())
    }

    /// Ancestors of `id`, nearest first, `id` included.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut cursor = self.is_alive(id).then_some(id);
        while let Some(node) = cursor {
            path.push(node);
            cursor = self.parent(node);
        }
        path
    }

    // -------------------------------------------------------------------------
    // Tree Mutation
    // -------------------------------------------------------------------------

    /// Remove `id` from its parent, if it has one.
    pub fn detach(&mut self, id: NodeId) -> DomResult<()> {
        let Some(parent) = self.node(id)?.parent else {
            return Ok(());
        };
        self.remove_child(parent, id)
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<()> {
        if self.node(child)?.parent != Some(parent) {
            return Err(DomError::NotAChild { parent, child });
        }
        let siblings = &mut self.node_mut(parent)?.children;
        siblings.retain(|&c| c != child);
        self.node_mut(child)?.parent = None;
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<()> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` before `reference`, or at the end when `reference` is
    /// `None`. A child that already has a parent is moved. Inserting a
    /// fragment moves the fragment's children and leaves it empty.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> DomResult<()> {
        if reference == Some(child) {
            return Ok(());
        }
        if let Some(reference) = reference {
            if self.node(reference)?.parent != Some(parent) {
                return Err(DomError::NotAChild {
                    parent,
                    child: reference,
                });
            }
        }
        if self.node(child)?.kind() == NodeKind::Fragment {
            let moved = std::mem::take(&mut self.node_mut(child)?.children);
            for node in moved {
                self.node_mut(node)?.parent = None;
                self.insert_one(parent, node, reference)?;
            }
            return Ok(());
        }
        self.insert_one(parent, child, reference)
    }

    fn insert_one(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> DomResult<()> {
        if self.ancestors(parent).contains(&child) {
            return Err(DomError::Hierarchy { parent, child });
        }
        self.detach(child)?;
        let siblings = &mut self.node_mut(parent)?.children;
        let at = reference
            .and_then(|r| siblings.iter().position(|&c| c == r))
            .unwrap_or(siblings.len());
        siblings.insert(at, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Put `new` where `old` is. `old` is detached but stays alive.
    pub fn replace_child(&mut self, parent: NodeId, new: NodeId, old: NodeId) -> DomResult<()> {
        if new == old {
            return Ok(());
        }
        if self.node(old)?.parent != Some(parent) {
            return Err(DomError::NotAChild { parent, child: old });
        }
        self.insert_before(parent, new, Some(old))?;
        self.remove_child(parent, old)
    }

    // -------------------------------------------------------------------------
    // Attributes, Styles, Properties
    // -------------------------------------------------------------------------

    pub fn attribute(&self, id: NodeId, key: &str) -> Option<&str> {
        self.element(id).ok()?.attributes.get(key).map(String::as_str)
    }

    pub fn attributes(&self, id: NodeId) -> impl Iterator<Item = (&str, &str)> {
        self.element(id)
            .ok()
            .into_iter()
            .flat_map(|el| el.attributes.iter())
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn set_attribute(&mut self, id: NodeId, key: &str, value: &str) -> DomResult<()> {
        self.element_mut(id)?
            .attributes
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: NodeId, key: &str) -> DomResult<()> {
        self.element_mut(id)?.attributes.remove(key);
        Ok(())
    }

    pub fn attribute_ns(&self, id: NodeId, namespace: &str, key: &str) -> Option<&str> {
        match self.element(id).ok()?.ns_attributes.get(key) {
            Some((ns, value)) if ns == namespace => Some(value),
            _ => None,
        }
    }

    /// Namespaced attributes as `(namespace, key, value)`.
    pub fn attributes_ns(&self, id: NodeId) -> impl Iterator<Item = (&str, &str, &str)> {
        self.element(id)
            .ok()
            .into_iter()
            .flat_map(|el| el.ns_attributes.iter())
            .map(|(k, (ns, v))| (ns.as_str(), k.as_str(), v.as_str()))
    }

    pub fn set_attribute_ns(
        &mut self,
        id: NodeId,
        namespace: &str,
        key: &str,
        value: &str,
    ) -> DomResult<()> {
        self.element_mut(id)?
            .ns_attributes
            .insert(key.to_owned(), (namespace.to_owned(), value.to_owned()));
        Ok(())
    }

    /// Remove a namespaced attribute. Only an attribute in `namespace` is
    /// removed.
    pub fn remove_attribute_ns(&mut self, id: NodeId, namespace: &str, key: &str) -> DomResult<()> {
        let attrs = &mut self.element_mut(id)?.ns_attributes;
        if attrs.get(key).is_some_and(|(ns, _)| ns == namespace) {
            attrs.remove(key);
        }
        Ok(())
    }

    pub fn style(&self, id: NodeId, key: &str) -> Option<&str> {
        self.element(id).ok()?.styles.get(key).map(String::as_str)
    }

    pub fn styles(&self, id: NodeId) -> impl Iterator<Item = (&str, &str)> {
        self.element(id)
            .ok()
            .into_iter()
            .flat_map(|el| el.styles.iter())
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn set_style(&mut self, id: NodeId, key: &str, value: &str) -> DomResult<()> {
        self.element_mut(id)?
            .styles
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    pub fn remove_style(&mut self, id: NodeId, key: &str) -> DomResult<()> {
        self.element_mut(id)?.styles.remove(key);
        Ok(())
    }

    pub fn property(&self, id: NodeId, key: &str) -> Option<&PropValue> {
        self.element(id).ok()?.properties.get(key)
    }

    pub fn set_property(&mut self, id: NodeId, key: &str, value: PropValue) -> DomResult<()> {
        self.element_mut(id)?
            .properties
            .insert(key.to_owned(), value);
        Ok(())
    }

    pub fn remove_property(&mut self, id: NodeId, key: &str) -> DomResult<()> {
        self.element_mut(id)?.properties.remove(key);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Listeners and Hidden Fields
    // -------------------------------------------------------------------------

    pub fn listener(&self, id: NodeId, event: &str) -> Option<&Listener> {
        self.element(id).ok()?.listeners.get(event)
    }

    pub fn listener_names(&self, id: NodeId) -> Vec<String> {
        self.element(id)
            .map(|el| el.listeners.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Register `listener` for `event`, replacing any previous one.
    pub fn add_listener(&mut self, id: NodeId, event: &str, listener: Listener) -> DomResult<()> {
        self.element_mut(id)?
            .listeners
            .insert(event.to_owned(), listener);
        Ok(())
    }

    pub fn remove_listener(&mut self, id: NodeId, event: &str) -> DomResult<Option<Listener>> {
        Ok(self.element_mut(id)?.listeners.remove(event))
    }

    /// Dispatch context a tagger attached to this node.
    pub fn dispatch_context(&self, id: NodeId) -> Option<Rc<DispatchContext>> {
        self.node(id).ok()?.dispatch.clone()
    }

    pub fn set_dispatch_context(
        &mut self,
        id: NodeId,
        context: Option<Rc<DispatchContext>>,
    ) -> DomResult<()> {
        self.node_mut(id)?.dispatch = context;
        Ok(())
    }

    /// Opaque per-node value. Released together with the node.
    pub fn slot(&self, id: NodeId) -> Option<Rc<dyn Any>> {
        self.node(id).ok()?.slot.clone()
    }

    pub fn set_slot(&mut self, id: NodeId, value: Option<Rc<dyn Any>>) -> DomResult<()> {
        self.node_mut(id)?.slot = value;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    /// Structural copy of the subtree at `id`, for comparisons.
    pub fn snapshot(&self, id: NodeId) -> Option<Snapshot> {
        let node = self.node(id).ok()?;
        let children = || {
            node.children
                .iter()
                .filter_map(|&c| self.snapshot(c))
                .collect::<Vec<_>>()
        };
        Some(match &node.data {
            NodeData::Text(text) => Snapshot::Text(text.clone()),
            NodeData::Fragment => Snapshot::Fragment(children()),
            NodeData::Element(el) => Snapshot::Element {
                tag: el.tag.clone(),
                namespace: el.namespace.clone(),
                attributes: el.attributes.clone(),
                ns_attributes: el.ns_attributes.clone(),
                styles: el.styles.clone(),
                properties: el.properties.clone(),
                listeners: el
                    .listeners
                    .iter()
                    .map(|(name, l)| (name.clone(), l.use_capture()))
                    .collect(),
                children: children(),
            },
        })
    }

    /// Serialize the subtree at `id` as markup.
    ///
    /// Styles are folded into a `style` attribute and properties are written
    /// as `.name="value"`. Intended for debugging and tests.
    pub fn to_markup(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_markup(id, &mut out);
        out
    }

    fn write_markup(&self, id: NodeId, out: &mut String) {
        let Ok(node) = self.node(id) else {
            return;
        };
        match &node.data {
            NodeData::Text(text) => out.push_str(&escape(text)),
            NodeData::Fragment => {
                for &child in &node.children {
                    self.write_markup(child, out);
                }
            }
            NodeData::Element(el) => {
                let _ = write!(out, "<{}", el.tag);
                for (key, value) in &el.attributes {
                    let _ = write!(out, " {key}=\"{}\"", escape(value));
                }
                for (key, (_, value)) in &el.ns_attributes {
                    let _ = write!(out, " {key}=\"{}\"", escape(value));
                }
                if !el.styles.is_empty() {
                    let style: Vec<String> =
                        el.styles.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                    let _ = write!(out, " style=\"{}\"", escape(&style.join("; ")));
                }
                for (key, value) in &el.properties {
                    let _ = write!(out, " .{key}=\"{}\"", escape(&value.to_string()));
                }
                out.push('>');
                for &child in &node.children {
                    self.write_markup(child, out);
                }
                let _ = write!(out, "</{}>", el.tag);
            }
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Owned, comparable copy of a live subtree.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Text(String),
    Element {
        tag: String,
        namespace: Option<String>,
        attributes: BTreeMap<String, String>,
        ns_attributes: BTreeMap<String, (String, String)>,
        styles: BTreeMap<String, String>,
        properties: BTreeMap<String, PropValue>,
        /// Event name and capture flag of every listener.
        listeners: Vec<(String, bool)>,
        children: Vec<Snapshot>,
    },
    Fragment(Vec<Snapshot>),
}
