//! Side tables - which virtual node a live node was last rendered from.
//!
//! The morph engine reads the previous virtual node of every live node it
//! visits. Two strategies are provided:
//!
//! - [`SideTable`]: a map keyed by `NodeId`. Entries never keep a node
//!   alive; a released node's entry is unreachable (its generation is gone)
//!   and is dropped by periodic pruning.
//! - [`NodeSlot`]: stores the record in the node's own hidden slot, so it is
//!   released together with the node.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::{trace, warn};

use crate::dom::{DispatchContext, Document};
use crate::types::{Key, NodeId};
use crate::vdom::Html;

/// What the morph engine remembers about a live node.
#[derive(Clone, Debug)]
pub struct Rendered {
    pub vnode: Html,
    /// Key under which the node sits in a keyed parent.
    pub key: Option<Key>,
    /// Set when the node is the expansion of a lazy node.
    pub lazy: Option<LazyMark>,
}

impl Rendered {
    pub fn new(vnode: Html) -> Self {
        Self {
            vnode,
            key: None,
            lazy: None,
        }
    }
}

/// The lazy node a live node was expanded from, and the dispatch context
/// its listeners were bound under.
#[derive(Clone, Debug)]
pub struct LazyMark {
    pub vnode: Html,
    pub context: Rc<DispatchContext>,
}

/// O(1) association from live nodes to their last [`Rendered`] record.
pub trait VNodeStore {
    fn get(&self, doc: &Document, node: NodeId) -> Option<Rendered>;
    fn set(&mut self, doc: &mut Document, node: NodeId, rendered: Rendered);
    fn delete(&mut self, doc: &mut Document, node: NodeId);
}

const PRUNE_FLOOR: usize = 64;

/// Map-backed store.
#[derive(Debug, Default)]
pub struct SideTable {
    entries: HashMap<NodeId, Rendered>,
    watermark: usize,
}

impl SideTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries whose node has been released.
    pub fn prune(&mut self, doc: &Document) {
        let before = self.entries.len();
        self.entries.retain(|&node, _| doc.is_alive(node));
        trace!(before, after = self.entries.len(), "side table pruned");
    }
}

impl VNodeStore for SideTable {
    fn get(&self, doc: &Document, node: NodeId) -> Option<Rendered> {
        if !doc.is_alive(node) {
            return None;
        }
        self.entries.get(&node).cloned()
    }

    fn set(&mut self, doc: &mut Document, node: NodeId, rendered: Rendered) {
        self.entries.insert(node, rendered);
        if self.entries.len() > (2 * self.watermark).max(PRUNE_FLOOR) {
            self.prune(doc);
            self.watermark = self.entries.len();
        }
    }

    fn delete(&mut self, _doc: &mut Document, node: NodeId) {
        self.entries.remove(&node);
    }
}

/// Store that keeps each record in the node's hidden slot.
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeSlot;

impl VNodeStore for NodeSlot {
    fn get(&self, doc: &Document, node: NodeId) -> Option<Rendered> {
        let slot = doc.slot(node)?;
        slot.downcast::<Rendered>().ok().map(|r| (*r).clone())
    }

    fn set(&mut self, doc: &mut Document, node: NodeId, rendered: Rendered) {
        if let Err(err) = doc.set_slot(node, Some(Rc::new(rendered))) {
            warn!(%err, "could not record rendered node");
        }
    }

    fn delete(&mut self, doc: &mut Document, node: NodeId) {
        // A stale node has no slot left to clear.
        let _ = doc.set_slot(node, None);
    }
}
