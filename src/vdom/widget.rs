//! Custom nodes - user-supplied render and diff.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::dom::{DomResult, Document};
use crate::types::NodeId;

/// Renderer for a custom node.
///
/// Two custom nodes are only diffed against each other when they share the
/// same widget (`Rc::ptr_eq`); otherwise the node is redrawn.
pub trait Widget {
    /// Build the live node for `model`.
    fn render(&self, doc: &mut Document, model: &dyn Any) -> NodeId;

    /// Changes needed to go from `old` to `new`, or `None` if the rendered
    /// node is already up to date.
    fn diff(&self, old: &dyn Any, new: &dyn Any) -> Option<WidgetPatch>;
}

/// Deferred update produced by [`Widget::diff`].
///
/// The patch receives the live node and returns the node that should stand
/// in its place. It may update the node in place and return it, or build a
/// replacement and return that. A replacement must be left detached; the
/// engine gives it the node's facts and swaps it in for the old node.
#[derive(Clone)]
pub struct WidgetPatch(Rc<dyn Fn(&mut Document, NodeId) -> DomResult<NodeId>>);

impl WidgetPatch {
    pub fn new(apply: impl Fn(&mut Document, NodeId) -> DomResult<NodeId> + 'static) -> Self {
        Self(Rc::new(apply))
    }

    pub fn apply(&self, doc: &mut Document, node: NodeId) -> DomResult<NodeId> {
        (self.0)(doc, node)
    }
}

impl fmt::Debug for WidgetPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WidgetPatch(..)")
    }
}
