//! Foreign nodes - live nodes the morph engine did not render.

use tracing::debug;

use crate::dom::Document;
use crate::types::NodeId;
use crate::vdom::VNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignAction {
    /// Leave the node where it is and skip it.
    Keep,
    /// Treat the node as the rendering of the expected virtual node; the
    /// expected node is consumed without being rendered.
    Adopt,
    /// Discard the node.
    Remove,
}

/// Decides what to do with a live child that has no rendered record.
///
/// `expected` is the virtual node the engine would reconcile next and
/// `previous` the one it saw at the same position last pass. In keyed
/// children the position counts recorded and adopted children before the
/// node.
pub trait ForeignHandler {
    fn handle(
        &mut self,
        doc: &Document,
        node: NodeId,
        expected: Option<&VNode>,
        previous: Option<&VNode>,
    ) -> ForeignAction;
}

impl<F> ForeignHandler for F
where
    F: FnMut(&Document, NodeId, Option<&VNode>, Option<&VNode>) -> ForeignAction,
{
    fn handle(
        &mut self,
        doc: &Document,
        node: NodeId,
        expected: Option<&VNode>,
        previous: Option<&VNode>,
    ) -> ForeignAction {
        self(doc, node, expected, previous)
    }
}

/// Handles the `<font>` wrappers page translators put around text.
///
/// A wrapper standing in for unchanged text is adopted, so the translated
/// text stays. Any other `<font>` is removed. Everything else is kept.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultForeignHandler;

impl ForeignHandler for DefaultForeignHandler {
    fn handle(
        &mut self,
        doc: &Document,
        node: NodeId,
        expected: Option<&VNode>,
        previous: Option<&VNode>,
    ) -> ForeignAction {
        if !doc.tag(node).is_some_and(|t| t.eq_ignore_ascii_case("font")) {
            return ForeignAction::Keep;
        }
        match (expected, previous) {
            (Some(VNode::Text(e)), Some(VNode::Text(p))) if e == p => ForeignAction::Adopt,
            _ => {
                debug!(node = %node, "removing foreign font wrapper");
                ForeignAction::Remove
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vdom::text;

    #[test]
    fn test_default_handler() {
        let mut doc = Document::new();
        let font = doc.create_element("FONT", None);
        let widget = doc.create_element("div", None);
        let mut handler = DefaultForeignHandler;

        let hello = text("hello");
        let bye = text("bye");
        assert_eq!(
            handler.handle(&doc, font, Some(&*hello), Some(&*hello)),
            ForeignAction::Adopt
        );
        assert_eq!(
            handler.handle(&doc, font, Some(&*bye), Some(&*hello)),
            ForeignAction::Remove
        );
        assert_eq!(handler.handle(&doc, font, None, None), ForeignAction::Remove);
        assert_eq!(handler.handle(&doc, widget, None, None), ForeignAction::Keep);
    }

    #[test]
    fn test_closure_handler() {
        let mut doc = Document::new();
        let node = doc.create_text("x");
        let mut remove_all = |_: &Document, _: NodeId, _: Option<&VNode>, _: Option<&VNode>| {
            ForeignAction::Remove
        };
        assert_eq!(remove_all.handle(&doc, node, None, None), ForeignAction::Remove);
    }
}
