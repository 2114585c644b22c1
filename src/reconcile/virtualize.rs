//! Reading an existing live tree back as a virtual tree.
//!
//! Used to take over markup that was not rendered by this crate, such as
//! server output, before the first diff. Only text and element nodes are
//! read; attributes, namespaced attributes and styles become facts.
//! Properties and listeners cannot be recovered and are left out, so the
//! first diff re-applies them.

use tracing::trace;

use super::store::{Rendered, VNodeStore};
use crate::dom::{Document, NodeKind};
use crate::types::NodeId;
use crate::vdom::{Facts, Html, NsValue, element_from_parts, text};

/// Virtual tree for the subtree at `node`. Fragments and released nodes
/// yield `None`, and are skipped when they appear as children.
pub fn virtualize(doc: &Document, node: NodeId) -> Option<Html> {
    virtualize_with(doc, None, node, &mut |_, _| true)
}

/// [`virtualize`] that records every read node in `store`, and keeps only
/// the children `filter` accepts.
pub fn virtualize_into(
    doc: &mut Document,
    store: &mut dyn VNodeStore,
    node: NodeId,
    filter: &mut dyn FnMut(&Document, NodeId) -> bool,
) -> Option<Html> {
    let mut read = Vec::new();
    let vnode = virtualize_with(doc, Some(&mut read), node, filter)?;
    trace!(nodes = read.len(), "virtualized");
    for (id, html) in read {
        store.set(doc, id, Rendered::new(html));
    }
    Some(vnode)
}

fn virtualize_with(
    doc: &Document,
    mut read: Option<&mut Vec<(NodeId, Html)>>,
    node: NodeId,
    filter: &mut dyn FnMut(&Document, NodeId) -> bool,
) -> Option<Html> {
    let vnode = match doc.kind(node).ok()? {
        NodeKind::Text => text(doc.text(node)?),
        NodeKind::Fragment => return None,
        NodeKind::Element => {
            let mut facts = Facts::default();
            for (key, value) in doc.attributes(node) {
                facts.attributes.insert(key.to_owned(), value.to_owned());
            }
            for (namespace, key, value) in doc.attributes_ns(node) {
                facts.ns_attributes.insert(
                    key.to_owned(),
                    NsValue {
                        namespace: namespace.to_owned(),
                        value: value.to_owned(),
                    },
                );
            }
            for (key, value) in doc.styles(node) {
                facts.styles.insert(key.to_owned(), value.to_owned());
            }
            let mut children = Vec::new();
            for &child in doc.children(node) {
                if !filter(doc, child) {
                    continue;
                }
                if let Some(kid) = virtualize_with(doc, read.as_deref_mut(), child, filter) {
                    children.push(kid);
                }
            }
            element_from_parts(doc.tag(node)?, doc.namespace(node), facts, children)
        }
    };
    if let Some(read) = read {
        read.push((node, vnode.clone()));
    }
    Some(vnode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::store::SideTable;
    use crate::types::SVG_NAMESPACE;
    use crate::vdom::VNode;

    fn server_markup(doc: &mut Document) -> NodeId {
        let div = doc.create_element("div", None);
        doc.set_attribute(div, "id", "app").unwrap();
        doc.set_style(div, "color", "red").unwrap();
        let svg = doc.create_element("svg", Some(SVG_NAMESPACE));
        doc.set_attribute_ns(svg, "http://www.w3.org/1999/xlink", "href", "#a")
            .unwrap();
        let hello = doc.create_text("hello");
        doc.append_child(div, hello).unwrap();
        doc.append_child(div, svg).unwrap();
        div
    }

    #[test]
    fn test_virtualize_reads_facts_and_children() {
        let mut doc = Document::new();
        let div = server_markup(&mut doc);
        let vnode = virtualize(&doc, div).unwrap();

        let VNode::Element(el) = &*vnode else {
            panic!("expected an element, got {}", vnode.kind_name());
        };
        assert_eq!(el.tag, "div");
        assert_eq!(el.facts.attributes.get("id").map(String::as_str), Some("app"));
        assert_eq!(el.facts.styles.get("color").map(String::as_str), Some("red"));
        assert_eq!(el.children.len(), 2);
        assert_eq!(vnode.descendants(), 2);
        let VNode::Element(svg) = &*el.children[1] else {
            panic!("expected svg");
        };
        assert_eq!(svg.namespace.as_deref(), Some(SVG_NAMESPACE));
        assert_eq!(svg.facts.ns_attributes["href"].value, "#a");
    }

    #[test]
    fn test_virtualize_skips_fragments() {
        let mut doc = Document::new();
        let fragment = doc.create_fragment();
        assert!(virtualize(&doc, fragment).is_none());
    }

    #[test]
    fn test_virtualize_into_records_and_filters() {
        let mut doc = Document::new();
        let div = server_markup(&mut doc);
        let mut table = SideTable::new();
        let mut no_text = |doc: &Document, node: NodeId| !doc.is_text(node);
        let vnode = virtualize_into(&mut doc, &mut table, div, &mut no_text).unwrap();

        assert_eq!(vnode.descendants(), 1);
        assert!(table.get(&doc, div).is_some());
        let hello = doc.first_child(div).unwrap();
        assert!(table.get(&doc, hello).is_none());
        assert_eq!(table.len(), 2);
    }
}
