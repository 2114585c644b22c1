//! Rendering virtual nodes into the document, and applying facts.

use std::rc::Rc;

use tracing::trace;

use crate::dom::{DispatchContext, DomResult, Document, EventHandler, Listener};
use crate::types::NodeId;
use crate::vdom::{Facts, FactsDiff, FactKinds, Html, NsChange, VNode, unwrap_taggers};

/// Build a fresh live subtree for `vnode`. Listeners are bound under
/// `context`, or under a tagger's context inside a tagger.
pub fn render(doc: &mut Document, vnode: &Html, context: &Rc<DispatchContext>) -> DomResult<NodeId> {
    let id = match &**vnode {
        VNode::Lazy(l) => {
            let expansion = l.force().clone();
            return render(doc, &expansion, context);
        }
        VNode::Tagger(_) => {
            let (mappers, inner) = unwrap_taggers(vnode);
            let sub = DispatchContext::tagged(mappers, context.clone());
            let id = render(doc, inner, &sub)?;
            doc.set_dispatch_context(id, Some(sub))?;
            return Ok(id);
        }
        VNode::Text(text) => doc.create_text(text.as_str()),
        VNode::Custom(c) => {
            let id = c.widget.render(doc, &*c.model);
            apply_facts(doc, id, context, &c.facts)?;
            id
        }
        VNode::Element(el) => {
            let id = doc.create_element(&el.tag, el.namespace.as_deref());
            apply_facts(doc, id, context, &el.facts)?;
            for child in &el.children {
                let child = render(doc, child, context)?;
                doc.append_child(id, child)?;
            }
            id
        }
        VNode::Keyed(el) => {
            let id = doc.create_element(&el.tag, el.namespace.as_deref());
            apply_facts(doc, id, context, &el.facts)?;
            for (_, child) in &el.children {
                let child = render(doc, child, context)?;
                doc.append_child(id, child)?;
            }
            id
        }
    };
    Ok(id)
}

// =============================================================================
// Facts
// =============================================================================

/// Register `handler` for `event`. An existing registration of the same
/// kind and capture flag only swaps its decoder; with `relink` it is also
/// moved under `context`.
pub(crate) fn bind_event(
    doc: &mut Document,
    node: NodeId,
    event: &str,
    handler: &EventHandler,
    context: &Rc<DispatchContext>,
    relink: bool,
) -> DomResult<()> {
    if let Some(existing) = doc.listener(node, event).cloned() {
        if existing.handler().same_registration(handler) {
            existing.set_handler(handler.clone());
            if relink {
                existing.set_context(context.clone());
            }
            return Ok(());
        }
    }
    trace!(node = %node, event, "listener registered");
    doc.add_listener(node, event, Listener::new(handler.clone(), context.clone()))
}

/// Apply a full fact table to a fresh node.
pub(crate) fn apply_facts(
    doc: &mut Document,
    node: NodeId,
    context: &Rc<DispatchContext>,
    facts: &Facts,
) -> DomResult<()> {
    for (event, handler) in &facts.events {
        bind_event(doc, node, event, handler, context, false)?;
    }
    for (key, value) in &facts.styles {
        doc.set_style(node, key, value)?;
    }
    for (key, value) in &facts.properties {
        doc.set_property(node, key, value.clone())?;
    }
    for (key, value) in &facts.attributes {
        doc.set_attribute(node, key, value)?;
    }
    for (key, ns) in &facts.ns_attributes {
        doc.set_attribute_ns(node, &ns.namespace, key, &ns.value)?;
    }
    Ok(())
}

/// Apply a fact diff to a live node.
pub(crate) fn apply_facts_diff(
    doc: &mut Document,
    node: NodeId,
    context: &Rc<DispatchContext>,
    diff: &FactsDiff,
) -> DomResult<()> {
    let kinds = diff.kinds();
    if kinds.contains(FactKinds::EVENTS) {
        for (event, change) in &diff.events {
            match change {
                Some(handler) => bind_event(doc, node, event, handler, context, false)?,
                None => {
                    doc.remove_listener(node, event)?;
                }
            }
        }
    }
    if kinds.contains(FactKinds::STYLES) {
        for (key, change) in &diff.styles {
            match change {
                Some(value) => doc.set_style(node, key, value)?,
                None => doc.remove_style(node, key)?,
            }
        }
    }
    if kinds.contains(FactKinds::PROPERTIES) {
        for (key, change) in &diff.properties {
            match change {
                Some(value) if key == "value" && doc.property(node, key) == Some(value) => {}
                Some(value) => doc.set_property(node, key, value.clone())?,
                None => doc.remove_property(node, key)?,
            }
        }
    }
    if kinds.contains(FactKinds::ATTRIBUTES) {
        for (key, change) in &diff.attributes {
            match change {
                Some(value) => doc.set_attribute(node, key, value)?,
                None => doc.remove_attribute(node, key)?,
            }
        }
    }
    if kinds.contains(FactKinds::NS_ATTRIBUTES) {
        for (key, change) in &diff.ns_attributes {
            match change {
                NsChange::Set(ns) => doc.set_attribute_ns(node, &ns.namespace, key, &ns.value)?,
                NsChange::Remove { namespace } => doc.remove_attribute_ns(node, namespace, key)?,
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::dom::{Event, PropValue, Snapshot};
    use crate::vdom::{attribute, map, node, on_message, property, style, text};

    fn root() -> (Rc<DispatchContext>, Rc<RefCell<Vec<String>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let ctx = DispatchContext::root(move |m| {
            if let Ok(s) = m.downcast::<String>() {
                sink.borrow_mut().push(*s);
            }
        });
        (ctx, seen)
    }

    #[test]
    fn test_render_element_tree() {
        let (ctx, _) = root();
        let mut doc = Document::new();
        let tree = node(
            "div",
            [attribute("id", "app"), style("color", "red"), property("value", "v")],
            [text("hi"), node("span", [], [])],
        );
        let id = render(&mut doc, &tree, &ctx).unwrap();

        assert_eq!(doc.to_markup(id), "<div id=\"app\" style=\"color: red\" .value=\"v\">hi<span></span></div>");
        assert_eq!(doc.property(id, "value"), Some(&PropValue::String("v".into())));
    }

    #[test]
    fn test_tagger_maps_events() {
        let (ctx, seen) = root();
        let mut doc = Document::new();
        let button = node("button", [on_message("click", 3u32)], []);
        let tree = map(|n: u32| format!("clicked {n}"), button);
        let id = render(&mut doc, &tree, &ctx).unwrap();

        assert!(doc.dispatch_context(id).is_some());
        doc.dispatch_event(id, &Event::new("click")).unwrap();
        assert_eq!(*seen.borrow(), vec!["clicked 3"]);
    }

    #[test]
    fn test_value_property_written_only_when_different() {
        let (ctx, _) = root();
        let mut doc = Document::new();
        let input = doc.create_element("input", None);
        doc.set_property(input, "value", "typed".into()).unwrap();

        let mut diff = FactsDiff::default();
        diff.properties
            .insert("value".into(), Some(PropValue::String("typed".into())));
        apply_facts_diff(&mut doc, input, &ctx, &diff).unwrap();
        assert_eq!(doc.property(input, "value"), Some(&PropValue::String("typed".into())));

        diff.properties.insert("value".into(), None);
        apply_facts_diff(&mut doc, input, &ctx, &diff).unwrap();
        assert!(matches!(doc.snapshot(input), Some(Snapshot::Element { ref properties, .. }) if properties.is_empty()));
    }

    #[test]
    fn test_bind_event_swaps_decoder_in_place() {
        let (ctx, seen) = root();
        let mut doc = Document::new();
        let el = doc.create_element("button", None);
        let first = EventHandler::new(crate::vdom::Handler::normal(|_| Some("one".to_owned())));
        let second = EventHandler::new(crate::vdom::Handler::normal(|_| Some("two".to_owned())));

        bind_event(&mut doc, el, "click", &first, &ctx, false).unwrap();
        let registered = doc.listener(el, "click").cloned().unwrap();
        bind_event(&mut doc, el, "click", &second, &ctx, false).unwrap();

        doc.dispatch_event(el, &Event::new("click")).unwrap();
        assert_eq!(*seen.borrow(), vec!["two"]);
        assert!(registered.handler().is_equivalent(&second));
    }
}
