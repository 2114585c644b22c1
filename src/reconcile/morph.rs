//! Morph engine - reconcile a live tree against a new virtual tree in one
//! walk, without an intermediate patch list.
//!
//! Each live node visited is compared with the virtual node it was last
//! rendered from (read from a [`VNodeStore`]) and with the new virtual node
//! that should stand at its position. Live nodes with no record are foreign
//! and go to a [`ForeignHandler`].
//!
//! Dispatch contexts are kept stable across passes: a tagger reuses the
//! context already attached to its live node and relinks it, and listeners
//! are moved under the current context when they are rebound. That is what
//! lets a lazy node skip its whole subtree when neither its arguments nor
//! its context changed.

use std::collections::HashSet;
use std::rc::Rc;

use tracing::{debug, trace};

use super::foreign::{ForeignAction, ForeignHandler};
use super::keyed::{self, Step};
use super::render::bind_event;
use super::store::{LazyMark, Rendered, VNodeStore};
use crate::dom::{DispatchContext, DomResult, Document};
use crate::types::{Key, NodeId};
use crate::vdom::{Custom, Facts, Html, KeyedElement, Lazy, VNode, unwrap_taggers};

/// Counters for one morph pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MorphStats {
    pub created: usize,
    pub reused: usize,
    pub removed: usize,
    pub moved: usize,
    pub foreign: usize,
    pub lazy_skipped: usize,
}

/// One morph pass over a document.
pub struct Morph<'a, S: VNodeStore + ?Sized, H: ForeignHandler + ?Sized> {
    doc: &'a mut Document,
    store: &'a mut S,
    foreign: &'a mut H,
    adopt: Option<NodeId>,
    stats: MorphStats,
}

enum Children<'v> {
    Plain(&'v [Html]),
    Keyed(&'v KeyedElement),
}

impl<'a, S, H> Morph<'a, S, H>
where
    S: VNodeStore + ?Sized,
    H: ForeignHandler + ?Sized,
{
    pub fn new(doc: &'a mut Document, store: &'a mut S, foreign: &'a mut H) -> Self {
        Self {
            doc,
            store,
            foreign,
            adopt: None,
            stats: MorphStats::default(),
        }
    }

    pub fn stats(&self) -> &MorphStats {
        &self.stats
    }

    /// Morph the tree at `root` into `next`. A root without a record is
    /// adopted when its tag matches. Returns the root afterwards; a
    /// replaced root takes the old one's place in its parent.
    pub fn run(
        &mut self,
        root: NodeId,
        next: &Html,
        context: &Rc<DispatchContext>,
    ) -> DomResult<NodeId> {
        self.adopt = Some(root);
        let result = self.morph_node(Some(root), next, context, None, None);
        self.adopt = None;
        let new_root = result?;
        if new_root != root {
            if let Some(parent) = self.doc.parent(root) {
                self.doc.replace_child(parent, new_root, root)?;
                self.remove(root)?;
            }
        }
        debug!(stats = ?self.stats, "morph complete");
        Ok(new_root)
    }

    /// Render `next` from scratch, recording every node.
    pub fn render(&mut self, next: &Html, context: &Rc<DispatchContext>) -> DomResult<NodeId> {
        self.morph_node(None, next, context, None, None)
    }

    fn morph_node(
        &mut self,
        live: Option<NodeId>,
        vnode: &Html,
        context: &Rc<DispatchContext>,
        key: Option<&Key>,
        lazy: Option<LazyMark>,
    ) -> DomResult<NodeId> {
        match &**vnode {
            VNode::Tagger(_) => self.morph_tagger(live, vnode, context, key, lazy),
            VNode::Lazy(l) => self.morph_lazy(live, vnode, l, context, key, lazy),
            VNode::Text(text) => self.morph_text(live, vnode, text, key, lazy),
            VNode::Custom(c) => self.morph_custom(live, vnode, c, context, key, lazy),
            VNode::Element(el) => self.morph_element(
                live,
                vnode,
                (&el.tag, el.namespace.as_deref(), &el.facts),
                Children::Plain(&el.children),
                context,
                key,
                lazy,
            ),
            VNode::Keyed(el) => self.morph_element(
                live,
                vnode,
                (&el.tag, el.namespace.as_deref(), &el.facts),
                Children::Keyed(el),
                context,
                key,
                lazy,
            ),
        }
    }

    /// Previous record of `live`, or an empty one when `live` is the
    /// adoptable root.
    fn previous(&self, live: NodeId) -> Option<Option<Rendered>> {
        match self.store.get(self.doc, live) {
            Some(record) => Some(Some(record)),
            None if self.adopt == Some(live) => Some(None),
            None => None,
        }
    }

    fn record(&mut self, node: NodeId, vnode: &Html, key: Option<&Key>, lazy: Option<LazyMark>) {
        let rendered = Rendered {
            vnode: vnode.clone(),
            key: key.cloned(),
            lazy,
        };
        self.store.set(self.doc, node, rendered);
    }

    fn remove(&mut self, node: NodeId) -> DomResult<()> {
        self.store.delete(self.doc, node);
        self.doc.discard(node)?;
        self.stats.removed += 1;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Per-variant morphing
    // -------------------------------------------------------------------------

    fn morph_text(
        &mut self,
        live: Option<NodeId>,
        vnode: &Html,
        text: &str,
        key: Option<&Key>,
        lazy: Option<LazyMark>,
    ) -> DomResult<NodeId> {
        if let Some(node) = live.filter(|&n| self.doc.is_text(n)) {
            if self.previous(node).is_some() {
                if self.doc.text(node) != Some(text) {
                    self.doc.set_text(node, text)?;
                }
                self.doc.set_dispatch_context(node, None)?;
                self.record(node, vnode, key, lazy);
                self.stats.reused += 1;
                return Ok(node);
            }
        }
        let node = self.doc.create_text(text);
        self.record(node, vnode, key, lazy);
        self.stats.created += 1;
        Ok(node)
    }

    #[allow(clippy::too_many_arguments)]
    fn morph_element(
        &mut self,
        live: Option<NodeId>,
        vnode: &Html,
        (tag, namespace, facts): (&str, Option<&str>, &Facts),
        children: Children<'_>,
        context: &Rc<DispatchContext>,
        key: Option<&Key>,
        lazy: Option<LazyMark>,
    ) -> DomResult<NodeId> {
        let reusable = live.filter(|&n| {
            self.doc.tag(n) == Some(tag) && self.doc.namespace(n) == namespace
        });
        if let Some(node) = reusable {
            if let Some(previous) = self.previous(node) {
                let prev_vnode = previous.map(|r| r.vnode);
                self.doc.set_dispatch_context(node, None)?;
                self.morph_facts(node, prev_vnode.as_deref().and_then(VNode::facts), facts, context)?;
                if self.doc.first_child(node).is_none() {
                    self.add_children(node, &children, context)?;
                } else {
                    match children {
                        Children::Plain(kids) => {
                            let prev_kids = prev_vnode.as_deref().map(plain_children).unwrap_or_default();
                            self.morph_children(node, kids, &prev_kids, context)?;
                        }
                        Children::Keyed(el) => {
                            let prev_kids = prev_vnode.as_deref().map(plain_children).unwrap_or_default();
                            self.morph_keyed(node, el, &prev_kids, context)?;
                        }
                    }
                }
                self.record(node, vnode, key, lazy);
                self.stats.reused += 1;
                return Ok(node);
            }
        }

        let node = self.doc.create_element(tag, namespace);
        self.morph_facts(node, None, facts, context)?;
        self.add_children(node, &children, context)?;
        self.record(node, vnode, key, lazy);
        self.stats.created += 1;
        Ok(node)
    }

    fn morph_custom(
        &mut self,
        live: Option<NodeId>,
        vnode: &Html,
        custom: &Custom,
        context: &Rc<DispatchContext>,
        key: Option<&Key>,
        lazy: Option<LazyMark>,
    ) -> DomResult<NodeId> {
        let previous = live.and_then(|n| self.store.get(self.doc, n).map(|r| (n, r)));
        if let Some((node, record)) = previous {
            if let VNode::Custom(prev) = &*record.vnode {
                if Rc::ptr_eq(&prev.widget, &custom.widget) {
                    let next = match custom.widget.diff(&*prev.model, &*custom.model) {
                        Some(patch) => patch.apply(self.doc, node)?,
                        None => node,
                    };
                    self.doc.set_dispatch_context(next, None)?;
                    let prev_facts = (next == node).then_some(&prev.facts);
                    self.morph_facts(next, prev_facts, &custom.facts, context)?;
                    let node = next;
                    self.record(node, vnode, key, lazy);
                    self.stats.reused += 1;
                    return Ok(node);
                }
            }
        }
        let node = custom.widget.render(self.doc, &*custom.model);
        self.morph_facts(node, None, &custom.facts, context)?;
        self.record(node, vnode, key, lazy);
        self.stats.created += 1;
        Ok(node)
    }

    fn morph_tagger(
        &mut self,
        live: Option<NodeId>,
        vnode: &Html,
        context: &Rc<DispatchContext>,
        key: Option<&Key>,
        lazy: Option<LazyMark>,
    ) -> DomResult<NodeId> {
        let (mappers, inner) = unwrap_taggers(vnode);
        let existing = live
            .and_then(|n| self.doc.dispatch_context(n))
            .filter(|c| !c.is_root() && !Rc::ptr_eq(c, context));
        let sub = match existing {
            Some(ctx) => {
                ctx.relink(mappers, context.clone());
                ctx
            }
            None => DispatchContext::tagged(mappers, context.clone()),
        };
        let node = self.morph_node(live, inner, &sub, key, lazy)?;
        self.doc.set_dispatch_context(node, Some(sub))?;
        Ok(node)
    }

    fn morph_lazy(
        &mut self,
        live: Option<NodeId>,
        vnode: &Html,
        l: &Lazy,
        context: &Rc<DispatchContext>,
        key: Option<&Key>,
        lazy: Option<LazyMark>,
    ) -> DomResult<NodeId> {
        if let Some(node) = live {
            if let Some(record) = self.store.get(self.doc, node) {
                let unchanged = record.lazy.as_ref().is_some_and(|mark| {
                    Rc::ptr_eq(&mark.context, context)
                        && matches!(&*mark.vnode, VNode::Lazy(prev) if prev.same_refs(l))
                });
                if unchanged {
                    if let Some(VNode::Lazy(prev)) = record.lazy.as_ref().map(|m| &*m.vnode) {
                        if let Some(expansion) = prev.cached() {
                            l.adopt(expansion.clone());
                        }
                    }
                    let mark = lazy.unwrap_or_else(|| LazyMark {
                        vnode: vnode.clone(),
                        context: context.clone(),
                    });
                    let rendered = Rendered {
                        vnode: record.vnode,
                        key: key.cloned(),
                        lazy: Some(mark),
                    };
                    self.store.set(self.doc, node, rendered);
                    self.stats.lazy_skipped += 1;
                    trace!(node = %node, "lazy subtree unchanged");
                    return Ok(node);
                }
            }
        }
        let mark = lazy.unwrap_or_else(|| LazyMark {
            vnode: vnode.clone(),
            context: context.clone(),
        });
        let expansion = l.force().clone();
        self.morph_node(live, &expansion, context, key, Some(mark))
    }

    // -------------------------------------------------------------------------
    // Facts
    // -------------------------------------------------------------------------

    /// Events and styles are compared with the previous virtual node;
    /// properties and attributes with what the live node actually holds.
    fn morph_facts(
        &mut self,
        node: NodeId,
        prev: Option<&Facts>,
        next: &Facts,
        context: &Rc<DispatchContext>,
    ) -> DomResult<()> {
        let doc = &mut *self.doc;
        for (event, handler) in &next.events {
            bind_event(doc, node, event, handler, context, true)?;
        }
        for (key, value) in &next.styles {
            if prev.and_then(|p| p.styles.get(key)) != Some(value) {
                doc.set_style(node, key, value)?;
            }
        }
        for (key, value) in &next.properties {
            if doc.property(node, key) != Some(value) {
                doc.set_property(node, key, value.clone())?;
            }
        }
        for (key, value) in &next.attributes {
            if doc.attribute(node, key) != Some(value.as_str()) {
                doc.set_attribute(node, key, value)?;
            }
        }
        for (key, ns) in &next.ns_attributes {
            if let Some(old) = prev.and_then(|p| p.ns_attributes.get(key)) {
                if old.namespace != ns.namespace {
                    doc.remove_attribute_ns(node, &old.namespace, key)?;
                }
            }
            if doc.attribute_ns(node, &ns.namespace, key) != Some(ns.value.as_str()) {
                doc.set_attribute_ns(node, &ns.namespace, key, &ns.value)?;
            }
        }

        let Some(prev) = prev else {
            return Ok(());
        };
        for event in prev.events.keys() {
            if !next.events.contains_key(event) {
                doc.remove_listener(node, event)?;
            }
        }
        for key in prev.styles.keys() {
            if !next.styles.contains_key(key) {
                doc.remove_style(node, key)?;
            }
        }
        for key in prev.properties.keys() {
            if !next.properties.contains_key(key) {
                doc.remove_property(node, key)?;
            }
        }
        for key in prev.attributes.keys() {
            if !next.attributes.contains_key(key) {
                doc.remove_attribute(node, key)?;
            }
        }
        for (key, old) in &prev.ns_attributes {
            if !next.ns_attributes.contains_key(key) {
                doc.remove_attribute_ns(node, &old.namespace, key)?;
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Children
    // -------------------------------------------------------------------------

    fn add_children(
        &mut self,
        parent: NodeId,
        children: &Children<'_>,
        context: &Rc<DispatchContext>,
    ) -> DomResult<()> {
        match children {
            Children::Plain(kids) => {
                for kid in kids.iter() {
                    let child = self.morph_node(None, kid, context, None, None)?;
                    self.doc.append_child(parent, child)?;
                }
            }
            Children::Keyed(el) => {
                for (key, kid) in &el.children {
                    let child = self.morph_node(None, kid, context, Some(key), None)?;
                    self.doc.append_child(parent, child)?;
                }
            }
        }
        Ok(())
    }

    /// Put `next` where `old` is, discarding `old`.
    fn swap_in(&mut self, parent: NodeId, next: NodeId, old: NodeId) -> DomResult<()> {
        if next != old {
            self.doc.replace_child(parent, next, old)?;
            self.remove(old)?;
        }
        Ok(())
    }

    fn morph_children(
        &mut self,
        parent: NodeId,
        kids: &[Html],
        prev_kids: &[Html],
        context: &Rc<DispatchContext>,
    ) -> DomResult<()> {
        let live = self.doc.children(parent).to_vec();
        let mut j = 0;
        for child in live {
            if self.store.get(self.doc, child).is_none() {
                self.stats.foreign += 1;
                let expected = kids.get(j).map(|k| &**k);
                let previous = prev_kids.get(j).map(|k| &**k);
                match self.foreign.handle(self.doc, child, expected, previous) {
                    ForeignAction::Adopt if expected.is_some() => j += 1,
                    ForeignAction::Remove => self.remove(child)?,
                    _ => {}
                }
                continue;
            }
            match kids.get(j) {
                Some(kid) => {
                    let next = self.morph_node(Some(child), kid, context, None, None)?;
                    self.swap_in(parent, next, child)?;
                    j += 1;
                }
                None => self.remove(child)?,
            }
        }
        for kid in kids.iter().skip(j) {
            let child = self.morph_node(None, kid, context, None, None)?;
            self.doc.append_child(parent, child)?;
        }
        Ok(())
    }

    /// A foreign child is matched against the new and previous child at
    /// its position. Adopting it stands it in for that new child, whose key
    /// then takes no part in planning. Foreign children stay where they are.
    fn morph_keyed(
        &mut self,
        parent: NodeId,
        el: &KeyedElement,
        prev_kids: &[Html],
        context: &Rc<DispatchContext>,
    ) -> DomResult<()> {
        let mut old_nodes = Vec::new();
        let mut old_keys: Vec<Key> = Vec::new();
        let mut pinned = HashSet::new();
        let mut adopted = HashSet::new();
        for child in self.doc.children(parent).to_vec() {
            match self.store.get(self.doc, child) {
                Some(record) => {
                    let key = record
                        .key
                        .unwrap_or_else(|| Rc::from(format!("\u{0}unkeyed{child}")));
                    old_nodes.push(child);
                    old_keys.push(key);
                }
                None => {
                    self.stats.foreign += 1;
                    let at = old_nodes.len() + adopted.len();
                    let expected = el.children.get(at).map(|(_, k)| &**k);
                    let previous = prev_kids.get(at).map(|k| &**k);
                    match self.foreign.handle(self.doc, child, expected, previous) {
                        ForeignAction::Remove => self.remove(child)?,
                        ForeignAction::Adopt if expected.is_some() => {
                            adopted.insert(at);
                            pinned.insert(child);
                        }
                        _ => {
                            pinned.insert(child);
                        }
                    }
                }
            }
        }

        let wanted: Vec<usize> = (0..el.children.len())
            .filter(|j| !adopted.contains(j))
            .collect();
        let old_refs: Vec<&str> = old_keys.iter().map(|k| &**k).collect();
        let new_refs: Vec<&str> = wanted.iter().map(|&j| &*el.children[j].0).collect();
        let old_set: HashSet<&str> = old_refs.iter().copied().collect();
        let plan = if adopted.is_empty() {
            keyed::reconcile(&old_refs, &new_refs, &old_set, &el.keys)
        } else {
            let new_set: HashSet<&str> = new_refs.iter().copied().collect();
            keyed::reconcile(&old_refs, &new_refs, &old_set, &new_set)
        };
        trace!(stats = ?plan.stats, adopted = adopted.len(), "keyed morph plan");

        for &i in &plan.removed {
            self.remove(old_nodes[i])?;
        }

        let moving: HashSet<NodeId> = plan
            .steps
            .iter()
            .filter_map(|s| match s {
                Step::Move(i) => Some(old_nodes[*i]),
                _ => None,
            })
            .collect();
        let order = self.doc.children(parent).to_vec();
        let mut cursor = 0;

        for (step, &j) in plan.steps.iter().zip(&wanted) {
            while order
                .get(cursor)
                .is_some_and(|n| pinned.contains(n) || moving.contains(n))
            {
                cursor += 1;
            }
            let reference = order.get(cursor).copied();
            let (key, kid) = &el.children[j];
            match *step {
                Step::Keep(i) | Step::Move(i) => {
                    let old = old_nodes[i];
                    let next = self.morph_node(Some(old), kid, context, Some(key), None)?;
                    if reference == Some(old) {
                        self.swap_in(parent, next, old)?;
                        cursor += 1;
                    } else {
                        if next != old {
                            self.remove(old)?;
                        }
                        self.doc.insert_before(parent, next, reference)?;
                        self.stats.moved += 1;
                    }
                }
                Step::Create => {
                    let next = self.morph_node(None, kid, context, Some(key), None)?;
                    self.doc.insert_before(parent, next, reference)?;
                }
            }
        }
        Ok(())
    }
}

fn plain_children(vnode: &VNode) -> Vec<Html> {
    match vnode {
        VNode::Element(el) => el.children.clone(),
        VNode::Keyed(el) => el.children.iter().map(|(_, c)| c.clone()).collect(),
        _ => Vec::new(),
    }
}

/// Morph `root` into `next` with `store` and `foreign`. See [`Morph::run`].
pub fn morph<S, H>(
    doc: &mut Document,
    store: &mut S,
    foreign: &mut H,
    root: NodeId,
    next: &Html,
    context: &Rc<DispatchContext>,
) -> DomResult<NodeId>
where
    S: VNodeStore + ?Sized,
    H: ForeignHandler + ?Sized,
{
    Morph::new(doc, store, foreign).run(root, next, context)
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::dom::Event;
    use crate::reconcile::foreign::DefaultForeignHandler;
    use crate::reconcile::store::SideTable;
    use crate::vdom::{attribute, keyed_node, lazy, map, node, on_message, style, text};

    struct Fixture {
        doc: Document,
        table: SideTable,
        ctx: Rc<DispatchContext>,
        seen: Rc<RefCell<Vec<String>>>,
    }

    impl Fixture {
        fn new() -> Self {
            let seen = Rc::new(RefCell::new(Vec::new()));
            let sink = seen.clone();
            let ctx = DispatchContext::root(move |m| {
                if let Ok(s) = m.downcast::<String>() {
                    sink.borrow_mut().push(*s);
                }
            });
            Self {
                doc: Document::new(),
                table: SideTable::new(),
                ctx,
                seen,
            }
        }

        fn render(&mut self, tree: &Html) -> NodeId {
            Morph::new(&mut self.doc, &mut self.table, &mut DefaultForeignHandler)
                .render(tree, &self.ctx)
                .unwrap()
        }

        fn morph(&mut self, root: NodeId, tree: &Html) -> (NodeId, MorphStats) {
            let mut handler = DefaultForeignHandler;
            let mut m = Morph::new(&mut self.doc, &mut self.table, &mut handler);
            let root = m.run(root, tree, &self.ctx).unwrap();
            (root, m.stats().clone())
        }
    }

    fn li(label: &str) -> Html {
        node("li", [], [text(label)])
    }

    #[test]
    fn test_morph_updates_in_place() {
        let mut fx = Fixture::new();
        let root = fx.render(&node("div", [attribute("id", "a"), style("color", "red")], [text("x")]));
        let text_node = fx.doc.first_child(root).unwrap();

        let (after, stats) = fx.morph(root, &node("div", [attribute("title", "t")], [text("y")]));
        assert_eq!(after, root);
        assert_eq!(fx.doc.first_child(root), Some(text_node));
        assert_eq!(fx.doc.to_markup(root), "<div title=\"t\">y</div>");
        assert_eq!(stats.created, 0);
    }

    #[test]
    fn test_keyed_rotation_is_one_move() {
        let mut fx = Fixture::new();
        let a = keyed_node("ul", [], [("k1", li("A")), ("k2", li("B")), ("k3", li("C"))]);
        let root = fx.render(&a);
        let before = fx.doc.children(root).to_vec();

        let b = keyed_node("ul", [], [("k3", li("C")), ("k1", li("A")), ("k2", li("B"))]);
        let (root, stats) = fx.morph(root, &b);
        assert_eq!(fx.doc.children(root), &[before[2], before[0], before[1]]);
        assert_eq!(stats.moved, 1);
        assert_eq!(stats.created, 0);
        assert_eq!(stats.removed, 0);
    }

    #[test]
    fn test_adopts_unrecorded_root_and_foreign_children() {
        let mut fx = Fixture::new();
        let root = fx.doc.create_element("div", None);
        let extension = fx.doc.create_element("aside", None);
        fx.doc.append_child(root, extension).unwrap();

        let (after, stats) = fx.morph(root, &node("div", [], [text("hello")]));
        assert_eq!(after, root);
        assert_eq!(stats.foreign, 1);
        assert_eq!(fx.doc.to_markup(root), "<div><aside></aside>hello</div>");
    }

    #[test]
    fn test_translated_font_wrapper_is_adopted() {
        let mut fx = Fixture::new();
        let root = fx.render(&node("p", [], [text("hello")]));
        let original = fx.doc.first_child(root).unwrap();
        let font = fx.doc.create_element("font", None);
        let translated = fx.doc.create_text("hallo");
        fx.doc.append_child(font, translated).unwrap();
        fx.doc.replace_child(root, font, original).unwrap();
        fx.doc.discard(original).unwrap();

        let (_, _) = fx.morph(root, &node("p", [], [text("hello")]));
        assert_eq!(fx.doc.to_markup(root), "<p><font>hallo</font></p>");

        let (_, _) = fx.morph(root, &node("p", [], [text("bye")]));
        assert_eq!(fx.doc.to_markup(root), "<p>bye</p>");
    }

    #[test]
    fn test_lazy_skip_does_not_call_view() {
        let mut fx = Fixture::new();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let view = Rc::new(move |n: &u32| {
            counter.set(counter.get() + 1);
            node("span", [], [text(n.to_string())])
        });
        let arg = Rc::new(1u32);

        let root = fx.render(&node("div", [], [lazy(&view, &arg)]));
        let (_, stats) = fx.morph(root, &node("div", [], [lazy(&view, &arg)]));
        assert_eq!(calls.get(), 1);
        assert_eq!(stats.lazy_skipped, 1);

        let (_, _) = fx.morph(root, &node("div", [], [lazy(&view, &Rc::new(2u32))]));
        assert_eq!(calls.get(), 2);
        assert_eq!(fx.doc.to_markup(root), "<div><span>2</span></div>");
    }

    #[test]
    fn test_tagger_context_is_reused_and_relinked() {
        let mut fx = Fixture::new();
        let button = || node("button", [on_message("click", 1u8)], []);
        let root = fx.render(&map(|n: u8| format!("a{n}"), button()));
        let ctx = fx.doc.dispatch_context(root).unwrap();

        let (root, _) = fx.morph(root, &map(|n: u8| format!("b{n}"), button()));
        assert!(Rc::ptr_eq(&ctx, &fx.doc.dispatch_context(root).unwrap()));
        fx.doc.dispatch_event(root, &Event::new("click")).unwrap();
        assert_eq!(*fx.seen.borrow(), vec!["b1"]);
    }

    #[test]
    fn test_root_kind_change_replaces_in_parent() {
        let mut fx = Fixture::new();
        let body = fx.doc.create_element("body", None);
        let root = fx.render(&node("div", [], []));
        fx.doc.append_child(body, root).unwrap();

        let (after, _) = fx.morph(root, &text("plain"));
        assert_ne!(after, root);
        assert!(!fx.doc.is_alive(root));
        assert_eq!(fx.doc.children(body), &[after]);
    }

    #[test]
    fn test_keyed_foreign_child_sees_its_position() {
        let mut fx = Fixture::new();
        let a = keyed_node("ul", [], [("a", li("A")), ("b", li("B"))]);
        let root = fx.render(&a);
        let first = fx.doc.first_child(root);
        let server = fx.doc.create_element("li", None);
        let label = fx.doc.create_text("X");
        fx.doc.append_child(server, label).unwrap();
        fx.doc.insert_before(root, server, first).unwrap();

        let mut seen = Vec::new();
        let mut handler = |_: &Document, _: NodeId, expected: Option<&VNode>, previous: Option<&VNode>| {
            seen.push((expected.map(|v| v.descendants()), previous.map(|v| v.descendants())));
            match expected {
                Some(VNode::Element(el)) if el.tag == "li" => ForeignAction::Adopt,
                _ => ForeignAction::Keep,
            }
        };
        let b = keyed_node("ul", [], [("x", li("X")), ("a", li("A")), ("b", li("B"))]);
        let mut m = Morph::new(&mut fx.doc, &mut fx.table, &mut handler);
        let after = m.run(root, &b, &fx.ctx).unwrap();
        let stats = m.stats().clone();

        assert_eq!(seen, [(Some(1), Some(1))]);
        assert_eq!(after, root);
        assert_eq!(stats.created, 0);
        assert_eq!(stats.foreign, 1);
        assert_eq!(fx.doc.first_child(root), Some(server));
        assert_eq!(fx.doc.to_markup(root), "<ul><li>X</li><li>A</li><li>B</li></ul>");
    }
}
