//! Patch applier.
//!
//! Applying happens in two passes. The locate pass walks the live tree
//! alongside the old virtual tree and resolves every patch index to a live
//! node and the dispatch context in force there. It only descends into a
//! subtree when a pending index falls inside the subtree's descendant
//! range. The apply pass then mutates, so no mutation can disturb the
//! positional walk.

use std::iter::Peekable;
use std::rc::Rc;
use std::vec::IntoIter;

use tracing::{debug, trace, warn};

use super::patch::{Entry, Insert, Patch, PatchKind};
use super::render::{apply_facts, apply_facts_diff, render};
use crate::dom::{DispatchContext, DomResult, Document, Mapper};
use crate::types::NodeId;
use crate::vdom::{Facts, FactsDiff, Html, VNode, WidgetPatch, unwrap_taggers};

/// Apply `patches` (from diffing `old` against a new tree) to the live
/// rendering of `old` rooted at `root`. Returns the root afterwards, which
/// differs from `root` when the root itself was redrawn.
pub fn apply(
    doc: &mut Document,
    root: NodeId,
    old: &Html,
    patches: Vec<Patch>,
    context: &Rc<DispatchContext>,
) -> DomResult<NodeId> {
    if patches.is_empty() {
        return Ok(root);
    }
    let total = patches.len();
    let located = Locator { doc }.locate(root, old, patches, context);
    debug!(patches = total, located = located.len(), "applying patches");
    let mut slots = Vec::new();
    Applier { doc }.apply_all(root, located, &mut slots)
}

struct Located {
    node: NodeId,
    context: Rc<DispatchContext>,
    op: Op,
}

enum Op {
    Redraw(Html),
    Facts(FactsDiff),
    Text(String),
    Lazy(Vec<Located>),
    Retag(Vec<Mapper>),
    RemoveLast(usize),
    Append(Vec<Html>),
    Remove,
    Stash { entry: usize, patches: Vec<Located> },
    Reorder {
        patches: Vec<Located>,
        inserts: Vec<Insert>,
        end_inserts: Vec<Insert>,
        entries: Vec<Entry>,
    },
    Widget { patch: WidgetPatch, facts: Facts },
}

type Queue = Peekable<IntoIter<Patch>>;

// =============================================================================
// Locate
// =============================================================================

struct Locator<'d> {
    doc: &'d Document,
}

impl Locator<'_> {
    fn locate(
        &self,
        node: NodeId,
        vnode: &Html,
        patches: Vec<Patch>,
        context: &Rc<DispatchContext>,
    ) -> Vec<Located> {
        let mut queue = patches.into_iter().peekable();
        let mut out = Vec::new();
        self.walk(node, vnode, &mut queue, 0, vnode.descendants(), context, &mut out);
        let remaining = queue.len();
        if let Some(rest) = queue.peek() {
            warn!(
                index = rest.index,
                remaining,
                "patch indexes outside the old tree, dropping"
            );
        }
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn walk(
        &self,
        node: NodeId,
        vnode: &Html,
        queue: &mut Queue,
        low: usize,
        high: usize,
        context: &Rc<DispatchContext>,
        out: &mut Vec<Located>,
    ) {
        while let Some(patch) = queue.next_if(|p| p.index == low) {
            out.push(self.locate_one(node, vnode, patch, low, high, context));
        }
        if !queue.peek().is_some_and(|p| p.index <= high) {
            return;
        }
        match &**vnode {
            VNode::Tagger(_) => {
                let (_, inner) = unwrap_taggers(vnode);
                let inner_context = self
                    .doc
                    .dispatch_context(node)
                    .unwrap_or_else(|| context.clone());
                self.walk(node, inner, queue, low + 1, high, &inner_context, out);
            }
            VNode::Element(el) => {
                self.walk_children(node, el.children.iter(), queue, low, high, context, out);
            }
            VNode::Keyed(el) => {
                let kids = el.children.iter().map(|(_, c)| c);
                self.walk_children(node, kids, queue, low, high, context, out);
            }
            VNode::Text(_) | VNode::Custom(_) | VNode::Lazy(_) => {}
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn walk_children<'v>(
        &self,
        node: NodeId,
        kids: impl Iterator<Item = &'v Html>,
        queue: &mut Queue,
        mut low: usize,
        high: usize,
        context: &Rc<DispatchContext>,
        out: &mut Vec<Located>,
    ) {
        let children = self.doc.children(node);
        for (j, kid) in kids.enumerate() {
            low += 1;
            let next_low = low + kid.descendants();
            let Some(index) = queue.peek().map(|p| p.index) else {
                return;
            };
            if index > high {
                return;
            }
            if low <= index && index <= next_low {
                match children.get(j) {
                    Some(&child) => self.walk(child, kid, queue, low, next_low, context, out),
                    None => {
                        warn!(parent = %node, child = j, "live child missing, dropping its patches");
                        while queue.next_if(|p| p.index <= next_low).is_some() {}
                    }
                }
            }
            low = next_low;
        }
    }

    fn locate_one(
        &self,
        node: NodeId,
        vnode: &Html,
        patch: Patch,
        low: usize,
        high: usize,
        context: &Rc<DispatchContext>,
    ) -> Located {
        let op = match patch.kind {
            PatchKind::Redraw(v) => Op::Redraw(v),
            PatchKind::Facts(d) => Op::Facts(d),
            PatchKind::Text(t) => Op::Text(t),
            PatchKind::Retag(m) => Op::Retag(m),
            PatchKind::RemoveLast(n) => Op::RemoveLast(n),
            PatchKind::Append(v) => Op::Append(v),
            PatchKind::Widget { patch, facts } => Op::Widget { patch, facts },
            PatchKind::Remove(None) => Op::Remove,
            PatchKind::Lazy(sub) => match &**vnode {
                VNode::Lazy(l) => match l.cached() {
                    Some(expansion) => Op::Lazy(self.locate(node, expansion, sub, context)),
                    None => {
                        warn!(node = %node, "lazy node has no cached expansion, skipping its patches");
                        Op::Lazy(Vec::new())
                    }
                },
                _ => {
                    warn!(node = %node, kind = vnode.kind_name(), "lazy patch on a non-lazy node");
                    Op::Lazy(Vec::new())
                }
            },
            PatchKind::Remove(Some(moved)) => Op::Stash {
                entry: moved.entry,
                patches: self.locate_range(node, vnode, moved.patches, low, high, context),
            },
            PatchKind::Reorder(r) => Op::Reorder {
                patches: self.locate_range(node, vnode, r.patches, low, high, context),
                inserts: r.inserts,
                end_inserts: r.end_inserts,
                entries: r.entries,
            },
        };
        Located {
            node,
            context: context.clone(),
            op,
        }
    }

    /// Locate nested patches that share the enclosing node's index space.
    fn locate_range(
        &self,
        node: NodeId,
        vnode: &Html,
        patches: Vec<Patch>,
        low: usize,
        high: usize,
        context: &Rc<DispatchContext>,
    ) -> Vec<Located> {
        let mut queue = patches.into_iter().peekable();
        let mut out = Vec::new();
        self.walk(node, vnode, &mut queue, low, high, context, &mut out);
        if let Some(rest) = queue.peek() {
            warn!(index = rest.index, "nested patch outside its subtree, dropping");
        }
        out
    }
}

// =============================================================================
// Apply
// =============================================================================

struct Applier<'d> {
    doc: &'d mut Document,
}

impl Applier<'_> {
    fn apply_all(
        &mut self,
        mut root: NodeId,
        located: Vec<Located>,
        slots: &mut Vec<Option<NodeId>>,
    ) -> DomResult<NodeId> {
        for patch in located {
            let target = patch.node;
            let node = self.apply_one(patch, slots)?;
            if target == root {
                root = node;
            }
        }
        Ok(root)
    }

    fn apply_one(&mut self, patch: Located, slots: &mut Vec<Option<NodeId>>) -> DomResult<NodeId> {
        let Located { node, context, op } = patch;
        match op {
            Op::Redraw(vnode) => self.redraw(node, &vnode, &context),
            Op::Facts(diff) => {
                apply_facts_diff(self.doc, node, &context, &diff)?;
                Ok(node)
            }
            Op::Text(text) => {
                self.doc.set_text(node, text)?;
                Ok(node)
            }
            Op::Lazy(sub) => self.apply_all(node, sub, &mut Vec::new()),
            Op::Retag(mappers) => {
                match self.doc.dispatch_context(node) {
                    Some(existing) if !existing.is_root() => existing.retag(mappers),
                    _ => {
                        let tagged = DispatchContext::tagged(mappers, context);
                        self.doc.set_dispatch_context(node, Some(tagged))?;
                    }
                }
                Ok(node)
            }
            Op::RemoveLast(count) => {
                for _ in 0..count {
                    match self.doc.last_child(node) {
                        Some(last) => self.doc.discard(last)?,
                        None => break,
                    }
                }
                Ok(node)
            }
            Op::Append(vnodes) => {
                for vnode in &vnodes {
                    let child = render(self.doc, vnode, &context)?;
                    self.doc.append_child(node, child)?;
                }
                Ok(node)
            }
            Op::Remove => {
                self.doc.discard(node)?;
                Ok(node)
            }
            Op::Stash { entry, patches } => {
                self.doc.detach(node)?;
                let moved = self.apply_all(node, patches, &mut Vec::new())?;
                if moved != node {
                    self.doc.discard(node)?;
                }
                match slots.get_mut(entry) {
                    Some(slot) => *slot = Some(moved),
                    None => warn!(entry, "moved child has no reorder entry"),
                }
                Ok(node)
            }
            Op::Reorder {
                patches,
                inserts,
                end_inserts,
                entries,
            } => {
                let mut stash = vec![None; entries.len()];
                let node = self.apply_all(node, patches, &mut stash)?;
                for insert in &inserts {
                    let Some(child) = self.entry_node(&entries, &stash, insert, &context)? else {
                        continue;
                    };
                    let reference = self.doc.child_at(node, insert.index);
                    self.doc.insert_before(node, child, reference)?;
                }
                if !end_inserts.is_empty() {
                    let fragment = self.doc.create_fragment();
                    for insert in &end_inserts {
                        if let Some(child) = self.entry_node(&entries, &stash, insert, &context)? {
                            self.doc.append_child(fragment, child)?;
                        }
                    }
                    self.doc.append_child(node, fragment)?;
                    self.doc.discard(fragment)?;
                }
                trace!(node = %node, inserts = inserts.len(), end_inserts = end_inserts.len(), "reordered");
                Ok(node)
            }
            Op::Widget { patch, facts } => self.widget(node, &patch, &facts, &context),
        }
    }

    fn entry_node(
        &mut self,
        entries: &[Entry],
        stash: &[Option<NodeId>],
        insert: &Insert,
        context: &Rc<DispatchContext>,
    ) -> DomResult<Option<NodeId>> {
        match entries.get(insert.entry) {
            Some(Entry::Insert(vnode)) => render(self.doc, vnode, context).map(Some),
            Some(Entry::Move) => {
                let moved = stash.get(insert.entry).copied().flatten();
                if moved.is_none() {
                    warn!(entry = insert.entry, "moved child was never stashed");
                }
                Ok(moved)
            }
            None => {
                warn!(entry = insert.entry, "insert refers to a missing entry");
                Ok(None)
            }
        }
    }

    /// Run a widget patch. A returned replacement gets the full facts and
    /// takes the old node's place, like a redraw.
    fn widget(
        &mut self,
        node: NodeId,
        patch: &WidgetPatch,
        facts: &Facts,
        context: &Rc<DispatchContext>,
    ) -> DomResult<NodeId> {
        let next = patch.apply(self.doc, node)?;
        if next == node {
            return Ok(node);
        }
        apply_facts(self.doc, next, context, facts)?;
        if self.doc.dispatch_context(next).is_none() {
            let inherited = self.doc.dispatch_context(node);
            self.doc.set_dispatch_context(next, inherited)?;
        }
        if let Some(parent) = self.doc.parent(node) {
            self.doc.replace_child(parent, next, node)?;
            self.doc.discard(node)?;
        }
        Ok(next)
    }

    fn redraw(
        &mut self,
        node: NodeId,
        vnode: &Html,
        context: &Rc<DispatchContext>,
    ) -> DomResult<NodeId> {
        let fresh = render(self.doc, vnode, context)?;
        if self.doc.dispatch_context(fresh).is_none() {
            let inherited = self.doc.dispatch_context(node);
            self.doc.set_dispatch_context(fresh, inherited)?;
        }
        if let Some(parent) = self.doc.parent(node) {
            self.doc.replace_child(parent, fresh, node)?;
            self.doc.discard(node)?;
        }
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::diff::diff;
    use crate::vdom::{attribute, keyed_node, map, node, on_message, text, thunk};

    fn sink() -> Rc<DispatchContext> {
        DispatchContext::root(|_| {})
    }

    fn li(label: &str) -> Html {
        node("li", [], [text(label)])
    }

    fn step(doc: &mut Document, root: NodeId, a: &Html, b: &Html) -> NodeId {
        apply(doc, root, a, diff(a, b), &sink()).unwrap()
    }

    #[test]
    fn test_text_patch_deep_in_tree() {
        let mut doc = Document::new();
        let a = node("div", [], [node("p", [], [text("x")]), node("ul", [], [li("a"), li("b")])]);
        let b = node("div", [], [node("p", [], [text("x")]), node("ul", [], [li("a"), li("c")])]);
        let root = render(&mut doc, &a, &sink()).unwrap();

        let root = step(&mut doc, root, &a, &b);
        assert_eq!(doc.to_markup(root), "<div><p>x</p><ul><li>a</li><li>c</li></ul></div>");
    }

    #[test]
    fn test_patches_past_the_old_tree_are_dropped() {
        let mut doc = Document::new();
        let a = node("p", [], [text("x")]);
        let root = render(&mut doc, &a, &sink()).unwrap();
        let patches = vec![
            Patch::new(1, PatchKind::Text("y".into())),
            Patch::new(5, PatchKind::Text("lost".into())),
            Patch::new(9, PatchKind::Remove(None)),
        ];

        let root = apply(&mut doc, root, &a, patches, &sink()).unwrap();
        assert_eq!(doc.to_markup(root), "<p>y</p>");
    }

    #[test]
    fn test_root_redraw_replaces_root() {
        let mut doc = Document::new();
        let container = doc.create_element("body", None);
        let a = node("div", [], []);
        let b = node("section", [], []);
        let root = render(&mut doc, &a, &sink()).unwrap();
        doc.append_child(container, root).unwrap();

        let new_root = step(&mut doc, root, &a, &b);
        assert_ne!(new_root, root);
        assert!(!doc.is_alive(root));
        assert_eq!(doc.children(container), &[new_root]);
    }

    #[test]
    fn test_keyed_rotation_reuses_nodes() {
        let mut doc = Document::new();
        let a = keyed_node("ul", [], [("k1", li("A")), ("k2", li("B")), ("k3", li("C"))]);
        let b = keyed_node("ul", [], [("k3", li("C")), ("k1", li("A")), ("k2", li("B"))]);
        let root = render(&mut doc, &a, &sink()).unwrap();
        let before = doc.children(root).to_vec();

        let root = step(&mut doc, root, &a, &b);
        assert_eq!(doc.children(root), &[before[2], before[0], before[1]]);
    }

    #[test]
    fn test_keyed_end_inserts_and_removals() {
        let mut doc = Document::new();
        let a = keyed_node("ul", [], [("a", li("a")), ("b", li("b"))]);
        let b = keyed_node("ul", [], [("a", li("a")), ("c", li("c")), ("d", li("d"))]);
        let root = render(&mut doc, &a, &sink()).unwrap();
        let first = doc.children(root)[0];

        let root = step(&mut doc, root, &a, &b);
        assert_eq!(doc.children(root)[0], first);
        assert_eq!(doc.to_markup(root), "<ul><li>a</li><li>c</li><li>d</li></ul>");
    }

    #[test]
    fn test_moved_child_gets_its_patches() {
        let mut doc = Document::new();
        let a = keyed_node("ul", [], [("a", li("a")), ("b", li("b")), ("c", li("c"))]);
        let b = keyed_node("ul", [], [("c", li("c2")), ("a", li("a")), ("b", li("b"))]);
        let root = render(&mut doc, &a, &sink()).unwrap();

        let root = step(&mut doc, root, &a, &b);
        assert_eq!(doc.to_markup(root), "<ul><li>c2</li><li>a</li><li>b</li></ul>");
    }

    #[test]
    fn test_retag_updates_context_in_place() {
        let seen = Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink_seen = seen.clone();
        let ctx = DispatchContext::root(move |m| {
            if let Ok(s) = m.downcast::<String>() {
                sink_seen.borrow_mut().push(*s);
            }
        });
        let mut doc = Document::new();
        let button = node("button", [on_message("click", 1u8)], []);
        let a = map(|n: u8| format!("a{n}"), button.clone());
        let b = map(|n: u8| format!("b{n}"), button);
        let root = render(&mut doc, &a, &ctx).unwrap();
        let before = doc.dispatch_context(root).unwrap();

        let root = apply(&mut doc, root, &a, diff(&a, &b), &ctx).unwrap();
        assert!(Rc::ptr_eq(&before, &doc.dispatch_context(root).unwrap()));
        doc.dispatch_event(root, &crate::dom::Event::new("click")).unwrap();
        assert_eq!(*seen.borrow(), vec!["b1"]);
    }

    #[test]
    fn test_lazy_patch_applies_inside_expansion() {
        let mut doc = Document::new();
        let a = node("div", [], [thunk(vec![Rc::new(1u8) as Rc<dyn std::any::Any>], || li("1"))]);
        let b = node("div", [], [thunk(vec![Rc::new(2u8) as Rc<dyn std::any::Any>], || li("2"))]);
        let root = render(&mut doc, &a, &sink()).unwrap();

        let root = step(&mut doc, root, &a, &b);
        assert_eq!(doc.to_markup(root), "<div><li>2</li></div>");
    }

    #[test]
    fn test_redraw_inherits_dispatch_context() {
        let mut doc = Document::new();
        let a = map(|n: u8| n, node("div", [attribute("id", "a")], []));
        let b = map(|n: u8| n, text("now text"));
        let root = render(&mut doc, &a, &sink()).unwrap();
        let ctx = doc.dispatch_context(root).unwrap();

        let root = step(&mut doc, root, &a, &b);
        assert_eq!(doc.text(root), Some("now text"));
        assert!(Rc::ptr_eq(&ctx, &doc.dispatch_context(root).unwrap()));
    }
}
