//! Diff engine - compare two virtual trees into a patch list.

use std::rc::Rc;

use tracing::{debug, warn};

use super::keyed::{self, Role, Step};
use super::patch::{Entry, Insert, Moved, Patch, PatchKind, Reorder};
use crate::vdom::{Custom, Html, KeyedElement, Lazy, VNode, diff_facts, unwrap_taggers};

/// Patches that turn a live rendering of `old` into one of `new`.
///
/// Patches are ordered by ascending index, which is what the applier's
/// single walk relies on.
pub fn diff(old: &Html, new: &Html) -> Vec<Patch> {
    let mut patches = Vec::new();
    diff_help(old, new, &mut patches, 0);
    debug!(patches = patches.len(), "diff complete");
    patches
}

fn diff_help(x: &Html, y: &Html, patches: &mut Vec<Patch>, index: usize) {
    if Rc::ptr_eq(x, y) {
        return;
    }
    match (&**x, &**y) {
        (VNode::Lazy(a), VNode::Lazy(b)) => diff_lazy(a, b, y, patches, index),
        (VNode::Tagger(_), VNode::Tagger(_)) => diff_taggers(x, y, patches, index),
        (VNode::Text(a), VNode::Text(b)) => {
            if a != b {
                patches.push(Patch::new(index, PatchKind::Text(b.clone())));
            }
        }
        (VNode::Element(a), VNode::Element(b)) => {
            if !same_element(&a.tag, &a.namespace, &b.tag, &b.namespace) {
                redraw(y, patches, index);
                return;
            }
            if let Some(d) = diff_facts(&a.facts, &b.facts) {
                patches.push(Patch::new(index, PatchKind::Facts(d)));
            }
            diff_kids(&a.children, &b.children, patches, index);
        }
        (VNode::Keyed(a), VNode::Keyed(b)) => {
            if !same_element(&a.tag, &a.namespace, &b.tag, &b.namespace) {
                redraw(y, patches, index);
                return;
            }
            if let Some(d) = diff_facts(&a.facts, &b.facts) {
                patches.push(Patch::new(index, PatchKind::Facts(d)));
            }
            diff_keyed_kids(a, b, patches, index);
        }
        (VNode::Element(a), VNode::Keyed(b)) => {
            // New node is keyed but the old one was not: diff positionally.
            if !same_element(&a.tag, &a.namespace, &b.tag, &b.namespace) {
                redraw(y, patches, index);
                return;
            }
            if let Some(d) = diff_facts(&a.facts, &b.facts) {
                patches.push(Patch::new(index, PatchKind::Facts(d)));
            }
            let dekeyed: Vec<Html> = b.children.iter().map(|(_, c)| c.clone()).collect();
            diff_kids(&a.children, &dekeyed, patches, index);
        }
        (VNode::Custom(a), VNode::Custom(b)) => diff_custom(a, b, y, patches, index),
        _ => redraw(y, patches, index),
    }
}

fn same_element(
    x_tag: &str,
    x_ns: &Option<String>,
    y_tag: &str,
    y_ns: &Option<String>,
) -> bool {
    x_tag == y_tag && x_ns == y_ns
}

fn redraw(y: &Html, patches: &mut Vec<Patch>, index: usize) {
    patches.push(Patch::new(index, PatchKind::Redraw(y.clone())));
}

fn diff_lazy(a: &Lazy, b: &Lazy, y: &Html, patches: &mut Vec<Patch>, index: usize) {
    if a.same_refs(b) {
        if let Some(cached) = a.cached() {
            b.adopt(cached.clone());
        }
        return;
    }
    let Some(old) = a.cached() else {
        warn!(index, "previous lazy node was never expanded, redrawing");
        redraw(y, patches, index);
        return;
    };
    let mut sub = Vec::new();
    diff_help(old, b.force(), &mut sub, 0);
    if !sub.is_empty() {
        patches.push(Patch::new(index, PatchKind::Lazy(sub)));
    }
}

fn diff_taggers(x: &Html, y: &Html, patches: &mut Vec<Patch>, index: usize) {
    let (x_mappers, x_inner) = unwrap_taggers(x);
    let (y_mappers, y_inner) = unwrap_taggers(y);

    if x_mappers.len() != y_mappers.len() {
        redraw(y, patches, index);
        return;
    }
    let same = x_mappers
        .iter()
        .zip(&y_mappers)
        .all(|(a, b)| a.ptr_eq(b));
    if !same {
        patches.push(Patch::new(index, PatchKind::Retag(y_mappers)));
    }
    diff_help(x_inner, y_inner, patches, index + 1);
}

fn diff_custom(a: &Custom, b: &Custom, y: &Html, patches: &mut Vec<Patch>, index: usize) {
    if !Rc::ptr_eq(&a.widget, &b.widget) {
        redraw(y, patches, index);
        return;
    }
    if let Some(d) = diff_facts(&a.facts, &b.facts) {
        patches.push(Patch::new(index, PatchKind::Facts(d)));
    }
    if let Some(patch) = b.widget.diff(&*a.model, &*b.model) {
        let facts = b.facts.clone();
        patches.push(Patch::new(index, PatchKind::Widget { patch, facts }));
    }
}

fn diff_kids(xs: &[Html], ys: &[Html], patches: &mut Vec<Patch>, root: usize) {
    if xs.len() > ys.len() {
        patches.push(Patch::new(root, PatchKind::RemoveLast(xs.len() - ys.len())));
    } else if xs.len() < ys.len() {
        patches.push(Patch::new(root, PatchKind::Append(ys[xs.len()..].to_vec())));
    }

    let mut index = root;
    for (x, y) in xs.iter().zip(ys) {
        index += 1;
        diff_help(x, y, patches, index);
        index += x.descendants();
    }
}

fn diff_keyed_kids(a: &KeyedElement, b: &KeyedElement, patches: &mut Vec<Patch>, root: usize) {
    let old_keys: Vec<&str> = a.children.iter().map(|(k, _)| &**k).collect();
    let new_keys: Vec<&str> = b.children.iter().map(|(k, _)| &**k).collect();
    let plan = keyed::reconcile(&old_keys, &new_keys, &a.keys, &b.keys);

    let mut local = Vec::new();
    let mut entries = Vec::new();
    let mut entry_of_new: Vec<Option<usize>> = vec![None; b.children.len()];

    let mut index = root;
    for (i, (_, x)) in a.children.iter().enumerate() {
        index += 1;
        match plan.roles[i] {
            Role::Keep(j) => diff_help(x, &b.children[j].1, &mut local, index),
            Role::Move(j) => {
                let mut sub = Vec::new();
                diff_help(x, &b.children[j].1, &mut sub, index);
                entry_of_new[j] = Some(entries.len());
                local.push(Patch::new(
                    index,
                    PatchKind::Remove(Some(Moved {
                        entry: entries.len(),
                        patches: sub,
                    })),
                ));
                entries.push(Entry::Move);
            }
            Role::Removed => local.push(Patch::new(index, PatchKind::Remove(None))),
        }
        index += x.descendants();
    }

    for (j, step) in plan.steps.iter().enumerate() {
        if matches!(step, Step::Create) {
            entry_of_new[j] = Some(entries.len());
            entries.push(Entry::Insert(b.children[j].1.clone()));
        }
    }

    let tail = plan.tail_start();
    let mut inserts = Vec::new();
    let mut end_inserts = Vec::new();
    for (j, entry) in entry_of_new.into_iter().enumerate() {
        let Some(entry) = entry else { continue };
        let insert = Insert { index: j, entry };
        if j >= tail {
            end_inserts.push(insert);
        } else {
            inserts.push(insert);
        }
    }

    if local.is_empty() && inserts.is_empty() && end_inserts.is_empty() {
        return;
    }
    patches.push(Patch::new(
        root,
        PatchKind::Reorder(Reorder {
            patches: local,
            inserts,
            end_inserts,
            entries,
        }),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::patch::count;
    use crate::vdom::{attribute, class, keyed_node, map, node, text, thunk};

    fn li(label: &str) -> Html {
        node("li", [], [text(label)])
    }

    #[test]
    fn test_same_reference_no_patches() {
        let tree = node("div", [class("a")], [text("x")]);
        assert!(diff(&tree, &tree).is_empty());
    }

    #[test]
    fn test_deep_equal_trees_only_touch_nothing() {
        let a = node("div", [class("a")], [li("x"), li("y")]);
        let b = node("div", [class("a")], [li("x"), li("y")]);
        assert!(diff(&a, &b).is_empty());
    }

    #[test]
    fn test_kind_change_redraws() {
        let a = node("div", [], [text("x")]);
        let b = node("div", [], [node("span", [], [])]);
        let patches = diff(&a, &b);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].index, 1);
        assert!(matches!(patches[0].kind, PatchKind::Redraw(_)));
    }

    #[test]
    fn test_text_and_facts_indexes() {
        let a = node("ul", [], [li("a"), li("b")]);
        let b = node("ul", [attribute("id", "list")], [li("a"), li("c")]);
        let patches = diff(&a, &b);

        assert_eq!(patches.len(), 2);
        assert_eq!(patches[0].index, 0);
        assert!(matches!(patches[0].kind, PatchKind::Facts(_)));
        // ul=0, li=1, "a"=2, li=3, "b"=4
        assert_eq!(patches[1].index, 4);
        assert!(matches!(&patches[1].kind, PatchKind::Text(t) if t == "c"));
    }

    #[test]
    fn test_length_changes() {
        let a = node("ul", [], [li("a"), li("b"), li("c")]);
        let b = node("ul", [], [li("a")]);
        assert!(matches!(diff(&a, &b)[0].kind, PatchKind::RemoveLast(2)));

        let patches = diff(&b, &a);
        assert!(matches!(&patches[0].kind, PatchKind::Append(nodes) if nodes.len() == 2));
    }

    #[test]
    fn test_tagger_retag_and_length_mismatch() {
        let inner = text("x");
        let a = map(|n: u8| n, inner.clone());
        let b = map(|n: u8| n, inner.clone());
        let patches = diff(&a, &b);
        assert_eq!(patches.len(), 1);
        assert!(matches!(patches[0].kind, PatchKind::Retag(_)));

        let c = map(|n: u8| n, map(|n: u8| n, inner));
        assert!(matches!(diff(&a, &c)[0].kind, PatchKind::Redraw(_)));
    }

    #[test]
    fn test_lazy_same_refs_skips_thunk() {
        let arg: Rc<dyn std::any::Any> = Rc::new(1u8);
        let a = thunk(vec![arg.clone()], || text("a"));
        let VNode::Lazy(la) = &*a else { panic!() };
        la.force();

        let b = thunk(vec![arg], || panic!("thunk must not run"));
        assert!(diff(&a, &b).is_empty());
        let VNode::Lazy(lb) = &*b else { panic!() };
        assert!(lb.cached().is_some());
    }

    #[test]
    fn test_lazy_changed_refs_nests_patches() {
        let a = thunk(vec![Rc::new(1u8) as Rc<dyn std::any::Any>], || node("p", [], [text("1")]));
        let VNode::Lazy(la) = &*a else { panic!() };
        la.force();
        let b = thunk(vec![Rc::new(2u8) as Rc<dyn std::any::Any>], || node("p", [], [text("2")]));

        let patches = diff(&a, &b);
        let PatchKind::Lazy(sub) = &patches[0].kind else { panic!() };
        assert_eq!(sub[0].index, 1);
        assert_eq!(count(&patches), 2);
    }

    #[test]
    fn test_keyed_rotation_single_move() {
        let a = keyed_node("ul", [], [("k1", li("A")), ("k2", li("B")), ("k3", li("C"))]);
        let b = keyed_node("ul", [], [("k3", li("C")), ("k1", li("A")), ("k2", li("B"))]);
        let patches = diff(&a, &b);
        let PatchKind::Reorder(r) = &patches[0].kind else { panic!() };
        assert_eq!(r.moves(), 1);
        assert_eq!(r.creates(), 0);
        assert_eq!(r.removals(), 0);
        assert_eq!(r.inserts, vec![Insert { index: 0, entry: 0 }]);
    }

    #[test]
    fn test_element_to_keyed_is_positional() {
        let a = node("ul", [], [li("a")]);
        let b = keyed_node("ul", [], [("x", li("a")), ("y", li("b"))]);
        let patches = diff(&a, &b);
        assert!(matches!(&patches[0].kind, PatchKind::Append(n) if n.len() == 1));

        // the other direction is a different kind
        assert!(matches!(diff(&b, &a)[0].kind, PatchKind::Redraw(_)));
    }
}
