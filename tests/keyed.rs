//! Keyed list scenarios run through both engines.

use std::rc::Rc;

use spark_vdom::dom::{DispatchContext, Document};
use spark_vdom::reconcile::keyed::reconcile_keys;
use spark_vdom::reconcile::{
    DefaultForeignHandler, Morph, PatchKind, SideTable, apply, diff, render,
};
use spark_vdom::types::NodeId;
use spark_vdom::vdom::{Html, keyed_node, node, text};

fn row(key: &str) -> (String, Html) {
    (key.to_owned(), node("li", [], [text(key)]))
}

fn list(keys: &[&str]) -> Html {
    keyed_node("ul", [], keys.iter().map(|k| row(k)))
}

fn labels(doc: &Document, root: NodeId) -> Vec<String> {
    doc.children(root)
        .iter()
        .filter_map(|&li| doc.first_child(li).and_then(|t| doc.text(t)))
        .map(str::to_owned)
        .collect()
}

fn context() -> Rc<DispatchContext> {
    DispatchContext::root(|_| {})
}

#[test]
fn test_rotation_diff_patch() {
    let old = list(&["A", "B", "C", "D", "E"]);
    let new = list(&["E", "A", "B", "C", "D"]);

    let patches = diff(&old, &new);
    assert_eq!(patches.len(), 1);
    let PatchKind::Reorder(reorder) = &patches[0].kind else {
        panic!("expected reorder, got {}", patches[0].kind.name());
    };
    assert_eq!(reorder.moves(), 1);
    assert_eq!(reorder.creates(), 0);
    assert_eq!(reorder.removals(), 0);

    let ctx = context();
    let mut doc = Document::new();
    let root = render(&mut doc, &old, &ctx).unwrap();
    let before = doc.children(root).to_vec();
    let root = apply(&mut doc, root, &old, patches, &ctx).unwrap();

    assert_eq!(labels(&doc, root), ["E", "A", "B", "C", "D"]);
    assert_eq!(doc.children(root)[0], before[4]);
    assert_eq!(&doc.children(root)[1..], &before[..4]);
}

#[test]
fn test_rotation_morph() {
    let old = list(&["A", "B", "C", "D", "E"]);
    let new = list(&["E", "A", "B", "C", "D"]);

    let ctx = context();
    let mut doc = Document::new();
    let mut table = SideTable::new();
    let mut handler = DefaultForeignHandler;
    let root = Morph::new(&mut doc, &mut table, &mut handler)
        .render(&old, &ctx)
        .unwrap();
    let before = doc.children(root).to_vec();

    let mut morph = Morph::new(&mut doc, &mut table, &mut handler);
    let root = morph.run(root, &new, &ctx).unwrap();
    let stats = morph.stats().clone();
    assert_eq!(stats.moved, 1);
    assert_eq!(stats.created, 0);
    assert_eq!(stats.removed, 0);

    assert_eq!(labels(&doc, root), ["E", "A", "B", "C", "D"]);
    assert_eq!(doc.children(root)[0], before[4]);
}

#[test]
fn test_swap_needs_no_map() {
    let plan = reconcile_keys(&["A", "B", "C", "D"], &["A", "C", "B", "D"]);
    assert_eq!(plan.stats.swaps, 1);
    assert!(!plan.stats.used_map);
    assert_eq!(plan.stats.created, 0);
    assert_eq!(plan.stats.removed, 0);
}

#[test]
fn test_insert_remove_and_reorder_together() {
    let old = list(&["A", "B", "C", "D"]);
    let new = list(&["D", "X", "B", "A"]);
    let ctx = context();

    let mut doc = Document::new();
    let root = render(&mut doc, &old, &ctx).unwrap();
    let root = apply(&mut doc, root, &old, diff(&old, &new), &ctx).unwrap();
    assert_eq!(labels(&doc, root), ["D", "X", "B", "A"]);

    let mut doc = Document::new();
    let mut table = SideTable::new();
    let mut handler = DefaultForeignHandler;
    let root = Morph::new(&mut doc, &mut table, &mut handler)
        .render(&old, &ctx)
        .unwrap();
    let mut morph = Morph::new(&mut doc, &mut table, &mut handler);
    let root = morph.run(root, &new, &ctx).unwrap();
    // the new row and its text
    assert_eq!(morph.stats().created, 2);
    assert_eq!(morph.stats().removed, 1);
    assert_eq!(labels(&doc, root), ["D", "X", "B", "A"]);
}

#[test]
fn test_duplicate_keys_still_converge() {
    let old = list(&["A", "A", "B"]);
    let new = list(&["B", "A", "A", "A"]);
    let ctx = context();

    let mut doc = Document::new();
    let root = render(&mut doc, &old, &ctx).unwrap();
    let root = apply(&mut doc, root, &old, diff(&old, &new), &ctx).unwrap();
    assert_eq!(labels(&doc, root), ["B", "A", "A", "A"]);

    let mut doc = Document::new();
    let mut table = SideTable::new();
    let mut handler = DefaultForeignHandler;
    let root = Morph::new(&mut doc, &mut table, &mut handler)
        .render(&old, &ctx)
        .unwrap();
    let root = Morph::new(&mut doc, &mut table, &mut handler)
        .run(root, &new, &ctx)
        .unwrap();
    assert_eq!(labels(&doc, root), ["B", "A", "A", "A"]);
}
