//! Virtual nodes.
//!
//! A virtual tree is immutable and built fresh for every render pass.
//! Subtrees are shared through `Rc`, which is what makes the reference
//! equality short-circuits in the diff and morph engines valid.
//!
//! Element, keyed element and tagger nodes cache their descendant count at
//! construction:
//!
//! - element: number of children plus the sum of the children's counts
//! - tagger: one plus the wrapped node's count
//! - text, custom and lazy nodes: zero
//!
//! Patch indexes are pre-order positions computed from these counts, so a
//! whole untouched subtree can be skipped with one addition.

use std::any::Any;
use std::cell::OnceCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use tracing::warn;

use super::facts::{Fact, Facts, normalize};
use super::sanitize::no_script;
use super::widget::Widget;
use crate::dom::Mapper;
use crate::types::{Key, normalize_namespace};

/// Shared handle to a virtual node.
pub type Html = Rc<VNode>;

pub enum VNode {
    Text(String),
    Element(Element),
    Keyed(KeyedElement),
    Custom(Custom),
    Tagger(Tagger),
    Lazy(Lazy),
}

pub struct Element {
    pub tag: String,
    pub namespace: Option<String>,
    pub facts: Facts,
    pub children: Vec<Html>,
    descendants: usize,
}

pub struct KeyedElement {
    pub tag: String,
    pub namespace: Option<String>,
    pub facts: Facts,
    pub children: Vec<(Key, Html)>,
    /// Every key in `children`, for telling removals from moves.
    pub keys: HashSet<Key>,
    descendants: usize,
}

pub struct Custom {
    pub facts: Facts,
    pub model: Rc<dyn Any>,
    pub widget: Rc<dyn Widget>,
}

pub struct Tagger {
    pub mapper: Mapper,
    pub node: Html,
    descendants: usize,
}

/// Deferred subtree. The thunk runs at most once per `Lazy` value.
pub struct Lazy {
    pub refs: Vec<Rc<dyn Any>>,
    thunk: Rc<dyn Fn() -> Html>,
    cache: OnceCell<Html>,
}

impl Element {
    pub fn descendants(&self) -> usize {
        self.descendants
    }
}

impl KeyedElement {
    pub fn descendants(&self) -> usize {
        self.descendants
    }
}

impl Tagger {
    pub fn descendants(&self) -> usize {
        self.descendants
    }
}

impl Lazy {
    /// Expansion of this node, running the thunk on first use.
    pub fn force(&self) -> &Html {
        self.cache.get_or_init(|| (self.thunk)())
    }

    pub fn cached(&self) -> Option<&Html> {
        self.cache.get()
    }

    /// Take over an expansion computed for an equivalent lazy node.
    pub(crate) fn adopt(&self, expansion: Html) {
        let _ = self.cache.set(expansion);
    }

    /// Pairwise reference equality of the argument lists.
    pub fn same_refs(&self, other: &Lazy) -> bool {
        self.refs.len() == other.refs.len()
            && self
                .refs
                .iter()
                .zip(&other.refs)
                .all(|(a, b)| Rc::ptr_eq(a, b))
    }
}

impl VNode {
    /// Pre-order descendant count used for patch indexing.
    pub fn descendants(&self) -> usize {
        match self {
            VNode::Element(el) => el.descendants,
            VNode::Keyed(el) => el.descendants,
            VNode::Tagger(t) => t.descendants,
            VNode::Text(_) | VNode::Custom(_) | VNode::Lazy(_) => 0,
        }
    }

    pub fn facts(&self) -> Option<&Facts> {
        match self {
            VNode::Element(el) => Some(&el.facts),
            VNode::Keyed(el) => Some(&el.facts),
            VNode::Custom(c) => Some(&c.facts),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            VNode::Text(_) => "text",
            VNode::Element(_) => "element",
            VNode::Keyed(_) => "keyed",
            VNode::Custom(_) => "custom",
            VNode::Tagger(_) => "tagger",
            VNode::Lazy(_) => "lazy",
        }
    }
}

/// Collapse a chain of taggers. Mappers are returned outermost first,
/// together with the first non-tagger node.
pub fn unwrap_taggers(node: &Html) -> (Vec<Mapper>, &Html) {
    let mut mappers = Vec::new();
    let mut current = node;
    while let VNode::Tagger(t) = &**current {
        mappers.push(t.mapper.clone());
        current = &t.node;
    }
    (mappers, current)
}

// =============================================================================
// Constructors
// =============================================================================

pub fn text(text: impl Into<String>) -> Html {
    Rc::new(VNode::Text(text.into()))
}

pub(crate) fn element_from_parts(
    tag: &str,
    namespace: Option<&str>,
    facts: Facts,
    children: Vec<Html>,
) -> Html {
    let descendants = children.iter().map(|c| 1 + c.descendants()).sum();
    Rc::new(VNode::Element(Element {
        tag: tag.to_owned(),
        namespace: normalize_namespace(namespace).map(str::to_owned),
        facts,
        children,
        descendants,
    }))
}

/// Element node. A `Namespace` fact sets the namespace.
pub fn node(
    tag: &str,
    facts: impl IntoIterator<Item = Fact>,
    children: impl IntoIterator<Item = Html>,
) -> Html {
    let normalized = normalize(facts);
    element_from_parts(
        no_script(tag),
        normalized.namespace.as_deref(),
        normalized.facts,
        children.into_iter().collect(),
    )
}

/// Element node in `namespace`, which takes precedence over any
/// `Namespace` fact.
pub fn node_ns(
    namespace: &str,
    tag: &str,
    facts: impl IntoIterator<Item = Fact>,
    children: impl IntoIterator<Item = Html>,
) -> Html {
    let normalized = normalize(facts);
    element_from_parts(
        no_script(tag),
        Some(namespace),
        normalized.facts,
        children.into_iter().collect(),
    )
}

fn keyed_from_parts(
    tag: &str,
    namespace: Option<&str>,
    facts: Facts,
    children: Vec<(Key, Html)>,
) -> Html {
    let descendants = children.iter().map(|(_, c)| 1 + c.descendants()).sum();
    let mut keys = HashSet::with_capacity(children.len());
    for (key, _) in &children {
        if !keys.insert(key.clone()) {
            warn!(key = %key, tag, "duplicate key in keyed children");
        }
    }
    Rc::new(VNode::Keyed(KeyedElement {
        tag: no_script(tag).to_owned(),
        namespace: normalize_namespace(namespace).map(str::to_owned),
        facts,
        children,
        keys,
        descendants,
    }))
}

/// Element whose children carry stable keys.
pub fn keyed_node<K: Into<Key>>(
    tag: &str,
    facts: impl IntoIterator<Item = Fact>,
    children: impl IntoIterator<Item = (K, Html)>,
) -> Html {
    let normalized = normalize(facts);
    keyed_from_parts(
        tag,
        normalized.namespace.as_deref(),
        normalized.facts,
        children.into_iter().map(|(k, c)| (k.into(), c)).collect(),
    )
}

pub fn keyed_node_ns<K: Into<Key>>(
    namespace: &str,
    tag: &str,
    facts: impl IntoIterator<Item = Fact>,
    children: impl IntoIterator<Item = (K, Html)>,
) -> Html {
    let normalized = normalize(facts);
    keyed_from_parts(
        tag,
        Some(namespace),
        normalized.facts,
        children.into_iter().map(|(k, c)| (k.into(), c)).collect(),
    )
}

/// Custom node rendered and diffed by `widget`.
pub fn custom(
    facts: impl IntoIterator<Item = Fact>,
    model: impl Any,
    widget: Rc<dyn Widget>,
) -> Html {
    Rc::new(VNode::Custom(Custom {
        facts: normalize(facts).facts,
        model: Rc::new(model),
        widget,
    }))
}

/// Wrap `node` so its `A` messages reach the application as `B`.
pub fn map<A: 'static, B: 'static>(f: impl Fn(A) -> B + 'static, node: Html) -> Html {
    map_with(Mapper::new(f), node)
}

pub fn map_with(mapper: Mapper, node: Html) -> Html {
    let descendants = 1 + node.descendants();
    Rc::new(VNode::Tagger(Tagger {
        mapper,
        node,
        descendants,
    }))
}

/// Lazy node over an explicit reference list.
pub fn thunk(refs: Vec<Rc<dyn Any>>, build: impl Fn() -> Html + 'static) -> Html {
    Rc::new(VNode::Lazy(Lazy {
        refs,
        thunk: Rc::new(build),
        cache: OnceCell::new(),
    }))
}

/// `view(a)`, skipped while `view` and `a` are the same allocations as in
/// the previous pass.
pub fn lazy<F, A>(view: &Rc<F>, a: &Rc<A>) -> Html
where
    F: Fn(&A) -> Html + 'static,
    A: 'static,
{
    let (f, x) = (view.clone(), a.clone());
    let refs: Vec<Rc<dyn Any>> = vec![view.clone(), a.clone()];
    thunk(refs, move || f(&x))
}

pub fn lazy2<F, A, B>(view: &Rc<F>, a: &Rc<A>, b: &Rc<B>) -> Html
where
    F: Fn(&A, &B) -> Html + 'static,
    A: 'static,
    B: 'static,
{
    let (f, x, y) = (view.clone(), a.clone(), b.clone());
    let refs: Vec<Rc<dyn Any>> = vec![view.clone(), a.clone(), b.clone()];
    thunk(refs, move || f(&x, &y))
}

pub fn lazy3<F, A, B, C>(view: &Rc<F>, a: &Rc<A>, b: &Rc<B>, c: &Rc<C>) -> Html
where
    F: Fn(&A, &B, &C) -> Html + 'static,
    A: 'static,
    B: 'static,
    C: 'static,
{
    let (f, x, y, z) = (view.clone(), a.clone(), b.clone(), c.clone());
    let refs: Vec<Rc<dyn Any>> = vec![view.clone(), a.clone(), b.clone(), c.clone()];
    thunk(refs, move || f(&x, &y, &z))
}

// =============================================================================
// Debug
// =============================================================================

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VNode::Text(s) => f.debug_tuple("Text").field(s).finish(),
            VNode::Element(el) => f
                .debug_struct("Element")
                .field("tag", &el.tag)
                .field("namespace", &el.namespace)
                .field("facts", &el.facts)
                .field("children", &el.children)
                .finish(),
            VNode::Keyed(el) => f
                .debug_struct("Keyed")
                .field("tag", &el.tag)
                .field("namespace", &el.namespace)
                .field("facts", &el.facts)
                .field("children", &el.children)
                .finish(),
            VNode::Custom(c) => f
                .debug_struct("Custom")
                .field("facts", &c.facts)
                .finish_non_exhaustive(),
            VNode::Tagger(t) => f
                .debug_struct("Tagger")
                .field("mapper", &t.mapper)
                .field("node", &t.node)
                .finish(),
            VNode::Lazy(l) => f
                .debug_struct("Lazy")
                .field("refs", &l.refs.len())
                .field("cached", &l.cache.get())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::vdom::facts::{attribute, namespace};

    #[test]
    fn test_descendant_counts() {
        let leaf = || node("li", [], [text("x")]);
        let ul = node("ul", [], [leaf(), leaf(), text("t")]);
        // three children, two of which hold one text node each
        assert_eq!(ul.descendants(), 5);

        let tagged = map(|n: u8| n, ul.clone());
        assert_eq!(tagged.descendants(), 6);

        let keyed = keyed_node("ul", [], [("a", leaf()), ("b", text("y"))]);
        assert_eq!(keyed.descendants(), 3);

        let deferred = thunk(vec![], move || ul.clone());
        assert_eq!(deferred.descendants(), 0);
    }

    #[test]
    fn test_script_becomes_p() {
        let n = node("script", [], []);
        let VNode::Element(el) = &*n else { panic!("not an element") };
        assert_eq!(el.tag, "p");
    }

    #[test]
    fn test_namespace_from_fact_and_constructor() {
        let svg = crate::types::SVG_NAMESPACE;
        let from_fact = node("circle", [namespace(svg)], []);
        let VNode::Element(el) = &*from_fact else { panic!() };
        assert_eq!(el.namespace.as_deref(), Some(svg));

        let explicit = node_ns(svg, "circle", [namespace("other")], []);
        let VNode::Element(el) = &*explicit else { panic!() };
        assert_eq!(el.namespace.as_deref(), Some(svg));

        let html = node_ns(crate::types::XHTML_NAMESPACE, "div", [attribute("id", "x")], []);
        let VNode::Element(el) = &*html else { panic!() };
        assert_eq!(el.namespace, None);
    }

    #[test]
    fn test_unwrap_taggers_collects_outermost_first() {
        let inner = text("x");
        let outer_mapper = Mapper::new(|n: u8| n as u16);
        let inner_mapper = Mapper::new(|n: u8| n);
        let tree = map_with(outer_mapper.clone(), map_with(inner_mapper.clone(), inner.clone()));

        let (mappers, node) = unwrap_taggers(&tree);
        assert_eq!(mappers.len(), 2);
        assert!(mappers[0].ptr_eq(&outer_mapper));
        assert!(mappers[1].ptr_eq(&inner_mapper));
        assert!(Rc::ptr_eq(node, &inner));
    }

    #[test]
    fn test_lazy_runs_thunk_once() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let view = Rc::new(move |n: &u32| {
            counter.set(counter.get() + 1);
            text(n.to_string())
        });
        let arg = Rc::new(7u32);
        let html = lazy(&view, &arg);
        let VNode::Lazy(l) = &*html else { panic!() };

        assert!(l.cached().is_none());
        l.force();
        l.force();
        assert_eq!(calls.get(), 1);

        let again = lazy(&view, &arg);
        let VNode::Lazy(l2) = &*again else { panic!() };
        assert!(l.same_refs(l2));

        let fresh = lazy(&view, &Rc::new(7u32));
        let VNode::Lazy(l3) = &*fresh else { panic!() };
        assert!(!l.same_refs(l3));
    }
}
