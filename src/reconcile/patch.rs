//! Patch types produced by [`diff`](super::diff) and consumed by
//! [`apply`](super::apply).

use crate::dom::Mapper;
use crate::vdom::{Facts, FactsDiff, Html, WidgetPatch};

/// One recorded mutation. `index` is the pre-order position of the target
/// in the old tree.
#[derive(Debug, Clone)]
pub struct Patch {
    pub index: usize,
    pub kind: PatchKind,
}

impl Patch {
    pub fn new(index: usize, kind: PatchKind) -> Self {
        Self { index, kind }
    }
}

#[derive(Debug, Clone)]
pub enum PatchKind {
    /// Render the node from scratch and replace the live one.
    Redraw(Html),
    Facts(FactsDiff),
    Text(String),
    /// Patches for a lazy node's expansion, indexed from the expansion.
    Lazy(Vec<Patch>),
    /// New mapper chain for a tagger, outermost first.
    Retag(Vec<Mapper>),
    RemoveLast(usize),
    Append(Vec<Html>),
    /// Keyed child removal. A moved child carries its own patches and the
    /// entry it is re-inserted through.
    Remove(Option<Moved>),
    Reorder(Reorder),
    /// Custom node update. `facts` are the new node's full facts, set on the
    /// replacement when the patch swaps the live node out.
    Widget { patch: WidgetPatch, facts: Facts },
}

impl PatchKind {
    pub fn name(&self) -> &'static str {
        match self {
            PatchKind::Redraw(_) => "redraw",
            PatchKind::Facts(_) => "facts",
            PatchKind::Text(_) => "text",
            PatchKind::Lazy(_) => "lazy",
            PatchKind::Retag(_) => "retag",
            PatchKind::RemoveLast(_) => "remove-last",
            PatchKind::Append(_) => "append",
            PatchKind::Remove(_) => "remove",
            PatchKind::Reorder(_) => "reorder",
            PatchKind::Widget { .. } => "widget",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Moved {
    pub entry: usize,
    pub patches: Vec<Patch>,
}

/// Keyed children update.
#[derive(Debug, Clone)]
pub struct Reorder {
    /// Patches for old children, indexed like any other patch.
    pub patches: Vec<Patch>,
    /// Insertions before the child currently at `index`, ascending.
    pub inserts: Vec<Insert>,
    /// Insertions appended together through one fragment.
    pub end_inserts: Vec<Insert>,
    pub entries: Vec<Entry>,
}

impl Reorder {
    /// Number of old children moved to a new position.
    pub fn moves(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, Entry::Move))
            .count()
    }

    /// Number of children rendered fresh.
    pub fn creates(&self) -> usize {
        self.entries.len() - self.moves()
    }

    /// Number of old children removed for good.
    pub fn removals(&self) -> usize {
        self.patches
            .iter()
            .filter(|p| matches!(p.kind, PatchKind::Remove(None)))
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insert {
    pub index: usize,
    pub entry: usize,
}

#[derive(Debug, Clone)]
pub enum Entry {
    /// Render this node.
    Insert(Html),
    /// Take the node stashed by the matching `Remove(Some(..))`.
    Move,
}

/// Total number of patches, nested ones included.
pub fn count(patches: &[Patch]) -> usize {
    patches
        .iter()
        .map(|p| {
            1 + match &p.kind {
                PatchKind::Lazy(sub) => count(sub),
                PatchKind::Remove(Some(moved)) => count(&moved.patches),
                PatchKind::Reorder(r) => count(&r.patches),
                _ => 0,
            }
        })
        .sum()
}
