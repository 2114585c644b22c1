//! Core types for spark-vdom.
//!
//! These are the handles and aliases shared by the live document and the
//! virtual node model. They are deliberately small: everything that flows
//! through a reconciliation pass is either a `NodeId` (a live node) or an
//! `Html` (an immutable virtual node, see [`crate::vdom`]).

use std::any::Any;
use std::fmt;
use std::rc::Rc;

// =============================================================================
// Node Handles
// =============================================================================

/// Handle to a node in a [`Document`](crate::dom::Document).
///
/// A `NodeId` is a weak handle: holding one never keeps a node alive. Once a
/// node is discarded its slot may be reused, but the generation changes, so
/// an old handle can never alias the new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot of this node.
    #[inline]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    /// Generation of the slot when this handle was issued.
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

// =============================================================================
// Namespaces
// =============================================================================

pub const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";
pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";
pub const XLINK_NAMESPACE: &str = "http://www.w3.org/1999/xlink";

/// Normalize an element namespace.
///
/// `None` and the XHTML namespace both mean "plain HTML element" and are
/// stored as `None`, so the diff and morph engines compare namespaces the
/// same way.
#[inline]
pub fn normalize_namespace(namespace: Option<&str>) -> Option<&str> {
    match namespace {
        None | Some(XHTML_NAMESPACE) | Some("") => None,
        other => other,
    }
}

// =============================================================================
// Messages
// =============================================================================

/// Application message produced by an event handler.
///
/// Messages are type-erased because taggers change the message type as they
/// bubble towards the application root.
pub type Message = Box<dyn Any>;

/// Delivery function owned by the host runtime.
pub type Sink = Rc<dyn Fn(Message)>;

/// Stable identity of a keyed child.
pub type Key = Rc<str>;
