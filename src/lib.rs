//! # spark-vdom
//!
//! Virtual DOM reconciliation for Rust.
//!
//! An application describes its interface as an immutable virtual tree
//! ([`vdom::Html`]) on every update. This crate brings a live document tree
//! ([`dom::Document`]) in line with the latest description, using one of two
//! strategies:
//!
//! - **diff/patch**: compare the previous and next virtual trees into a list
//!   of patches, then apply them to the live tree.
//! - **morph**: walk the live tree directly, comparing each node with the
//!   virtual node it was last rendered from. Nodes inserted by third parties
//!   are tolerated and handed to a foreign-node handler.
//!
//! Both strategies share one keyed-children reconciler, so keyed lists are
//! reordered with the same minimal set of moves either way.
//!
//! ## Architecture
//!
//! ```text
//! view(model) → Html ──┬─ diff → patches → apply ─┬→ Document
//!                      └────────── morph ──────────┘
//! ```
//!
//! Events flow the other way: a listener decodes the event into a message,
//! and the dispatch context chain maps it through every enclosing tagger
//! before it reaches the root sink.
//!
//! ## Modules
//!
//! - [`types`] - `NodeId`, namespaces, message aliases
//! - [`dom`] - live document arena and event dispatch
//! - [`vdom`] - virtual nodes, facts, widgets
//! - [`reconcile`] - keyed reconciler, diff, patch applier, morph
//! - [`config`] - strategy selection
//! - [`root`] - the mounted application root

pub mod config;
pub mod dom;
pub mod reconcile;
pub mod root;
pub mod types;
pub mod vdom;

// Re-export commonly used items
pub use types::*;

pub use config::{Config, Strategy};
pub use dom::{DispatchContext, DomError, DomResult, Document, Event, EventOutcome};
pub use reconcile::{Morph, MorphStats, Patch, apply, diff, morph, render};
pub use root::Root;
pub use vdom::{
    Fact, Html, VNode, attribute, class, custom, keyed_node, lazy, lazy2, lazy3, map, node,
    node_ns, on, property, style, text,
};
