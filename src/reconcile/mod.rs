//! Reconciliation - bringing a live tree in line with a new virtual tree.
//!
//! Two engines share the keyed planner in [`keyed`]:
//!
//! - diff/patch: [`diff`] compares two virtual trees into a flat list of
//!   [`Patch`]es, and [`apply`] locates and applies them to the live tree.
//! - morph: [`morph`] walks the live tree directly, reading each node's
//!   previous virtual node from a [`VNodeStore`].

pub mod keyed;

mod apply;
mod diff;
mod foreign;
mod morph;
mod patch;
mod render;
mod store;
mod virtualize;

pub use apply::apply;
pub use diff::diff;
pub use foreign::{DefaultForeignHandler, ForeignAction, ForeignHandler};
pub use keyed::{KeyedPlan, KeyedStats, reconcile_keys};
pub use morph::{Morph, MorphStats, morph};
pub use patch::{Entry, Insert, Moved, Patch, PatchKind, Reorder, count};
pub use render::render;
pub use store::{LazyMark, NodeSlot, Rendered, SideTable, VNodeStore};
pub use virtualize::{virtualize, virtualize_into};
