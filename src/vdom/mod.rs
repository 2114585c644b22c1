//! Virtual node model.
//!
//! - `node` - `VNode` variants, descendant counts, constructors
//! - `facts` - fact entries, normalization, fact diffs
//! - `widget` - the custom node contract
//! - `sanitize` - key and value rewriting done by the constructors

mod facts;
mod node;
mod sanitize;
mod widget;

pub use facts::*;
pub use node::*;
pub use sanitize::*;
pub use widget::*;

pub use crate::dom::{CustomOutcome, EventHandler, Handler, HandlerKind, Mapper};
