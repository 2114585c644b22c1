//! Live document - the tree reconciliation mutates.
//!
//! - `document` - node arena, tree mutation, attributes, snapshots
//! - `events` - handlers, dispatch contexts, capture/bubble delivery
//! - `error` - `DomError`

mod document;
mod error;
mod events;

pub use document::*;
pub use error::*;
pub use events::*;
