//! Document errors.

use thiserror::Error;

use crate::types::NodeId;

/// A document operation was asked to do something the tree cannot do.
///
/// These are precondition failures (a stale handle, a node that is not where
/// the caller believes it is), never conditions a well-formed reconciliation
/// pass runs into.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    #[error("node {0} is no longer part of the document")]
    StaleNode(NodeId),

    #[error("node {child} is not a child of {parent}")]
    NotAChild { parent: NodeId, child: NodeId },

    #[error("node {node} is not {expected}")]
    WrongKind { node: NodeId, expected: &'static str },

    #[error("inserting {child} under {parent} would make a node its own ancestor")]
    Hierarchy { parent: NodeId, child: NodeId },
}

pub type DomResult<T> = Result<T, DomError>;
