//! DOM mutation errors

use crate::NodeId;

/// Errors from structural tree mutation
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DomError {
    #[error("node {0:?} does not exist in this tree")]
    NodeNotFound(NodeId),

    #[error("node {0:?} is not an element")]
    NotAnElement(NodeId),

    #[error("node {0:?} is already attached to a parent")]
    AlreadyAttached(NodeId),

    #[error("appending {0:?} would create a cycle")]
    WouldCreateCycle(NodeId),
}
