//! Lumen DOM - arena-based document tree
//!
//! Compact node storage with interned strings, cached id/class lookups,
//! per-element state flags, tree scopes for scoped style application, and
//! a document generation counter for downstream cache invalidation.

mod error;
mod generation;
mod interner;
mod node;
mod tree;

pub use error::DomError;
pub use generation::{AtomicGeneration, Generation};
pub use interner::{InternedString, StringInterner};
pub use node::{Attribute, ElementData, ElementState, Node, NodeData};
pub use tree::{DomTree, ScopeData};

/// Node identifier (index into the tree arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Sentinel for "no node"
    pub const NONE: NodeId = NodeId(u32::MAX);

    /// The document node
    pub const DOCUMENT: NodeId = NodeId(0);

    /// Whether this id refers to a node at all
    #[inline]
    pub fn is_some(self) -> bool {
        self != Self::NONE
    }

    /// Raw index value
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Tree scope identifier
///
/// Scope 0 is the document scope; further scopes are created by attaching
/// a scoped subtree to a host element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct ScopeId(pub(crate) u16);

impl ScopeId {
    /// The document scope
    pub const DOCUMENT: ScopeId = ScopeId(0);

    /// Raw index value
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}
