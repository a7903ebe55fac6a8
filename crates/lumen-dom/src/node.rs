//! DOM node - compact representation
//!
//! Nodes use 4-byte `NodeId` links instead of pointers. Element id and
//! class attributes are cached in decoded form because selector matching
//! reads them far more often than generic attribute lookups.

use smallvec::SmallVec;

use crate::{InternedString, NodeId, ScopeId};

/// DOM node
#[derive(Debug)]
pub struct Node {
    /// Parent node (NONE if detached or root)
    pub parent: NodeId,
    /// First child
    pub first_child: NodeId,
    /// Last child (for O(1) append)
    pub last_child: NodeId,
    /// Previous sibling
    pub prev_sibling: NodeId,
    /// Next sibling
    pub next_sibling: NodeId,
    /// Tree scope this node belongs to
    pub scope: ScopeId,
    /// Node-specific data
    pub data: NodeData,
}

impl Node {
    pub(crate) fn new(data: NodeData) -> Self {
        Self {
            parent: NodeId::NONE,
            first_child: NodeId::NONE,
            last_child: NodeId::NONE,
            prev_sibling: NodeId::NONE,
            next_sibling: NodeId::NONE,
            scope: ScopeId::DOCUMENT,
            data,
        }
    }

    /// Check if this is an element
    #[inline]
    pub fn is_element(&self) -> bool {
        matches!(self.data, NodeData::Element(_))
    }

    /// Get element data if this is an element
    #[inline]
    pub fn as_element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Get mutable element data
    #[inline]
    pub fn as_element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Get text content if this is a text node
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match &self.data {
            NodeData::Text(content) => Some(content),
            _ => None,
        }
    }
}

/// Node-specific data
#[derive(Debug)]
pub enum NodeData {
    /// Document root
    Document,
    /// Element
    Element(ElementData),
    /// Text content
    Text(String),
    /// Comment
    Comment(String),
    /// Root of a scoped subtree attached to a host element
    ScopeRoot,
}

/// Element-specific data
#[derive(Debug)]
pub struct ElementData {
    /// Tag name (interned, lowercase)
    pub tag: InternedString,
    /// Attributes in document order
    pub attrs: SmallVec<[Attribute; 4]>,
    /// Cached id attribute
    pub id: Option<InternedString>,
    /// Cached class list
    pub classes: SmallVec<[InternedString; 4]>,
    /// Dynamic state flags (hover, focus, ...)
    pub state: ElementState,
}

impl ElementData {
    pub(crate) fn new(tag: InternedString) -> Self {
        Self {
            tag,
            attrs: SmallVec::new(),
            id: None,
            classes: SmallVec::new(),
            state: ElementState::empty(),
        }
    }

    /// Get an attribute value by interned name
    pub fn attr(&self, name: InternedString) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Whether the element carries the attribute at all
    pub fn has_attr(&self, name: InternedString) -> bool {
        self.attrs.iter().any(|a| a.name == name)
    }

    /// Whether the cached class list contains `class`
    #[inline]
    pub fn has_class(&self, class: InternedString) -> bool {
        self.classes.contains(&class)
    }
}

/// Attribute
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: InternedString,
    pub value: String,
}

/// Dynamic element state as a compact bit set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct ElementState(u16);

impl ElementState {
    pub const HOVER: ElementState = ElementState(1 << 0);
    pub const FOCUS: ElementState = ElementState(1 << 1);
    pub const ACTIVE: ElementState = ElementState(1 << 2);
    pub const VISITED: ElementState = ElementState(1 << 3);
    pub const ENABLED: ElementState = ElementState(1 << 4);
    pub const DISABLED: ElementState = ElementState(1 << 5);
    pub const CHECKED: ElementState = ElementState(1 << 6);

    /// No state bits set
    pub const fn empty() -> Self {
        ElementState(0)
    }

    #[inline]
    pub fn contains(self, other: ElementState) -> bool {
        (self.0 & other.0) == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: ElementState) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: ElementState) {
        self.0 &= !other.0;
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}
