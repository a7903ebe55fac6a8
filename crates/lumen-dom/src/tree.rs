//! Document tree (arena-based allocation)
//!
//! Nodes live in one `Vec` arena and link to each other by `NodeId`. Every
//! structural or attribute mutation bumps the document generation counter;
//! style caches key their validity off that counter.
//!
//! A tree may contain scoped subtrees: `attach_scope` hangs a scope root off
//! a host element, and nodes appended below it belong to the new scope.
//! Scoped subtrees are invisible to plain (light) traversal and joined to
//! the host by flattened traversal.

use tracing::debug;

use crate::{
    AtomicGeneration, DomError, ElementData, ElementState, Generation, InternedString, Node,
    NodeData, NodeId, ScopeId, StringInterner,
};

/// A scoped subtree attached to a host element
#[derive(Debug, Clone, Copy)]
pub struct ScopeData {
    /// Root node of the scoped subtree (`NodeData::ScopeRoot`)
    pub root: NodeId,
    /// Host element the subtree is attached to (NONE for the document scope)
    pub host: NodeId,
    /// Enclosing scope
    pub parent: ScopeId,
}

/// Arena-based document tree
pub struct DomTree {
    nodes: Vec<Node>,
    scopes: Vec<ScopeData>,
    interner: StringInterner,
    generation: AtomicGeneration,
}

impl DomTree {
    /// Create a tree holding only the document node
    pub fn new() -> Self {
        let mut tree = Self {
            nodes: Vec::with_capacity(64),
            scopes: Vec::with_capacity(4),
            interner: StringInterner::new(),
            generation: AtomicGeneration::new(),
        };
        tree.nodes.push(Node::new(NodeData::Document));
        tree.scopes.push(ScopeData {
            root: NodeId::DOCUMENT,
            host: NodeId::NONE,
            parent: ScopeId::DOCUMENT,
        });
        tree
    }

    // ----- node construction -----

    /// Allocate a detached element node
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let tag = self.interner.intern(tag);
        self.push_node(Node::new(NodeData::Element(ElementData::new(tag))))
    }

    /// Allocate a detached text node
    pub fn create_text(&mut self, content: &str) -> NodeId {
        self.push_node(Node::new(NodeData::Text(content.into())))
    }

    fn push_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Append `child` as the last child of `parent`
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        if self.get(parent).is_none() {
            return Err(DomError::NodeNotFound(parent));
        }
        let child_node = self.get(child).ok_or(DomError::NodeNotFound(child))?;
        if child_node.parent.is_some() {
            return Err(DomError::AlreadyAttached(child));
        }
        if parent == child || self.is_ancestor_of(child, parent) {
            return Err(DomError::WouldCreateCycle(child));
        }

        let scope = self.nodes[parent.index()].scope;
        let old_last = self.nodes[parent.index()].last_child;

        {
            let node = &mut self.nodes[child.index()];
            node.parent = parent;
            node.prev_sibling = old_last;
            node.scope = scope;
        }
        if old_last.is_some() {
            self.nodes[old_last.index()].next_sibling = child;
        } else {
            self.nodes[parent.index()].first_child = child;
        }
        self.nodes[parent.index()].last_child = child;

        self.generation.bump();
        Ok(())
    }

    fn is_ancestor_of(&self, candidate: NodeId, node: NodeId) -> bool {
        let mut current = self.nodes[node.index()].parent;
        while current.is_some() {
            if current == candidate {
                return true;
            }
            current = self.nodes[current.index()].parent;
        }
        false
    }

    // ----- scopes -----

    /// Attach a new scoped subtree to `host`, returning its scope id
    ///
    /// Children appended under the returned scope root belong to the new
    /// scope. A host carries at most one scope.
    pub fn attach_scope(&mut self, host: NodeId) -> Result<ScopeId, DomError> {
        let node = self.get(host).ok_or(DomError::NodeNotFound(host))?;
        if !node.is_element() {
            return Err(DomError::NotAnElement(host));
        }
        if self.scope_hosted_by(host).is_some() {
            return Err(DomError::AlreadyAttached(host));
        }

        let parent_scope = self.nodes[host.index()].scope;
        let scope = ScopeId(self.scopes.len() as u16);
        let root = self.push_node(Node::new(NodeData::ScopeRoot));
        {
            let root_node = &mut self.nodes[root.index()];
            root_node.parent = host;
            root_node.scope = scope;
        }
        self.scopes.push(ScopeData {
            root,
            host,
            parent: parent_scope,
        });

        debug!(host = host.0, scope = scope.0, "attached tree scope");
        self.generation.bump();
        Ok(scope)
    }

    /// Scope descriptor
    pub fn scope(&self, scope: ScopeId) -> Option<&ScopeData> {
        self.scopes.get(scope.index())
    }

    /// Root node of a scope
    pub fn scope_root(&self, scope: ScopeId) -> NodeId {
        self.scopes
            .get(scope.index())
            .map(|s| s.root)
            .unwrap_or(NodeId::NONE)
    }

    /// The scope hosted by `host`, if any
    pub fn scope_hosted_by(&self, host: NodeId) -> Option<ScopeId> {
        self.scopes
            .iter()
            .position(|s| s.host == host)
            .map(|i| ScopeId(i as u16))
    }

    /// Scope chain for a node, innermost first, ending at the document scope
    pub fn scope_chain(&self, node: NodeId) -> Vec<ScopeId> {
        let mut chain = Vec::with_capacity(2);
        let mut scope = match self.get(node) {
            Some(n) => n.scope,
            None => return chain,
        };
        loop {
            chain.push(scope);
            if scope == ScopeId::DOCUMENT {
                break;
            }
            scope = self.scopes[scope.index()].parent;
        }
        chain
    }

    // ----- attributes and state -----

    /// Set an attribute, refreshing the cached id/class lists
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let name_id = self.interner.intern(name);
        let (id_attr, class_attr) = (name == "id", name == "class");
        let class_ids: Vec<InternedString> = if class_attr {
            value
                .split_ascii_whitespace()
                .map(|c| self.interner.intern(c))
                .collect()
        } else {
            Vec::new()
        };
        let value_id = if id_attr {
            Some(self.interner.intern(value))
        } else {
            None
        };

        let elem = self
            .nodes
            .get_mut(node.index())
            .ok_or(DomError::NodeNotFound(node))?
            .as_element_mut()
            .ok_or(DomError::NotAnElement(node))?;

        match elem.attrs.iter().position(|a| a.name == name_id) {
            Some(index) => elem.attrs[index].value = value.into(),
            None => elem.attrs.push(crate::Attribute {
                name: name_id,
                value: value.into(),
            }),
        }
        if id_attr {
            elem.id = value_id;
        }
        if class_attr {
            elem.classes = class_ids.into_iter().collect();
        }

        self.generation.bump();
        Ok(())
    }

    /// Remove an attribute if present
    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<(), DomError> {
        let Some(name_id) = self.interner.get(name) else {
            return Ok(());
        };
        let elem = self
            .nodes
            .get_mut(node.index())
            .ok_or(DomError::NodeNotFound(node))?
            .as_element_mut()
            .ok_or(DomError::NotAnElement(node))?;

        let before = elem.attrs.len();
        elem.attrs.retain(|a| a.name != name_id);
        if name == "id" {
            elem.id = None;
        }
        if name == "class" {
            elem.classes.clear();
        }
        if elem.attrs.len() != before {
            self.generation.bump();
        }
        Ok(())
    }

    /// Set dynamic state bits on an element (hover, focus, ...)
    ///
    /// State flips do not bump the generation: they change which rules match,
    /// never the tree structure, and state-dependent resolutions are not
    /// memoized downstream.
    pub fn set_state(&mut self, node: NodeId, state: ElementState, on: bool) -> Result<(), DomError> {
        let elem = self
            .nodes
            .get_mut(node.index())
            .ok_or(DomError::NodeNotFound(node))?
            .as_element_mut()
            .ok_or(DomError::NotAnElement(node))?;
        if on {
            elem.state.insert(state);
        } else {
            elem.state.remove(state);
        }
        Ok(())
    }

    // ----- queries -----

    /// Get a node by id
    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Element data for a node, if it is an element
    #[inline]
    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        self.get(id).and_then(Node::as_element)
    }

    /// Current dynamic state of an element (empty for non-elements)
    #[inline]
    pub fn element_state(&self, id: NodeId) -> ElementState {
        self.element(id).map(|e| e.state).unwrap_or_default()
    }

    /// Number of nodes in the arena
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Current document generation
    #[inline]
    pub fn generation(&self) -> Generation {
        self.generation.get()
    }

    // ----- traversal -----

    /// Structural parent
    #[inline]
    pub fn parent(&self, id: NodeId) -> NodeId {
        self.get(id).map(|n| n.parent).unwrap_or(NodeId::NONE)
    }

    /// First child
    #[inline]
    pub fn first_child(&self, id: NodeId) -> NodeId {
        self.get(id).map(|n| n.first_child).unwrap_or(NodeId::NONE)
    }

    /// Next sibling
    #[inline]
    pub fn next_sibling(&self, id: NodeId) -> NodeId {
        self.get(id).map(|n| n.next_sibling).unwrap_or(NodeId::NONE)
    }

    /// Nearest ancestor that is an element, not crossing scope roots
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.parent(id);
        while current.is_some() {
            match &self.nodes[current.index()].data {
                NodeData::Element(_) => return Some(current),
                NodeData::ScopeRoot => return None,
                _ => current = self.nodes[current.index()].parent,
            }
        }
        None
    }

    /// Nearest ancestor element in the flattened tree: a scope root hops to
    /// its host element
    pub fn flat_parent_element(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.parent(id);
        while current.is_some() {
            match &self.nodes[current.index()].data {
                NodeData::Element(_) => return Some(current),
                NodeData::ScopeRoot => {
                    let scope = self.nodes[current.index()].scope;
                    current = self.scopes[scope.index()].host;
                }
                _ => current = self.nodes[current.index()].parent,
            }
        }
        None
    }

    /// Nearest preceding sibling that is an element
    pub fn prev_sibling_element(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.get(id).map(|n| n.prev_sibling).unwrap_or(NodeId::NONE);
        while current.is_some() {
            if self.nodes[current.index()].is_element() {
                return Some(current);
            }
            current = self.nodes[current.index()].prev_sibling;
        }
        None
    }

    /// Whether the node is the root element (no parent element in any view)
    pub fn is_root_element(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(Node::is_element)
            && self.flat_parent_element(id).is_none()
    }

    /// Whether the element has no element or text children
    pub fn is_empty_element(&self, id: NodeId) -> bool {
        let mut child = self.first_child(id);
        while child.is_some() {
            match &self.nodes[child.index()].data {
                NodeData::Element(_) | NodeData::Text(_) => return false,
                _ => child = self.nodes[child.index()].next_sibling,
            }
        }
        true
    }

    /// 1-based position among element siblings, counting from the front
    pub fn element_index(&self, id: NodeId) -> usize {
        let mut index = 1;
        let mut current = self.prev_sibling_element(id);
        while let Some(prev) = current {
            index += 1;
            current = self.prev_sibling_element(prev);
        }
        index
    }

    /// 1-based position among element siblings, counting from the back
    pub fn element_index_from_end(&self, id: NodeId) -> usize {
        let mut index = 1;
        let mut current = self.next_sibling(id);
        while current.is_some() {
            if self.nodes[current.index()].is_element() {
                index += 1;
            }
            current = self.nodes[current.index()].next_sibling;
        }
        index
    }

    /// 1-based position among element siblings sharing this element's tag
    pub fn typed_index(&self, id: NodeId) -> usize {
        let Some(tag) = self.element(id).map(|e| e.tag) else {
            return 1;
        };
        let mut index = 1;
        let mut current = self.prev_sibling_element(id);
        while let Some(prev) = current {
            if self.element(prev).is_some_and(|e| e.tag == tag) {
                index += 1;
            }
            current = self.prev_sibling_element(prev);
        }
        index
    }

    /// 1-based position among same-tag element siblings, from the back
    pub fn typed_index_from_end(&self, id: NodeId) -> usize {
        let Some(tag) = self.element(id).map(|e| e.tag) else {
            return 1;
        };
        let mut index = 1;
        let mut current = self.next_sibling(id);
        while current.is_some() {
            if self.element(current).is_some_and(|e| e.tag == tag) {
                index += 1;
            }
            current = self.nodes[current.index()].next_sibling;
        }
        index
    }

    // ----- interner access -----

    /// Intern a string in the tree's interner
    pub fn intern(&mut self, s: &str) -> InternedString {
        self.interner.intern(s)
    }

    /// Look up an already interned string
    pub fn lookup(&self, s: &str) -> Option<InternedString> {
        self.interner.get(s)
    }

    /// Resolve an interned string
    #[inline]
    pub fn resolve(&self, id: InternedString) -> &str {
        self.interner.resolve(id)
    }
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}
