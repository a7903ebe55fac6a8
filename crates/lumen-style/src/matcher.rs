//! Predicate matcher
//!
//! Evaluates one compiled selector against one node: the subject compound
//! first, then each relation leftward, short-circuiting on the first
//! failure. Pure function of the selector, the node, the traversal
//! strategy, and the dynamic-state accessor.
//!
//! Failures are split into two kinds so the collector can prune: a failure
//! that happened entirely on the ancestor side of the subject holds for
//! every following sibling as well (siblings share ancestors), while any
//! failure involving the subject itself or its preceding siblings is local
//! to this node.

use lumen_dom::{DomTree, ElementData, ElementState, NodeId};

use crate::selectors::{
    AttrOp, Compound, PseudoClass, Relation, Selector, SimplePredicate, Specificity,
};
use crate::PseudoElement;

/// Traversal strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalMode {
    /// Structural tree; scoped subtrees are invisible from inside
    Light,
    /// Flattened tree; a scope root's parent is its host element
    Flat,
}

/// Tree plus traversal strategy, passed to the matcher by value
#[derive(Clone, Copy)]
pub struct TreeView<'a> {
    pub tree: &'a DomTree,
    pub mode: TraversalMode,
}

impl<'a> TreeView<'a> {
    pub fn new(tree: &'a DomTree, mode: TraversalMode) -> Self {
        Self { tree, mode }
    }

    /// Parent element under the active traversal strategy
    #[inline]
    pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        match self.mode {
            TraversalMode::Light => self.tree.parent_element(node),
            TraversalMode::Flat => self.tree.flat_parent_element(node),
        }
    }

    /// Nearest preceding sibling element
    #[inline]
    pub fn prev_sibling_element(&self, node: NodeId) -> Option<NodeId> {
        self.tree.prev_sibling_element(node)
    }
}

/// Dynamic-state accessor used by hover/focus/... predicates
pub trait StateSource {
    fn element_state(&self, node: NodeId) -> ElementState;
}

impl StateSource for DomTree {
    fn element_state(&self, node: NodeId) -> ElementState {
        DomTree::element_state(self, node)
    }
}

/// Result of matching one selector against one node
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matches(MatchedDetails),
    /// Does not match this node; siblings may still match
    FailsLocally,
    /// Cannot match this node nor any following sibling
    FailsAllFollowingSiblings,
}

/// Extracted details of a successful match
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedDetails {
    pub specificity: Specificity,
    pub pseudo_element: Option<PseudoElement>,
    pub depends_on_state: bool,
}

enum Inner {
    Matched,
    Failed,
    /// Failure confined to the ancestor side of the subject
    FailedAncestorSide,
}

/// Match a selector against a candidate node
pub fn match_selector(
    selector: &Selector,
    node: NodeId,
    view: &TreeView<'_>,
    states: &dyn StateSource,
) -> MatchOutcome {
    if view.tree.element(node).is_none() {
        return MatchOutcome::FailsLocally;
    }
    if !match_compound(selector.compound(0), node, view, states) {
        return MatchOutcome::FailsLocally;
    }

    match match_leftward(selector, 1, node, view, states, false) {
        Inner::Matched => MatchOutcome::Matches(MatchedDetails {
            specificity: selector.specificity(),
            pseudo_element: selector.pseudo_element(),
            depends_on_state: selector.depends_on_state(),
        }),
        Inner::Failed => MatchOutcome::FailsLocally,
        Inner::FailedAncestorSide => MatchOutcome::FailsAllFollowingSiblings,
    }
}

/// Match compounds `index..` given that `index - 1` matched at `from`
///
/// `crossed_sibling` is true once any sibling relation lies between the
/// subject and the current position; failures past that point are never
/// sibling-invariant.
fn match_leftward(
    selector: &Selector,
    index: usize,
    from: NodeId,
    view: &TreeView<'_>,
    states: &dyn StateSource,
    crossed_sibling: bool,
) -> Inner {
    if index == selector.compound_count() {
        return Inner::Matched;
    }
    let compound = selector.compound(index);
    let ancestor_failure = || {
        if crossed_sibling {
            Inner::Failed
        } else {
            Inner::FailedAncestorSide
        }
    };

    match selector.relation(index - 1) {
        Relation::Parent => match view.parent_element(from) {
            Some(parent) if match_compound(compound, parent, view, states) => {
                match_leftward(selector, index + 1, parent, view, states, crossed_sibling)
            }
            _ => ancestor_failure(),
        },
        Relation::Ancestor => {
            let mut current = view.parent_element(from);
            while let Some(ancestor) = current {
                if match_compound(compound, ancestor, view, states) {
                    if let Inner::Matched = match_leftward(
                        selector,
                        index + 1,
                        ancestor,
                        view,
                        states,
                        crossed_sibling,
                    ) {
                        return Inner::Matched;
                    }
                    // Backtrack: a higher ancestor may satisfy the rest.
                }
                current = view.parent_element(ancestor);
            }
            ancestor_failure()
        }
        Relation::PrevSibling => match view.prev_sibling_element(from) {
            Some(sibling) if match_compound(compound, sibling, view, states) => {
                match_leftward(selector, index + 1, sibling, view, states, true)
            }
            _ => Inner::Failed,
        },
        Relation::EarlierSibling => {
            let mut current = view.prev_sibling_element(from);
            while let Some(sibling) = current {
                if match_compound(compound, sibling, view, states) {
                    if let Inner::Matched =
                        match_leftward(selector, index + 1, sibling, view, states, true)
                    {
                        return Inner::Matched;
                    }
                }
                current = view.prev_sibling_element(sibling);
            }
            Inner::Failed
        }
    }
}

fn match_compound(
    compound: &Compound,
    node: NodeId,
    view: &TreeView<'_>,
    states: &dyn StateSource,
) -> bool {
    let Some(elem) = view.tree.element(node) else {
        return false;
    };
    compound
        .simples
        .iter()
        .all(|simple| match_simple(simple, node, elem, view, states))
}

fn match_simple(
    simple: &SimplePredicate,
    node: NodeId,
    elem: &ElementData,
    view: &TreeView<'_>,
    states: &dyn StateSource,
) -> bool {
    let tree = view.tree;
    match simple {
        SimplePredicate::Universal => true,
        SimplePredicate::Tag(tag) => tree.resolve(elem.tag) == &**tag,
        SimplePredicate::Id(id) => elem
            .id
            .is_some_and(|actual| tree.resolve(actual) == &**id),
        SimplePredicate::Class(class) => elem
            .classes
            .iter()
            .any(|actual| tree.resolve(*actual) == &**class),
        SimplePredicate::Attr { name, op, value } => {
            let Some(name_id) = tree.lookup(name) else {
                return false;
            };
            match elem.attr(name_id) {
                None => false,
                Some(actual) => match op {
                    AttrOp::Exists => true,
                    AttrOp::Equals => actual == &**value,
                    AttrOp::Includes => actual.split_ascii_whitespace().any(|w| w == &**value),
                    AttrOp::DashMatch => {
                        actual == &**value
                            || (actual.starts_with(&**value)
                                && actual[value.len()..].starts_with('-'))
                    }
                    AttrOp::Prefix => actual.starts_with(&**value),
                    AttrOp::Suffix => actual.ends_with(&**value),
                    AttrOp::Substring => actual.contains(&**value),
                },
            }
        }
        SimplePredicate::Pseudo(pseudo) => match_pseudo(pseudo, node, view, states),
        SimplePredicate::Not(inner) => !inner
            .iter()
            .any(|simple| match_simple(simple, node, elem, view, states)),
    }
}

fn match_pseudo(
    pseudo: &PseudoClass,
    node: NodeId,
    view: &TreeView<'_>,
    states: &dyn StateSource,
) -> bool {
    let tree = view.tree;
    match pseudo {
        PseudoClass::Root => tree.is_root_element(node),
        PseudoClass::Empty => tree.is_empty_element(node),
        PseudoClass::FirstChild => tree.prev_sibling_element(node).is_none(),
        PseudoClass::LastChild => tree.element_index_from_end(node) == 1,
        PseudoClass::OnlyChild => {
            tree.prev_sibling_element(node).is_none() && tree.element_index_from_end(node) == 1
        }
        PseudoClass::NthChild(nth) => nth.matches(tree.element_index(node)),
        PseudoClass::NthLastChild(nth) => nth.matches(tree.element_index_from_end(node)),
        PseudoClass::FirstOfType => tree.typed_index(node) == 1,
        PseudoClass::LastOfType => tree.typed_index_from_end(node) == 1,
        PseudoClass::Hover => states.element_state(node).contains(ElementState::HOVER),
        PseudoClass::Focus => states.element_state(node).contains(ElementState::FOCUS),
        PseudoClass::Active => states.element_state(node).contains(ElementState::ACTIVE),
        PseudoClass::Visited => states.element_state(node).contains(ElementState::VISITED),
        PseudoClass::Enabled => {
            let state = states.element_state(node);
            state.contains(ElementState::ENABLED) && !state.contains(ElementState::DISABLED)
        }
        PseudoClass::Disabled => states.element_state(node).contains(ElementState::DISABLED),
        PseudoClass::Checked => states.element_state(node).contains(ElementState::CHECKED),
    }
}
