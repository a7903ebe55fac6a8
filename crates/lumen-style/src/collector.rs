//! Rule collection and cascade ordering
//!
//! For one node, walks the registry's rule sets in precedence order (UA,
//! then author sets per scope from innermost to outermost, then
//! cross-boundary host rules, presentational hints and the inline block),
//! matches candidates, and sorts the survivors into a range-partitioned
//! [`MatchResult`].
//!
//! Precedence is realized in two layers. The 64-bit cascade key packs
//! origin bucket, scope position, stylesheet index and source position so
//! that coarse precedence lives in high bits and literal declaration order
//! breaks ties. Specificity is deliberately kept out of the key: it must
//! outrank source order but never origin, so the sort compares
//! (range group, style-attribute flag, specificity, key).

use std::hash::Hasher;
use std::sync::Arc;

use bitflags::bitflags;
use fnv::{FnvHashSet, FnvHasher};
use lumen_dom::{NodeId, ScopeId};
use smallvec::SmallVec;
use tracing::trace;

use crate::bloom::AncestorFilter;
use crate::matcher::{match_selector, MatchOutcome, StateSource, TreeView};
use crate::properties::DeclarationBlock;
use crate::rules::{presentational_hints, CascadeOrigin, RuleRegistry, RuleSet};
use crate::selectors::Specificity;
use crate::PseudoElement;

const ORIGIN_SHIFT: u32 = 58;
const SCOPE_SHIFT: u32 = 48;
const SHEET_SHIFT: u32 = 32;

/// Origin bucket inside the cascade key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyBucket {
    Ua = 0,
    PresHint = 1,
    Author = 2,
    StyleAttr = 3,
}

fn cascade_key(bucket: KeyBucket, scope_pos: u16, sheet: u16, source: u32) -> u64 {
    ((bucket as u64) << ORIGIN_SHIFT)
        | (u64::from(scope_pos.min(0x3ff)) << SCOPE_SHIFT)
        | (u64::from(sheet) << SHEET_SHIFT)
        | u64::from(source)
}

/// Importance sub-range a matched rule entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Importance {
    Normal,
    Important,
}

/// One matched rule, annotated with everything the sorter and applier need
#[derive(Debug, Clone)]
pub struct MatchedRule {
    pub block: Arc<DeclarationBlock>,
    pub specificity: Specificity,
    /// Packed (origin bucket, scope position, sheet, source position)
    pub key: u64,
    pub origin: CascadeOrigin,
    pub importance: Importance,
    /// Declarations from the style attribute outrank any selector
    pub via_style_attr: bool,
    /// Scope the rule came from; disambiguates rule identity in the cache
    /// key and the sibling skip set
    pub scope: ScopeId,
}

bitflags! {
    /// Facts about a resolution that the cache eligibility predicate reads
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ResolutionFlags: u8 {
        /// Inline (style attribute) declarations participated
        const STYLE_ATTR = 1 << 0;
        /// Presentational attribute hints participated
        const PRES_HINTS = 1 << 1;
        /// Matched author rules from more than one tree scope
        const MULTI_SCOPE = 1 << 2;
        /// A matched selector read dynamic element state
        const DYNAMIC_STATE = 1 << 3;
    }
}

/// Immutable, range-partitioned view over the sorted matches of one node
///
/// Within the normal ranges entries are sorted ascending by precedence;
/// the important ranges are stored highest-precedence-first so every range
/// can hand the applier its winner-first order without re-sorting.
#[derive(Debug)]
pub struct MatchResult {
    entries: Vec<MatchedRule>,
    ua_normal_end: usize,
    author_normal_end: usize,
    author_important_end: usize,
    pub flags: ResolutionFlags,
    pseudo: Option<PseudoElement>,
    hash: u64,
}

impl MatchResult {
    fn build(
        buffer: SmallVec<[MatchedRule; 16]>,
        flags: ResolutionFlags,
        pseudo: Option<PseudoElement>,
    ) -> Self {
        let mut entries = buffer.into_vec();
        entries.sort_by_key(|e| (range_group(e), e.via_style_attr, e.specificity, e.key));

        let ua_normal_end = entries.partition_point(|e| range_group(e) == 0);
        let author_normal_end = entries.partition_point(|e| range_group(e) <= 1);
        let author_important_end = entries.partition_point(|e| range_group(e) <= 2);

        // Important ranges flip to reverse-priority order: walking them
        // forward visits the winning declaration first.
        entries[author_normal_end..author_important_end].reverse();
        entries[author_important_end..].reverse();

        let mut hasher = FnvHasher::default();
        for entry in &entries {
            hasher.write_u64(entry.key);
            hasher.write_u16(entry.scope.index() as u16);
            hasher.write_u8(entry.origin as u8);
            hasher.write_u8(entry.importance as u8);
        }
        hasher.write_u8(match pseudo {
            None => 0,
            Some(PseudoElement::Before) => 1,
            Some(PseudoElement::After) => 2,
            Some(PseudoElement::Marker) => 3,
            Some(PseudoElement::Placeholder) => 4,
        });

        Self {
            entries,
            ua_normal_end,
            author_normal_end,
            author_important_end,
            flags,
            pseudo,
            hash: hasher.finish(),
        }
    }

    /// Result with no matches (not an error)
    pub fn empty(pseudo: Option<PseudoElement>) -> Self {
        Self::build(SmallVec::new(), ResolutionFlags::empty(), pseudo)
    }

    /// UA declarations without `!important`, ascending precedence
    pub fn ua_normal(&self) -> &[MatchedRule] {
        &self.entries[..self.ua_normal_end]
    }

    /// Author declarations without `!important`, ascending precedence
    pub fn author_normal(&self) -> &[MatchedRule] {
        &self.entries[self.ua_normal_end..self.author_normal_end]
    }

    /// Author `!important` declarations, highest precedence first
    pub fn author_important(&self) -> &[MatchedRule] {
        &self.entries[self.author_normal_end..self.author_important_end]
    }

    /// UA `!important` declarations, highest precedence first
    pub fn ua_important(&self) -> &[MatchedRule] {
        &self.entries[self.author_important_end..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn pseudo(&self) -> Option<PseudoElement> {
        self.pseudo
    }

    /// Content hash over the exact ordered matched-rule sequence
    #[inline]
    pub fn content_hash(&self) -> u64 {
        self.hash
    }
}

/// Storage group of an entry: [ua normal | author normal | author !important
/// | ua !important], matching the ranges above
fn range_group(entry: &MatchedRule) -> u8 {
    match (entry.origin, entry.importance) {
        (CascadeOrigin::UserAgent, Importance::Normal) => 0,
        (CascadeOrigin::Author, Importance::Normal) => 1,
        (CascadeOrigin::Author, Importance::Important) => 2,
        (CascadeOrigin::UserAgent, Importance::Important) => 3,
    }
}

/// Per-resolution pruning state owned by the resolver's traversal scratch
pub(crate) struct PruneState<'a> {
    /// Ancestor filter, present only when the traversal pushed the full
    /// ancestor chain of the node being resolved
    pub filter: Option<&'a AncestorFilter>,
    /// Rules known to fail for all remaining siblings of the current parent
    pub skip: Option<&'a mut FnvHashSet<(u64, ScopeId)>>,
}

impl PruneState<'_> {
    pub(crate) fn inert() -> PruneState<'static> {
        PruneState {
            filter: None,
            skip: None,
        }
    }
}

/// Collect, sort and partition the rules matching `node`
pub(crate) fn collect_matches(
    registry: &RuleRegistry,
    view: &TreeView<'_>,
    states: &dyn StateSource,
    node: NodeId,
    pseudo: Option<PseudoElement>,
    inline: Option<&Arc<DeclarationBlock>>,
    mut prune: PruneState<'_>,
) -> MatchResult {
    let tree = view.tree;
    if tree.element(node).is_none() {
        return MatchResult::empty(pseudo);
    }

    let mut buffer: SmallVec<[MatchedRule; 16]> = SmallVec::new();
    let mut flags = ResolutionFlags::empty();
    let mut matched_scope: Option<ScopeId> = None;

    for (sheet, set) in registry.ua_sheets().iter().enumerate() {
        collect_from_set(
            set,
            SetPlacement {
                origin: CascadeOrigin::UserAgent,
                bucket: KeyBucket::Ua,
                scope_pos: 0,
                sheet: sheet as u16,
                scope: ScopeId::DOCUMENT,
                counts_for_scope: false,
            },
            view,
            states,
            node,
            pseudo,
            &mut prune,
            &mut buffer,
            &mut flags,
            &mut matched_scope,
        );
    }

    // Author sets, innermost scope first. Scope position grows toward the
    // innermost scope so that, at equal specificity, the scope closest to
    // the node wins.
    let chain = tree.scope_chain(node);
    for (idx, scope) in chain.iter().enumerate() {
        let scope_pos = (chain.len() - idx) as u16;
        for (sheet, set) in registry.scope_sheets(*scope).iter().enumerate() {
            collect_from_set(
                set,
                SetPlacement {
                    origin: CascadeOrigin::Author,
                    bucket: KeyBucket::Author,
                    scope_pos,
                    sheet: sheet as u16,
                    scope: *scope,
                    counts_for_scope: true,
                },
                view,
                states,
                node,
                pseudo,
                &mut prune,
                &mut buffer,
                &mut flags,
                &mut matched_scope,
            );
        }
    }

    // Cross-boundary subset: rules from a hosted scope targeting its host.
    // They rank below every author rule of the host's own scope chain.
    if let Some(hosted) = tree.scope_hosted_by(node) {
        if let Some(set) = registry.host_rules(hosted) {
            collect_from_set(
                set,
                SetPlacement {
                    origin: CascadeOrigin::Author,
                    bucket: KeyBucket::Author,
                    scope_pos: 0,
                    sheet: 0,
                    scope: hosted,
                    counts_for_scope: true,
                },
                view,
                states,
                node,
                pseudo,
                &mut prune,
                &mut buffer,
                &mut flags,
                &mut matched_scope,
            );
        }
    }

    // Presentational hints and the style attribute apply to the element
    // itself, never to its pseudo-elements.
    if pseudo.is_none() {
        if let Some(hints) = presentational_hints(tree, node) {
            flags |= ResolutionFlags::PRES_HINTS;
            push_matched(
                &mut buffer,
                &Arc::new(hints),
                Specificity::default(),
                cascade_key(KeyBucket::PresHint, 0, 0, 0),
                CascadeOrigin::Author,
                false,
                ScopeId::DOCUMENT,
            );
        }
        if let Some(block) = inline {
            flags |= ResolutionFlags::STYLE_ATTR;
            push_matched(
                &mut buffer,
                block,
                Specificity::default(),
                cascade_key(KeyBucket::StyleAttr, 0, 0, 0),
                CascadeOrigin::Author,
                true,
                ScopeId::DOCUMENT,
            );
        }
    }

    trace!(
        node = node.index(),
        matched = buffer.len(),
        "collected candidate rules"
    );
    MatchResult::build(buffer, flags, pseudo)
}

/// Where a rule set sits in the cascade for the current node
struct SetPlacement {
    origin: CascadeOrigin,
    bucket: KeyBucket,
    scope_pos: u16,
    sheet: u16,
    scope: ScopeId,
    /// Whether matches contribute to multi-scope detection
    counts_for_scope: bool,
}

#[allow(clippy::too_many_arguments)]
fn collect_from_set(
    set: &RuleSet,
    placement: SetPlacement,
    view: &TreeView<'_>,
    states: &dyn StateSource,
    node: NodeId,
    pseudo: Option<PseudoElement>,
    prune: &mut PruneState<'_>,
    buffer: &mut SmallVec<[MatchedRule; 16]>,
    flags: &mut ResolutionFlags,
    matched_scope: &mut Option<ScopeId>,
) {
    let tree = view.tree;
    let Some(elem) = tree.element(node) else {
        return;
    };

    let mut candidates: SmallVec<[u32; 32]> = SmallVec::new();
    set.candidates(tree, elem, &mut candidates);

    for position in candidates {
        let rule = set.rule(position);
        if rule.selector.pseudo_element() != pseudo {
            continue;
        }
        let key = cascade_key(
            placement.bucket,
            placement.scope_pos,
            placement.sheet,
            rule.source_position,
        );
        if let Some(skip) = prune.skip.as_deref() {
            if skip.contains(&(key, placement.scope)) {
                continue;
            }
        }
        if let Some(filter) = prune.filter {
            if rule
                .selector
                .ancestor_hashes()
                .iter()
                .any(|hash| !filter.may_contain(*hash))
            {
                continue;
            }
        }

        match match_selector(&rule.selector, node, view, states) {
            MatchOutcome::Matches(details) => {
                if details.depends_on_state {
                    *flags |= ResolutionFlags::DYNAMIC_STATE;
                }
                if placement.counts_for_scope {
                    match matched_scope {
                        None => *matched_scope = Some(placement.scope),
                        Some(seen) if *seen != placement.scope => {
                            *flags |= ResolutionFlags::MULTI_SCOPE;
                        }
                        Some(_) => {}
                    }
                }
                push_matched(
                    buffer,
                    &rule.block,
                    details.specificity,
                    key,
                    placement.origin,
                    false,
                    placement.scope,
                );
            }
            MatchOutcome::FailsAllFollowingSiblings => {
                if let Some(skip) = prune.skip.as_deref_mut() {
                    skip.insert((key, placement.scope));
                }
            }
            MatchOutcome::FailsLocally => {}
        }
    }
}

/// Append up to two entries for one matched declaration block, one per
/// importance level present in it
#[allow(clippy::too_many_arguments)]
fn push_matched(
    buffer: &mut SmallVec<[MatchedRule; 16]>,
    block: &Arc<DeclarationBlock>,
    specificity: Specificity,
    key: u64,
    origin: CascadeOrigin,
    via_style_attr: bool,
    scope: ScopeId,
) {
    if block.has_normal() {
        buffer.push(MatchedRule {
            block: Arc::clone(block),
            specificity,
            key,
            origin,
            importance: Importance::Normal,
            via_style_attr,
            scope,
        });
    }
    if block.has_important() {
        buffer.push(MatchedRule {
            block: Arc::clone(block),
            specificity,
            key,
            origin,
            importance: Importance::Important,
            via_style_attr,
            scope,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::TraversalMode;
    use crate::properties::{Longhand, SpecifiedValue};
    use crate::selectors::Selector;
    use lumen_dom::DomTree;

    fn block_with(name: Longhand, value: SpecifiedValue, important: bool) -> Arc<DeclarationBlock> {
        let mut block = DeclarationBlock::new();
        if important {
            block.declare_important(name, value).unwrap();
        } else {
            block.declare(name, value).unwrap();
        }
        Arc::new(block)
    }

    fn fixture() -> (DomTree, NodeId) {
        let mut tree = DomTree::new();
        let div = tree.create_element("div");
        tree.append_child(NodeId::DOCUMENT, div).unwrap();
        tree.set_attribute(div, "class", "x").unwrap();
        tree.set_attribute(div, "id", "y").unwrap();
        (tree, div)
    }

    fn collect(
        registry: &RuleRegistry,
        tree: &DomTree,
        node: NodeId,
        inline: Option<&Arc<DeclarationBlock>>,
    ) -> MatchResult {
        let view = TreeView::new(tree, TraversalMode::Flat);
        collect_matches(
            registry,
            &view,
            tree,
            node,
            None,
            inline,
            PruneState::inert(),
        )
    }

    #[test]
    fn test_empty_result_for_no_rules() {
        let (tree, div) = fixture();
        let registry = RuleRegistry::new();
        let result = collect(&registry, &tree, div, None);
        assert!(result.is_empty());
        assert_eq!(result.ua_normal().len(), 0);
    }

    #[test]
    fn test_specificity_orders_author_range() {
        let (tree, div) = fixture();
        let mut sheet = RuleSet::new();
        // .x first in source, #y second; #y must sort later (higher).
        sheet.add(
            Selector::builder().class("x").build().unwrap(),
            block_with(Longhand::Width, SpecifiedValue::px(1.0), false),
        );
        sheet.add(
            Selector::builder().id("y").build().unwrap(),
            block_with(Longhand::Width, SpecifiedValue::px(2.0), false),
        );
        let mut registry = RuleRegistry::new();
        registry.push_author(ScopeId::DOCUMENT, sheet);

        let result = collect(&registry, &tree, div, None);
        let range = result.author_normal();
        assert_eq!(range.len(), 2);
        assert!(range[0].specificity < range[1].specificity);
    }

    #[test]
    fn test_importance_partitions_ranges() {
        let (tree, div) = fixture();
        let mut ua = RuleSet::new();
        ua.add(
            Selector::builder().tag("div").build().unwrap(),
            block_with(Longhand::Width, SpecifiedValue::px(1.0), true),
        );
        let mut author = RuleSet::new();
        let mut mixed = DeclarationBlock::new();
        mixed
            .declare(Longhand::Height, SpecifiedValue::px(2.0))
            .unwrap();
        mixed
            .declare_important(Longhand::Width, SpecifiedValue::px(3.0))
            .unwrap();
        author.add(
            Selector::builder().tag("div").build().unwrap(),
            Arc::new(mixed),
        );

        let mut registry = RuleRegistry::new();
        registry.push_ua(ua);
        registry.push_author(ScopeId::DOCUMENT, author);

        let result = collect(&registry, &tree, div, None);
        // The mixed author block lands in both author ranges.
        assert_eq!(result.ua_normal().len(), 0);
        assert_eq!(result.author_normal().len(), 1);
        assert_eq!(result.author_important().len(), 1);
        assert_eq!(result.ua_important().len(), 1);
    }

    #[test]
    fn test_inline_outranks_id_specificity() {
        let (tree, div) = fixture();
        let mut sheet = RuleSet::new();
        sheet.add(
            Selector::builder().id("y").build().unwrap(),
            block_with(Longhand::Width, SpecifiedValue::px(1.0), false),
        );
        let mut registry = RuleRegistry::new();
        registry.push_author(ScopeId::DOCUMENT, sheet);

        let inline = block_with(Longhand::Width, SpecifiedValue::px(2.0), false);
        let result = collect(&registry, &tree, div, Some(&inline));

        assert!(result.flags.contains(ResolutionFlags::STYLE_ATTR));
        let range = result.author_normal();
        assert_eq!(range.len(), 2);
        // Style attribute sorts above the id rule despite zero specificity.
        assert!(range[1].via_style_attr);
    }

    #[test]
    fn test_content_hash_tracks_sequence() {
        let (tree, div) = fixture();
        let mut sheet = RuleSet::new();
        sheet.add(
            Selector::builder().class("x").build().unwrap(),
            block_with(Longhand::Width, SpecifiedValue::px(1.0), false),
        );
        let mut registry = RuleRegistry::new();
        registry.push_author(ScopeId::DOCUMENT, sheet);

        let first = collect(&registry, &tree, div, None);
        let second = collect(&registry, &tree, div, None);
        assert_eq!(first.content_hash(), second.content_hash());

        let mut bigger = RuleSet::new();
        bigger.add(
            Selector::builder().tag("div").build().unwrap(),
            block_with(Longhand::Height, SpecifiedValue::px(2.0), false),
        );
        registry.push_author(ScopeId::DOCUMENT, bigger);
        let third = collect(&registry, &tree, div, None);
        assert_ne!(first.content_hash(), third.content_hash());
    }

    #[test]
    fn test_sibling_skip_set_prunes() {
        let mut tree = DomTree::new();
        let parent = tree.create_element("div");
        let first = tree.create_element("p");
        let second = tree.create_element("p");
        tree.append_child(NodeId::DOCUMENT, parent).unwrap();
        tree.append_child(parent, first).unwrap();
        tree.append_child(parent, second).unwrap();

        // section p: fails on the ancestor side for every sibling.
        let mut sheet = RuleSet::new();
        sheet.add(
            Selector::builder().tag("p").ancestor().tag("section").build().unwrap(),
            block_with(Longhand::Width, SpecifiedValue::px(1.0), false),
        );
        let mut registry = RuleRegistry::new();
        registry.push_author(ScopeId::DOCUMENT, sheet);

        let view = TreeView::new(&tree, TraversalMode::Flat);
        let mut skip = FnvHashSet::default();
        let result = collect_matches(
            &registry,
            &view,
            &tree,
            first,
            None,
            None,
            PruneState {
                filter: None,
                skip: Some(&mut skip),
            },
        );
        assert!(result.is_empty());
        // The failure was recorded for the following siblings.
        assert_eq!(skip.len(), 1);
    }
}
