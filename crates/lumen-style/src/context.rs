//! Resolver context
//!
//! One explicit context value owns everything a resolution needs: the rule
//! registry, the matched-properties cache, device metrics, the initial
//! table, and the per-traversal scratch state (ancestor filter plus sibling
//! skip sets). There is no global state; two documents get two resolvers.
//!
//! Resolutions are synchronous and non-reentrant. A host traversing a
//! subtree should call `push_ancestor` when descending into an element and
//! `pop_ancestor` when leaving it, which keeps the ancestor filter and the
//! sibling pruning sets aligned with the open chain; `resolve_subtree` does
//! this bookkeeping for whole-tree resolution.

use std::sync::Arc;

use fnv::{FnvHashMap, FnvHashSet};
use lumen_dom::{DomTree, Generation, NodeId, ScopeId};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::animation::InterpolationOverrides;
use crate::applier::{apply, ApplyInputs};
use crate::bloom::{element_features, AncestorFilter};
use crate::cache::{eligible_for_cache, CacheOutcome, CacheStats, MatchedPropertiesCache};
use crate::collector::{collect_matches, MatchResult, PruneState};
use crate::computed::ComputedStyle;
use crate::matcher::{TraversalMode, TreeView};
use crate::properties::DeclarationBlock;
use crate::rules::RuleRegistry;
use crate::PseudoElement;

/// Viewport and typography metrics of the rendering device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceMetrics {
    pub viewport_width: f32,
    pub viewport_height: f32,
    /// Fallback root font size before the root element is resolved
    pub root_font_size: f32,
}

impl Default for DeviceMetrics {
    fn default() -> Self {
        Self {
            viewport_width: 1280.0,
            viewport_height: 720.0,
            root_font_size: 16.0,
        }
    }
}

/// Output of one resolution
pub struct ResolvedStyle {
    pub style: Arc<ComputedStyle>,
    /// Pre-animation table, present when interpolation overrides applied;
    /// handed back to the animation collaborator for snapshotting
    pub base: Option<Arc<ComputedStyle>>,
}

/// Per-traversal scratch: ancestor filter plus one sibling skip set per
/// open ancestor level
struct TraversalScratch {
    filter: AncestorFilter,
    pushed: Vec<NodeId>,
    skip_stack: Vec<FnvHashSet<(u64, ScopeId)>>,
}

impl TraversalScratch {
    fn new() -> Self {
        Self {
            filter: AncestorFilter::new(),
            pushed: Vec::new(),
            skip_stack: Vec::new(),
        }
    }
}

/// Style cascade resolver for one document
pub struct StyleResolver {
    registry: RuleRegistry,
    cache: MatchedPropertiesCache,
    device: DeviceMetrics,
    mode: TraversalMode,
    inline: FnvHashMap<NodeId, Arc<DeclarationBlock>>,
    scratch: TraversalScratch,
    /// Context-owned last-resort table, returned for non-element nodes
    initial_style: Arc<ComputedStyle>,
    /// Resolved font size of the root element, for rem conversion
    root_font_size: f32,
    seen_rules_generation: Option<u64>,
    seen_doc_generation: Option<Generation>,
}

impl StyleResolver {
    pub fn new(registry: RuleRegistry) -> Self {
        let device = DeviceMetrics::default();
        Self {
            registry,
            cache: MatchedPropertiesCache::new(),
            device,
            mode: TraversalMode::Flat,
            inline: FnvHashMap::default(),
            scratch: TraversalScratch::new(),
            initial_style: Arc::new(ComputedStyle::initial()),
            root_font_size: device.root_font_size,
            seen_rules_generation: None,
            seen_doc_generation: None,
        }
    }

    pub fn with_device(registry: RuleRegistry, device: DeviceMetrics) -> Self {
        let mut resolver = Self::new(registry);
        resolver.device = device;
        resolver.root_font_size = device.root_font_size;
        resolver
    }

    // ----- configuration -----

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Mutable registry access; any mutation bumps its generation and the
    /// next resolution flushes the cache
    pub fn registry_mut(&mut self) -> &mut RuleRegistry {
        &mut self.registry
    }

    /// Select light or flattened traversal for matching
    pub fn set_traversal_mode(&mut self, mode: TraversalMode) {
        if self.mode != mode {
            self.mode = mode;
            self.cache.flush("traversal mode change");
        }
    }

    /// Attach an inline (style attribute) declaration block to a node
    pub fn set_inline_style(&mut self, node: NodeId, block: Arc<DeclarationBlock>) {
        self.inline.insert(node, block);
    }

    pub fn clear_inline_style(&mut self, node: NodeId) {
        self.inline.remove(&node);
    }

    /// Viewport resize: viewport-relative values must recompute
    pub fn set_viewport(&mut self, width: f32, height: f32) {
        if (self.device.viewport_width, self.device.viewport_height) != (width, height) {
            self.device.viewport_width = width;
            self.device.viewport_height = height;
            self.cache.flush("viewport change");
        }
    }

    pub fn device(&self) -> DeviceMetrics {
        self.device
    }

    // ----- cache control -----

    pub fn set_cache_enabled(&mut self, enabled: bool) {
        self.cache.set_enabled(enabled);
    }

    pub fn flush_cache(&mut self) {
        self.cache.flush("explicit flush");
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // ----- traversal scratch -----

    /// Enter an element while traversing a subtree
    pub fn push_ancestor(&mut self, tree: &DomTree, node: NodeId) {
        for feature in element_features(tree, node) {
            self.scratch.filter.push(feature);
        }
        self.scratch.pushed.push(node);
        self.scratch.skip_stack.push(FnvHashSet::default());
    }

    /// Leave an element entered with `push_ancestor`
    pub fn pop_ancestor(&mut self, tree: &DomTree, node: NodeId) {
        debug_assert_eq!(self.scratch.pushed.last(), Some(&node));
        self.scratch.pushed.pop();
        self.scratch.skip_stack.pop();
        for feature in element_features(tree, node) {
            self.scratch.filter.pop(feature);
        }
    }

    /// Whether the pushed chain is exactly the node's ancestor chain
    ///
    /// The filter and skip sets are only consulted when they demonstrably
    /// describe this node's ancestors; a standalone `resolve` with no
    /// pushed chain falls back to unpruned matching.
    fn scratch_aligned(&self, view: &TreeView<'_>, node: NodeId) -> bool {
        let mut remaining = self.scratch.pushed.len();
        let mut current = view.parent_element(node);
        while let Some(ancestor) = current {
            if remaining == 0 || self.scratch.pushed[remaining - 1] != ancestor {
                return false;
            }
            remaining -= 1;
            current = view.parent_element(ancestor);
        }
        remaining == 0
    }

    // ----- resolution -----

    /// Resolve the effective style of an element
    ///
    /// `parent_style` is the resolved style of the element's (flattened)
    /// parent, or `None` for the root. Interpolation overrides, when
    /// present, apply above the whole cascade and make the resolution
    /// ineligible for caching; the pre-animation base table is returned
    /// alongside the final one.
    pub fn resolve(
        &mut self,
        tree: &DomTree,
        node: NodeId,
        parent_style: Option<&Arc<ComputedStyle>>,
        overrides: Option<&InterpolationOverrides>,
    ) -> ResolvedStyle {
        self.resolve_with_pseudo(tree, node, None, parent_style, overrides)
    }

    /// Resolve the style of a pseudo-element of `node`
    ///
    /// Only rules whose selector carries the matching pseudo-element tag
    /// apply; the element's own resolved style is the inheritance parent.
    pub fn resolve_pseudo(
        &mut self,
        tree: &DomTree,
        node: NodeId,
        pseudo: PseudoElement,
        element_style: &Arc<ComputedStyle>,
    ) -> Arc<ComputedStyle> {
        self.resolve_with_pseudo(tree, node, Some(pseudo), Some(element_style), None)
            .style
    }

    fn resolve_with_pseudo(
        &mut self,
        tree: &DomTree,
        node: NodeId,
        pseudo: Option<PseudoElement>,
        parent_style: Option<&Arc<ComputedStyle>>,
        overrides: Option<&InterpolationOverrides>,
    ) -> ResolvedStyle {
        self.sync_invalidation(tree);

        let view = TreeView::new(tree, self.mode);
        if tree.element(node).is_none() {
            return ResolvedStyle {
                style: Arc::clone(&self.initial_style),
                base: None,
            };
        }

        let aligned = self.scratch_aligned(&view, node);
        let inline = if pseudo.is_none() {
            self.inline.get(&node).cloned()
        } else {
            None
        };
        let result = {
            let prune = if aligned {
                PruneState {
                    filter: Some(&self.scratch.filter),
                    skip: self.scratch.skip_stack.last_mut(),
                }
            } else {
                PruneState::inert()
            };
            collect_matches(
                &self.registry,
                &view,
                tree,
                node,
                pseudo,
                inline.as_ref(),
                prune,
            )
        };

        let animated = overrides.is_some_and(|o| !o.is_empty());
        let cacheable = eligible_for_cache(result.flags, animated);

        if cacheable {
            match self.cache.lookup(&result, parent_style) {
                CacheOutcome::Hit(style) | CacheOutcome::Partial(style) => {
                    self.note_root_font(&view, node, &style);
                    return ResolvedStyle { style, base: None };
                }
                CacheOutcome::Miss => {}
            }
        }

        let style = Arc::new(self.apply_result(&result, parent_style, None));
        if animated {
            // The uncached path runs twice: once without overrides for the
            // base snapshot, once with them for the final table.
            let final_style = Arc::new(self.apply_result(&result, parent_style, overrides));
            self.note_root_font(&view, node, &final_style);
            return ResolvedStyle {
                style: final_style,
                base: Some(style),
            };
        }

        if cacheable {
            self.cache
                .store(&result, Arc::clone(&style), parent_style.cloned());
        }
        self.note_root_font(&view, node, &style);
        trace!(node = node.index(), matched = result.len(), "resolved style");
        ResolvedStyle { style, base: None }
    }

    fn apply_result(
        &self,
        result: &MatchResult,
        parent_style: Option<&Arc<ComputedStyle>>,
        overrides: Option<&InterpolationOverrides>,
    ) -> ComputedStyle {
        apply(
            result,
            &ApplyInputs {
                parent: parent_style.map(Arc::as_ref),
                root_font_size: self.root_font_size,
                viewport_width: self.device.viewport_width,
                viewport_height: self.device.viewport_height,
                overrides,
            },
        )
    }

    /// Track the root element's font size; rem units resolve against it
    fn note_root_font(&mut self, view: &TreeView<'_>, node: NodeId, style: &ComputedStyle) {
        if view.parent_element(node).is_some() {
            return;
        }
        let font_size = style.font_size();
        if (font_size - self.root_font_size).abs() > f32::EPSILON {
            debug!(font_size, "root font size changed");
            self.root_font_size = font_size;
            self.cache.flush("root font size change");
        }
    }

    /// Resolve an element and its element descendants in document order
    pub fn resolve_subtree(
        &mut self,
        tree: &DomTree,
        root: NodeId,
        parent_style: Option<&Arc<ComputedStyle>>,
    ) -> Vec<(NodeId, Arc<ComputedStyle>)> {
        let mut out = Vec::new();
        self.resolve_subtree_into(tree, root, parent_style, &mut out);
        out
    }

    fn resolve_subtree_into(
        &mut self,
        tree: &DomTree,
        node: NodeId,
        parent_style: Option<&Arc<ComputedStyle>>,
        out: &mut Vec<(NodeId, Arc<ComputedStyle>)>,
    ) {
        let resolved = self.resolve(tree, node, parent_style, None);
        let style = resolved.style;
        out.push((node, Arc::clone(&style)));

        let children: SmallVec<[NodeId; 8]> = element_children(tree, node);
        if children.is_empty() {
            return;
        }
        self.push_ancestor(tree, node);
        for child in children {
            self.resolve_subtree_into(tree, child, Some(&style), out);
        }
        self.pop_ancestor(tree, node);
    }

    fn sync_invalidation(&mut self, tree: &DomTree) {
        let rules_generation = self.registry.generation();
        if self.seen_rules_generation != Some(rules_generation) {
            if self.seen_rules_generation.is_some() {
                self.cache.flush("rule registry mutation");
            }
            self.seen_rules_generation = Some(rules_generation);
        }
        let doc_generation = tree.generation();
        if self.seen_doc_generation != Some(doc_generation) {
            if self.seen_doc_generation.is_some() {
                self.cache.flush("document mutation");
            }
            self.seen_doc_generation = Some(doc_generation);
        }
    }
}

fn element_children(tree: &DomTree, node: NodeId) -> SmallVec<[NodeId; 8]> {
    let mut children = SmallVec::new();
    let mut child = tree.first_child(node);
    while child.is_some() {
        if tree.get(child).is_some_and(|n| n.is_element()) {
            children.push(child);
        }
        child = tree.next_sibling(child);
    }
    children
}
