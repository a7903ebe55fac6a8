//! Matched-properties cache
//!
//! Memoizes resolved property tables keyed by a content hash of the exact
//! ordered matched-rule sequence. Densely repeated markup produces long
//! runs of nodes with identical sequences, so one entry serves many nodes.
//!
//! A hit with the same parent signature returns the stored table verbatim.
//! If only the parent differs, the non-inherited portion is still valid:
//! the stored table is cloned and the inherited, non-declared properties
//! are re-derived from the real parent (partial hit). Entries whose
//! explicitly set values depend on the parent (explicit inherit, font
//! relative units, var substitution) never take the partial path.
//!
//! There is no per-entry eviction: any invalidating event (rule mutation,
//! document mutation, viewport change) clears the whole cache.

use std::sync::Arc;

use fnv::FnvHashMap;
use tracing::debug;

use crate::collector::{MatchResult, ResolutionFlags};
use crate::computed::{ComputedStyle, StyleFlags};
use crate::properties::Longhand;

/// Outcome of a cache lookup
pub enum CacheOutcome {
    /// Stored table is valid verbatim
    Hit(Arc<ComputedStyle>),
    /// Non-inherited portion reused, inherited values re-derived
    Partial(Arc<ComputedStyle>),
    Miss,
}

/// Counters exposed for diagnostics and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub partial_hits: u64,
    pub misses: u64,
    pub flushes: u64,
    pub entries: usize,
}

struct CacheEntry {
    style: Arc<ComputedStyle>,
    parent: Option<Arc<ComputedStyle>>,
}

/// Centralized cacheability predicate, evaluated once per resolution
///
/// A resolution is ineligible whenever it depended on node-instance state
/// the content hash does not capture: inline declarations, presentational
/// hints, rules from more than one scope, dynamic-state selectors, or
/// animation interpolations.
pub fn eligible_for_cache(flags: ResolutionFlags, animated: bool) -> bool {
    !animated
        && !flags.intersects(
            ResolutionFlags::STYLE_ATTR
                | ResolutionFlags::PRES_HINTS
                | ResolutionFlags::MULTI_SCOPE
                | ResolutionFlags::DYNAMIC_STATE,
        )
}

/// Content-hash keyed style memoization
pub struct MatchedPropertiesCache {
    entries: FnvHashMap<u64, CacheEntry>,
    enabled: bool,
    hits: u64,
    partial_hits: u64,
    misses: u64,
    flushes: u64,
}

impl MatchedPropertiesCache {
    pub fn new() -> Self {
        Self {
            entries: FnvHashMap::default(),
            enabled: true,
            hits: 0,
            partial_hits: 0,
            misses: 0,
            flushes: 0,
        }
    }

    /// Turn the cache off (resolution results must not change)
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.entries.clear();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Look up a result for a matched-rule sequence
    pub fn lookup(
        &mut self,
        result: &MatchResult,
        parent: Option<&Arc<ComputedStyle>>,
    ) -> CacheOutcome {
        if !self.enabled {
            return CacheOutcome::Miss;
        }
        let Some(entry) = self.entries.get(&result.content_hash()) else {
            self.misses += 1;
            return CacheOutcome::Miss;
        };

        if parent_signature_matches(entry.parent.as_ref(), parent) {
            self.hits += 1;
            return CacheOutcome::Hit(Arc::clone(&entry.style));
        }

        if entry.style.flags.intersects(StyleFlags::PARENT_SENSITIVE) {
            self.misses += 1;
            return CacheOutcome::Miss;
        }
        let Some(parent) = parent else {
            self.misses += 1;
            return CacheOutcome::Miss;
        };

        self.partial_hits += 1;
        CacheOutcome::Partial(Arc::new(rederive_inherited(&entry.style, parent)))
    }

    /// Store an eligible resolution
    pub fn store(
        &mut self,
        result: &MatchResult,
        style: Arc<ComputedStyle>,
        parent: Option<Arc<ComputedStyle>>,
    ) {
        if !self.enabled {
            return;
        }
        self.entries
            .insert(result.content_hash(), CacheEntry { style, parent });
    }

    /// Whole-cache invalidation; the only eviction mechanism
    pub fn flush(&mut self, reason: &str) {
        if !self.entries.is_empty() {
            debug!(reason, entries = self.entries.len(), "flushing style cache");
        }
        self.entries.clear();
        self.flushes += 1;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            partial_hits: self.partial_hits,
            misses: self.misses,
            flushes: self.flushes,
            entries: self.entries.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MatchedPropertiesCache {
    fn default() -> Self {
        Self::new()
    }
}

fn parent_signature_matches(
    stored: Option<&Arc<ComputedStyle>>,
    actual: Option<&Arc<ComputedStyle>>,
) -> bool {
    match (stored, actual) {
        (None, None) => true,
        (Some(stored), Some(actual)) => {
            Arc::ptr_eq(stored, actual) || stored.inherited_eq(actual)
        }
        _ => false,
    }
}

/// Clone the stored table and re-derive inherited properties the entry did
/// not pin with declarations
fn rederive_inherited(stored: &ComputedStyle, parent: &ComputedStyle) -> ComputedStyle {
    let mut style = stored.clone();
    for longhand in Longhand::ALL {
        if longhand.is_inherited() && !stored.is_explicit(longhand) {
            style.set_derived(longhand, parent.get(longhand).clone());
        }
    }
    style.custom = parent.custom.inherit();
    // Inherited values may carry unit dependencies of their own.
    style.flags |= parent.flags & StyleFlags::INHERITED_CARRYOVER;
    style
}
