//! Custom properties
//!
//! Custom property values live in a per-style map, inherited wholesale from
//! the parent and overlaid with the node's own declarations. A `var()`
//! reference resolves through the map recursively; an undefined name falls
//! back to the reference's fallback value, and a reference cycle poisons
//! every name on the cycle. Both failures are silent: the referencing
//! declaration is simply treated as absent.

use std::collections::HashSet;
use std::sync::Arc;

use fnv::FnvHashMap;

use crate::properties::{SpecifiedValue, VarReference};

/// Name-to-value map for custom properties
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomPropertyMap {
    map: FnvHashMap<Arc<str>, Arc<SpecifiedValue>>,
}

impl CustomPropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Child map: custom properties inherit as a whole
    pub fn inherit(&self) -> Self {
        self.clone()
    }

    pub fn set(&mut self, name: Arc<str>, value: Arc<SpecifiedValue>) {
        self.map.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<SpecifiedValue>> {
        self.map.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Resolve a `var()` reference to a concrete specified value
///
/// Returns `None` for an undefined name without usable fallback or for a
/// reference cycle; the caller treats the declaration as absent.
pub fn resolve_reference(
    map: &CustomPropertyMap,
    reference: &VarReference,
) -> Option<SpecifiedValue> {
    let mut visiting = HashSet::new();
    resolve_inner(map, reference, &mut visiting)
}

fn resolve_inner(
    map: &CustomPropertyMap,
    reference: &VarReference,
    visiting: &mut HashSet<Arc<str>>,
) -> Option<SpecifiedValue> {
    if !visiting.insert(Arc::clone(&reference.name)) {
        // Cycle: every participant is invalid, fallbacks included.
        return None;
    }
    let resolved = match map.get(&reference.name) {
        Some(value) => match &**value {
            SpecifiedValue::Var(inner) => resolve_inner(map, inner, visiting),
            concrete => Some(concrete.clone()),
        },
        None => match &reference.fallback {
            Some(fallback) => match &**fallback {
                SpecifiedValue::Var(inner) => resolve_inner(map, inner, visiting),
                concrete => Some(concrete.clone()),
            },
            None => None,
        },
    };
    visiting.remove(&reference.name);
    resolved
}

/// Resolve a specified value, substituting any `var()` reference
pub fn resolve_value(map: &CustomPropertyMap, value: &SpecifiedValue) -> Option<SpecifiedValue> {
    match value {
        SpecifiedValue::Var(reference) => resolve_reference(map, reference),
        other => Some(other.clone()),
    }
}
