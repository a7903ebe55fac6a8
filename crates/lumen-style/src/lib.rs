//! Lumen style engine - cascade resolution
//!
//! Resolves the effective property values for a tree node against
//! prioritized rule-set collections: selector matching over the node's
//! ancestors and siblings, cascade ordering by (origin, importance,
//! specificity, source order), multi-pass property application with
//! forward dependencies, and a matched-properties cache that must be
//! bit-identical to the uncached path.

mod animation;
mod applier;
mod bloom;
mod cache;
mod collector;
mod computed;
mod context;
mod error;
mod matcher;
mod properties;
mod rules;
mod selectors;
mod variables;

pub use animation::InterpolationOverrides;
pub use applier::LengthConversion;
pub use bloom::AncestorFilter;
pub use cache::{eligible_for_cache, CacheOutcome, CacheStats, MatchedPropertiesCache};
pub use collector::{Importance, MatchResult, MatchedRule, ResolutionFlags};
pub use computed::{ComputedStyle, StyleFlags};
pub use context::{DeviceMetrics, ResolvedStyle, StyleResolver};
pub use error::StyleError;
pub use matcher::{
    match_selector, MatchOutcome, MatchedDetails, StateSource, TraversalMode, TreeView,
};
pub use properties::{
    Color, ComputedValue, Declaration, DeclarationBlock, KeywordValue, Length, LengthUnit,
    Longhand, PriorityClass, PropertyName, PropertySet, SpecifiedValue, VarReference,
    LONGHAND_COUNT,
};
pub use rules::{
    presentational_hints, ua_default_rules, CascadeOrigin, Rule, RuleRegistry, RuleSet,
};
pub use selectors::{
    AttrOp, Compound, Nth, PseudoClass, PseudoElement, Relation, Selector, SelectorBuilder,
    SimplePredicate, Specificity,
};
pub use variables::{resolve_reference, resolve_value, CustomPropertyMap};
