//! Output property table
//!
//! The resolved style is a dense, fixed-shape table indexed by longhand id,
//! plus bookkeeping flags and the set of properties pinned by declarations
//! (the cache needs that set to re-derive only inherited values on a
//! partial hit). Once a resolution returns a table it is never mutated;
//! later resolutions clone it as an inheritance base or a cache hit.

use bitflags::bitflags;

use crate::properties::{Color, ComputedValue, KeywordValue, Longhand, PropertySet};
use crate::variables::CustomPropertyMap;

bitflags! {
    /// Derived signals the output consumer uses to schedule invalidation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StyleFlags: u8 {
        /// Some value depends on viewport dimensions (vw/vh)
        const VIEWPORT_RELATIVE = 1 << 0;
        /// Some value depends on a resolved font size (em/rem, font %)
        const FONT_RELATIVE = 1 << 1;
        /// A declaration explicitly inherited from the parent
        const EXPLICIT_INHERIT = 1 << 2;
        /// The node declared custom properties of its own
        const DECLARED_CUSTOMS = 1 << 3;
        /// A declaration substituted a var() reference
        const USES_VARIABLES = 1 << 4;
        /// Interpolated animation values were applied on top of the cascade
        const ANIMATED = 1 << 5;
    }
}

impl StyleFlags {
    /// Flags that travel with inherited values on a partial cache hit
    pub const INHERITED_CARRYOVER: StyleFlags = StyleFlags::VIEWPORT_RELATIVE
        .union(StyleFlags::FONT_RELATIVE);

    /// Flags whose presence makes a stored entry unusable as a partial hit.
    /// Explicit inherit, var substitution and declared customs mean some
    /// pinned value depends on the parent; relative-unit flags cannot be
    /// attributed to own declarations versus inherited carryover, so they
    /// disqualify too.
    pub const PARENT_SENSITIVE: StyleFlags = StyleFlags::EXPLICIT_INHERIT
        .union(StyleFlags::FONT_RELATIVE)
        .union(StyleFlags::VIEWPORT_RELATIVE)
        .union(StyleFlags::DECLARED_CUSTOMS)
        .union(StyleFlags::USES_VARIABLES);
}

/// Fully resolved property table for one node
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedStyle {
    values: Box<[ComputedValue]>,
    explicit: PropertySet,
    pub flags: StyleFlags,
    pub custom: CustomPropertyMap,
}

impl ComputedStyle {
    /// Table holding every property's initial value
    pub fn initial() -> Self {
        let values = Longhand::ALL
            .iter()
            .map(|l| l.initial_value())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            values,
            explicit: PropertySet::new(),
            flags: StyleFlags::empty(),
            custom: CustomPropertyMap::new(),
        }
    }

    /// Inheritance base: inherited properties from the parent, the rest
    /// initial, custom properties carried over wholesale
    pub fn inherit_from(parent: &ComputedStyle) -> Self {
        let values = Longhand::ALL
            .iter()
            .map(|l| {
                if l.is_inherited() {
                    parent.get(*l).clone()
                } else {
                    l.initial_value()
                }
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            values,
            explicit: PropertySet::new(),
            // Inherited values keep their unit dependencies.
            flags: parent.flags & StyleFlags::INHERITED_CARRYOVER,
            custom: parent.custom.inherit(),
        }
    }

    /// Final value of a longhand
    #[inline]
    pub fn get(&self, property: Longhand) -> &ComputedValue {
        &self.values[property.index()]
    }

    /// Set a cascaded value and pin the property against lower precedence
    pub(crate) fn set_cascaded(&mut self, property: Longhand, value: ComputedValue) {
        self.values[property.index()] = value;
        self.explicit.insert(property);
    }

    /// Overwrite a value without marking it declaration-pinned (inherited
    /// re-derivation on partial cache hits, animation overrides)
    pub(crate) fn set_derived(&mut self, property: Longhand, value: ComputedValue) {
        self.values[property.index()] = value;
    }

    /// Whether a declaration pinned this property during its resolution
    #[inline]
    pub fn is_explicit(&self, property: Longhand) -> bool {
        self.explicit.contains(property)
    }

    /// Properties pinned by declarations
    #[inline]
    pub fn explicit_set(&self) -> PropertySet {
        self.explicit
    }

    // ----- typed accessors -----

    /// Resolved font size in pixels
    pub fn font_size(&self) -> f32 {
        self.get(Longhand::FontSize).as_px().unwrap_or(16.0)
    }

    pub fn color(&self) -> Color {
        self.get(Longhand::Color).as_color().unwrap_or(Color::BLACK)
    }

    pub fn background_color(&self) -> Color {
        self.get(Longhand::BackgroundColor)
            .as_color()
            .unwrap_or(Color::TRANSPARENT)
    }

    pub fn display(&self) -> KeywordValue {
        self.get(Longhand::Display)
            .as_keyword()
            .unwrap_or(KeywordValue::Inline)
    }

    pub fn opacity(&self) -> f32 {
        match self.get(Longhand::Opacity) {
            ComputedValue::Number(n) => n.clamp(0.0, 1.0),
            _ => 1.0,
        }
    }

    /// Whether the inherited-relevant portion of two styles is identical
    ///
    /// Used as the parent signature comparison for full cache hits: if this
    /// holds between the stored parent and the actual parent, inheriting
    /// from either produces the same base.
    pub fn inherited_eq(&self, other: &ComputedStyle) -> bool {
        (self.flags & StyleFlags::INHERITED_CARRYOVER)
            == (other.flags & StyleFlags::INHERITED_CARRYOVER)
            && Longhand::ALL
                .iter()
                .filter(|l| l.is_inherited())
                .all(|l| self.get(*l) == other.get(*l))
            && self.custom == other.custom
    }
}
