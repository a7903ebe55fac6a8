//! Property applier (cascade engine)
//!
//! Applies a [`MatchResult`] into an output property table in a fixed pass
//! order: custom properties first, then the animation-affecting class, then
//! the early class (properties later conversions depend on), then the rest.
//! After the early class the length conversion context is rebuilt so em/rem
//! values in late properties convert against the freshly resolved font size.
//!
//! Within each pass the ranges are walked highest precedence first (UA
//! !important, author !important, author normal, UA normal) and the first
//! declaration to reach a property wins; nothing is ever overwritten by a
//! lower-precedence declaration. A declaration whose value cannot be
//! resolved (undefined var, cycle) is treated as absent, so the walk simply
//! carries on to the next lower-precedence source.

use std::sync::Arc;

use fnv::FnvHashSet;

use crate::animation::InterpolationOverrides;
use crate::collector::{Importance, MatchResult, MatchedRule};
use crate::computed::{ComputedStyle, StyleFlags};
use crate::properties::{
    ComputedValue, Length, LengthUnit, Longhand, PriorityClass, PropertyName, PropertySet,
    SpecifiedValue,
};
use crate::variables::resolve_value;

/// Factors for converting relative length units to pixels
#[derive(Debug, Clone, Copy)]
pub struct LengthConversion {
    /// Font size an `em` resolves against
    pub em: f32,
    /// Root font size a `rem` resolves against
    pub rem: f32,
    pub viewport_width: f32,
    pub viewport_height: f32,
}

/// Inputs the applier needs besides the match result
pub(crate) struct ApplyInputs<'a> {
    pub parent: Option<&'a ComputedStyle>,
    /// Font size of the root element, for rem units
    pub root_font_size: f32,
    pub viewport_width: f32,
    pub viewport_height: f32,
    pub overrides: Option<&'a InterpolationOverrides>,
}

/// Walk every range in precedence order, winner first
fn precedence_walk(result: &MatchResult) -> impl Iterator<Item = &MatchedRule> {
    result
        .ua_important()
        .iter()
        .chain(result.author_important())
        .chain(result.author_normal().iter().rev())
        .chain(result.ua_normal().iter().rev())
}

/// Apply a match result into a fresh output table
pub(crate) fn apply(result: &MatchResult, inputs: &ApplyInputs<'_>) -> ComputedStyle {
    let mut style = match inputs.parent {
        Some(parent) => ComputedStyle::inherit_from(parent),
        None => ComputedStyle::initial(),
    };

    apply_custom_properties(result, &mut style);

    let parent_font = inputs
        .parent
        .map(ComputedStyle::font_size)
        .unwrap_or_else(|| Longhand::FontSize.initial_value().as_px().unwrap_or(16.0));
    let mut conversion = LengthConversion {
        em: parent_font,
        rem: inputs.root_font_size,
        viewport_width: inputs.viewport_width,
        viewport_height: inputs.viewport_height,
    };

    let mut applied = PropertySet::new();
    for class in [PriorityClass::Animation, PriorityClass::Early, PriorityClass::Late] {
        if let Some(overrides) = inputs.overrides {
            apply_overrides(overrides, class, &mut style, &mut applied);
        }
        apply_class(result, class, inputs.parent, &conversion, &mut style, &mut applied);

        if class == PriorityClass::Early {
            // Early properties are settled: rebuild the conversion context
            // before any late length converts.
            conversion.em = style.font_size();
            if inputs.parent.is_none() {
                conversion.rem = style.font_size();
            }
        }
    }

    style
}

/// First pass: custom property declarations, first applied per name wins
fn apply_custom_properties(result: &MatchResult, style: &mut ComputedStyle) {
    let mut seen: FnvHashSet<Arc<str>> = FnvHashSet::default();
    for entry in precedence_walk(result) {
        for decl in declarations_of(entry) {
            if let PropertyName::Custom(name) = &decl.name {
                if seen.insert(Arc::clone(name)) {
                    style.flags |= StyleFlags::DECLARED_CUSTOMS;
                    style
                        .custom
                        .set(Arc::clone(name), Arc::new(decl.value.clone()));
                }
            }
        }
    }
}

fn apply_overrides(
    overrides: &InterpolationOverrides,
    class: PriorityClass,
    style: &mut ComputedStyle,
    applied: &mut PropertySet,
) {
    for (property, value) in overrides.iter() {
        if property.priority_class() == class && !applied.contains(*property) {
            applied.insert(*property);
            style.flags |= StyleFlags::ANIMATED;
            style.set_derived(*property, value.clone());
        }
    }
}

fn apply_class(
    result: &MatchResult,
    class: PriorityClass,
    parent: Option<&ComputedStyle>,
    conversion: &LengthConversion,
    style: &mut ComputedStyle,
    applied: &mut PropertySet,
) {
    for entry in precedence_walk(result) {
        for decl in declarations_of(entry) {
            match &decl.name {
                PropertyName::Custom(_) => {}
                PropertyName::All => {
                    apply_all_reset(&decl.value, class, parent, style, applied);
                }
                PropertyName::Longhand(longhand) => {
                    let longhand = *longhand;
                    if longhand.priority_class() != class || applied.contains(longhand) {
                        continue;
                    }
                    if let Some(value) =
                        resolve_declaration(longhand, &decl.value, parent, conversion, style)
                    {
                        applied.insert(longhand);
                        style.set_cascaded(longhand, value);
                    }
                }
            }
        }
    }
}

/// Expand a reset-all declaration over every covered longhand of the pass
///
/// Only CSS-wide keywords are meaningful for `all`; anything else leaves
/// the declaration inert.
fn apply_all_reset(
    value: &SpecifiedValue,
    class: PriorityClass,
    parent: Option<&ComputedStyle>,
    style: &mut ComputedStyle,
    applied: &mut PropertySet,
) {
    if !value.is_css_wide() {
        return;
    }
    for longhand in Longhand::ALL {
        if longhand.priority_class() != class
            || !longhand.covered_by_all()
            || applied.contains(longhand)
        {
            continue;
        }
        let resolved = resolve_css_wide(longhand, value, parent, style);
        applied.insert(longhand);
        style.set_cascaded(longhand, resolved);
    }
}

/// Resolve one declaration's value for one longhand
///
/// `None` means the declaration is treated as absent for this property and
/// lower-precedence sources stay in play.
fn resolve_declaration(
    longhand: Longhand,
    value: &SpecifiedValue,
    parent: Option<&ComputedStyle>,
    conversion: &LengthConversion,
    style: &mut ComputedStyle,
) -> Option<ComputedValue> {
    let value = match value {
        SpecifiedValue::Var(_) => {
            style.flags |= StyleFlags::USES_VARIABLES;
            resolve_value(&style.custom, value)?
        }
        other => other.clone(),
    };

    let computed = match value {
        SpecifiedValue::Inherit => {
            style.flags |= StyleFlags::EXPLICIT_INHERIT;
            inherited_value(longhand, parent)
        }
        SpecifiedValue::Initial => longhand.initial_value(),
        SpecifiedValue::Unset => {
            if longhand.is_inherited() {
                style.flags |= StyleFlags::EXPLICIT_INHERIT;
                inherited_value(longhand, parent)
            } else {
                longhand.initial_value()
            }
        }
        SpecifiedValue::Keyword(keyword) => ComputedValue::Keyword(keyword),
        SpecifiedValue::Length(length) => convert_length(length, conversion, &mut style.flags),
        SpecifiedValue::Percentage(pct) => {
            if longhand == Longhand::FontSize {
                // Font-size percentages resolve against the inherited font
                // size immediately; other percentages wait for layout.
                style.flags |= StyleFlags::FONT_RELATIVE;
                ComputedValue::Px(conversion.em * pct / 100.0)
            } else {
                ComputedValue::Percentage(pct)
            }
        }
        SpecifiedValue::Number(n) => ComputedValue::Number(n),
        SpecifiedValue::Integer(i) => ComputedValue::Integer(i),
        SpecifiedValue::Color(c) => ComputedValue::Color(c),
        SpecifiedValue::Ident(name) => ComputedValue::Ident(name),
        // A var() out of the custom map resolving to another var() is
        // handled inside resolve_value; reaching here means a bug.
        SpecifiedValue::Var(_) => return None,
    };
    Some(computed)
}

fn resolve_css_wide(
    longhand: Longhand,
    value: &SpecifiedValue,
    parent: Option<&ComputedStyle>,
    style: &mut ComputedStyle,
) -> ComputedValue {
    match value {
        SpecifiedValue::Inherit => {
            style.flags |= StyleFlags::EXPLICIT_INHERIT;
            inherited_value(longhand, parent)
        }
        SpecifiedValue::Unset if longhand.is_inherited() => {
            style.flags |= StyleFlags::EXPLICIT_INHERIT;
            inherited_value(longhand, parent)
        }
        _ => longhand.initial_value(),
    }
}

fn inherited_value(longhand: Longhand, parent: Option<&ComputedStyle>) -> ComputedValue {
    match parent {
        Some(parent) => parent.get(longhand).clone(),
        None => longhand.initial_value(),
    }
}

fn convert_length(
    length: Length,
    conversion: &LengthConversion,
    flags: &mut StyleFlags,
) -> ComputedValue {
    match length.unit {
        LengthUnit::Px => ComputedValue::Px(length.value),
        LengthUnit::Em => {
            *flags |= StyleFlags::FONT_RELATIVE;
            ComputedValue::Px(length.value * conversion.em)
        }
        LengthUnit::Rem => {
            *flags |= StyleFlags::FONT_RELATIVE;
            ComputedValue::Px(length.value * conversion.rem)
        }
        LengthUnit::Vw => {
            *flags |= StyleFlags::VIEWPORT_RELATIVE;
            ComputedValue::Px(length.value * conversion.viewport_width / 100.0)
        }
        LengthUnit::Vh => {
            *flags |= StyleFlags::VIEWPORT_RELATIVE;
            ComputedValue::Px(length.value * conversion.viewport_height / 100.0)
        }
    }
}

/// Declarations of an entry filtered to its importance level
fn declarations_of(entry: &MatchedRule) -> impl Iterator<Item = &crate::properties::Declaration> {
    let important = entry.importance == Importance::Important;
    entry.block.iter().filter(move |d| d.important == important)
}
