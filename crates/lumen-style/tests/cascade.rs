//! Cascade resolution integration tests
//!
//! End-to-end precedence behavior: origin, importance, specificity, source
//! order, scopes, inline overrides, css-wide keywords, variables, unit
//! conversion, pseudo-elements and animation overrides.

use std::sync::Arc;

use lumen_dom::{DomTree, ElementState, NodeId, ScopeId};
use lumen_style::{
    Color, DeclarationBlock, InterpolationOverrides, KeywordValue, Longhand, PseudoClass,
    PseudoElement, RuleRegistry, RuleSet, Selector, SelectorBuilder, SpecifiedValue,
    StyleResolver,
};

const RED: Color = Color::rgb(255, 0, 0);
const BLUE: Color = Color::rgb(0, 0, 255);
const GREEN: Color = Color::rgb(0, 128, 0);

fn block(build: impl FnOnce(&mut DeclarationBlock)) -> Arc<DeclarationBlock> {
    let mut block = DeclarationBlock::new();
    build(&mut block);
    Arc::new(block)
}

fn color_block(color: Color) -> Arc<DeclarationBlock> {
    block(|b| {
        b.declare(Longhand::Color, SpecifiedValue::Color(color)).unwrap();
    })
}

fn selector(build: impl FnOnce(SelectorBuilder) -> SelectorBuilder) -> Selector {
    build(Selector::builder()).build().unwrap()
}

/// One document-scope author sheet wrapped into a resolver
fn resolver_with(sheet: RuleSet) -> StyleResolver {
    let mut registry = RuleRegistry::new();
    registry.push_author(ScopeId::DOCUMENT, sheet);
    StyleResolver::new(registry)
}

fn single_div(class: &str, id: &str) -> (DomTree, NodeId) {
    let mut tree = DomTree::new();
    let div = tree.create_element("div");
    tree.append_child(NodeId::DOCUMENT, div).unwrap();
    if !class.is_empty() {
        tree.set_attribute(div, "class", class).unwrap();
    }
    if !id.is_empty() {
        tree.set_attribute(div, "id", id).unwrap();
    }
    (tree, div)
}

#[test]
fn test_specificity_wins_regardless_of_source_order() {
    let (tree, div) = single_div("x", "y");

    // .x first, #y second
    let mut sheet = RuleSet::new();
    sheet.add(selector(|s| s.class("x")), color_block(RED));
    sheet.add(selector(|s| s.id("y")), color_block(BLUE));
    let mut resolver = resolver_with(sheet);
    assert_eq!(resolver.resolve(&tree, div, None, None).style.color(), BLUE);

    // #y first, .x second: same winner
    let mut sheet = RuleSet::new();
    sheet.add(selector(|s| s.id("y")), color_block(BLUE));
    sheet.add(selector(|s| s.class("x")), color_block(RED));
    let mut resolver = resolver_with(sheet);
    assert_eq!(resolver.resolve(&tree, div, None, None).style.color(), BLUE);
}

#[test]
fn test_later_source_wins_at_equal_specificity() {
    let (tree, div) = single_div("x", "");
    let mut sheet = RuleSet::new();
    sheet.add(selector(|s| s.class("x")), color_block(RED));
    sheet.add(selector(|s| s.class("x")), color_block(BLUE));
    let mut resolver = resolver_with(sheet);
    assert_eq!(resolver.resolve(&tree, div, None, None).style.color(), BLUE);
}

#[test]
fn test_author_beats_ua_for_normal_declarations() {
    let (tree, div) = single_div("", "");
    let mut ua = RuleSet::new();
    ua.add(selector(|s| s.tag("div")), color_block(RED));
    let mut author = RuleSet::new();
    author.add(selector(|s| s.tag("div")), color_block(BLUE));

    let mut registry = RuleRegistry::new();
    registry.push_ua(ua);
    registry.push_author(ScopeId::DOCUMENT, author);
    let mut resolver = StyleResolver::new(registry);
    assert_eq!(resolver.resolve(&tree, div, None, None).style.color(), BLUE);
}

#[test]
fn test_ua_important_beats_author_important() {
    let (tree, div) = single_div("", "");
    let mut ua = RuleSet::new();
    ua.add(
        selector(|s| s.tag("div")),
        block(|b| {
            b.declare_important(Longhand::Color, SpecifiedValue::Color(RED)).unwrap();
        }),
    );
    let mut author = RuleSet::new();
    author.add(
        selector(|s| s.tag("div")),
        block(|b| {
            b.declare_important(Longhand::Color, SpecifiedValue::Color(BLUE)).unwrap();
        }),
    );

    let mut registry = RuleRegistry::new();
    registry.push_ua(ua);
    registry.push_author(ScopeId::DOCUMENT, author);
    let mut resolver = StyleResolver::new(registry);
    // Important inverts origin precedence.
    assert_eq!(resolver.resolve(&tree, div, None, None).style.color(), RED);
}

#[test]
fn test_important_beats_higher_specificity_normal() {
    let (tree, div) = single_div("x", "y");
    let mut sheet = RuleSet::new();
    sheet.add(selector(|s| s.id("y")), color_block(BLUE));
    sheet.add(
        selector(|s| s.class("x")),
        block(|b| {
            b.declare_important(Longhand::Color, SpecifiedValue::Color(RED)).unwrap();
        }),
    );
    let mut resolver = resolver_with(sheet);
    assert_eq!(resolver.resolve(&tree, div, None, None).style.color(), RED);
}

#[test]
fn test_inline_style_outranks_any_selector() {
    let (tree, div) = single_div("", "y");
    let mut sheet = RuleSet::new();
    sheet.add(selector(|s| s.id("y")), color_block(RED));
    let mut resolver = resolver_with(sheet);
    resolver.set_inline_style(div, color_block(BLUE));
    assert_eq!(resolver.resolve(&tree, div, None, None).style.color(), BLUE);
}

#[test]
fn test_author_important_beats_inline_normal() {
    let (tree, div) = single_div("", "y");
    let mut sheet = RuleSet::new();
    sheet.add(
        selector(|s| s.id("y")),
        block(|b| {
            b.declare_important(Longhand::Color, SpecifiedValue::Color(RED)).unwrap();
        }),
    );
    let mut resolver = resolver_with(sheet);
    resolver.set_inline_style(div, color_block(BLUE));
    assert_eq!(resolver.resolve(&tree, div, None, None).style.color(), RED);

    // Inline !important turns it back around.
    resolver.set_inline_style(
        div,
        block(|b| {
            b.declare_important(Longhand::Color, SpecifiedValue::Color(BLUE)).unwrap();
        }),
    );
    assert_eq!(resolver.resolve(&tree, div, None, None).style.color(), BLUE);
}

#[test]
fn test_presentational_hints_lose_to_author_rules() {
    let mut tree = DomTree::new();
    let img = tree.create_element("img");
    tree.append_child(NodeId::DOCUMENT, img).unwrap();
    tree.set_attribute(img, "width", "120").unwrap();

    // No author rule: the hint applies.
    let mut resolver = resolver_with(RuleSet::new());
    let style = resolver.resolve(&tree, img, None, None).style;
    assert_eq!(style.get(Longhand::Width).as_px(), Some(120.0));

    // Any author rule, even a zero-specificity universal one, wins.
    let mut sheet = RuleSet::new();
    sheet.add(
        selector(|s| s.universal()),
        block(|b| {
            b.declare(Longhand::Width, SpecifiedValue::px(200.0)).unwrap();
        }),
    );
    let mut resolver = resolver_with(sheet);
    let style = resolver.resolve(&tree, img, None, None).style;
    assert_eq!(style.get(Longhand::Width).as_px(), Some(200.0));
}

#[test]
fn test_inherited_properties_flow_to_children() {
    let mut tree = DomTree::new();
    let parent = tree.create_element("div");
    let child = tree.create_element("p");
    tree.append_child(NodeId::DOCUMENT, parent).unwrap();
    tree.append_child(parent, child).unwrap();

    let mut sheet = RuleSet::new();
    sheet.add(
        selector(|s| s.tag("div")),
        block(|b| {
            b.declare(Longhand::Color, SpecifiedValue::Color(RED)).unwrap();
            b.declare(Longhand::Width, SpecifiedValue::px(300.0)).unwrap();
        }),
    );
    let mut resolver = resolver_with(sheet);

    let parent_style = resolver.resolve(&tree, parent, None, None).style;
    let child_style = resolver
        .resolve(&tree, child, Some(&parent_style), None)
        .style;

    // color inherits, width does not
    assert_eq!(child_style.color(), RED);
    assert_eq!(
        child_style.get(Longhand::Width).as_keyword(),
        Some(KeywordValue::Auto)
    );
}

#[test]
fn test_css_wide_keywords() {
    let mut tree = DomTree::new();
    let parent = tree.create_element("div");
    let child = tree.create_element("p");
    tree.append_child(NodeId::DOCUMENT, parent).unwrap();
    tree.append_child(parent, child).unwrap();

    let mut sheet = RuleSet::new();
    sheet.add(
        selector(|s| s.tag("div")),
        block(|b| {
            b.declare(Longhand::Color, SpecifiedValue::Color(RED)).unwrap();
            b.declare(Longhand::Width, SpecifiedValue::px(300.0)).unwrap();
        }),
    );
    sheet.add(
        selector(|s| s.tag("p")),
        block(|b| {
            // width inherits explicitly, color resets to initial,
            // height unsets to its initial (non-inherited).
            b.declare(Longhand::Width, SpecifiedValue::Inherit).unwrap();
            b.declare(Longhand::Color, SpecifiedValue::Initial).unwrap();
            b.declare(Longhand::Height, SpecifiedValue::Unset).unwrap();
        }),
    );
    let mut resolver = resolver_with(sheet);

    let parent_style = resolver.resolve(&tree, parent, None, None).style;
    let child_style = resolver
        .resolve(&tree, child, Some(&parent_style), None)
        .style;

    assert_eq!(child_style.get(Longhand::Width).as_px(), Some(300.0));
    assert_eq!(child_style.color(), Color::BLACK);
    assert_eq!(
        child_style.get(Longhand::Height).as_keyword(),
        Some(KeywordValue::Auto)
    );
}

#[test]
fn test_font_relative_units_convert_against_the_right_basis() {
    let mut tree = DomTree::new();
    let root = tree.create_element("html");
    let child = tree.create_element("p");
    tree.append_child(NodeId::DOCUMENT, root).unwrap();
    tree.append_child(root, child).unwrap();

    let mut sheet = RuleSet::new();
    sheet.add(
        selector(|s| s.tag("html")),
        block(|b| {
            b.declare(Longhand::FontSize, SpecifiedValue::px(20.0)).unwrap();
        }),
    );
    sheet.add(
        selector(|s| s.tag("p")),
        block(|b| {
            // font-size: 2em resolves against the parent font size;
            // padding: 1em against the element's own resolved font size;
            // width: 2rem against the root font size.
            b.declare(Longhand::FontSize, SpecifiedValue::em(2.0)).unwrap();
            b.declare(Longhand::PaddingLeft, SpecifiedValue::em(1.0)).unwrap();
            b.declare(
                Longhand::Width,
                SpecifiedValue::Length(lumen_style::Length::new(2.0, lumen_style::LengthUnit::Rem)),
            )
            .unwrap();
        }),
    );
    let mut resolver = resolver_with(sheet);

    let styles = resolver.resolve_subtree(&tree, root, None);
    let child_style = &styles.iter().find(|(id, _)| *id == child).unwrap().1;

    assert_eq!(child_style.font_size(), 40.0);
    assert_eq!(child_style.get(Longhand::PaddingLeft).as_px(), Some(40.0));
    assert_eq!(child_style.get(Longhand::Width).as_px(), Some(40.0));
}

#[test]
fn test_font_size_percentage_resolves_against_parent() {
    let mut tree = DomTree::new();
    let parent = tree.create_element("div");
    let child = tree.create_element("p");
    tree.append_child(NodeId::DOCUMENT, parent).unwrap();
    tree.append_child(parent, child).unwrap();

    let mut sheet = RuleSet::new();
    sheet.add(
        selector(|s| s.tag("div")),
        block(|b| {
            b.declare(Longhand::FontSize, SpecifiedValue::px(10.0)).unwrap();
        }),
    );
    sheet.add(
        selector(|s| s.tag("p")),
        block(|b| {
            b.declare(Longhand::FontSize, SpecifiedValue::Percentage(150.0)).unwrap();
        }),
    );
    let mut resolver = resolver_with(sheet);
    let parent_style = resolver.resolve(&tree, parent, None, None).style;
    let child_style = resolver
        .resolve(&tree, child, Some(&parent_style), None)
        .style;
    assert_eq!(child_style.font_size(), 15.0);
}

#[test]
fn test_reset_all_expansion() {
    let mut tree = DomTree::new();
    let parent = tree.create_element("div");
    let child = tree.create_element("p");
    tree.append_child(NodeId::DOCUMENT, parent).unwrap();
    tree.append_child(parent, child).unwrap();

    let mut sheet = RuleSet::new();
    sheet.add(
        selector(|s| s.tag("div")),
        block(|b| {
            b.declare(Longhand::Color, SpecifiedValue::Color(RED)).unwrap();
            b.declare(
                Longhand::Direction,
                SpecifiedValue::Keyword(KeywordValue::Rtl),
            )
            .unwrap();
        }),
    );
    // Lower-precedence color on the child, then a reset-all above it.
    sheet.add(selector(|s| s.tag("p")), color_block(GREEN));
    sheet.add(
        selector(|s| s.tag("p").class("reset")),
        block(|b| {
            b.declare(lumen_style::PropertyName::All, SpecifiedValue::Initial).unwrap();
        }),
    );
    tree.set_attribute(child, "class", "reset").unwrap();

    let mut resolver = resolver_with(sheet);
    let parent_style = resolver.resolve(&tree, parent, None, None).style;
    let child_style = resolver
        .resolve(&tree, child, Some(&parent_style), None)
        .style;

    // Reset wins over the lower-precedence color rule and over inheritance.
    assert_eq!(child_style.color(), Color::BLACK);
    // Direction is not covered by the reset and keeps inheriting.
    assert_eq!(
        child_style.get(Longhand::Direction).as_keyword(),
        Some(KeywordValue::Rtl)
    );

    // Idempotence: reset-all alone equals the expansion of every covered
    // longhand to its initial value.
    for longhand in Longhand::ALL {
        if longhand.covered_by_all() {
            assert_eq!(
                child_style.get(longhand),
                &longhand.initial_value(),
                "{} after reset",
                longhand.name()
            );
        }
    }
}

#[test]
fn test_variable_substitution_and_fallback() {
    let mut tree = DomTree::new();
    let parent = tree.create_element("div");
    let child = tree.create_element("p");
    tree.append_child(NodeId::DOCUMENT, parent).unwrap();
    tree.append_child(parent, child).unwrap();

    let mut sheet = RuleSet::new();
    sheet.add(
        selector(|s| s.tag("div")),
        block(|b| {
            b.declare_custom("accent", SpecifiedValue::Color(GREEN)).unwrap();
        }),
    );
    sheet.add(
        selector(|s| s.tag("p")),
        block(|b| {
            // Custom properties inherit; the reference resolves on the child.
            b.declare(Longhand::Color, SpecifiedValue::var("accent")).unwrap();
            b.declare(
                Longhand::BackgroundColor,
                SpecifiedValue::var_or("missing", SpecifiedValue::Color(BLUE)),
            )
            .unwrap();
        }),
    );
    let mut resolver = resolver_with(sheet);
    let parent_style = resolver.resolve(&tree, parent, None, None).style;
    let child_style = resolver
        .resolve(&tree, child, Some(&parent_style), None)
        .style;

    assert_eq!(child_style.color(), GREEN);
    assert_eq!(child_style.background_color(), BLUE);
}

#[test]
fn test_unresolvable_variable_falls_through_to_lower_precedence() {
    let (tree, div) = single_div("x", "y");
    let mut sheet = RuleSet::new();
    // Lower precedence concrete declaration.
    sheet.add(selector(|s| s.class("x")), color_block(GREEN));
    // Higher specificity, but its value cannot be computed.
    sheet.add(
        selector(|s| s.id("y")),
        block(|b| {
            b.declare(Longhand::Color, SpecifiedValue::var("missing")).unwrap();
        }),
    );
    let mut resolver = resolver_with(sheet);
    assert_eq!(resolver.resolve(&tree, div, None, None).style.color(), GREEN);
}

#[test]
fn test_variable_cycle_recovers_silently() {
    let (tree, div) = single_div("x", "y");
    let mut sheet = RuleSet::new();
    sheet.add(
        selector(|s| s.class("x")),
        block(|b| {
            b.declare_custom("a", SpecifiedValue::var("b")).unwrap();
            b.declare_custom("b", SpecifiedValue::var("a")).unwrap();
            b.declare(Longhand::Color, SpecifiedValue::Color(RED)).unwrap();
        }),
    );
    sheet.add(
        selector(|s| s.id("y")),
        block(|b| {
            b.declare(Longhand::Color, SpecifiedValue::var("a")).unwrap();
        }),
    );
    let mut resolver = resolver_with(sheet);
    // The cyclic reference is treated as absent; the .x color applies.
    assert_eq!(resolver.resolve(&tree, div, None, None).style.color(), RED);
}

#[test]
fn test_inner_scope_wins_at_equal_specificity() {
    let mut tree = DomTree::new();
    let host = tree.create_element("div");
    tree.append_child(NodeId::DOCUMENT, host).unwrap();
    let scope = tree.attach_scope(host).unwrap();
    let scope_root = tree.scope_root(scope);
    let inner = tree.create_element("span");
    tree.append_child(scope_root, inner).unwrap();

    let mut doc_sheet = RuleSet::new();
    doc_sheet.add(selector(|s| s.tag("span")), color_block(RED));
    let mut scope_sheet = RuleSet::new();
    scope_sheet.add(selector(|s| s.tag("span")), color_block(BLUE));

    let mut registry = RuleRegistry::new();
    registry.push_author(ScopeId::DOCUMENT, doc_sheet);
    registry.push_author(scope, scope_sheet);
    let mut resolver = StyleResolver::new(registry);

    let host_style = resolver.resolve(&tree, host, None, None).style;
    let inner_style = resolver.resolve(&tree, inner, Some(&host_style), None).style;
    assert_eq!(inner_style.color(), BLUE);
}

#[test]
fn test_host_rules_lose_to_document_rules_on_the_host() {
    let mut tree = DomTree::new();
    let host = tree.create_element("div");
    tree.append_child(NodeId::DOCUMENT, host).unwrap();
    let scope = tree.attach_scope(host).unwrap();

    let mut doc_sheet = RuleSet::new();
    doc_sheet.add(selector(|s| s.tag("div")), color_block(RED));
    let mut host_sheet = RuleSet::new();
    host_sheet.add(selector(|s| s.tag("div")), color_block(BLUE));

    let mut registry = RuleRegistry::new();
    registry.push_author(ScopeId::DOCUMENT, doc_sheet);
    registry.set_host_rules(scope, host_sheet);
    let mut resolver = StyleResolver::new(registry);

    assert_eq!(resolver.resolve(&tree, host, None, None).style.color(), RED);
}

#[test]
fn test_pseudo_element_rules_only_apply_to_the_pseudo() {
    let mut tree = DomTree::new();
    let p = tree.create_element("p");
    tree.append_child(NodeId::DOCUMENT, p).unwrap();

    let mut sheet = RuleSet::new();
    sheet.add(
        selector(|s| s.tag("p")),
        block(|b| {
            b.declare(Longhand::FontSize, SpecifiedValue::px(20.0)).unwrap();
        }),
    );
    sheet.add(
        selector(|s| s.tag("p").pseudo_element(PseudoElement::Before)),
        color_block(RED),
    );
    let mut resolver = resolver_with(sheet);

    let element_style = resolver.resolve(&tree, p, None, None).style;
    assert_eq!(element_style.color(), Color::BLACK);
    assert_eq!(element_style.font_size(), 20.0);

    let before = resolver.resolve_pseudo(&tree, p, PseudoElement::Before, &element_style);
    assert_eq!(before.color(), RED);
    // The pseudo inherits from its originating element.
    assert_eq!(before.font_size(), 20.0);
}

#[test]
fn test_animation_overrides_apply_above_the_cascade() {
    let (tree, div) = single_div("", "");
    let mut sheet = RuleSet::new();
    sheet.add(
        selector(|s| s.tag("div")),
        block(|b| {
            b.declare_important(Longhand::Opacity, SpecifiedValue::Number(0.9)).unwrap();
        }),
    );
    let mut resolver = resolver_with(sheet);

    let mut overrides = InterpolationOverrides::new();
    overrides.set(Longhand::Opacity, lumen_style::ComputedValue::Number(0.5));

    let resolved = resolver.resolve(&tree, div, None, Some(&overrides));
    assert_eq!(resolved.style.opacity(), 0.5);

    // The base table carries the pre-animation value for snapshotting.
    let base = resolved.base.expect("animated resolution returns a base");
    assert_eq!(base.opacity(), 0.9);
}

#[test]
fn test_dynamic_state_changes_matching() {
    let (mut tree, div) = single_div("", "");
    let mut sheet = RuleSet::new();
    sheet.add(selector(|s| s.tag("div")), color_block(RED));
    sheet.add(
        selector(|s| s.tag("div").pseudo(PseudoClass::Hover)),
        color_block(BLUE),
    );
    let mut resolver = resolver_with(sheet);

    assert_eq!(resolver.resolve(&tree, div, None, None).style.color(), RED);
    tree.set_state(div, ElementState::HOVER, true).unwrap();
    assert_eq!(resolver.resolve(&tree, div, None, None).style.color(), BLUE);
}

#[test]
fn test_resolution_is_deterministic() {
    let (tree, div) = single_div("x", "y");

    let build = || {
        let mut registry = RuleRegistry::new();
        let mut copy = RuleSet::new();
        copy.add(selector(|s| s.class("x")), color_block(RED));
        copy.add(
            selector(|s| s.id("y")),
            block(|b| {
                b.declare(Longhand::Width, SpecifiedValue::em(2.0)).unwrap();
                b.declare_custom("gap", SpecifiedValue::px(4.0)).unwrap();
            }),
        );
        registry.push_author(ScopeId::DOCUMENT, copy);
        StyleResolver::new(registry)
    };

    let mut first = build();
    let mut second = build();
    let a = first.resolve(&tree, div, None, None).style;
    let b = second.resolve(&tree, div, None, None).style;
    assert_eq!(*a, *b);

    // Re-resolving without intervening mutation is bit-identical too.
    let again = first.resolve(&tree, div, None, None).style;
    assert_eq!(*a, *again);
}
