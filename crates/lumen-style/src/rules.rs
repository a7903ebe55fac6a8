//! Rule sets and the rule registry
//!
//! A rule set owns compiled rules plus a cheap reject index: rules are
//! bucketed by the most specific feature of their subject compound (id,
//! then class, then tag, else universal), so candidate lookup for an
//! element touches only the buckets its own features select.
//!
//! The registry holds rule sets partitioned by origin and tree scope and
//! bumps a generation counter on every mutation; the matched-properties
//! cache is cleared whenever that counter moves.

use std::sync::Arc;

use fnv::FnvHashMap;
use lumen_dom::{DomTree, ElementData, NodeId, ScopeId};
use smallvec::SmallVec;

use crate::properties::{
    Color, DeclarationBlock, KeywordValue, Longhand, SpecifiedValue,
};
use crate::selectors::{BucketKey, Selector};

/// Coarse precedence class of a rule set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CascadeOrigin {
    /// Built-in defaults
    UserAgent,
    /// Author-supplied, including per-scope sheets and inline overrides
    Author,
}

/// Compiled rule: selector plus shared declaration block
#[derive(Debug, Clone)]
pub struct Rule {
    pub selector: Selector,
    pub block: Arc<DeclarationBlock>,
    /// Position within the owning rule set, the final cascade tie-break
    pub source_position: u32,
}

/// Ordered collection of rules with a feature-bucketed candidate index
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    by_id: FnvHashMap<Box<str>, Vec<u32>>,
    by_class: FnvHashMap<Box<str>, Vec<u32>>,
    by_tag: FnvHashMap<Box<str>, Vec<u32>>,
    universal: Vec<u32>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule; source order is insertion order
    pub fn add(&mut self, selector: Selector, block: Arc<DeclarationBlock>) {
        let position = self.rules.len() as u32;
        match selector.bucket_key() {
            BucketKey::Id(id) => self.by_id.entry(id.into()).or_default().push(position),
            BucketKey::Class(class) => {
                self.by_class.entry(class.into()).or_default().push(position)
            }
            BucketKey::Tag(tag) => self.by_tag.entry(tag.into()).or_default().push(position),
            BucketKey::Universal => self.universal.push(position),
        }
        self.rules.push(Rule {
            selector,
            block,
            source_position: position,
        });
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[inline]
    pub fn rule(&self, position: u32) -> &Rule {
        &self.rules[position as usize]
    }

    /// Collect candidate rule positions for an element
    ///
    /// Candidates are a superset of the rules that can match; order does not
    /// matter because the collector sorts by the full cascade key anyway.
    pub fn candidates(
        &self,
        tree: &DomTree,
        elem: &ElementData,
        out: &mut SmallVec<[u32; 32]>,
    ) {
        if let Some(id) = elem.id {
            if let Some(bucket) = self.by_id.get(tree.resolve(id)) {
                out.extend_from_slice(bucket);
            }
        }
        for class in &elem.classes {
            if let Some(bucket) = self.by_class.get(tree.resolve(*class)) {
                out.extend_from_slice(bucket);
            }
        }
        if let Some(bucket) = self.by_tag.get(tree.resolve(elem.tag)) {
            out.extend_from_slice(bucket);
        }
        out.extend_from_slice(&self.universal);
    }
}

/// Author rule sets belonging to one tree scope
#[derive(Debug, Default)]
struct ScopeRules {
    /// Stylesheets in registration order
    sheets: Vec<RuleSet>,
    /// Cross-boundary subset: rules from this scope that target its host
    host: RuleSet,
}

/// Ordered rule-set collection, partitioned by origin and scope
#[derive(Debug, Default)]
pub struct RuleRegistry {
    ua: Vec<RuleSet>,
    scopes: FnvHashMap<ScopeId, ScopeRules>,
    generation: u64,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in default sheet
    pub fn with_ua_defaults() -> Self {
        let mut registry = Self::new();
        registry.push_ua(ua_default_rules());
        registry
    }

    /// Register a user-agent stylesheet
    pub fn push_ua(&mut self, sheet: RuleSet) {
        self.ua.push(sheet);
        self.generation += 1;
    }

    /// Register an author stylesheet for a scope
    pub fn push_author(&mut self, scope: ScopeId, sheet: RuleSet) {
        self.scopes.entry(scope).or_default().sheets.push(sheet);
        self.generation += 1;
    }

    /// Replace the cross-boundary (host-targeting) rules of a scope
    pub fn set_host_rules(&mut self, scope: ScopeId, sheet: RuleSet) {
        self.scopes.entry(scope).or_default().host = sheet;
        self.generation += 1;
    }

    pub fn ua_sheets(&self) -> &[RuleSet] {
        &self.ua
    }

    pub fn scope_sheets(&self, scope: ScopeId) -> &[RuleSet] {
        self.scopes
            .get(&scope)
            .map(|s| s.sheets.as_slice())
            .unwrap_or(&[])
    }

    pub fn host_rules(&self, scope: ScopeId) -> Option<&RuleSet> {
        self.scopes
            .get(&scope)
            .map(|s| &s.host)
            .filter(|set| !set.is_empty())
    }

    /// Mutation counter; any change here invalidates downstream caches
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Built-in default rules
///
/// A minimal default sheet: block-level containers, hidden document
/// metadata, emphasis and heading defaults.
pub fn ua_default_rules() -> RuleSet {
    let mut sheet = RuleSet::new();

    let block_tags = [
        "html", "body", "div", "p", "ul", "ol", "li", "form", "header", "footer", "nav",
        "main", "section", "article", "aside", "h1", "h2", "h3", "h4", "h5", "h6",
    ];
    let mut block = DeclarationBlock::new();
    block
        .declare(Longhand::Display, SpecifiedValue::Keyword(KeywordValue::Block))
        .expect("fresh block");
    let block = Arc::new(block);
    for tag in block_tags {
        let selector = Selector::builder().tag(tag).build().expect("tag selector");
        sheet.add(selector, Arc::clone(&block));
    }

    let hidden_tags = ["head", "script", "style", "link", "meta", "title"];
    let mut hidden = DeclarationBlock::new();
    hidden
        .declare(Longhand::Display, SpecifiedValue::Keyword(KeywordValue::None))
        .expect("fresh block");
    let hidden = Arc::new(hidden);
    for tag in hidden_tags {
        let selector = Selector::builder().tag(tag).build().expect("tag selector");
        sheet.add(selector, Arc::clone(&hidden));
    }

    let bold_tags = ["b", "strong", "h1", "h2", "h3", "h4", "h5", "h6"];
    let mut bold = DeclarationBlock::new();
    bold.declare(Longhand::FontWeight, SpecifiedValue::Keyword(KeywordValue::Bold))
        .expect("fresh block");
    let bold = Arc::new(bold);
    for tag in bold_tags {
        let selector = Selector::builder().tag(tag).build().expect("tag selector");
        sheet.add(selector, Arc::clone(&bold));
    }

    let italic_tags = ["i", "em"];
    let mut italic = DeclarationBlock::new();
    italic
        .declare(Longhand::FontStyle, SpecifiedValue::Keyword(KeywordValue::Italic))
        .expect("fresh block");
    let italic = Arc::new(italic);
    for tag in italic_tags {
        let selector = Selector::builder().tag(tag).build().expect("tag selector");
        sheet.add(selector, Arc::clone(&italic));
    }

    let mut anchor = DeclarationBlock::new();
    anchor
        .declare(Longhand::Color, SpecifiedValue::Color(Color::rgb(0, 0, 238)))
        .expect("fresh block");
    let selector = Selector::builder().tag("a").build().expect("tag selector");
    sheet.add(selector, Arc::new(anchor));

    sheet
}

/// Map presentational attributes to a declaration block
///
/// These enter the cascade as zero-specificity author declarations ranked
/// below every author rule.
pub fn presentational_hints(tree: &DomTree, node: NodeId) -> Option<DeclarationBlock> {
    let elem = tree.element(node)?;
    let mut block = DeclarationBlock::new();

    let attr = |name: &str| tree.lookup(name).and_then(|id| elem.attr(id));

    if let Some(value) = attr("width").and_then(parse_dimension) {
        let _ = block.declare(Longhand::Width, value);
    }
    if let Some(value) = attr("height").and_then(parse_dimension) {
        let _ = block.declare(Longhand::Height, value);
    }
    if let Some(value) = attr("align").and_then(parse_alignment) {
        let _ = block.declare(Longhand::TextAlign, value);
    }
    if let Some(color) = attr("bgcolor").and_then(Color::from_hex) {
        let _ = block.declare(Longhand::BackgroundColor, SpecifiedValue::Color(color));
    }
    if tree.lookup("hidden").is_some_and(|id| elem.has_attr(id)) {
        let _ = block.declare(
            Longhand::Display,
            SpecifiedValue::Keyword(KeywordValue::None),
        );
    }

    if block.is_empty() {
        None
    } else {
        Some(block)
    }
}

fn parse_dimension(value: &str) -> Option<SpecifiedValue> {
    let value = value.trim();
    if let Some(percent) = value.strip_suffix('%') {
        return percent
            .trim()
            .parse::<f32>()
            .ok()
            .map(SpecifiedValue::Percentage);
    }
    let number = value.strip_suffix("px").unwrap_or(value);
    number.trim().parse::<f32>().ok().map(SpecifiedValue::px)
}

fn parse_alignment(value: &str) -> Option<SpecifiedValue> {
    let keyword = match value.trim().to_ascii_lowercase().as_str() {
        "left" => KeywordValue::Left,
        "right" => KeywordValue::Right,
        "center" => KeywordValue::Center,
        "justify" => KeywordValue::Justify,
        _ => return None,
    };
    Some(SpecifiedValue::Keyword(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(build: impl FnOnce(crate::selectors::SelectorBuilder) -> crate::selectors::SelectorBuilder) -> Selector {
        build(Selector::builder()).build().unwrap()
    }

    fn empty_block() -> Arc<DeclarationBlock> {
        Arc::new(DeclarationBlock::new())
    }

    #[test]
    fn test_bucketed_candidates() {
        let mut set = RuleSet::new();
        set.add(selector(|b| b.tag("div")), empty_block());
        set.add(selector(|b| b.class("hero")), empty_block());
        set.add(selector(|b| b.id("main")), empty_block());
        set.add(selector(|b| b.universal()), empty_block());

        let mut tree = DomTree::new();
        let div = tree.create_element("div");
        tree.append_child(NodeId::DOCUMENT, div).unwrap();
        tree.set_attribute(div, "class", "hero").unwrap();

        let mut out = SmallVec::new();
        set.candidates(&tree, tree.element(div).unwrap(), &mut out);
        // class bucket, tag bucket and universal; the id bucket is skipped.
        assert_eq!(out.len(), 3);
        assert!(!out.contains(&2));

        let span = tree.create_element("span");
        tree.append_child(NodeId::DOCUMENT, span).unwrap();
        let mut out = SmallVec::new();
        set.candidates(&tree, tree.element(span).unwrap(), &mut out);
        assert_eq!(out.as_slice(), &[3]);
    }

    #[test]
    fn test_registry_generation_bumps() {
        let mut registry = RuleRegistry::new();
        let before = registry.generation();
        registry.push_author(ScopeId::DOCUMENT, RuleSet::new());
        assert_ne!(registry.generation(), before);
    }

    #[test]
    fn test_presentational_hints() {
        let mut tree = DomTree::new();
        let img = tree.create_element("img");
        tree.append_child(NodeId::DOCUMENT, img).unwrap();
        tree.set_attribute(img, "width", "120").unwrap();
        tree.set_attribute(img, "height", "50%").unwrap();
        tree.set_attribute(img, "align", "center").unwrap();
        tree.set_attribute(img, "bgcolor", "#ff0000").unwrap();

        let block = presentational_hints(&tree, img).unwrap();
        assert_eq!(block.len(), 4);

        let plain = tree.create_element("span");
        tree.append_child(NodeId::DOCUMENT, plain).unwrap();
        assert!(presentational_hints(&tree, plain).is_none());
    }
}
