//! String interner
//!
//! Tag names, attribute names, ids and classes repeat heavily across a
//! document; each distinct string is stored once and referenced by a 4-byte
//! id, so equality checks during selector matching are integer compares.

use std::collections::HashMap;

/// Interned string id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct InternedString(pub u32);

impl InternedString {
    /// The empty string, pre-interned at index 0
    pub const EMPTY: InternedString = InternedString(0);
}

/// Deduplicating string store
pub struct StringInterner {
    strings: Vec<Box<str>>,
    lookup: HashMap<Box<str>, u32>,
}

impl StringInterner {
    /// Create an interner with common tag and attribute names pre-interned
    pub fn new() -> Self {
        let mut interner = Self {
            strings: Vec::with_capacity(128),
            lookup: HashMap::with_capacity(128),
        };

        interner.intern("");

        const COMMON: &[&str] = &[
            "html", "head", "body", "div", "span", "p", "a", "img", "ul", "ol", "li",
            "table", "tr", "td", "th", "form", "input", "button", "select", "option",
            "h1", "h2", "h3", "h4", "h5", "h6", "header", "footer", "nav", "main",
            "section", "article", "aside", "script", "style", "link", "meta", "title",
            "id", "class", "href", "src", "type", "name", "value", "width", "height",
            "align", "bgcolor", "hidden", "disabled", "checked",
        ];
        for s in COMMON {
            interner.intern(s);
        }

        interner
    }

    /// Intern a string, returning its id (existing id if already present)
    pub fn intern(&mut self, s: &str) -> InternedString {
        if let Some(&id) = self.lookup.get(s) {
            return InternedString(id);
        }
        let id = self.strings.len() as u32;
        self.strings.push(s.into());
        self.lookup.insert(s.into(), id);
        InternedString(id)
    }

    /// Look up an id for a string without interning it
    pub fn get(&self, s: &str) -> Option<InternedString> {
        self.lookup.get(s).copied().map(InternedString)
    }

    /// Resolve an id back to its string
    #[inline]
    pub fn resolve(&self, id: InternedString) -> &str {
        self.strings.get(id.0 as usize).map(|s| &**s).unwrap_or("")
    }

    /// Number of distinct strings
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_dedup() {
        let mut interner = StringInterner::new();
        let first = interner.intern("banner");
        let second = interner.intern("banner");
        assert_eq!(first, second);
    }

    #[test]
    fn test_resolve_round_trip() {
        let mut interner = StringInterner::new();
        let id = interner.intern("sidebar");
        assert_eq!(interner.resolve(id), "sidebar");
    }

    #[test]
    fn test_lookup_without_intern() {
        let mut interner = StringInterner::new();
        assert!(interner.get("missing").is_none());
        let id = interner.intern("present");
        assert_eq!(interner.get("present"), Some(id));
    }
}
