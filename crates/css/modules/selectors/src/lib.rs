//! Selectors Level 3: element matching and selector serialization.
//! Reference: <https://www.w3.org/TR/selectors-3/>
//!
//! This module implements the subset needed to re-locate elements from
//! generated selectors:
//! - Type, universal, class, id and attribute (`[a]`, `[a=v]`) selectors
//! - The `:nth-child(An+B)` structural pseudo-class
//! - Combinators: descendant, child, adjacent sibling, general sibling
//! - Identifier and string serialization (CSSOM `CSS.escape`)
//!
//! Ids, classes and attribute values are case-sensitive; type selectors and
//! attribute names are ASCII-lowercased, matching HTML documents.

mod matcher;
mod parser;
mod serialize;

pub use matcher::{matches_complex, matches_compound, matches_selector_list};
pub use parser::{SelectorParseError, parse_complex_selector, parse_selector_list};
pub use serialize::{serialize_identifier, serialize_string};

/// An adapter that abstracts DOM access for selector matching.
/// Implement this for your DOM layer.
///
/// References:
/// - Section 3: Selectors overview and element matching
pub trait ElementAdapter {
    type Handle: Copy + Eq;

    /// Parent element if any. Must return `None` for the document node.
    /// Selectors Level 3 §11: Combinators (for tree relationships)
    fn parent(&self, element: Self::Handle) -> Option<Self::Handle>;

    /// Previous sibling element (non-element nodes skipped).
    /// Selectors Level 3 §11: Sibling combinators
    fn previous_sibling_element(&self, element: Self::Handle) -> Option<Self::Handle>;

    /// Tag name in ASCII lowercase.
    /// Selectors Level 3 §5: Type selectors
    fn tag_name(&self, element: Self::Handle) -> &str;

    /// Returns Some(id) if the element has an id attribute, else None.
    /// Selectors Level 3 §7: ID selectors
    fn element_id(&self, element: Self::Handle) -> Option<&str>;

    /// True if the element has the given class token.
    /// Selectors Level 3 §6: Class selectors
    fn has_class(&self, element: Self::Handle, class: &str) -> bool;

    /// Returns the attribute value if present.
    /// Selectors Level 3 §8: Attribute selectors
    fn attr(&self, element: Self::Handle, name: &str) -> Option<&str>;
}

/// `An+B` argument of `:nth-child()`.
/// Selectors Level 3 §6.6.5.2: `:nth-child()` pseudo-class
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Nth {
    pub step: i64,
    pub offset: i64,
}

impl Nth {
    /// True when the 1-based `index` is `step * n + offset` for some `n >= 0`.
    #[inline]
    pub fn matches(self, index: usize) -> bool {
        let Ok(position) = i64::try_from(index) else {
            return false;
        };
        let delta = position - self.offset;
        if self.step == 0 {
            return delta == 0;
        }
        delta % self.step == 0 && delta / self.step >= 0
    }
}

/// Simple selectors (subset).
/// Selectors Level 3 §5, 6, 7, 8
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SimpleSelector {
    /// Selectors Level 3 §5: Type selectors
    Type(String),
    /// Selectors Level 3 §6: Class selectors
    Class(String),
    /// Selectors Level 3 §7: ID selectors
    IdSelector(String),
    /// Selectors Level 3 §8: Attribute presence `[attr]`
    AttrExists(String),
    /// Selectors Level 3 §8: Attribute selectors `[attr=value]`
    AttrEquals { name: String, value: String },
    /// Selectors Level 3 §6.6.5.2: `:nth-child(An+B)`
    NthChild(Nth),
    /// Selectors Level 3 §5: Universal selector
    Universal,
}

/// A compound selector is a sequence of simple selectors (no combinators).
/// Selectors Level 3 §5: Simple selector sequences
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct CompoundSelector {
    pub simples: Vec<SimpleSelector>,
}

/// Combinators between compounds.
/// Selectors Level 3 §11: Combinators
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
    AdjacentSibling,
    GeneralSibling,
}

/// A complex selector is one or more compounds separated by combinators.
/// Selectors Level 3 §3, 11
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ComplexSelector {
    pub first: CompoundSelector,
    pub rest: Vec<(Combinator, CompoundSelector)>,
}

/// A selector list separated by commas.
/// Selectors Level 3 §4: Groups of selectors
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SelectorList {
    pub selectors: Vec<ComplexSelector>,
}
