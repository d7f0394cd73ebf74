//! CSS selector matching engine.
//! Reference: <https://www.w3.org/TR/selectors-3/>

use crate::{
    Combinator, ComplexSelector, CompoundSelector, ElementAdapter, SelectorList, SimpleSelector,
};

/// Match a selector list against an element.
/// Selectors Level 3 §3, 4
pub fn matches_selector_list<A: ElementAdapter>(
    adapter: &A,
    element: A::Handle,
    list: &SelectorList,
) -> bool {
    list.selectors
        .iter()
        .any(|selector_item| matches_complex(adapter, element, selector_item))
}

/// Match a complex selector against an element.
/// Selectors Level 3 §3, 11: right-to-left matching with backtracking over combinators
pub fn matches_complex<A: ElementAdapter>(
    adapter: &A,
    element: A::Handle,
    sel: &ComplexSelector,
) -> bool {
    matches_from(adapter, element, sel, sel.rest.len())
}

/// Compound at `position`, where 0 is `sel.first` and `n` is `sel.rest[n - 1]`.
fn compound_at(sel: &ComplexSelector, position: usize) -> Option<&CompoundSelector> {
    match position.checked_sub(1) {
        None => Some(&sel.first),
        Some(rest_index) => sel.rest.get(rest_index).map(|pair| &pair.1),
    }
}

/// True if `element` matches the compound at `position` and everything left of it
/// can be satisfied through the combinators.
fn matches_from<A: ElementAdapter>(
    adapter: &A,
    element: A::Handle,
    sel: &ComplexSelector,
    position: usize,
) -> bool {
    let Some(compound) = compound_at(sel, position) else {
        return false;
    };
    if !matches_compound(adapter, element, compound) {
        return false;
    }
    let Some(left) = position.checked_sub(1) else {
        return true;
    };
    let Some(&(combinator, _)) = sel.rest.get(left) else {
        return false;
    };
    match combinator {
        Combinator::Child => adapter
            .parent(element)
            .is_some_and(|parent| matches_from(adapter, parent, sel, left)),
        Combinator::AdjacentSibling => adapter
            .previous_sibling_element(element)
            .is_some_and(|sibling| matches_from(adapter, sibling, sel, left)),
        Combinator::Descendant => {
            let mut current = adapter.parent(element);
            while let Some(ancestor) = current {
                if matches_from(adapter, ancestor, sel, left) {
                    return true;
                }
                current = adapter.parent(ancestor);
            }
            false
        }
        Combinator::GeneralSibling => {
            let mut current = adapter.previous_sibling_element(element);
            while let Some(sibling) = current {
                if matches_from(adapter, sibling, sel, left) {
                    return true;
                }
                current = adapter.previous_sibling_element(sibling);
            }
            false
        }
    }
}

/// 1-based position of the element among its element siblings.
fn element_index<A: ElementAdapter>(adapter: &A, element: A::Handle) -> usize {
    let mut index = 1usize;
    let mut current = adapter.previous_sibling_element(element);
    while let Some(sibling) = current {
        index = index.saturating_add(1);
        current = adapter.previous_sibling_element(sibling);
    }
    index
}

/// Match a compound selector against a single element.
/// Selectors Level 3 §5–8
pub fn matches_compound<A: ElementAdapter>(
    adapter: &A,
    element: A::Handle,
    compound: &CompoundSelector,
) -> bool {
    compound.simples.iter().all(|simple| match simple {
        SimpleSelector::Universal => true,
        SimpleSelector::Type(type_name) => adapter.tag_name(element) == type_name.as_str(),
        SimpleSelector::Class(class_name) => adapter.has_class(element, class_name),
        SimpleSelector::IdSelector(id_value) => {
            adapter.element_id(element) == Some(id_value.as_str())
        }
        SimpleSelector::AttrExists(name) => adapter.attr(element, name).is_some(),
        SimpleSelector::AttrEquals { name, value } => {
            adapter.attr(element, name) == Some(value.as_str())
        }
        SimpleSelector::NthChild(nth) => nth.matches(element_index(adapter, element)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_complex_selector;

    /// A tiny fixed tree: index = handle, parent/prev-sibling tables.
    struct Fixture {
        tags: Vec<&'static str>,
        ids: Vec<Option<&'static str>>,
        classes: Vec<Vec<&'static str>>,
        parents: Vec<Option<usize>>,
        prev: Vec<Option<usize>>,
    }

    impl ElementAdapter for Fixture {
        type Handle = usize;

        fn parent(&self, element: usize) -> Option<usize> {
            self.parents[element]
        }

        fn previous_sibling_element(&self, element: usize) -> Option<usize> {
            self.prev[element]
        }

        fn tag_name(&self, element: usize) -> &str {
            self.tags[element]
        }

        fn element_id(&self, element: usize) -> Option<&str> {
            self.ids[element]
        }

        fn has_class(&self, element: usize, class: &str) -> bool {
            self.classes[element].contains(&class)
        }

        fn attr(&self, element: usize, name: &str) -> Option<&str> {
            if name == "id" {
                return self.ids[element];
            }
            None
        }
    }

    /// body > (section#a > (p, p.x)), (section > p.x > span)
    fn fixture() -> Fixture {
        Fixture {
            tags: vec!["body", "section", "p", "p", "section", "p", "span"],
            ids: vec![None, Some("a"), None, None, None, None, None],
            classes: vec![vec![], vec![], vec![], vec!["x"], vec![], vec!["x"], vec![]],
            parents: vec![None, Some(0), Some(1), Some(1), Some(0), Some(4), Some(5)],
            prev: vec![None, None, None, Some(2), Some(1), None, None],
        }
    }

    fn matches(selector: &str, element: usize) -> bool {
        let sel = parse_complex_selector(selector).expect("parses");
        matches_complex(&fixture(), element, &sel)
    }

    #[test]
    fn nth_child_counts_element_siblings() {
        assert!(matches("p:nth-child(2)", 3));
        assert!(!matches("p:nth-child(2)", 2));
        assert!(matches("section:nth-child(2) > p", 5));
    }

    #[test]
    fn descendant_backtracks_past_first_candidate() {
        // span's nearest `.x` ancestor is p.x inside a section without id; the
        // `#a` constraint must not be satisfied by it.
        assert!(!matches("#a .x span", 6));
        assert!(matches("section .x span", 6));
        assert!(matches("body span", 6));
    }

    #[test]
    fn sibling_combinators() {
        assert!(matches("p + p.x", 3));
        assert!(matches("section ~ section", 4));
        assert!(!matches("p + p", 2));
    }
}
