//! Stable selectors for elements the engine does not control.

use css_selectors::{serialize_identifier, serialize_string};
use html::{Document, NodeId};

use crate::config::{ENGINE_CLASSES, PatcherConfig};
use crate::error::PatchError;

/// Derives selectors, trying id, test attribute, unique classes, then a path.
#[derive(Clone, Debug)]
pub struct SelectorResolver {
    test_attributes: Vec<String>,
}

impl Default for SelectorResolver {
    fn default() -> Self {
        Self::from_config(&PatcherConfig::default())
    }
}

fn own_classes(doc: &Document, node: NodeId) -> Vec<&str> {
    doc.classes(node)
        .into_iter()
        .filter(|class| !ENGINE_CLASSES.contains(class))
        .collect()
}

/// 1-based position among element siblings, if a sibling shares the tag name.
fn nth_child_if_ambiguous(doc: &Document, node: NodeId, tag: &str) -> Option<usize> {
    let parent = doc.parent_element(node)?;
    let siblings = doc.element_children(parent);
    let same_tag = siblings
        .iter()
        .filter(|sibling| doc.tag_name(**sibling) == Some(tag))
        .count();
    if same_tag < 2 {
        return None;
    }
    siblings
        .iter()
        .position(|sibling| *sibling == node)
        .map(|index| index.saturating_add(1))
}

impl SelectorResolver {
    pub fn new(test_attributes: Vec<String>) -> Self {
        Self { test_attributes }
    }

    pub fn from_config(config: &PatcherConfig) -> Self {
        Self::new(config.test_attributes.clone())
    }

    /// Derive a selector for `node`. First match wins.
    pub fn resolve(&self, doc: &Document, node: NodeId) -> Result<String, PatchError> {
        let Some(tag) = doc.tag_name(node) else {
            return Err(PatchError::UnresolvableSelector(
                "not an element".to_owned(),
            ));
        };
        let Some(body) = doc.body() else {
            return Err(PatchError::UnresolvableSelector(
                "document has no body".to_owned(),
            ));
        };
        if node == body {
            return Ok("body".to_owned());
        }
        let mut chain = Vec::new();
        let mut current = Some(node);
        while let Some(element) = current {
            if element == body {
                break;
            }
            chain.push(element);
            current = doc.parent_element(element);
        }
        if current.is_none() {
            return Err(PatchError::UnresolvableSelector(format!(
                "<{tag}> is not inside body"
            )));
        }

        if let Some(id) = doc.attr(node, "id").filter(|id| !id.is_empty()) {
            return Ok(format!("#{}", serialize_identifier(id)));
        }

        for name in &self.test_attributes {
            if let Some(value) = doc.attr(node, name).filter(|value| !value.is_empty()) {
                return Ok(format!(
                    "[{}={}]",
                    serialize_identifier(name),
                    serialize_string(value)
                ));
            }
        }

        let classes = own_classes(doc, node);
        if !classes.is_empty() {
            let compound: String = classes
                .iter()
                .take(2)
                .map(|class| format!(".{}", serialize_identifier(class)))
                .collect();
            let unique = doc
                .query_selector_all(&compound)
                .is_ok_and(|matches| matches.len() == 1);
            if unique {
                return Ok(compound);
            }
        }

        let segments: Vec<String> = chain
            .iter()
            .rev()
            .map(|element| self.path_segment(doc, *element))
            .collect();
        log::debug!(target: "patcher", "path selector for <{tag}> with {} segments", segments.len());
        Ok(format!("body > {}", segments.join(" > ")))
    }

    fn path_segment(&self, doc: &Document, element: NodeId) -> String {
        let tag = doc.tag_name(element).unwrap_or("*");
        let mut segment = serialize_identifier(tag);
        if let Some(id) = doc.attr(element, "id").filter(|id| !id.is_empty()) {
            segment.push('#');
            segment.push_str(&serialize_identifier(id));
        }
        if let Some(class) = own_classes(doc, element).first() {
            segment.push('.');
            segment.push_str(&serialize_identifier(class));
        }
        if let Some(position) = nth_child_if_ambiguous(doc, element, tag) {
            segment.push_str(&format!(":nth-child({position})"));
        }
        segment
    }
}

/// Find the element a selector names. Missing targets and bad selectors are both `None`.
pub fn locate(doc: &Document, selector: &str) -> Option<NodeId> {
    match doc.query_selector(selector) {
        Ok(found) => found,
        Err(err) => {
            log::debug!(target: "patcher", "unparsable selector {selector:?}: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HOVER_CLASS;

    const PAGE: &str = r#"<html><head><title>x</title></head><body>
        <h1 id="main title">Title</h1>
        <button data-testid="save">Save</button>
        <button data-cy="cancel" data-test="cancel-btn">Cancel</button>
        <p class="note lead">unique</p>
        <p class="note">first</p>
        <ul class="items"><li>a</li><li>b</li><li class="note">c</li></ul>
        <section><span>lonely</span></section>
    </body></html>"#;

    fn resolve_all(doc: &Document) -> Vec<(NodeId, String)> {
        let resolver = SelectorResolver::default();
        let mut nodes = vec![doc.body().expect("body")];
        nodes.extend(doc.query_selector_all("body *").expect("valid"));
        nodes
            .into_iter()
            .map(|node| (node, resolver.resolve(doc, node).expect("resolvable")))
            .collect()
    }

    #[test]
    fn every_element_in_body_round_trips() {
        let doc = Document::parse(PAGE).expect("parse");
        let resolved = resolve_all(&doc);
        assert!(resolved.len() > 8);
        for (node, selector) in resolved {
            assert_eq!(locate(&doc, &selector), Some(node), "selector {selector:?}");
        }
    }

    #[test]
    fn heuristics_in_priority_order() {
        let doc = Document::parse(PAGE).expect("parse");
        let resolver = SelectorResolver::default();
        let pick = |selector: &str| doc.query_selector(selector).expect("valid").expect("present");

        let title = pick("h1");
        assert_eq!(resolver.resolve(&doc, title).expect("id"), "#main\\ title");

        let save = pick("button");
        assert_eq!(
            resolver.resolve(&doc, save).expect("testid"),
            "[data-testid=\"save\"]"
        );
        let cancel = pick("button:nth-child(3)");
        assert_eq!(
            resolver.resolve(&doc, cancel).expect("data-test first"),
            "[data-test=\"cancel-btn\"]"
        );

        let lead = pick(".lead");
        assert_eq!(resolver.resolve(&doc, lead).expect("classes"), ".note.lead");

        // `.note` alone is not unique, so a path is used.
        let first = pick("p:nth-child(5)");
        assert_eq!(
            resolver.resolve(&doc, first).expect("path"),
            "body > p.note:nth-child(5)"
        );

        let lonely = pick("span");
        assert_eq!(
            resolver.resolve(&doc, lonely).expect("path"),
            "body > section > span"
        );
    }

    #[test]
    fn engine_classes_are_ignored() {
        let mut doc = Document::parse(PAGE).expect("parse");
        let lonely = doc.query_selector("span").expect("valid").expect("span");
        doc.add_class(lonely, HOVER_CLASS).expect("class");
        let resolver = SelectorResolver::default();
        assert_eq!(
            resolver.resolve(&doc, lonely).expect("path"),
            "body > section > span"
        );
    }

    #[test]
    fn unresolvable_nodes() {
        let mut doc = Document::parse(PAGE).expect("parse");
        let resolver = SelectorResolver::default();
        let title = doc.query_selector("title").expect("valid").expect("title");
        assert!(matches!(
            resolver.resolve(&doc, title),
            Err(PatchError::UnresolvableSelector(_))
        ));
        let detached = doc.create_element("div");
        assert!(resolver.resolve(&doc, detached).is_err());
        let body = doc.body().expect("body");
        assert_eq!(resolver.resolve(&doc, body).expect("body"), "body");
    }

    #[test]
    fn locate_tolerates_garbage() {
        let doc = Document::parse(PAGE).expect("parse");
        assert_eq!(locate(&doc, "#nope"), None);
        assert_eq!(locate(&doc, "p >"), None);
    }
}
