//! `querySelector` over the live tree.

use css_selectors::{ElementAdapter, SelectorParseError, matches_selector_list, parse_selector_list};
use indextree::NodeId;

use super::Document;

impl ElementAdapter for Document {
    type Handle = NodeId;

    fn parent(&self, element: NodeId) -> Option<NodeId> {
        self.parent_element(element)
    }

    fn previous_sibling_element(&self, element: NodeId) -> Option<NodeId> {
        self.previous_element_sibling(element)
    }

    fn tag_name(&self, element: NodeId) -> &str {
        Self::tag_name(self, element).unwrap_or_default()
    }

    fn element_id(&self, element: NodeId) -> Option<&str> {
        self.attr(element, "id")
    }

    fn has_class(&self, element: NodeId, class: &str) -> bool {
        Self::has_class(self, element, class)
    }

    fn attr(&self, element: NodeId, name: &str) -> Option<&str> {
        Self::attr(self, element, name)
    }
}

impl Document {
    /// All connected elements matching `selectors`, in document order.
    pub fn query_selector_all(&self, selectors: &str) -> Result<Vec<NodeId>, SelectorParseError> {
        let list = parse_selector_list(selectors)?;
        Ok(self
            .root()
            .descendants(self.arena())
            .filter(|id| self.is_element(*id))
            .filter(|id| matches_selector_list(self, *id, &list))
            .collect())
    }

    /// First connected element matching `selectors`.
    pub fn query_selector(&self, selectors: &str) -> Result<Option<NodeId>, SelectorParseError> {
        Ok(self.query_selector_all(selectors)?.into_iter().next())
    }

    /// True when `element` matches `selectors`.
    pub fn matches(&self, element: NodeId, selectors: &str) -> Result<bool, SelectorParseError> {
        let list = parse_selector_list(selectors)?;
        Ok(self.is_element(element) && matches_selector_list(self, element, &list))
    }
}
