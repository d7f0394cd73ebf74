//! Arena-backed live document.
//!
//! Every mutating call publishes the records it produced as one batch on the
//! mutation channel, so observers see the same sequence a browser's
//! `MutationObserver` would. Setting a form control's value changes state
//! without producing a record, as in a browser.

pub mod events;
pub mod printing;
pub mod query;
pub mod updating;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Error, anyhow};
use indextree::{Arena, Node, NodeId};
use smallvec::SmallVec;
use tokio::sync::broadcast;

use crate::parser;
use events::DomEvent;
use updating::{DOMUpdate, MutationBatch, MutationObserver, ObserveOptions};

/// Capacity of the mutation and event channels. Slow observers see `Lagged`.
const CHANNEL_CAPACITY: usize = 256;

/// Elements whose value is user-editable state rather than markup.
const FORM_CONTROLS: [&str; 3] = ["input", "textarea", "select"];

/// A document shared between host code and the page agent.
pub type SharedDocument = Arc<Mutex<Document>>;

/// Lock a shared document. A panic in another holder does not make the tree unusable.
pub fn lock_shared(shared: &SharedDocument) -> MutexGuard<'_, Document> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NodeKind {
    #[default]
    Document,
    Element {
        tag: String,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct DOMNode {
    pub kind: NodeKind,
    pub attrs: SmallVec<(String, String), 4>,
    /// Dirty value of a form control; `None` until script or the user sets it.
    pub value: Option<String>,
}

impl DOMNode {
    pub fn element(tag: impl Into<String>, attrs: SmallVec<(String, String), 4>) -> Self {
        Self {
            kind: NodeKind::Element {
                tag: tag.into().to_ascii_lowercase(),
            },
            attrs,
            value: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Text { text: text.into() },
            attrs: SmallVec::new(),
            value: None,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { tag } => Some(tag.as_str()),
            _ => None,
        }
    }

    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

pub struct Document {
    arena: Arena<DOMNode>,
    root: NodeId,
    mutations: broadcast::Sender<MutationBatch>,
    events: broadcast::Sender<DomEvent>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty `html > (head, body)` document.
    pub fn new() -> Self {
        let mut document = Self::bare();
        let html = document
            .arena
            .new_node(DOMNode::element("html", SmallVec::new()));
        let head = document
            .arena
            .new_node(DOMNode::element("head", SmallVec::new()));
        let body = document
            .arena
            .new_node(DOMNode::element("body", SmallVec::new()));
        document.root.append(html, &mut document.arena);
        html.append(head, &mut document.arena);
        html.append(body, &mut document.arena);
        document
    }

    /// Parse a full HTML document.
    pub fn parse(html: &str) -> Result<Self, Error> {
        let mut document = Self::bare();
        parser::parse_document_into(&mut document.arena, document.root, html)?;
        log::debug!(target: "html", "parsed document with {} nodes", document.arena.count());
        Ok(document)
    }

    fn bare() -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(DOMNode::default());
        let (mutations, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            arena,
            root,
            mutations,
            events,
        }
    }

    pub fn into_shared(self) -> SharedDocument {
        Arc::new(Mutex::new(self))
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn arena(&self) -> &Arena<DOMNode> {
        &self.arena
    }

    /// The node behind `id`, or `None` once it has been removed.
    pub fn node(&self, id: NodeId) -> Option<&DOMNode> {
        if id.is_removed(&self.arena) {
            return None;
        }
        self.arena.get(id).map(Node::get)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut DOMNode, Error> {
        if id.is_removed(&self.arena) {
            return Err(anyhow!("node {id:?} has been removed"));
        }
        self.arena
            .get_mut(id)
            .map(Node::get_mut)
            .ok_or_else(|| anyhow!("node {id:?} does not exist"))
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut DOMNode, Error> {
        let node = self.node_mut(id)?;
        if node.tag().is_none() {
            return Err(anyhow!("node {id:?} is not an element"));
        }
        Ok(node)
    }

    fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?;
        self.arena.get(id).and_then(Node::parent)
    }

    /// True when `id` is alive and attached under the document root.
    pub fn is_connected(&self, id: NodeId) -> bool {
        if self.node(id).is_none() {
            return false;
        }
        id.ancestors(&self.arena).any(|ancestor| ancestor == self.root)
    }

    fn child_element_named(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .into_iter()
            .find(|child| self.tag_name(*child) == Some(name))
    }

    pub fn document_element(&self) -> Option<NodeId> {
        self.child_element_named(self.root, "html")
    }

    pub fn head(&self) -> Option<NodeId> {
        self.child_element_named(self.document_element()?, "head")
    }

    pub fn body(&self) -> Option<NodeId> {
        self.child_element_named(self.document_element()?, "body")
    }

    // ----- element state -----

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.node(id)?.tag()
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.tag_name(id).is_some()
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id)?.get_attr(name)
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), Error> {
        let name = name.to_ascii_lowercase();
        let node = self.element_mut(id)?;
        match node.attrs.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => value.clone_into(&mut slot.1),
            None => node.attrs.push((name.clone(), value.to_owned())),
        }
        self.publish(vec![DOMUpdate::SetAttr {
            node: id,
            name,
            value: value.to_owned(),
        }]);
        Ok(())
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Result<(), Error> {
        let name = name.to_ascii_lowercase();
        let node = self.element_mut(id)?;
        let before = node.attrs.len();
        node.attrs.retain(|(key, _)| *key != name);
        if node.attrs.len() != before {
            self.publish(vec![DOMUpdate::RemoveAttr { node: id, name }]);
        }
        Ok(())
    }

    pub fn classes(&self, id: NodeId) -> Vec<&str> {
        self.attr(id, "class")
            .map(|list| list.split_ascii_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.classes(id).contains(&class)
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) -> Result<(), Error> {
        if self.has_class(id, class) {
            return Ok(());
        }
        let mut list: Vec<&str> = self.classes(id);
        list.push(class);
        let joined = list.join(" ");
        self.set_attr(id, "class", &joined)
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) -> Result<(), Error> {
        if !self.has_class(id, class) {
            return Ok(());
        }
        let joined = self
            .classes(id)
            .into_iter()
            .filter(|token| *token != class)
            .collect::<Vec<_>>()
            .join(" ");
        self.set_attr(id, "class", &joined)
    }

    // ----- tree navigation -----

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        if self.node(id).is_none() {
            return Vec::new();
        }
        id.children(&self.arena).collect()
    }

    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .into_iter()
            .filter(|child| self.is_element(*child))
            .collect()
    }

    /// Parent if it is an element; the document node is never returned.
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.parent_of(id).filter(|parent| self.is_element(*parent))
    }

    pub fn previous_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?;
        id.preceding_siblings(&self.arena)
            .skip(1)
            .find(|sibling| self.is_element(*sibling))
    }

    /// Every live element in document order, starting below the root.
    pub fn elements(&self) -> Vec<NodeId> {
        self.root
            .descendants(&self.arena)
            .filter(|id| self.is_element(*id))
            .collect()
    }

    // ----- text and markup -----

    pub fn text_content(&self, id: NodeId) -> String {
        let Some(node) = self.node(id) else {
            return String::new();
        };
        if let NodeKind::Text { text } = &node.kind {
            return text.clone();
        }
        id.descendants(&self.arena)
            .filter_map(|descendant| match self.arena.get(descendant).map(Node::get) {
                Some(DOMNode {
                    kind: NodeKind::Text { text },
                    ..
                }) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Replace all children with a single text node. Markup in `text` stays literal.
    pub fn set_text_content(&mut self, id: NodeId, text: &str) -> Result<(), Error> {
        self.element_mut(id)?;
        let mut batch = self.detach_children(id);
        if !text.is_empty() {
            let child = self.arena.new_node(DOMNode::text(text));
            self.append_raw(id, child)?;
            batch.push(self.insert_record(id, child));
        }
        self.publish(batch);
        Ok(())
    }

    /// Change the data of a text node in place.
    pub fn set_text_data(&mut self, id: NodeId, text: &str) -> Result<(), Error> {
        let node = self.node_mut(id)?;
        let NodeKind::Text { text: data } = &mut node.kind else {
            return Err(anyhow!("node {id:?} is not a text node"));
        };
        text.clone_into(data);
        self.publish(vec![DOMUpdate::SetText {
            node: id,
            text: text.to_owned(),
        }]);
        Ok(())
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        if self.node(id).is_none() {
            return String::new();
        }
        printing::serialize_children(&self.arena, id)
    }

    /// `inner_html` with every attribute passed through `filter` first.
    pub fn inner_html_filtered(&self, id: NodeId, filter: printing::AttrFilter<'_>) -> String {
        if self.node(id).is_none() {
            return String::new();
        }
        printing::serialize_children_filtered(&self.arena, id, filter)
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        if self.node(id).is_none() {
            return String::new();
        }
        printing::serialize_node(&self.arena, id)
    }

    /// Parse `html` in the context of `id` and replace its children with it.
    /// The markup is inserted verbatim, scripts and handlers included.
    pub fn set_inner_html(&mut self, id: NodeId, html: &str) -> Result<(), Error> {
        let context = self
            .element_mut(id)?
            .tag()
            .map(str::to_owned)
            .unwrap_or_default();
        let mut batch = self.detach_children(id);
        let inserted = parser::parse_fragment_into(&mut self.arena, id, &context, html)?;
        batch.extend(inserted.into_iter().map(|child| self.insert_record(id, child)));
        log::debug!(target: "html", "replaced markup of {id:?}: {} records", batch.len());
        self.publish(batch);
        Ok(())
    }

    /// What `inner_html` would return after `set_inner_html` on a `context` element.
    pub fn serialize_fragment(context: &str, html: &str) -> Result<String, Error> {
        let (scratch, holder) = Self::parse_fragment(context, html)?;
        Ok(scratch.inner_html(holder))
    }

    /// A detached scratch document holding `html` parsed under a `context`
    /// element. Returns the document and the holder element.
    pub fn parse_fragment(context: &str, html: &str) -> Result<(Self, NodeId), Error> {
        let mut scratch = Self::bare();
        let holder = scratch.create_element(context);
        scratch.root.append(holder, &mut scratch.arena);
        parser::parse_fragment_into(&mut scratch.arena, holder, context, html)?;
        Ok((scratch, holder))
    }

    // ----- structure -----

    /// A detached element; attach it with [`Document::append_child`].
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.arena.new_node(DOMNode::element(tag, SmallVec::new()))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.arena.new_node(DOMNode::text(text))
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), Error> {
        self.node(parent)
            .ok_or_else(|| anyhow!("parent {parent:?} has been removed"))?;
        self.node(child)
            .ok_or_else(|| anyhow!("child {child:?} has been removed"))?;
        let mut batch = Vec::new();
        if let Some(old_parent) = self.parent_of(child) {
            batch.push(DOMUpdate::RemoveNode {
                parent: old_parent,
                node: child,
            });
            child.detach(&mut self.arena);
        }
        self.append_raw(parent, child)?;
        batch.push(self.insert_record(parent, child));
        self.publish(batch);
        Ok(())
    }

    /// Remove a node and its subtree. Its id becomes stale.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), Error> {
        self.node(id)
            .ok_or_else(|| anyhow!("node {id:?} has already been removed"))?;
        if id == self.root {
            return Err(anyhow!("the document node cannot be removed"));
        }
        let parent = self.parent_of(id);
        id.remove_subtree(&mut self.arena);
        if let Some(parent) = parent {
            self.publish(vec![DOMUpdate::RemoveNode { parent, node: id }]);
        }
        Ok(())
    }

    fn append_raw(&mut self, parent: NodeId, child: NodeId) -> Result<(), Error> {
        parent
            .checked_append(child, &mut self.arena)
            .map_err(|err| anyhow!("cannot append {child:?} to {parent:?}: {err:?}"))
    }

    /// Remove every child of `id`, returning the removal records.
    fn detach_children(&mut self, id: NodeId) -> Vec<DOMUpdate> {
        let children = self.children(id);
        let mut batch = Vec::with_capacity(children.len());
        for child in children {
            child.remove_subtree(&mut self.arena);
            batch.push(DOMUpdate::RemoveNode {
                parent: id,
                node: child,
            });
        }
        batch
    }

    fn insert_record(&self, parent: NodeId, child: NodeId) -> DOMUpdate {
        let pos = parent
            .children(&self.arena)
            .position(|sibling| sibling == child)
            .unwrap_or_default();
        match self.node(child).map(|node| &node.kind) {
            Some(NodeKind::Text { text }) => DOMUpdate::InsertText {
                parent,
                node: child,
                text: text.clone(),
                pos,
            },
            Some(NodeKind::Element { tag }) => DOMUpdate::InsertElement {
                parent,
                node: child,
                tag: tag.clone(),
                pos,
            },
            _ => DOMUpdate::InsertElement {
                parent,
                node: child,
                tag: String::new(),
                pos,
            },
        }
    }

    // ----- form controls -----

    pub fn is_form_control(&self, id: NodeId) -> bool {
        self.tag_name(id)
            .is_some_and(|tag| FORM_CONTROLS.contains(&tag))
    }

    /// Lowercased `type` of an `<input>`; missing means `text`.
    pub fn input_type(&self, id: NodeId) -> Option<String> {
        if self.tag_name(id) != Some("input") {
            return None;
        }
        Some(
            self.attr(id, "type")
                .map(|kind| kind.trim().to_ascii_lowercase())
                .filter(|kind| !kind.is_empty())
                .unwrap_or_else(|| "text".to_owned()),
        )
    }

    /// Current value of an `input`, `textarea` or `select`; `None` for anything else.
    pub fn control_value(&self, id: NodeId) -> Option<String> {
        let node = self.node(id)?;
        if let Some(value) = &node.value {
            return Some(value.clone());
        }
        match node.tag()? {
            "input" => Some(node.get_attr("value").unwrap_or_default().to_owned()),
            "textarea" => Some(self.text_content(id)),
            "select" => Some(self.default_select_value(id)),
            _ => None,
        }
    }

    fn default_select_value(&self, id: NodeId) -> String {
        let options: Vec<NodeId> = id
            .descendants(&self.arena)
            .filter(|option| self.tag_name(*option) == Some("option"))
            .collect();
        let chosen = options
            .iter()
            .copied()
            .find(|option| self.attr(*option, "selected").is_some())
            .or_else(|| options.first().copied());
        chosen
            .map(|option| {
                self.attr(option, "value")
                    .map_or_else(|| self.text_content(option).trim().to_owned(), str::to_owned)
            })
            .unwrap_or_default()
    }

    /// Set the live value of a form control. Produces no mutation record.
    pub fn set_control_value(&mut self, id: NodeId, value: &str) -> Result<(), Error> {
        if !self.is_form_control(id) {
            return Err(anyhow!("node {id:?} is not a form control"));
        }
        self.node_mut(id)?.value = Some(value.to_owned());
        Ok(())
    }

    // ----- inline style -----

    pub fn style_property(&self, id: NodeId, property: &str) -> Option<String> {
        css_style_attr::get_property(self.attr(id, "style")?, property)
    }

    /// Set one inline style property, leaving every other declaration untouched.
    pub fn set_style_property(&mut self, id: NodeId, property: &str, value: &str) -> Result<(), Error> {
        let current = self.attr(id, "style").unwrap_or_default();
        let updated = css_style_attr::set_property(current, property, value);
        self.write_style(id, &updated)
    }

    pub fn remove_style_property(&mut self, id: NodeId, property: &str) -> Result<(), Error> {
        let Some(current) = self.attr(id, "style") else {
            return Ok(());
        };
        let updated = css_style_attr::remove_property(current, property);
        self.write_style(id, &updated)
    }

    fn write_style(&mut self, id: NodeId, declarations: &str) -> Result<(), Error> {
        if declarations.is_empty() {
            self.remove_attr(id, "style")
        } else {
            self.set_attr(id, "style", declarations)
        }
    }

    // ----- channels -----

    pub fn subscribe_mutations(&self) -> broadcast::Receiver<MutationBatch> {
        self.mutations.subscribe()
    }

    pub fn observe(&self, options: ObserveOptions) -> MutationObserver {
        MutationObserver::new(self.subscribe_mutations(), options)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DomEvent> {
        self.events.subscribe()
    }

    /// Deliver an event to every listener. Nobody listening is not an error.
    pub fn dispatch_event(&self, event: DomEvent) {
        log::debug!(target: "html", "dispatch {} on {:?}", event.name(), event.target());
        if self.events.receiver_count() > 0 {
            drop(self.events.send(event));
        }
    }

    fn publish(&self, batch: MutationBatch) {
        if batch.is_empty() || self.mutations.receiver_count() == 0 {
            return;
        }
        drop(self.mutations.send(batch));
    }
}
