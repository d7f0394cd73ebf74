//! The pick-an-element workflow of one page.

use anyhow::Error;
use html::{Document, NodeId, PointerEventKind};

use crate::classify::read_value;
use crate::config::{HOVER_CLASS, SELECTED_CLASS};
use crate::messaging::Message;
use crate::selector::SelectorResolver;

const PICK_CURSOR: &str = "crosshair";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionMode {
    Idle,
    Picking,
}

/// What routing a pointer event through the session did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PointerOutcome {
    /// Default prevented and propagation stopped; host listeners must not see it.
    pub consumed: bool,
    /// Event for the control surface.
    pub message: Option<Message>,
}

#[derive(Debug)]
pub struct SelectionSession {
    mode: SessionMode,
    hovered: Option<NodeId>,
    committed: Option<NodeId>,
    /// Inline `cursor` of the body before picking started.
    saved_cursor: Option<String>,
}

impl Default for SelectionSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionSession {
    pub fn new() -> Self {
        Self {
            mode: SessionMode::Idle,
            hovered: None,
            committed: None,
            saved_cursor: None,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn hovered(&self) -> Option<NodeId> {
        self.hovered
    }

    pub fn committed(&self) -> Option<NodeId> {
        self.committed
    }

    /// Idle → Picking. Already picking is a no-op.
    pub fn enable(&mut self, doc: &mut Document) -> Result<(), Error> {
        if self.mode == SessionMode::Picking {
            return Ok(());
        }
        if let Some(body) = doc.body() {
            self.saved_cursor = doc.style_property(body, "cursor");
            doc.set_style_property(body, "cursor", PICK_CURSOR)?;
        }
        self.mode = SessionMode::Picking;
        log::debug!(target: "patcher::session", "picking");
        Ok(())
    }

    /// Back to Idle from either state, clearing every highlight.
    pub fn disable(&mut self, doc: &mut Document) {
        if let Some(hovered) = self.hovered {
            drop(doc.remove_class(hovered, HOVER_CLASS));
        }
        clear_class(doc, SELECTED_CLASS);
        clear_class(doc, HOVER_CLASS);
        self.leave_picking(doc);
    }

    fn leave_picking(&mut self, doc: &mut Document) {
        if self.mode == SessionMode::Picking {
            if let Some(body) = doc.body() {
                let restored = match self.saved_cursor.take() {
                    Some(cursor) => doc.set_style_property(body, "cursor", &cursor),
                    None => doc.remove_style_property(body, "cursor"),
                };
                if let Err(err) = restored {
                    log::debug!(target: "patcher::session", "cursor restore failed: {err:#}");
                }
            }
        }
        self.mode = SessionMode::Idle;
        self.hovered = None;
        self.committed = None;
        self.saved_cursor = None;
    }

    /// Route a pointer event through the session ahead of host listeners.
    pub fn handle_pointer(
        &mut self,
        doc: &mut Document,
        resolver: &SelectorResolver,
        kind: PointerEventKind,
        target: NodeId,
    ) -> PointerOutcome {
        if self.mode != SessionMode::Picking {
            return PointerOutcome::default();
        }
        match kind {
            PointerEventKind::Enter => {
                if doc.is_element(target) {
                    if let Some(previous) = self.hovered.replace(target) {
                        drop(doc.remove_class(previous, HOVER_CLASS));
                    }
                    drop(doc.add_class(target, HOVER_CLASS));
                }
                PointerOutcome::default()
            }
            PointerEventKind::Leave => {
                if let Some(previous) = self.hovered.take() {
                    drop(doc.remove_class(previous, HOVER_CLASS));
                }
                PointerOutcome::default()
            }
            PointerEventKind::Click => PointerOutcome {
                consumed: true,
                message: Some(self.commit(doc, resolver, target)),
            },
        }
    }

    fn commit(&mut self, doc: &mut Document, resolver: &SelectorResolver, target: NodeId) -> Message {
        let selector = match resolver.resolve(doc, target) {
            Ok(selector) => selector,
            Err(err) => {
                log::debug!(target: "patcher::session", "pick failed: {err}");
                return Message::SelectionFailed {
                    reason: err.user_message(),
                };
            }
        };
        let value = read_value(doc, target).unwrap_or_default();

        if let Some(previous) = self.hovered.take() {
            drop(doc.remove_class(previous, HOVER_CLASS));
        }
        clear_class(doc, SELECTED_CLASS);
        drop(doc.add_class(target, SELECTED_CLASS));
        self.committed = Some(target);
        log::debug!(target: "patcher::session", "selected {selector:?}");

        self.leave_picking(doc);
        Message::TargetSelected { selector, value }
    }
}

/// Remove a highlight class from every element carrying it.
fn clear_class(doc: &mut Document, class: &str) {
    let marked = doc.query_selector_all(&format!(".{class}")).unwrap_or_default();
    for node in marked {
        drop(doc.remove_class(node, class));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<body style="cursor: help">
        <p id="one">first</p>
        <input id="field" value="typed">
    </body>"#;

    fn setup() -> (Document, SelectionSession, SelectorResolver) {
        (
            Document::parse(PAGE).expect("parse"),
            SelectionSession::new(),
            SelectorResolver::default(),
        )
    }

    #[test]
    fn idle_ignores_pointer_events() {
        let (mut doc, mut session, resolver) = setup();
        let one = doc.query_selector("#one").expect("valid").expect("p");
        let outcome = session.handle_pointer(&mut doc, &resolver, PointerEventKind::Click, one);
        assert_eq!(outcome, PointerOutcome::default());
    }

    #[test]
    fn pick_flow_highlights_and_restores_cursor() {
        let (mut doc, mut session, resolver) = setup();
        let body = doc.body().expect("body");
        let one = doc.query_selector("#one").expect("valid").expect("p");
        let field = doc.query_selector("#field").expect("valid").expect("input");

        session.enable(&mut doc).expect("enable");
        assert_eq!(session.mode(), SessionMode::Picking);
        assert_eq!(doc.style_property(body, "cursor").as_deref(), Some("crosshair"));

        session.handle_pointer(&mut doc, &resolver, PointerEventKind::Enter, one);
        assert!(doc.has_class(one, HOVER_CLASS));
        session.handle_pointer(&mut doc, &resolver, PointerEventKind::Enter, field);
        assert!(!doc.has_class(one, HOVER_CLASS));
        assert_eq!(session.hovered(), Some(field));

        let outcome = session.handle_pointer(&mut doc, &resolver, PointerEventKind::Click, field);
        assert!(outcome.consumed);
        assert_eq!(
            outcome.message,
            Some(Message::TargetSelected {
                selector: "#field".to_owned(),
                value: "typed".to_owned()
            })
        );
        assert_eq!(session.mode(), SessionMode::Idle);
        assert_eq!(session.hovered(), None);
        assert_eq!(session.committed(), None);
        assert!(doc.has_class(field, SELECTED_CLASS));
        assert!(!doc.has_class(field, HOVER_CLASS));
        assert_eq!(doc.style_property(body, "cursor").as_deref(), Some("help"));

        // A later pick moves the committed highlight.
        session.enable(&mut doc).expect("enable");
        session.handle_pointer(&mut doc, &resolver, PointerEventKind::Click, one);
        assert!(doc.has_class(one, SELECTED_CLASS));
        assert!(!doc.has_class(field, SELECTED_CLASS));

        session.disable(&mut doc);
        assert!(!doc.has_class(one, SELECTED_CLASS));
    }

    #[test]
    fn unresolvable_click_keeps_picking() {
        let (mut doc, mut session, resolver) = setup();
        session.enable(&mut doc).expect("enable");
        let detached = doc.create_element("div");
        let outcome = session.handle_pointer(&mut doc, &resolver, PointerEventKind::Click, detached);
        assert!(outcome.consumed);
        assert!(matches!(outcome.message, Some(Message::SelectionFailed { .. })));
        assert_eq!(session.mode(), SessionMode::Picking);

        session.disable(&mut doc);
        assert_eq!(session.mode(), SessionMode::Idle);
        let body = doc.body().expect("body");
        assert_eq!(doc.style_property(body, "cursor").as_deref(), Some("help"));
    }
}
