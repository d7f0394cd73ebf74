use indextree::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerEventKind {
    Enter,
    Leave,
    Click,
}

/// A dispatched event. Only the shapes the page needs are modelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomEvent {
    Input { target: NodeId },
    Change { target: NodeId },
    Pointer { kind: PointerEventKind, target: NodeId },
}

impl DomEvent {
    pub fn target(&self) -> NodeId {
        match self {
            Self::Input { target } | Self::Change { target } | Self::Pointer { target, .. } => {
                *target
            }
        }
    }

    /// The DOM event type name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Input { .. } => "input",
            Self::Change { .. } => "change",
            Self::Pointer {
                kind: PointerEventKind::Enter,
                ..
            } => "pointerenter",
            Self::Pointer {
                kind: PointerEventKind::Leave,
                ..
            } => "pointerleave",
            Self::Pointer {
                kind: PointerEventKind::Click,
                ..
            } => "click",
        }
    }

    /// `pointerenter` and `pointerleave` do not bubble.
    pub fn bubbles(&self) -> bool {
        !matches!(
            self,
            Self::Pointer {
                kind: PointerEventKind::Enter | PointerEventKind::Leave,
                ..
            }
        )
    }
}
