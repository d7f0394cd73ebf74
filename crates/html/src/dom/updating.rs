use indextree::NodeId;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

/// One mutation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DOMUpdate {
    InsertElement {
        parent: NodeId,
        node: NodeId,
        tag: String,
        pos: usize,
    },
    InsertText {
        parent: NodeId,
        node: NodeId,
        text: String,
        pos: usize,
    },
    /// Character data of an existing text node changed.
    SetText { node: NodeId, text: String },
    SetAttr {
        node: NodeId,
        name: String,
        value: String,
    },
    RemoveAttr { node: NodeId, name: String },
    RemoveNode { parent: NodeId, node: NodeId },
}

impl DOMUpdate {
    /// Child-list change.
    pub fn is_child_list(&self) -> bool {
        matches!(
            self,
            Self::InsertElement { .. } | Self::InsertText { .. } | Self::RemoveNode { .. }
        )
    }

    pub fn is_character_data(&self) -> bool {
        matches!(self, Self::SetText { .. })
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self, Self::SetAttr { .. } | Self::RemoveAttr { .. })
    }

    /// Child-list or character-data change.
    pub fn is_structural(&self) -> bool {
        self.is_child_list() || self.is_character_data()
    }
}

/// Records produced by one document operation.
pub type MutationBatch = Vec<DOMUpdate>;

/// Which record types an observer wants, as in `MutationObserverInit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserveOptions {
    pub child_list: bool,
    pub character_data: bool,
    pub attributes: bool,
}

impl ObserveOptions {
    /// Child-list and character-data changes anywhere in the document.
    pub const STRUCTURE: Self = Self {
        child_list: true,
        character_data: true,
        attributes: false,
    };

    pub const ALL: Self = Self {
        child_list: true,
        character_data: true,
        attributes: true,
    };

    fn wants(self, update: &DOMUpdate) -> bool {
        (self.child_list && update.is_child_list())
            || (self.character_data && update.is_character_data())
            || (self.attributes && update.is_attribute())
    }
}

/// What an observer wakes up with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Records(MutationBatch),
    /// The observer fell behind and `n` batches were dropped. Treat as "something changed".
    Lagged(u64),
}

/// A filtered subscription to a document's mutation channel.
#[derive(Debug)]
pub struct MutationObserver {
    receiver: broadcast::Receiver<MutationBatch>,
    options: ObserveOptions,
}

impl MutationObserver {
    pub fn new(receiver: broadcast::Receiver<MutationBatch>, options: ObserveOptions) -> Self {
        Self { receiver, options }
    }

    fn filter(&self, batch: MutationBatch) -> MutationBatch {
        batch
            .into_iter()
            .filter(|update| self.options.wants(update))
            .collect()
    }

    /// Wait for the next batch containing wanted records.
    /// Returns `None` once the document is gone. Cancel-safe.
    pub async fn next_batch(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(batch) => {
                    let wanted = self.filter(batch);
                    if !wanted.is_empty() {
                        return Some(Notification::Records(wanted));
                    }
                }
                Err(RecvError::Lagged(skipped)) => return Some(Notification::Lagged(skipped)),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Drain pending records without waiting.
    pub fn take_records(&mut self) -> MutationBatch {
        let mut records = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(batch) => records.extend(self.filter(batch)),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        records
    }
}
