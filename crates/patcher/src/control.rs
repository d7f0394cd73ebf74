//! The control surface: what the popup does on behalf of the user.

use tokio::sync::broadcast;

use crate::classify::ModificationKind;
use crate::error::PatchError;
use crate::messaging::{Message, Response};
use crate::page::PageHandle;
use crate::store::{KeyValueStore, Modification, ModificationStore};

#[derive(Clone, Debug)]
pub struct ControlSurface<S: KeyValueStore> {
    store: ModificationStore<S>,
    page: PageHandle,
    events: broadcast::Sender<Message>,
}

impl<S: KeyValueStore> ControlSurface<S> {
    pub fn new(
        store: ModificationStore<S>,
        page: PageHandle,
        events: broadcast::Sender<Message>,
    ) -> Self {
        Self {
            store,
            page,
            events,
        }
    }

    /// Page events (`targetSelected`, `selectionFailed`) from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.events.subscribe()
    }

    async fn ask(&self, message: Message) -> Result<Response, PatchError> {
        self.page.request(message).await
    }

    pub async fn enable_selection(&self) -> Result<bool, PatchError> {
        Ok(self.ask(Message::EnableSelection).await?.success())
    }

    pub async fn disable_selection(&self) -> Result<bool, PatchError> {
        Ok(self.ask(Message::DisableSelection).await?.success())
    }

    /// Persist the intent, then apply it to the page. The record is kept even
    /// when the page could not apply it.
    pub async fn submit(
        &self,
        selector: &str,
        kind: ModificationKind,
        value: &str,
    ) -> Result<bool, PatchError> {
        let record = self.store.upsert(selector, kind, value).await?;
        let applied = self
            .ask(Message::ApplyModification {
                selector: record.selector,
                value: record.value,
                kind: record.kind,
            })
            .await?
            .success();
        if !applied {
            log::info!(target: "patcher", "saved {selector:?} but it is not on this page");
        }
        Ok(applied)
    }

    /// Re-apply the stored value at `index`. Out of range is `false`.
    pub async fn load(&self, index: usize) -> Result<bool, PatchError> {
        let records = self.store.list().await?;
        let Some(record) = records.into_iter().nth(index) else {
            return Ok(false);
        };
        self.submit(&record.selector, record.kind, &record.value)
            .await
    }

    pub async fn remove(&self, index: usize) -> Result<Option<Modification>, PatchError> {
        self.store.remove_at(index).await
    }

    pub async fn clear_all(&self) -> Result<(), PatchError> {
        self.store.clear().await
    }

    pub async fn list(&self) -> Result<Vec<Modification>, PatchError> {
        self.store.list().await
    }

    pub async fn current_value(&self, selector: &str) -> Result<Option<String>, PatchError> {
        Ok(self
            .ask(Message::GetCurrentValue {
                selector: selector.to_owned(),
            })
            .await?
            .into_value())
    }

    pub async fn detect_kind(&self, selector: &str) -> Result<Option<ModificationKind>, PatchError> {
        Ok(self
            .ask(Message::DetectKind {
                selector: selector.to_owned(),
            })
            .await?
            .into_kind())
    }
}
