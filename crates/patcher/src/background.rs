//! The long-lived side of the extension: page registry, shared store and the
//! recurring `refreshAll` alarm.

use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use html::SharedDocument;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::IntervalStream;

use crate::config::PatcherConfig;
use crate::control::ControlSurface;
use crate::messaging::Message;
use crate::page::{PageAgent, PageHandle};
use crate::store::{KeyValueStore, ModificationStore};

const EVENT_BUFFER: usize = 64;

/// Open pages, pruned when their agent goes away.
#[derive(Clone, Debug, Default)]
pub struct PageRegistry {
    pages: Arc<Mutex<Vec<PageHandle>>>,
}

impl PageRegistry {
    pub fn register(&self, page: PageHandle) {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(page);
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<PageHandle> {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn prune(&self) -> usize {
        let mut pages = self.pages.lock().unwrap_or_else(PoisonError::into_inner);
        let before = pages.len();
        pages.retain(|page| !page.is_closed());
        before - pages.len()
    }

    /// Send `refreshAll` to every page at once. Returns how many pages answered.
    pub async fn refresh_all(&self) -> usize {
        let pages = self.snapshot();
        let replies = join_all(pages.iter().map(|page| page.request(Message::RefreshAll))).await;
        let delivered = replies.iter().filter(|reply| reply.is_ok()).count();
        let pruned = self.prune();
        log::debug!(
            target: "patcher",
            "refreshAll reached {delivered} of {} pages, pruned {pruned}",
            pages.len()
        );
        delivered
    }
}

/// Owner of the shared store, the page registry and the page event bus.
#[derive(Debug)]
pub struct Background<S: KeyValueStore> {
    store: ModificationStore<S>,
    config: PatcherConfig,
    registry: PageRegistry,
    events: broadcast::Sender<Message>,
}

impl<S: KeyValueStore> Background<S> {
    pub fn new(backend: S, config: PatcherConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            store: ModificationStore::new(backend),
            config,
            registry: PageRegistry::default(),
            events,
        }
    }

    pub fn store(&self) -> &ModificationStore<S> {
        &self.store
    }

    pub fn config(&self) -> &PatcherConfig {
        &self.config
    }

    pub fn registry(&self) -> &PageRegistry {
        &self.registry
    }

    /// Start an agent for a page and register it.
    pub fn open_page(&self, document: SharedDocument) -> PageHandle {
        let (page, _task) = PageAgent::spawn(
            document,
            self.store.clone(),
            &self.config,
            self.events.clone(),
        );
        self.registry.register(page.clone());
        log::debug!(target: "patcher", "opened page ({} registered)", self.registry.len());
        page
    }

    /// A control surface talking to `page`.
    pub fn control_surface(&self, page: &PageHandle) -> ControlSurface<S> {
        ControlSurface::new(self.store.clone(), page.clone(), self.events.clone())
    }

    pub async fn refresh_all(&self) -> usize {
        self.registry.refresh_all().await
    }

    /// Fan `refreshAll` out on every tick of the refresh interval, first tick one
    /// interval from now. Abort the returned task to stop it.
    pub fn start_alarm(&self) -> JoinHandle<()> {
        let period = self.config.refresh_interval();
        let registry = self.registry.clone();
        let mut ticks = IntervalStream::new(time::interval_at(Instant::now() + period, period));
        tokio::spawn(async move {
            while ticks.next().await.is_some() {
                registry.refresh_all().await;
            }
        })
    }
}
