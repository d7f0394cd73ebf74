//! Per-page agent: owns the session, engine and watcher of one document.
//!
//! The agent is a single task. Requests, pointer events, mutation and timer
//! triggers, the restore delay and acknowledgment deadlines are all handled in
//! one `select!` loop, so a pass never interleaves with another write from the
//! agent. The document lock is only held for synchronous work.

use html::{Document, DomEvent, NodeId, PointerEventKind, SharedDocument, lock_shared};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use crate::classify::{classify_kind, read_value};
use crate::config::PatcherConfig;
use crate::engine::PatchEngine;
use crate::error::PatchError;
use crate::messaging::{Message, Response};
use crate::selector::{SelectorResolver, locate};
use crate::session::SelectionSession;
use crate::store::{KeyValueStore, ModificationStore};
use crate::watcher::{PassReport, Trigger, Watcher, WatcherState};

const COMMAND_BUFFER: usize = 64;

enum PageCommand {
    Request {
        message: Message,
        reply: oneshot::Sender<Response>,
    },
    Pointer {
        kind: PointerEventKind,
        target: NodeId,
        reply: oneshot::Sender<bool>,
    },
    WatcherState {
        reply: oneshot::Sender<WatcherState>,
    },
    Shutdown,
}

/// Client side of a running page agent.
#[derive(Clone, Debug)]
pub struct PageHandle {
    commands: mpsc::Sender<PageCommand>,
    document: SharedDocument,
}

impl PageHandle {
    async fn round_trip<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> PageCommand,
    ) -> Result<T, PatchError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| PatchError::ChannelClosed("page agent"))?;
        response
            .await
            .map_err(|_| PatchError::ChannelClosed("page agent"))
    }

    /// Send a control-plane request and wait for the reply.
    pub async fn request(&self, message: Message) -> Result<Response, PatchError> {
        self.round_trip(|reply| PageCommand::Request { message, reply })
            .await
    }

    /// Deliver a pointer event. Returns `true` when the agent consumed it;
    /// otherwise it has been dispatched to the document's listeners.
    pub async fn pointer_event(
        &self,
        kind: PointerEventKind,
        target: NodeId,
    ) -> Result<bool, PatchError> {
        self.round_trip(|reply| PageCommand::Pointer {
            kind,
            target,
            reply,
        })
        .await
    }

    pub async fn watcher_state(&self) -> Result<WatcherState, PatchError> {
        self.round_trip(|reply| PageCommand::WatcherState { reply })
            .await
    }

    pub fn document(&self) -> SharedDocument {
        SharedDocument::clone(&self.document)
    }

    /// True once the agent has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Stop the agent and wait until it has released the page.
    pub async fn close(&self) {
        if self.commands.send(PageCommand::Shutdown).await.is_ok() {
            self.commands.closed().await;
        }
    }
}

/// Sleep until `deadline`, or forever when there is none.
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => core::future::pending().await,
    }
}

pub struct PageAgent<S: KeyValueStore> {
    document: SharedDocument,
    store: ModificationStore<S>,
    resolver: SelectorResolver,
    engine: PatchEngine,
    watcher: Watcher,
    session: SelectionSession,
    events: broadcast::Sender<Message>,
    commands: mpsc::Receiver<PageCommand>,
    restore_at: Option<Instant>,
}

impl<S: KeyValueStore> PageAgent<S> {
    /// Start an agent for `document`. The restore pass runs after the configured delay.
    /// Page events go to `events`; nobody listening is fine.
    pub fn spawn(
        document: SharedDocument,
        store: ModificationStore<S>,
        config: &PatcherConfig,
        events: broadcast::Sender<Message>,
    ) -> (PageHandle, JoinHandle<()>) {
        let (sender, commands) = mpsc::channel(COMMAND_BUFFER);
        let agent = Self {
            document: SharedDocument::clone(&document),
            store,
            resolver: SelectorResolver::from_config(config),
            engine: PatchEngine::new(config),
            watcher: Watcher::new(config.recheck_interval()),
            session: SelectionSession::new(),
            events,
            commands,
            restore_at: Some(Instant::now() + config.restore_delay()),
        };
        let task = tokio::spawn(agent.run());
        (
            PageHandle {
                commands: sender,
                document,
            },
            task,
        )
    }

    async fn run(mut self) {
        log::debug!(target: "patcher", "page agent started");
        loop {
            let restore_at = self.restore_at;
            let ack_deadline = self.engine.next_ack_deadline();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(PageCommand::Request { message, reply }) => {
                        let response = self.handle_request(message).await;
                        if reply.send(response).is_err() {
                            log::debug!(target: "patcher", "requester went away");
                        }
                    }
                    Some(PageCommand::Pointer { kind, target, reply }) => {
                        let consumed = self.handle_pointer(kind, target);
                        if reply.send(consumed).is_err() {
                            log::debug!(target: "patcher", "pointer sender went away");
                        }
                    }
                    Some(PageCommand::WatcherState { reply }) => {
                        if reply.send(self.watcher.state()).is_err() {
                            log::debug!(target: "patcher", "state requester went away");
                        }
                    }
                    Some(PageCommand::Shutdown) | None => break,
                },
                () = wait_until(restore_at) => {
                    self.restore_at = None;
                    self.restore().await;
                }
                () = wait_until(ack_deadline) => {
                    let mut doc = lock_shared(&self.document);
                    self.engine.expire_acks(&mut doc, Instant::now());
                }
                trigger = self.watcher.next_trigger() => match trigger {
                    Trigger::Mutation | Trigger::Timer => {
                        log::debug!(target: "patcher::watcher", "{trigger:?} pass");
                        self.reconcile().await;
                    }
                    Trigger::Closed => self.watcher.disarm(),
                },
            }
        }
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.watcher.disarm();
        self.commands.close();
        let mut doc = lock_shared(&self.document);
        self.engine.clear_acks(&mut doc);
        self.session.disable(&mut doc);
        log::debug!(target: "patcher", "page agent stopped");
    }

    fn arm_watcher(&mut self) {
        let doc = lock_shared(&self.document);
        self.watcher.arm(&doc);
    }

    /// Startup pass over persisted records.
    async fn restore(&mut self) {
        if let Some(report) = self.reconcile().await {
            log::info!(
                target: "patcher",
                "restored {} of {} modifications ({} missing)",
                report.rewritten,
                report.checked,
                report.missing
            );
        }
    }

    /// One full pass. Arms the watcher while records exist and disarms it
    /// once the store is empty.
    async fn reconcile(&mut self) -> Option<PassReport> {
        let records = match self.store.list().await {
            Ok(records) => records,
            Err(err) => {
                log::warn!(target: "patcher::watcher", "skipping pass: {err}");
                return None;
            }
        };
        if records.is_empty() {
            self.watcher.disarm();
            return Some(PassReport::default());
        }
        let report = {
            let mut doc = lock_shared(&self.document);
            Watcher::run_pass(&mut self.engine, &mut doc, &records)
        };
        self.arm_watcher();
        Some(report)
    }

    async fn handle_request(&mut self, message: Message) -> Response {
        log::debug!(target: "patcher", "request {}", message.action());
        match message {
            Message::EnableSelection => {
                let mut doc = lock_shared(&self.document);
                let enabled = self.session.enable(&mut doc);
                if let Err(err) = &enabled {
                    log::warn!(target: "patcher::session", "enable failed: {err:#}");
                }
                Response::Success {
                    success: enabled.is_ok(),
                }
            }
            Message::DisableSelection => {
                let mut doc = lock_shared(&self.document);
                self.session.disable(&mut doc);
                Response::Success { success: true }
            }
            Message::ApplyModification {
                selector,
                value,
                kind,
            } => {
                let applied = {
                    let mut doc = lock_shared(&self.document);
                    self.engine.apply_selector(&mut doc, &selector, kind, &value)
                };
                if applied {
                    self.arm_watcher();
                }
                Response::Success { success: applied }
            }
            Message::GetCurrentValue { selector } => {
                let doc = lock_shared(&self.document);
                Response::Value {
                    value: locate(&doc, &selector).and_then(|node| read_value(&doc, node)),
                }
            }
            Message::DetectKind { selector } => {
                let doc = lock_shared(&self.document);
                Response::Kind {
                    kind: locate(&doc, &selector).and_then(|node| classify_kind(&doc, node)),
                }
            }
            Message::RefreshAll => Response::Success {
                success: self.reconcile().await.is_some(),
            },
            Message::TargetSelected { .. } | Message::SelectionFailed { .. } => {
                log::debug!(target: "patcher", "ignoring page event sent to a page");
                Response::Success { success: false }
            }
        }
    }

    fn handle_pointer(&mut self, kind: PointerEventKind, target: NodeId) -> bool {
        let outcome = {
            let mut doc = lock_shared(&self.document);
            let outcome = self
                .session
                .handle_pointer(&mut doc, &self.resolver, kind, target);
            if !outcome.consumed {
                doc.dispatch_event(DomEvent::Pointer { kind, target });
            }
            outcome
        };
        if let Some(message) = outcome.message {
            // No control surface listening is fine.
            drop(self.events.send(message));
        }
        outcome.consumed
    }
}

/// Convenience for tests and embedders: a page over a freshly parsed document.
pub fn open_page<S: KeyValueStore>(
    html: &str,
    store: ModificationStore<S>,
    config: &PatcherConfig,
    events: broadcast::Sender<Message>,
) -> Result<(PageHandle, JoinHandle<()>), anyhow::Error> {
    let document = Document::parse(html)?.into_shared();
    Ok(PageAgent::spawn(document, store, config, events))
}
