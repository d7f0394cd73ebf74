//! Persistent DOM patching.
//!
//! A user picks an element on a page they do not control and records what it
//! should contain. The record is keyed by a derived selector, persisted, and
//! re-applied whenever the page drifts from it: on load, on structural
//! mutations and on a timer. Each page runs one agent task; a background
//! registry fans out periodic refreshes; a control surface drives picking and
//! editing over async request/response messages.
#![allow(
    clippy::missing_docs_in_private_items,
    reason = "Internal implementation details don't need public documentation"
)]
#![allow(
    clippy::missing_inline_in_public_items,
    reason = "Inlining decisions left to compiler for this crate"
)]

pub mod background;
pub mod classify;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod messaging;
pub mod page;
pub mod selector;
pub mod session;
pub mod store;
pub mod watcher;

pub use background::{Background, PageRegistry};
pub use classify::{ModificationKind, classify_kind, current_value, read_value};
pub use config::PatcherConfig;
pub use control::ControlSurface;
pub use engine::PatchEngine;
pub use error::PatchError;
pub use messaging::{Message, Response};
pub use page::{PageAgent, PageHandle, open_page};
pub use selector::{SelectorResolver, locate};
pub use session::{SelectionSession, SessionMode};
pub use store::{FileStore, KeyValueStore, MemoryStore, Modification, ModificationStore};
pub use watcher::{PassReport, Watcher, WatcherState};
