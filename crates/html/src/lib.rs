//! Live HTML document model.
//!
//! An arena-backed DOM that host code mutates directly and that publishes
//! every structural, text and attribute change as a batch of [`DOMUpdate`]
//! records on a broadcast channel, plus dispatched events on a second channel.
//! Parsing goes through html5ever; selector queries go through `css_selectors`.
#![allow(
    clippy::missing_docs_in_private_items,
    reason = "Internal implementation details don't need public documentation"
)]
#![allow(
    clippy::missing_inline_in_public_items,
    reason = "Inlining decisions left to compiler for this crate"
)]

pub mod dom;
pub mod parser;

pub use dom::events::{DomEvent, PointerEventKind};
pub use dom::updating::{DOMUpdate, MutationBatch, MutationObserver, Notification, ObserveOptions};
pub use dom::{DOMNode, Document, NodeKind, SharedDocument, lock_shared};
pub use indextree::NodeId;
