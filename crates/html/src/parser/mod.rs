//! HTML parsing into the document arena.
//!
//! html5ever builds an `RcDom`; the walk in [`html5ever_engine`] copies it into
//! our arena. Fragments are parsed as the body of a document and the parsed
//! `head` and `body` children are taken in order, so `<style>` or `<meta>` in a
//! fragment survives the head hoisting a document parse does.

mod html5ever_engine;

pub(crate) use html5ever_engine::{parse_document_into, parse_fragment_into};
