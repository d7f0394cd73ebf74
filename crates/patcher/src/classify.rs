//! What "changing" an element means, and what it currently holds.

use html::{Document, NodeId};
use serde::{Deserialize, Serialize};

/// How a stored value is written to its element.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ModificationKind {
    /// Replace the children with one text node.
    Text,
    /// Replace the children with parsed markup.
    Markup,
    /// Set a text-like control's value.
    FormValue,
    /// Set a number or range control's value.
    NumericFormValue,
    /// Set one inline style property from a `property:value` pair.
    Style,
}

const NUMERIC_INPUT_TYPES: [&str; 2] = ["number", "range"];

/// Input types whose value is not free text. Anything else, including
/// unknown types, is treated as text-like.
const NON_TEXT_INPUT_TYPES: [&str; 14] = [
    "checkbox",
    "radio",
    "file",
    "submit",
    "reset",
    "button",
    "image",
    "hidden",
    "color",
    "date",
    "datetime-local",
    "month",
    "week",
    "time",
];

pub fn is_numeric_control(doc: &Document, node: NodeId) -> bool {
    doc.input_type(node)
        .is_some_and(|kind| NUMERIC_INPUT_TYPES.contains(&kind.as_str()))
}

fn is_text_control(doc: &Document, node: NodeId) -> bool {
    match doc.tag_name(node) {
        Some("textarea") => true,
        Some("input") => doc.input_type(node).is_some_and(|kind| {
            !NUMERIC_INPUT_TYPES.contains(&kind.as_str())
                && !NON_TEXT_INPUT_TYPES.contains(&kind.as_str())
        }),
        _ => false,
    }
}

/// Classify an element; first match wins. `None` for stale or non-element nodes.
pub fn classify_kind(doc: &Document, node: NodeId) -> Option<ModificationKind> {
    doc.tag_name(node)?;
    let kind = if is_numeric_control(doc, node) {
        ModificationKind::NumericFormValue
    } else if is_text_control(doc, node) {
        ModificationKind::FormValue
    } else if doc.attr(node, "style").is_some() {
        ModificationKind::Style
    } else if doc.inner_html(node) != doc.text_content(node) {
        ModificationKind::Markup
    } else {
        ModificationKind::Text
    };
    Some(kind)
}

/// The value a user would want to edit: a control's value, otherwise trimmed text.
pub fn read_value(doc: &Document, node: NodeId) -> Option<String> {
    doc.node(node)?;
    if doc.is_form_control(node) {
        return doc.control_value(node);
    }
    Some(doc.text_content(node).trim().to_owned())
}

/// Split a `property:value` pair on the first colon. Both halves must be non-empty.
pub fn parse_style_pair(value: &str) -> Option<(String, String)> {
    let (property, declared) = value.split_once(':')?;
    let property = property.trim();
    let declared = declared.trim();
    if property.is_empty() || declared.is_empty() {
        return None;
    }
    Some((property.to_ascii_lowercase(), declared.to_owned()))
}

/// The live value of `node` in the terms `kind` writes it.
///
/// `value` is the stored value; for `Style` it names the property to read.
pub fn current_value(
    doc: &Document,
    node: NodeId,
    kind: ModificationKind,
    value: &str,
) -> Option<String> {
    doc.node(node)?;
    let trimmed_text = || Some(doc.text_content(node).trim().to_owned());
    match kind {
        ModificationKind::Text => trimmed_text(),
        ModificationKind::Markup => Some(doc.inner_html(node)),
        ModificationKind::FormValue if doc.is_form_control(node) => doc.control_value(node),
        ModificationKind::NumericFormValue if is_numeric_control(doc, node) => {
            doc.control_value(node)
        }
        ModificationKind::FormValue | ModificationKind::NumericFormValue => trimmed_text(),
        ModificationKind::Style => {
            let (property, _) = parse_style_pair(value)?;
            doc.style_property(node, &property)
        }
    }
}
