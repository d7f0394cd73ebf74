use std::fmt;

use super::{DOMNode, Document, NodeKind};
use indextree::{Arena, Node, NodeId};

/// Elements that never have children or an end tag.
const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta", "param",
    "source", "track",
];

/// Elements whose text children are serialized without escaping.
const RAW_TEXT_ELEMENTS: [&str; 7] = [
    "style",
    "script",
    "xmp",
    "iframe",
    "noembed",
    "noframes",
    "plaintext",
];

// -----------------------
// HTML fragment serialization
// -----------------------

fn escape_into(out: &mut String, text: &str, in_attribute: bool) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '"' if in_attribute => out.push_str("&quot;"),
            '<' if !in_attribute => out.push_str("&lt;"),
            '>' if !in_attribute => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

fn is_raw_text_parent(arena: &Arena<DOMNode>, id: NodeId) -> bool {
    arena
        .get(id)
        .and_then(Node::parent)
        .and_then(|parent| arena.get(parent))
        .and_then(|parent| parent.get().tag())
        .is_some_and(|tag| RAW_TEXT_ELEMENTS.contains(&tag))
}

/// Rewrites an attribute while serializing. Receives the element, the name and
/// the value; `None` drops the attribute.
pub type AttrFilter<'filter> = &'filter dyn Fn(NodeId, &str, &str) -> Option<String>;

fn write_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    escape_into(out, value, true);
    out.push('"');
}

fn write_node(
    arena: &Arena<DOMNode>,
    id: NodeId,
    out: &mut String,
    filter: Option<AttrFilter<'_>>,
) {
    let Some(node_ref) = arena.get(id) else {
        return;
    };
    let DOMNode { kind, attrs, .. } = node_ref.get();
    match kind {
        NodeKind::Document => write_children(arena, id, out, filter),
        NodeKind::Text { text } => {
            if is_raw_text_parent(arena, id) {
                out.push_str(text);
            } else {
                escape_into(out, text, false);
            }
        }
        NodeKind::Element { tag } => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in attrs.iter() {
                match filter {
                    Some(rewrite) => {
                        if let Some(kept) = rewrite(id, name, value) {
                            write_attr(out, name, &kept);
                        }
                    }
                    None => write_attr(out, name, value),
                }
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&tag.as_str()) {
                return;
            }
            write_children(arena, id, out, filter);
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}

fn write_children(
    arena: &Arena<DOMNode>,
    id: NodeId,
    out: &mut String,
    filter: Option<AttrFilter<'_>>,
) {
    for child in id.children(arena) {
        write_node(arena, child, out, filter);
    }
}

/// `innerHTML` of a node.
pub fn serialize_children(arena: &Arena<DOMNode>, id: NodeId) -> String {
    let mut out = String::new();
    write_children(arena, id, &mut out, None);
    out
}

/// `innerHTML` of a node with every attribute passed through `filter`.
pub fn serialize_children_filtered(
    arena: &Arena<DOMNode>,
    id: NodeId,
    filter: AttrFilter<'_>,
) -> String {
    let mut out = String::new();
    write_children(arena, id, &mut out, Some(filter));
    out
}

/// `outerHTML` of a node.
pub fn serialize_node(arena: &Arena<DOMNode>, id: NodeId) -> String {
    let mut out = String::new();
    write_node(arena, id, &mut out, None);
    out
}

// -----------------------
// Debug tree dump
// -----------------------

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Header
        writeln!(f, "Document")?;

        fn write_indent(f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
            for _ in 0..depth {
                f.write_str("  ")?;
            }
            Ok(())
        }

        fn escape_text(s: &str) -> String {
            let mut out = String::with_capacity(s.len());
            for ch in s.chars() {
                match ch {
                    '\\' => out.push_str("\\\\"),
                    '"' => out.push_str("\\\""),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    _ => out.push(ch),
                }
            }
            out
        }

        fn fmt_node(
            doc: &Document,
            id: NodeId,
            f: &mut fmt::Formatter<'_>,
            depth: usize,
        ) -> fmt::Result {
            let Some(DOMNode { kind, attrs, value }) = doc.node(id) else {
                return Ok(());
            };
            match kind {
                NodeKind::Document => {
                    write_indent(f, depth)?;
                    writeln!(f, "#document")?;
                }
                NodeKind::Element { tag } => {
                    write_indent(f, depth)?;
                    write!(f, "<{tag}")?;
                    for (name, attr_value) in attrs.iter() {
                        write!(f, " {}=\"{}\"", name, escape_text(attr_value))?;
                    }
                    if let Some(live) = value {
                        write!(f, " (value=\"{}\")", escape_text(live))?;
                    }
                    writeln!(f, ">")?;
                }
                NodeKind::Text { text } => {
                    // Skip pure-whitespace text nodes in the printer for cleaner output
                    if text.chars().all(char::is_whitespace) {
                        return Ok(());
                    }
                    write_indent(f, depth)?;
                    writeln!(f, "\"{}\"", escape_text(text))?;
                    return Ok(());
                }
            }
            for child in doc.children(id) {
                fmt_node(doc, child, f, depth + 1)?;
            }
            Ok(())
        }

        fmt_node(self, self.root, f, 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::Document;

    #[test]
    fn escapes_text_and_attributes() {
        let mut doc = Document::new();
        let body = doc.body().expect("body");
        let para = doc.create_element("p");
        doc.append_child(body, para).expect("append");
        doc.set_attr(para, "title", "a \"quoted\" & <b>").expect("attr");
        doc.set_text_content(para, "1 < 2 & 3 > 2").expect("text");
        assert_eq!(
            doc.outer_html(para),
            "<p title=\"a &quot;quoted&quot; &amp; <b>\">1 &lt; 2 &amp; 3 &gt; 2</p>"
        );
    }

    #[test]
    fn void_and_raw_text_elements() {
        let doc = Document::parse(
            "<body><div><input type=\"text\"><br><script>if (a < b) {}</script></div></body>",
        )
        .expect("parse");
        let div = doc.query_selector("div").expect("valid selector").expect("present");
        assert_eq!(
            doc.inner_html(div),
            "<input type=\"text\"><br><script>if (a < b) {}</script>"
        );
    }

    #[test]
    fn filtered_serialization_rewrites_attributes() {
        let doc = Document::parse(
            "<body><div><p class=\"keep drop\" id=\"x\">a</p><i class=\"drop\">b</i></div></body>",
        )
        .expect("parse");
        let div = doc.query_selector("div").expect("valid").expect("div");
        let html = doc.inner_html_filtered(div, &|_, name, value| {
            if name != "class" {
                return Some(value.to_owned());
            }
            let kept = value
                .split_whitespace()
                .filter(|class| *class != "drop")
                .collect::<Vec<_>>()
                .join(" ");
            (!kept.is_empty()).then_some(kept)
        });
        assert_eq!(html, "<p class=\"keep\" id=\"x\">a</p><i>b</i>");
        assert_eq!(
            doc.inner_html(div),
            "<p class=\"keep drop\" id=\"x\">a</p><i class=\"drop\">b</i>"
        );
    }

    #[test]
    fn debug_dump_lists_elements() {
        let doc = Document::parse("<p id=\"x\">hi</p>").expect("parse");
        let dump = format!("{doc:?}");
        assert!(dump.contains("<p id=\"x\">"));
        assert!(dump.contains("\"hi\""));
    }
}
