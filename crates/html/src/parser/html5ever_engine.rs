use crate::dom::DOMNode;
use anyhow::{Error, anyhow};
use html5ever::tendril::TendrilSink as _;
use html5ever::tree_builder::TreeBuilderOpts;
use html5ever::{LocalName, ParseOpts, QualName, ns, parse_document, parse_fragment};
use indextree::{Arena, NodeId};
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use smallvec::SmallVec;

fn parse_opts() -> ParseOpts {
    ParseOpts {
        tree_builder: TreeBuilderOpts {
            exact_errors: false,
            scripting_enabled: false,
            ..TreeBuilderOpts::default()
        },
        ..ParseOpts::default()
    }
}

fn parse_rcdom(html: &str) -> Result<RcDom, Error> {
    let dom = parse_document(RcDom::default(), parse_opts())
        .from_utf8()
        .read_from(&mut html.as_bytes())?;
    Ok(dom)
}

/// Parse in the insertion mode an element named `context` puts the tree builder in.
fn parse_rcdom_fragment(context: &str, html: &str) -> Result<RcDom, Error> {
    let context = QualName::new(None, ns!(html), LocalName::from(context));
    let dom = parse_fragment(RcDom::default(), parse_opts(), context, Vec::new(), false)
        .from_utf8()
        .read_from(&mut html.as_bytes())?;
    Ok(dom)
}

fn append(arena: &mut Arena<DOMNode>, parent: NodeId, child: NodeId) -> Result<(), Error> {
    parent
        .checked_append(child, arena)
        .map_err(|err| anyhow!("parser could not attach node: {err:?}"))
}

/// Copy `handle` under `parent`. Comments, doctypes and processing
/// instructions are dropped. Returns the node created for `handle`, if any.
fn walk_tree(
    handle: &Handle,
    parent: NodeId,
    arena: &mut Arena<DOMNode>,
) -> Result<Option<NodeId>, Error> {
    match &handle.data {
        NodeData::Document => {
            for child in handle.children.borrow().iter() {
                walk_tree(child, parent, arena)?;
            }
            Ok(None)
        }
        NodeData::Element { name, attrs, .. } => {
            let attrs: SmallVec<(String, String), 4> = attrs
                .borrow()
                .iter()
                .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
                .collect();
            let node = arena.new_node(DOMNode::element(name.local.to_string(), attrs));
            append(arena, parent, node)?;
            for child in handle.children.borrow().iter() {
                walk_tree(child, node, arena)?;
            }
            Ok(Some(node))
        }
        NodeData::Text { contents } => {
            let node = arena.new_node(DOMNode::text(contents.borrow().to_string()));
            append(arena, parent, node)?;
            Ok(Some(node))
        }
        _ => Ok(None),
    }
}

/// Parse a whole document below `root`.
pub(crate) fn parse_document_into(
    arena: &mut Arena<DOMNode>,
    root: NodeId,
    html: &str,
) -> Result<(), Error> {
    let dom = parse_rcdom(html)?;
    walk_tree(&dom.document, root, arena)?;
    Ok(())
}

/// Parse `html` as the children of a `context` element, as `innerHTML` does,
/// and append the result to `parent`. Returns the top-level nodes appended.
pub(crate) fn parse_fragment_into(
    arena: &mut Arena<DOMNode>,
    parent: NodeId,
    context: &str,
    html: &str,
) -> Result<Vec<NodeId>, Error> {
    let dom = parse_rcdom_fragment(context, html)?;
    // The fragment lands under a synthetic `<html>` root.
    let Some(root) = dom.document.children.borrow().first().cloned() else {
        return Ok(Vec::new());
    };
    let mut inserted = Vec::new();
    for child in root.children.borrow().iter() {
        if let Some(node) = walk_tree(child, parent, arena)? {
            inserted.push(node);
        }
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use crate::Document;

    #[test]
    fn fragment_keeps_text_and_inline_style() {
        assert_eq!(
            Document::serialize_fragment("div", "hello <b>world</b>").expect("fragment"),
            "hello <b>world</b>"
        );
        assert_eq!(
            Document::serialize_fragment("div", "<style>p{}</style><p>x").expect("fragment"),
            "<style>p{}</style><p>x</p>"
        );
        assert_eq!(Document::serialize_fragment("div", "").expect("fragment"), "");
    }

    #[test]
    fn fragment_follows_the_context_element() {
        assert_eq!(
            Document::serialize_fragment("tbody", "<tr><td>x</td></tr>").expect("fragment"),
            "<tr><td>x</td></tr>"
        );
        assert_eq!(
            Document::serialize_fragment("ul", "<li>a<li>b").expect("fragment"),
            "<li>a</li><li>b</li>"
        );
        assert_eq!(
            Document::serialize_fragment("select", "<option>one<option>two").expect("fragment"),
            "<option>one</option><option>two</option>"
        );
        // Outside a table the same markup loses its row structure.
        assert_eq!(
            Document::serialize_fragment("div", "<tr><td>x</td></tr>").expect("fragment"),
            "x"
        );
    }

    #[test]
    fn document_has_skeleton() {
        let doc = Document::parse("<p>x</p>").expect("parse");
        assert!(doc.head().is_some());
        let body = doc.body().expect("body");
        assert_eq!(doc.inner_html(body), "<p>x</p>");
    }
}
