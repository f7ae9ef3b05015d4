//! Markup serializer and node path labels
//!
//! This module handles:
//! - Turning single nodes back into markup fragments
//! - Splitting a parent's children into one fragment per child
//! - Positional paths used by Position queries

use crate::utils::escape_text;
use ego_tree::NodeRef;
use scraper::{ElementRef, Node};
use smallvec::SmallVec;

/// 1-based element positions from the root element down to a node
pub type PathPositions = SmallVec<[u32; 8]>;

/// Serialize one node (and its subtree) to markup.
///
/// Returns `None` for node kinds that produce no markup on their own
/// (document and fragment roots).
pub fn serialize_node(node: NodeRef<'_, Node>) -> Option<String> {
    match node.value() {
        Node::Element(_) => ElementRef::wrap(node).map(|element| element.html()),
        Node::Text(text) => {
            let mut output = String::with_capacity(text.len());
            if escapes_text(node) {
                escape_text(text, &mut output);
            } else {
                output.push_str(text);
            }
            Some(output)
        }
        Node::Comment(comment) => Some(format!("<!--{}-->", &**comment)),
        Node::ProcessingInstruction(pi) => Some(format!("<?{} {}>", &*pi.target, &*pi.data)),
        Node::Doctype(doctype) => Some(format!("<!DOCTYPE {}>", doctype.name())),
        _ => None,
    }
}

/// Serialize every child of `parent`, one fragment per child
pub fn serialize_children(parent: NodeRef<'_, Node>) -> Vec<String> {
    parent.children().filter_map(serialize_node).collect()
}

/// Text inside raw-text elements is written verbatim
fn escapes_text(node: NodeRef<'_, Node>) -> bool {
    const RAW_TEXT: &[&str] = &[
        "style", "script", "xmp", "iframe", "noembed", "noframes", "plaintext", "noscript",
    ];

    match node.parent().map(|parent| parent.value()) {
        Some(Node::Element(element)) => !RAW_TEXT.contains(&element.name()),
        _ => true,
    }
}

/// Compute the position path of a node.
///
/// Each level is the node's 1-based index among its element siblings, from
/// the root element down to the node itself. Non-element siblings (text,
/// comments) do not count, so whitespace in the source never shifts a path.
pub fn path_positions(node: NodeRef<'_, Node>) -> PathPositions {
    let mut positions = PathPositions::new();
    let mut current = Some(node);

    while let Some(n) = current {
        if !n.value().is_element() {
            break;
        }

        let position = n
            .prev_siblings()
            .filter(|sibling| sibling.value().is_element())
            .count()
            + 1;
        positions.push(position as u32);

        current = n.parent();
    }

    positions.reverse();
    positions
}

/// Path labels as strings, root first
pub fn path_labels(node: NodeRef<'_, Node>) -> Vec<String> {
    path_positions(node).iter().map(|p| p.to_string()).collect()
}
