//! Content Sanitizer — strips empty formatting wrappers before content is
//! persisted or measured.
//!
//! Two passes over the tree:
//! 1. empty underline elements (`<u>` or an inline `text-decoration: underline`)
//! 2. post-order removal of any element with no text and no child elements,
//!    except `br`, `img` and `hr`
//!
//! `svg` subtrees are left untouched by both passes. The result is a fixpoint,
//! so `clean(clean(x)) == clean(x)`.

use tracing::debug;

use crate::editor::document::{Element, Fragment, Node};

/// Elements that are meaningful even when they have no content.
const KEEP_WHEN_EMPTY: &[&str] = &["br", "img", "hr"];

/// Sanitizes an HTML string. Markup that cannot be parsed is returned as is.
pub fn clean(html: &str) -> String {
    match Fragment::parse(html) {
        Ok(mut fragment) => {
            clean_fragment(&mut fragment);
            fragment.to_html()
        }
        Err(err) => {
            debug!(error = %err, "sanitizer skipped unparseable markup");
            html.to_string()
        }
    }
}

/// Sanitizes a live fragment in place.
///
/// Selection markers are never removed and keep their parent alive, so a
/// caret parked inside an otherwise empty wrapper survives the pass.
pub fn clean_fragment(fragment: &mut Fragment) {
    strip_empty_underlines(&mut fragment.children);
    strip_empty_elements(&mut fragment.children);
}

fn strip_empty_underlines(children: &mut Vec<Node>) {
    children.retain_mut(|node| {
        let Node::Element(el) = node else {
            return true;
        };
        if el.tag == "svg" {
            return true;
        }
        if is_underline(el) && !node_has_text(el) && !holds_marker(el) {
            return false;
        }
        strip_empty_underlines(&mut el.children);
        true
    });
}

fn strip_empty_elements(children: &mut Vec<Node>) {
    children.retain_mut(|node| {
        let Node::Element(el) = node else {
            return true;
        };
        if el.tag == "svg" {
            return true;
        }
        // Children first so nested empty wrappers collapse in one pass.
        strip_empty_elements(&mut el.children);
        KEEP_WHEN_EMPTY.contains(&el.tag.as_str()) || node_has_text(el) || has_child_nodes(el)
    });
}

fn is_underline(el: &Element) -> bool {
    if el.tag == "u" {
        return true;
    }
    el.attr("style").is_some_and(|style| {
        let style: String = style
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        style.contains("text-decoration:underline") || style.contains("text-decoration-line:underline")
    })
}

fn node_has_text(el: &Element) -> bool {
    el.children.iter().any(Node::has_visible_text)
}

fn has_child_nodes(el: &Element) -> bool {
    el.children
        .iter()
        .any(|child| matches!(child, Node::Element(_) | Node::Marker(_)))
}

fn holds_marker(el: &Element) -> bool {
    el.children.iter().any(|child| match child {
        Node::Marker(_) => true,
        Node::Element(inner) => holds_marker(inner),
        Node::Text(_) => false,
    })
}
