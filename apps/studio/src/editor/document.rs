//! Document Fragment — the owned HTML tree behind an editing session.
//!
//! The tree is parsed leniently from an HTML fragment (unclosed tags, void
//! elements without a trailing slash, stray end tags) and serialized back to
//! a normalized HTML string. Selection boundaries address positions inside
//! the tree the same way a DOM range does: a node path plus an offset that is
//! a character offset inside text and a child index inside containers.
//!
//! `Marker` nodes are invisible anchors used by cursor preservation. They are
//! never serialized, so they cannot leak into persisted content.

use std::borrow::Cow;

use quick_xml::escape::{resolve_html5_entity, unescape_with};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Elements that never have children or an end tag.
pub const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed markup at byte {position}: {message}")]
    Syntax { position: u64, message: String },
}

// ────────────────────────────────────────────────────────────────────────────
// Tree types
// ────────────────────────────────────────────────────────────────────────────

/// Identity of an invisible selection marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerId(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    Marker(MarkerId),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    /// Lowercased tag name.
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_void(&self) -> bool {
        VOID_TAGS.contains(&self.tag.as_str())
    }
}

impl Node {
    pub fn line_break() -> Self {
        Node::Element(Element::new("br"))
    }

    /// True if this node or any descendant carries non-whitespace text.
    pub fn has_visible_text(&self) -> bool {
        match self {
            Node::Text(text) => !text.trim().is_empty(),
            Node::Element(el) => el.children.iter().any(Node::has_visible_text),
            Node::Marker(_) => false,
        }
    }

    fn contains_marker(&self, id: MarkerId) -> bool {
        match self {
            Node::Marker(marker) => *marker == id,
            Node::Element(el) => el.children.iter().any(|child| child.contains_marker(id)),
            Node::Text(_) => false,
        }
    }

    #[cfg(test)]
    fn push_text(&self, out: &mut String) {
        match self {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => el.children.iter().for_each(|child| child.push_text(out)),
            Node::Marker(_) => {}
        }
    }
}

/// A position inside a fragment.
///
/// `path` addresses a node from the root (empty = the root container).
/// `offset` is a character offset when the node is text, otherwise a child index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boundary {
    pub path: Vec<usize>,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub start: Boundary,
    pub end: Boundary,
}

impl Selection {
    pub fn caret(at: Boundary) -> Self {
        Self {
            start: at.clone(),
            end: at,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

/// The live content under edit plus its active selection.
#[derive(Debug, Clone, Default)]
pub struct Fragment {
    pub children: Vec<Node>,
    pub selection: Option<Selection>,
    next_marker: u64,
}

// ────────────────────────────────────────────────────────────────────────────
// Parsing and serialization
// ────────────────────────────────────────────────────────────────────────────

impl Fragment {
    pub fn new(children: Vec<Node>) -> Self {
        Self {
            children,
            ..Self::default()
        }
    }

    /// Parses an HTML fragment into a tree.
    ///
    /// Unclosed elements are closed at the end of input; end tags with no
    /// matching open element are ignored. Comments and doctypes are dropped.
    pub fn parse(html: &str) -> Result<Self, ParseError> {
        let mut reader = Reader::from_str(html);
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        let mut root: Vec<Node> = Vec::new();
        let mut stack: Vec<Element> = Vec::new();

        loop {
            let position = reader.buffer_position();
            match reader.read_event() {
                Ok(Event::Start(start)) => {
                    let el = element_from_start(&start, position)?;
                    if el.is_void() {
                        attach(&mut stack, &mut root, Node::Element(el));
                    } else {
                        stack.push(el);
                    }
                }
                Ok(Event::Empty(start)) => {
                    let el = element_from_start(&start, position)?;
                    attach(&mut stack, &mut root, Node::Element(el));
                }
                Ok(Event::End(end)) => {
                    let tag = String::from_utf8_lossy(end.name().as_ref()).to_ascii_lowercase();
                    if let Some(open_at) = stack.iter().rposition(|el| el.tag == tag) {
                        while stack.len() > open_at {
                            if let Some(el) = stack.pop() {
                                attach(&mut stack, &mut root, Node::Element(el));
                            }
                        }
                    }
                }
                Ok(Event::Text(text)) => {
                    let raw = String::from_utf8_lossy(&text);
                    let text = unescape_html(&raw).into_owned();
                    if !text.is_empty() {
                        attach(&mut stack, &mut root, Node::Text(text));
                    }
                }
                Ok(Event::CData(data)) => {
                    let text = String::from_utf8_lossy(&data).into_owned();
                    if !text.is_empty() {
                        attach(&mut stack, &mut root, Node::Text(text));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => {
                    return Err(ParseError::Syntax {
                        position: reader.buffer_position(),
                        message: err.to_string(),
                    })
                }
            }
        }

        while let Some(el) = stack.pop() {
            attach(&mut stack, &mut root, Node::Element(el));
        }

        Ok(Self::new(root))
    }

    /// Serializes the tree. Markers are skipped.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            write_node(node, &mut out);
        }
        out
    }

    #[cfg(test)]
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            node.push_text(&mut out);
        }
        out
    }

    /// Caret position after the last top-level node.
    pub fn end_boundary(&self) -> Boundary {
        Boundary {
            path: Vec::new(),
            offset: self.children.len(),
        }
    }

    /// Caret position at the end of the last text run, descending into the
    /// last open element the way a browser places the caret on focus.
    pub fn content_end(&self) -> Boundary {
        let mut path = Vec::new();
        let mut children = &self.children;
        loop {
            let Some(index) = children.len().checked_sub(1) else {
                return Boundary { path, offset: 0 };
            };
            match &children[index] {
                Node::Text(text) => {
                    path.push(index);
                    return Boundary {
                        path,
                        offset: text.chars().count(),
                    };
                }
                Node::Element(el) if !el.is_void() => {
                    path.push(index);
                    children = &el.children;
                }
                _ => {
                    return Boundary {
                        path,
                        offset: index + 1,
                    }
                }
            }
        }
    }

    /// Merges adjacent text nodes and drops empty ones.
    pub fn normalize(&mut self) {
        normalize_children(&mut self.children);
    }
}

fn attach(stack: &mut [Element], root: &mut Vec<Node>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => root.push(node),
    }
}

fn element_from_start(start: &BytesStart<'_>, position: u64) -> Result<Element, ParseError> {
    let mut el = Element::new(&String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.html_attributes() {
        let attr = attr.map_err(|err| ParseError::Syntax {
            position,
            message: err.to_string(),
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
        let raw = String::from_utf8_lossy(&attr.value);
        el.attrs.push((key, unescape_html(&raw).into_owned()));
    }
    Ok(el)
}

/// Resolves character references one at a time. A reference that does not
/// resolve stays literal without affecting its neighbours.
fn unescape_html(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(len) = reference_len(tail) else {
            out.push('&');
            rest = &tail[1..];
            continue;
        };
        let reference = &tail[..len];
        match unescape_with(reference, resolve_html5_entity) {
            Ok(resolved) => out.push_str(&resolved),
            Err(_) => out.push_str(reference),
        }
        rest = &tail[len..];
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Byte length of the `&name;` or `&#n;` reference that starts `text`.
fn reference_len(text: &str) -> Option<usize> {
    let body = text.strip_prefix('&')?;
    let end = body.find(|c: char| !(c.is_ascii_alphanumeric() || c == '#'))?;
    (end > 0 && body[end..].starts_with(';')).then_some(end + 2)
}

pub(crate) fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            _ => out.push(ch),
        }
    }
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Text(text) => escape_text(text, out),
        Node::Marker(_) => {}
        Node::Element(el) => {
            out.push('<');
            out.push_str(&el.tag);
            for (key, value) in &el.attrs {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                escape_attr(value, out);
                out.push('"');
            }
            out.push('>');
            if el.is_void() {
                return;
            }
            for child in &el.children {
                write_node(child, out);
            }
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
    }
}

fn normalize_children(children: &mut Vec<Node>) {
    let mut merged: Vec<Node> = Vec::with_capacity(children.len());
    for node in children.drain(..) {
        let node = match node {
            Node::Element(mut el) => {
                normalize_children(&mut el.children);
                Node::Element(el)
            }
            other => other,
        };
        if let Node::Text(text) = &node {
            if text.is_empty() {
                continue;
            }
            if let Some(Node::Text(prev)) = merged.last_mut() {
                prev.push_str(text);
                continue;
            }
        }
        merged.push(node);
    }
    *children = merged;
}

// ────────────────────────────────────────────────────────────────────────────
// Path addressing
// ────────────────────────────────────────────────────────────────────────────

impl Fragment {
    pub fn node_at(&self, path: &[usize]) -> Option<&Node> {
        let (first, rest) = path.split_first()?;
        let mut node = self.children.get(*first)?;
        for index in rest {
            node = match node {
                Node::Element(el) => el.children.get(*index)?,
                _ => return None,
            };
        }
        Some(node)
    }

    pub fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut Node> {
        let (first, rest) = path.split_first()?;
        let mut node = self.children.get_mut(*first)?;
        for index in rest {
            node = match node {
                Node::Element(el) => el.children.get_mut(*index)?,
                _ => return None,
            };
        }
        Some(node)
    }

    /// Children of the container at `path` (the root when empty).
    fn children_at_mut(&mut self, path: &[usize]) -> Option<&mut Vec<Node>> {
        if path.is_empty() {
            return Some(&mut self.children);
        }
        match self.node_at_mut(path)? {
            Node::Element(el) => Some(&mut el.children),
            _ => None,
        }
    }

    fn remove_at(&mut self, path: &[usize]) -> Option<Node> {
        let (index, parent) = path.split_last()?;
        let children = self.children_at_mut(parent)?;
        (*index < children.len()).then(|| children.remove(*index))
    }

    /// Paths of every leaf in document order (text, markers, childless elements).
    fn leaf_paths(&self) -> Vec<Vec<usize>> {
        fn walk(children: &[Node], prefix: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
            for (index, node) in children.iter().enumerate() {
                prefix.push(index);
                match node {
                    Node::Element(el) if !el.children.is_empty() => walk(&el.children, prefix, out),
                    _ => out.push(prefix.clone()),
                }
                prefix.pop();
            }
        }
        let mut out = Vec::new();
        walk(&self.children, &mut Vec::new(), &mut out);
        out
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Markers
// ────────────────────────────────────────────────────────────────────────────

/// Where a marker lands relative to the node a boundary points at.
enum Placement {
    Inside { offset: usize },
    Sibling { index: usize },
    Split { index: usize, byte: usize },
}

impl Fragment {
    pub fn new_marker(&mut self) -> MarkerId {
        self.next_marker += 1;
        MarkerId(self.next_marker)
    }

    /// Inserts a marker at `boundary`, splitting a text node when needed.
    ///
    /// Returns false when the boundary does not address a valid position.
    pub fn insert_marker(&mut self, boundary: &Boundary, id: MarkerId) -> bool {
        let Some((index, parent)) = boundary.path.split_last() else {
            if boundary.offset > self.children.len() {
                return false;
            }
            self.children.insert(boundary.offset, Node::Marker(id));
            return true;
        };

        let placement = match self.node_at(&boundary.path) {
            Some(Node::Element(el)) if !el.is_void() && boundary.offset <= el.children.len() => {
                Placement::Inside {
                    offset: boundary.offset,
                }
            }
            Some(Node::Text(text)) => {
                let len = text.chars().count();
                if boundary.offset > len {
                    return false;
                }
                if boundary.offset == 0 {
                    Placement::Sibling { index: *index }
                } else if boundary.offset == len {
                    Placement::Sibling { index: index + 1 }
                } else {
                    let byte = text
                        .char_indices()
                        .nth(boundary.offset)
                        .map_or(text.len(), |(byte, _)| byte);
                    Placement::Split {
                        index: *index,
                        byte,
                    }
                }
            }
            _ => return false,
        };

        match placement {
            Placement::Inside { offset } => match self.node_at_mut(&boundary.path) {
                Some(Node::Element(el)) => {
                    el.children.insert(offset, Node::Marker(id));
                    true
                }
                _ => false,
            },
            Placement::Sibling { index } => match self.children_at_mut(parent) {
                Some(children) => {
                    children.insert(index, Node::Marker(id));
                    true
                }
                None => false,
            },
            Placement::Split { index, byte } => {
                let Some(children) = self.children_at_mut(parent) else {
                    return false;
                };
                let tail = match children.get_mut(index) {
                    Some(Node::Text(text)) => text.split_off(byte),
                    _ => return false,
                };
                children.insert(index + 1, Node::Marker(id));
                children.insert(index + 2, Node::Text(tail));
                true
            }
        }
    }

    pub fn find_marker(&self, id: MarkerId) -> Option<Vec<usize>> {
        fn walk(children: &[Node], id: MarkerId, prefix: &mut Vec<usize>) -> bool {
            for (index, node) in children.iter().enumerate() {
                prefix.push(index);
                match node {
                    Node::Marker(marker) if *marker == id => return true,
                    Node::Element(el) if walk(&el.children, id, prefix) => return true,
                    _ => {}
                }
                prefix.pop();
            }
            false
        }
        let mut path = Vec::new();
        walk(&self.children, id, &mut path).then_some(path)
    }

    /// Removes a marker and returns the path it occupied.
    pub fn remove_marker(&mut self, id: MarkerId) -> Option<Vec<usize>> {
        let path = self.find_marker(id)?;
        self.remove_at(&path)?;
        Some(path)
    }

    /// Inserts `nodes` immediately before the marker, in its parent.
    pub fn insert_before_marker(&mut self, id: MarkerId, nodes: Vec<Node>) -> bool {
        let Some(path) = self.find_marker(id) else {
            return false;
        };
        let Some((index, parent)) = path.split_last() else {
            return false;
        };
        let Some(children) = self.children_at_mut(parent) else {
            return false;
        };
        for (offset, node) in nodes.into_iter().enumerate() {
            children.insert(index + offset, node);
        }
        true
    }

    /// Removes all content strictly between two markers.
    ///
    /// Elements only partially covered keep their shell; fully covered ones
    /// are dropped. Both markers stay in place.
    pub fn delete_between(&mut self, start: MarkerId, end: MarkerId) {
        #[derive(PartialEq)]
        enum Scan {
            Before,
            Inside,
            After,
        }

        fn prune(children: &mut Vec<Node>, start: MarkerId, end: MarkerId, scan: &mut Scan) {
            let mut i = 0;
            while i < children.len() && *scan != Scan::After {
                let remove = match &children[i] {
                    Node::Marker(id) if *id == start => {
                        *scan = Scan::Inside;
                        false
                    }
                    Node::Marker(id) if *id == end => {
                        *scan = Scan::After;
                        false
                    }
                    Node::Element(el)
                        if *scan == Scan::Inside
                            && !el.children.iter().any(|c| c.contains_marker(end)) =>
                    {
                        true
                    }
                    Node::Element(_) => false,
                    _ => *scan == Scan::Inside,
                };
                if remove {
                    children.remove(i);
                    continue;
                }
                if let Node::Element(el) = &mut children[i] {
                    prune(&mut el.children, start, end, scan);
                }
                i += 1;
            }
        }

        let mut scan = Scan::Before;
        prune(&mut self.children, start, end, &mut scan);
    }

    /// Deletes one character (or one void element) before the marker.
    ///
    /// Returns false when nothing precedes the marker.
    pub fn delete_before_marker(&mut self, id: MarkerId) -> bool {
        let leaves = self.leaf_paths();
        let Some(marker_at) = leaves
            .iter()
            .position(|path| matches!(self.node_at(path), Some(Node::Marker(m)) if *m == id))
        else {
            return false;
        };

        for path in leaves[..marker_at].iter().rev() {
            let remove_node = match self.node_at_mut(path) {
                Some(Node::Text(text)) if !text.is_empty() => {
                    text.pop();
                    Some(text.is_empty())
                }
                Some(Node::Element(el)) if el.is_void() => Some(true),
                _ => None,
            };
            if let Some(remove_node) = remove_node {
                if remove_node {
                    self.remove_at(path);
                }
                return true;
            }
        }
        false
    }

    /// Number of text characters preceding the marker in document order.
    pub fn text_offset_of_marker(&self, id: MarkerId) -> Option<usize> {
        fn walk(children: &[Node], id: MarkerId, offset: &mut usize) -> bool {
            for node in children {
                match node {
                    Node::Marker(marker) if *marker == id => return true,
                    Node::Text(text) => *offset += text.chars().count(),
                    Node::Element(el) if walk(&el.children, id, offset) => return true,
                    _ => {}
                }
            }
            false
        }
        let mut offset = 0;
        walk(&self.children, id, &mut offset).then_some(offset)
    }

    /// Inserts a marker after `offset` text characters, clamped to the end.
    pub fn insert_marker_at_text_offset(&mut self, offset: usize, id: MarkerId) -> bool {
        let mut remaining = offset;
        for path in self.leaf_paths() {
            if let Some(Node::Text(text)) = self.node_at(&path) {
                let len = text.chars().count();
                if remaining <= len {
                    return self.insert_marker(
                        &Boundary {
                            path,
                            offset: remaining,
                        },
                        id,
                    );
                }
                remaining -= len;
            }
        }
        let end = self.end_boundary();
        self.insert_marker(&end, id)
    }
}

/// Drops trailing line breaks (and whitespace after them), descending into
/// the last element.
pub fn strip_trailing_breaks(children: &mut Vec<Node>) {
    loop {
        let trailing = match children.last() {
            Some(Node::Element(el)) => el.tag == "br",
            Some(Node::Text(text)) => text.trim().is_empty(),
            _ => false,
        };
        if !trailing {
            break;
        }
        children.pop();
    }
    if let Some(Node::Element(el)) = children.last_mut() {
        if !el.is_void() {
            strip_trailing_breaks(&mut el.children);
        }
    }
}
