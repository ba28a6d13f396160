//! Reading scalar and link-shaped field values from marked nodes.
//!
//! A missing attribute is never an error: the value degrades to `""`.

use tracing::trace;

use crate::dom::NodeRef;
use crate::locate::{find_by_marker, has_attribute_token, read_attribute};

pub const VALUE_MARKER: &str = "value";

/// A value read from the tree, along with the node it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldValue<'a> {
    pub value: String,
    pub source: NodeRef<'a>,
}

impl<'a> FieldValue<'a> {
    fn new(value: impl Into<String>, source: NodeRef<'a>) -> Self {
        Self {
            value: value.into(),
            source,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

/// Reads the text value of `node`.
///
/// In order of precedence:
/// 1. the concatenated text of nodes marked `value`,
/// 2. `abbr[title]` yields the title, `a[rel~=tag]` the last segment of its
///    `href`, other links their text, `img` and `area` their `alt`,
/// 3. the trimmed text content.
pub fn read_field(node: NodeRef<'_>) -> FieldValue<'_> {
    let values = find_by_marker(node, VALUE_MARKER, None);
    if !values.is_empty() {
        let joined = values.iter().map(|v| v.text_content()).collect::<String>();
        return FieldValue::new(joined.trim(), node);
    }

    let value = match node.node_name() {
        "abbr" if node.attr("title").is_some() => read_attribute(node, "title").to_owned(),
        "a" if has_attribute_token(node, "rel", "tag") => {
            rel_tag(read_attribute(node, "href")).to_owned()
        }
        "img" | "area" => read_attribute(node, "alt").to_owned(),
        _ => node.text_content().trim().to_owned(),
    };

    FieldValue::new(value, node)
}

/// Reads the link-shaped value of `node`.
pub fn read_url_field(node: NodeRef<'_>) -> FieldValue<'_> {
    let attr = match node.node_name() {
        "a" | "area" => "href",
        "abbr" => "title",
        "img" => "src",
        "object" => "data",
        _ => return FieldValue::new(node.text_content().trim(), node),
    };

    if node.attr(attr).is_none() {
        trace!(node = ?node, attr, "link attribute missing");
    }

    FieldValue::new(read_attribute(node, attr), node)
}

/// The tag named by a rel-tag `href`: its last path segment, without query
/// or fragment.
pub fn rel_tag(href: &str) -> &str {
    let path = href.split(['#', '?']).next().unwrap_or_default();
    let path = path.strip_suffix('/').unwrap_or(path);
    path.rsplit('/').next().unwrap_or(path)
}

/// Text content with runs of whitespace collapsed to one space.
pub fn read_node_content(node: NodeRef<'_>) -> String {
    node.text_content()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The text value of the first node at or below `root` marked `marker`.
pub fn singular_text_field<'a>(root: NodeRef<'a>, marker: &str) -> Option<FieldValue<'a>> {
    find_by_marker(root, marker, None).first().map(|n| read_field(*n))
}

/// Text values of every node at or below `root` marked `marker`, in document order.
pub fn plural_text_field<'a>(root: NodeRef<'a>, marker: &str) -> Vec<FieldValue<'a>> {
    find_by_marker(root, marker, None)
        .into_iter()
        .map(read_field)
        .collect()
}

pub fn singular_url_field<'a>(root: NodeRef<'a>, marker: &str) -> Option<FieldValue<'a>> {
    find_by_marker(root, marker, None).first().map(|n| read_url_field(*n))
}

pub fn plural_url_field<'a>(root: NodeRef<'a>, marker: &str) -> Vec<FieldValue<'a>> {
    find_by_marker(root, marker, None)
        .into_iter()
        .map(read_url_field)
        .collect()
}
