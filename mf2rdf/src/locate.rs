//! Finding marked nodes.
//!
//! A marker is a whole, case-insensitive token of the `class` attribute:
//! `class="bar foo"` carries `foo`, `class="foob"` does not.

use crate::dom::NodeRef;

pub const MARKER_ATTRIBUTE: &str = "class";

/// `true` if the whitespace-separated value of `attr` contains `token`.
pub fn has_attribute_token(node: NodeRef<'_>, attr: &str, token: &str) -> bool {
    node.attr(attr).is_some_and(|value| {
        value
            .split_ascii_whitespace()
            .any(|t| t.eq_ignore_ascii_case(token))
    })
}

pub fn has_marker(node: NodeRef<'_>, marker: &str) -> bool {
    has_attribute_token(node, MARKER_ATTRIBUTE, marker)
}

/// All nodes at or below `root` carrying `marker`, in document order.
///
/// With a `tag` filter only elements with that name are returned.
pub fn find_by_marker<'a>(root: NodeRef<'a>, marker: &str, tag: Option<&str>) -> Vec<NodeRef<'a>> {
    root.descendants()
        .filter(|node| tag.is_none_or(|tag| node.node_name().eq_ignore_ascii_case(tag)))
        .filter(|node| has_marker(*node, marker))
        .collect()
}

pub fn find_first_by_marker<'a>(root: NodeRef<'a>, marker: &str) -> Option<NodeRef<'a>> {
    root.descendants().find(|node| has_marker(*node, marker))
}

pub fn find_by_tag<'a>(root: NodeRef<'a>, tag: &str) -> Vec<NodeRef<'a>> {
    root.descendants()
        .filter(|node| node.is_element() && node.node_name().eq_ignore_ascii_case(tag))
        .collect()
}

/// Elements at or below `root` that carry `attr`, optionally with exactly `value`.
pub fn find_by_attribute<'a>(
    root: NodeRef<'a>,
    attr: &str,
    value: Option<&str>,
) -> Vec<NodeRef<'a>> {
    root.descendants()
        .filter(|node| match (node.attr(attr), value) {
            (Some(actual), Some(expected)) => actual == expected,
            (Some(_), None) => true,
            (None, _) => false,
        })
        .collect()
}

/// The value of `attr`, or `""` when it is absent.
pub fn read_attribute<'a>(node: NodeRef<'a>, attr: &str) -> &'a str {
    node.attr(attr).unwrap_or_default()
}
