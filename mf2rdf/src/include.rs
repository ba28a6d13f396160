//! Materialization of the include pattern.
//!
//! An element marked `include` whose link field points at `#id` inherits a
//! copy of the element with that id:
//!
//! ```html
//! <div class="vcard"><a class="include" href="#org"></a></div>
//! ...
//! <span id="org" class="org">Example Inc.</span>
//! ```
//!
//! A table cell naming header cells in its `headers` attribute inherits copies
//! of those cells in the same way. Both are resolved in one pass before any
//! extraction runs. Every copy is taken from the tree as it was before the
//! pass, so chains are not followed: an element including `#y` gets `y` as
//! written, not what `y` itself includes.

use tracing::{debug, trace};

use crate::Error;
use crate::dom::{Document, NodeId};
use crate::field::read_url_field;
use crate::locate::{MARKER_ATTRIBUTE, find_by_attribute, find_by_marker};

pub const INCLUDE_MARKER: &str = "include";

/// Resolves every include reference of `document` and returns how many
/// subtrees were copied.
///
/// Each referencing element loses its marker before anything is copied, and
/// copies come from a snapshot of the tree, so the result does not depend on
/// document order and self-references and cycles terminate.
pub fn resolve_includes(document: &mut Document) -> Result<usize, Error> {
    let mut copies = Vec::new();

    let cells = find_by_attribute(document.root(), "headers", None)
        .into_iter()
        .filter(|cell| cell.node_name() == "td")
        .map(|cell| {
            let targets = cell
                .attr("headers")
                .unwrap_or_default()
                .split_ascii_whitespace()
                .filter_map(|id| document.element_by_id(id))
                .map(|header| header.id())
                .collect::<Vec<_>>();
            (cell.id(), targets)
        })
        .collect::<Vec<_>>();

    for (cell, targets) in cells {
        if !targets.is_empty() {
            document.remove_attr(cell, "headers");
        }
        copies.extend(targets.into_iter().map(|target| (cell, target)));
    }

    let includes = find_by_marker(document.root(), INCLUDE_MARKER, None)
        .into_iter()
        .map(|node| {
            let link = read_url_field(node).value;
            let target = link
                .split_once('#')
                .and_then(|(_, id)| document.element_by_id(id))
                .map(|target| target.id());
            if target.is_none() {
                debug!(%link, "include target not found");
            }
            (node.id(), target)
        })
        .collect::<Vec<_>>();

    for (node, _) in &includes {
        strip_include_marker(document, *node);
    }
    copies.extend(
        includes
            .into_iter()
            .filter_map(|(node, target)| Some((node, target?))),
    );

    let snapshot = document.clone();
    for (parent, target) in &copies {
        let copy = document.append_subtree_from(&snapshot, *target, *parent)?;
        trace!(%parent, %target, %copy, "included subtree");
    }

    Ok(copies.len())
}

fn strip_include_marker(document: &mut Document, node: NodeId) {
    let Some(class) = document.get(node).and_then(|n| n.attr(MARKER_ATTRIBUTE)) else {
        return;
    };

    let remaining = class
        .split_ascii_whitespace()
        .filter(|token| !token.eq_ignore_ascii_case(INCLUDE_MARKER))
        .collect::<Vec<_>>()
        .join(" ");

    if remaining.is_empty() {
        document.remove_attr(node, MARKER_ATTRIBUTE);
    } else {
        document.set_attr(node, MARKER_ATTRIBUTE, remaining);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locate::{find_by_tag, find_first_by_marker, has_marker};
    use crate::normalize::normalize_str;
    use rstest::rstest;

    #[test]
    fn copies_referenced_subtree_and_strips_marker() {
        let mut doc = normalize_str(
            r##"<div class="vcard"><a class="include url" href="#org">x</a></div><p id="org" class="org">Example</p>"##,
        )
        .unwrap();

        assert_eq!(resolve_includes(&mut doc).unwrap(), 1);

        let vcard = find_first_by_marker(doc.root(), "vcard").unwrap();
        let link = find_by_tag(vcard, "a")[0];
        assert!(!has_marker(link, INCLUDE_MARKER));
        assert!(has_marker(link, "url"));
        insta::assert_snapshot!(
            vcard.to_html(),
            @r##"<div class="vcard"><a class="url" href="#org">x<p id="org" class="org">Example</p></a></div>"##
        );
    }

    #[test]
    fn self_reference_terminates() {
        let mut doc =
            normalize_str(r##"<object id="me" class="include" data="#me"><b>b</b></object>"##)
                .unwrap();
        assert_eq!(resolve_includes(&mut doc).unwrap(), 1);

        let object = find_by_tag(doc.root(), "object");
        assert_eq!(object.len(), 2);
        assert_eq!(object[0].attr("class"), None);
        assert_eq!(find_by_tag(doc.root(), "b").len(), 2);

        assert_eq!(resolve_includes(&mut doc).unwrap(), 0);
    }

    #[rstest]
    #[case::including_first(
        r##"<div id="x"><a class="include" href="#y">x</a></div><div id="y"><a class="include" href="#w">y</a></div><b id="w">w</b>"##
    )]
    #[case::included_first(
        r##"<div id="y"><a class="include" href="#w">y</a></div><div id="x"><a class="include" href="#y">x</a></div><b id="w">w</b>"##
    )]
    fn chains_do_not_depend_on_document_order(#[case] html: &str) {
        let mut doc = normalize_str(html).unwrap();
        assert_eq!(resolve_includes(&mut doc).unwrap(), 2);

        let x = doc.element_by_id("x").unwrap();
        assert_eq!(find_by_tag(x, "b").len(), 0);
        assert_eq!(find_by_tag(x, "div").len(), 2);
        assert_eq!(find_by_tag(doc.root(), "b").len(), 2);
    }

    #[test]
    fn missing_target_only_strips_marker() {
        let mut doc = normalize_str(r##"<a class="include" href="#nowhere">x</a>"##).unwrap();
        assert_eq!(resolve_includes(&mut doc).unwrap(), 0);
        assert_eq!(find_by_tag(doc.root(), "a")[0].attr("class"), None);
    }

    #[test]
    fn table_cells_inherit_their_headers() {
        let mut doc = normalize_str(
            r#"<table><tr><th id="h1" class="org">Acme</th><th id="h2">Role</th></tr>
               <tr><td class="vcard" headers="h1 h2 missing"><span class="fn">Jo</span></td></tr></table>"#,
        )
        .unwrap();

        assert_eq!(resolve_includes(&mut doc).unwrap(), 2);
        let cell = find_by_tag(doc.root(), "td")[0];
        assert_eq!(cell.attr("headers"), None);
        assert_eq!(find_by_tag(cell, "th").len(), 2);
        assert_eq!(find_by_marker(cell, "org", None).len(), 1);
    }
}
