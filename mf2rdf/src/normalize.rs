//! Tolerant normalization of tag soup into a [`Document`].
//!
//! Markup defects are never errors: the html5ever tree builder behind
//! `scraper` closes unclosed tags and synthesizes missing structural
//! elements, and its complaints are only logged.

use std::io::Read;

use scraper::{ElementRef, Html, Node};
use tracing::{debug, trace, warn};

use crate::Error;
use crate::closer::{DEFAULT_INLINE_MARKER, InlineTagCloser};
use crate::dom::{Document, Element, NodeKind};

/// Normalizes a byte stream, closing self-closed `<span/>` tags first.
///
/// Only an unrecoverable read error fails.
pub fn normalize(input: impl Read, encoding: Option<&str>) -> Result<Document, Error> {
    normalize_with_marker(input, encoding, DEFAULT_INLINE_MARKER)
}

pub fn normalize_with_marker(
    input: impl Read,
    encoding: Option<&str>,
    inline_marker: &str,
) -> Result<Document, Error> {
    let mut bytes = Vec::new();
    InlineTagCloser::new(input, inline_marker).read_to_end(&mut bytes)?;
    let text = decode(&bytes, encoding);
    from_html(&Html::parse_document(&text))
}

pub fn normalize_str(input: &str) -> Result<Document, Error> {
    normalize(input.as_bytes(), None)
}

fn is_utf8_label(label: &str) -> bool {
    let label = label.trim();
    label.eq_ignore_ascii_case("utf-8") || label.eq_ignore_ascii_case("utf8")
}

fn decode(bytes: &[u8], encoding: Option<&str>) -> String {
    if let Some(label) = encoding.filter(|label| !is_utf8_label(label)) {
        warn!(encoding = label, "unsupported declared encoding, decoding as UTF-8");
    }

    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

fn convert_element(element: &scraper::node::Element) -> Element {
    element
        .attrs()
        .fold(Element::new(element.name()), |converted, (name, value)| {
            converted.with_attr(name, value)
        })
}

/// Copies the parsed tree into a [`Document`].
///
/// Uses an explicit stack: tag soup can nest deeper than the call stack allows.
fn from_html(html: &Html) -> Result<Document, Error> {
    for err in html.errors.iter() {
        debug!(%err, "repaired markup defect");
    }

    let mut document = Document::new();
    let html_root = html.root_element();
    let html_id = document.append_child(
        document.root_id(),
        NodeKind::Element(convert_element(html_root.value())),
    )?;

    let mut stack = vec![(html_root, html_id)];
    while let Some((element, id)) = stack.pop() {
        let mut nested = Vec::new();
        for child in element.children() {
            match child.value() {
                Node::Element(el) => {
                    let child_id =
                        document.append_child(id, NodeKind::Element(convert_element(el)))?;
                    if let Some(child) = ElementRef::wrap(child) {
                        nested.push((child, child_id));
                    }
                }
                Node::Text(text) => {
                    document.append_child(id, NodeKind::Text((**text).to_owned()))?;
                }
                Node::Comment(comment) => {
                    document.append_child(id, NodeKind::Comment((**comment).to_owned()))?;
                }
                _ => {}
            }
        }

        stack.extend(nested.into_iter().rev());
    }

    trace!(nodes = document.len(), "normalized document");
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locate::find_by_tag;

    fn body_html(input: &str) -> String {
        let doc = normalize_str(input).unwrap();
        find_by_tag(doc.root(), "body")
            .first()
            .map(|body| body.to_html())
            .unwrap_or_default()
    }

    #[test]
    fn synthesizes_missing_structure() {
        let doc = normalize_str("<p>unclosed <b>bold").unwrap();
        insta::assert_snapshot!(doc.to_html(), @"<html><head></head><body><p>unclosed <b>bold</b></p></body></html>");
    }

    #[test]
    fn self_closed_span_does_not_swallow_siblings() {
        insta::assert_snapshot!(
            body_html("<p><span class=\"a\"/>tail</p>"),
            @r#"<body><p><span class="a"></span>tail</p></body>"#
        );
    }

    #[test]
    fn attributes_keep_source_order() {
        let doc = normalize_str(r#"<p title="t" id="a" class="b" data-x="1">x</p>"#).unwrap();
        let p = find_by_tag(doc.root(), "p")[0];
        let names = p
            .as_element()
            .map(|e| e.attrs().map(|(name, _)| name).collect::<Vec<_>>())
            .unwrap_or_default();
        assert_eq!(names, vec!["title", "id", "class", "data-x"]);
    }

    #[test]
    fn quoted_span_is_kept_as_attribute_text() {
        let doc = normalize_str(r#"<a title="<span/>">x</a>"#).unwrap();
        let a = find_by_tag(doc.root(), "a");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].attr("title"), Some("<span/>"));
        assert_eq!(a[0].text_content(), "x");
    }

    #[test]
    fn names_are_normalized_to_lowercase() {
        let doc = normalize_str(r#"<DIV CLASS="VCard"><SPAN Class="fn">x</SPAN></DIV>"#).unwrap();
        let div = find_by_tag(doc.root(), "div");
        assert_eq!(div.len(), 1);
        assert_eq!(div[0].attr("class"), Some("VCard"));
        assert_eq!(find_by_tag(doc.root(), "span").len(), 1);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let doc = normalize(&b"<p>caf\xE9</p>"[..], Some("iso-8859-1")).unwrap();
        let p = find_by_tag(doc.root(), "p");
        assert_eq!(p[0].text_content(), "caf\u{FFFD}");
    }

    #[test]
    fn exactly_one_root() {
        let doc = normalize_str("").unwrap();
        assert_eq!(doc.root().parent(), None);
        assert_eq!(doc.root().child_ids().len(), 1);
        assert!(
            doc.root()
                .descendants()
                .skip(1)
                .all(|n| n.parent().is_some())
        );
    }
}
