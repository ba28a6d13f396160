//! Consolidation of entities found inside other entities.
//!
//! When an extractor reads a property from a node that lies on the path to an
//! entity root recognized by another extractor, the two descriptions overlap.
//! Instead of dropping either, the overlap is made explicit:
//!
//! ```text
//! N        any23:nesting_original    property
//! N        any23:nesting_structured  (property object, or the nested root)
//! subject  any23:nesting             N
//! ```

use std::collections::HashMap;

use indexmap::IndexSet;
use itertools::iproduct;
use oxrdf::{Literal, Triple};
use tracing::trace;
use url::Url;

use crate::extractor::Extractor;
use crate::identity::hashed_blank_node;
use crate::result::{Extraction, ExtractionContext, PropertyPath, ResourceRoot};
use crate::session::Session;
use crate::sindice_vocab;

pub const CONSOLIDATION_EXTRACTOR: &str = "consolidation-extractor";

pub fn consolidation_context(session: &Session) -> ExtractionContext {
    ExtractionContext::new(CONSOLIDATION_EXTRACTOR, session.document_uri(), "consolidation")
}

/// Consolidation triples for the extractions of one document, without duplicates.
pub fn consolidate(
    session: &Session,
    extractions: &[Extraction],
    extractors: &[&dyn Extractor],
) -> Vec<Triple> {
    let roots = extractions
        .iter()
        .flat_map(|e| e.resource_roots())
        .collect::<Vec<_>>();

    let mut triples = IndexSet::new();

    if session.options().nesting {
        let includes = extractors
            .iter()
            .map(|e| (e.name(), e.includes()))
            .collect::<HashMap<_, _>>();
        let paths = extractions
            .iter()
            .flat_map(|e| e.property_paths())
            .collect::<Vec<_>>();

        triples.extend(nesting_triples(&roots, &paths, |including, included| {
            includes
                .get(including)
                .is_some_and(|names| names.iter().any(|name| *name == included))
        }));
    }

    if session.options().domain_triples {
        if let Some(host) = host_of(session.document_uri()) {
            triples.extend(roots.iter().map(|root| {
                Triple::new(
                    root.root.clone(),
                    sindice_vocab::DOMAIN,
                    Literal::new_simple_literal(&host),
                )
            }));
        }
    }

    triples.into_iter().collect()
}

/// Nesting triples for every root lying at or below a property path produced
/// by a different extractor.
///
/// `includes(a, b)` tells whether extractor `a` already links entities of
/// extractor `b` itself; such pairs are skipped.
pub fn nesting_triples(
    roots: &[&ResourceRoot],
    paths: &[&PropertyPath],
    includes: impl Fn(&str, &str) -> bool,
) -> Vec<Triple> {
    let mut triples = Vec::new();
    for (root, path) in iproduct!(roots, paths) {
        if root.extractor == path.extractor || includes(&path.extractor, &root.extractor) {
            continue;
        }

        if !root.path.starts_with(&path.path) {
            continue;
        }

        trace!(root = %root.path, property = %path.property, "nested entity");

        let seed = match &path.object {
            Some(object) => format!("{}{}", path.property.as_str(), object.as_str()),
            None => path.property.as_str().to_owned(),
        };
        let nesting = hashed_blank_node(&seed);
        let structured = path.object.clone().unwrap_or_else(|| root.root.clone());

        triples.push(Triple::new(
            nesting.clone(),
            sindice_vocab::NESTING_ORIGINAL,
            path.property.clone(),
        ));
        triples.push(Triple::new(
            nesting.clone(),
            sindice_vocab::NESTING_STRUCTURED,
            structured,
        ));
        triples.push(Triple::new(
            path.subject.clone(),
            sindice_vocab::NESTING,
            nesting,
        ));
    }

    triples
}

/// The host of `uri`, without user info or port.
fn host_of(uri: &str) -> Option<String> {
    Url::parse(uri).ok()?.host_str().map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locate::find_by_marker;
    use crate::normalize::normalize_str;
    use crate::path::canonical_path;
    use oxrdf::{BlankNode, NamedNode};
    use rstest::rstest;

    fn fixture() -> (Vec<ResourceRoot>, Vec<PropertyPath>) {
        let doc = normalize_str(
            r#"<div class="vevent"><div class="location"><div class="geo">x</div></div></div>"#,
        )
        .unwrap();
        let path_of = |marker| canonical_path(find_by_marker(doc.root(), marker, None)[0]).unwrap();

        let event = BlankNode::new_unchecked("event");
        let geo = BlankNode::new_unchecked("geo");
        let roots = vec![
            ResourceRoot {
                path: path_of("vevent"),
                root: event.clone(),
                extractor: "hcalendar".to_owned(),
            },
            ResourceRoot {
                path: path_of("geo"),
                root: geo,
                extractor: "geo".to_owned(),
            },
        ];
        let paths = vec![PropertyPath {
            path: path_of("location"),
            subject: event.into(),
            property: NamedNode::new_unchecked("http://e.org/location"),
            object: None,
            extractor: "hcalendar".to_owned(),
        }];
        (roots, paths)
    }

    #[test]
    fn links_nested_root_to_enclosing_property() {
        let (roots, paths) = fixture();
        let roots = roots.iter().collect::<Vec<_>>();
        let paths = paths.iter().collect::<Vec<_>>();

        let triples = nesting_triples(&roots, &paths, |_, _| false);
        let nesting = hashed_blank_node("http://e.org/location");
        pretty_assertions::assert_eq!(
            triples,
            vec![
                Triple::new(
                    nesting.clone(),
                    sindice_vocab::NESTING_ORIGINAL,
                    NamedNode::new_unchecked("http://e.org/location"),
                ),
                Triple::new(
                    nesting.clone(),
                    sindice_vocab::NESTING_STRUCTURED,
                    BlankNode::new_unchecked("geo"),
                ),
                Triple::new(
                    BlankNode::new_unchecked("event"),
                    sindice_vocab::NESTING,
                    nesting,
                ),
            ]
        );
    }

    #[test]
    fn declared_inclusions_are_skipped() {
        let (roots, paths) = fixture();
        let roots = roots.iter().collect::<Vec<_>>();
        let paths = paths.iter().collect::<Vec<_>>();

        let triples = nesting_triples(&roots, &paths, |including, included| {
            including == "hcalendar" && included == "geo"
        });
        assert!(triples.is_empty());
    }

    #[rstest]
    #[case("http://e.org/doc", Some("e.org"))]
    #[case("http://user:pw@e.org:8080/doc", Some("e.org"))]
    #[case("http://[::1]:80/", Some("[::1]"))]
    #[case("urn:isbn:0451450523", None)]
    fn host_of_document_uri(#[case] uri: &str, #[case] expected: Option<&str>) {
        assert_eq!(host_of(uri).as_deref(), expected);
    }
}
