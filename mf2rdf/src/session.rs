use oxiri::Iri;
use oxrdf::{BlankNode, NamedNode};
use tracing::{debug, trace};

use crate::Error;
use crate::closer::DEFAULT_INLINE_MARKER;
use crate::dom::{Document, NodeRef};
use crate::include::resolve_includes;
use crate::locate::find_by_tag;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    /// Tag whose self-closed form is rewritten before parsing.
    pub inline_marker: String,
    pub resolve_includes: bool,
    /// Emit nesting triples linking entities found inside other entities.
    pub nesting: bool,
    /// Emit the document host as a `domain` of every entity root.
    pub domain_triples: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            inline_marker: DEFAULT_INLINE_MARKER.to_owned(),
            resolve_includes: true,
            nesting: true,
            domain_triples: false,
        }
    }
}

impl Options {
    pub fn with_inline_marker(mut self, marker: impl Into<String>) -> Self {
        self.inline_marker = marker.into();
        self
    }

    pub fn with_includes(mut self, resolve_includes: bool) -> Self {
        self.resolve_includes = resolve_includes;
        self
    }

    pub fn with_nesting(mut self, nesting: bool) -> Self {
        self.nesting = nesting;
        self
    }

    pub fn with_domain_triples(mut self, domain_triples: bool) -> Self {
        self.domain_triples = domain_triples;
        self
    }
}

/// Everything extractors share while processing one document.
///
/// A session owns its tree; nothing in it is shared with other documents.
pub struct Session {
    document: Document,
    document_uri: Iri<String>,
    base: Iri<String>,
    options: Options,
}

impl Session {
    /// Validates `document_uri`, applies `<base href>` and, if enabled,
    /// materializes include references.
    pub fn new(mut document: Document, document_uri: &str, options: Options) -> Result<Self, Error> {
        let document_uri = parse_document_uri(document_uri)?;

        let base = match base_href(&document) {
            Some(href) => {
                let base = document_uri
                    .resolve(href)
                    .map_err(|source| Error::UnresolvableBaseUri {
                        source,
                        uri: href.to_owned(),
                    })?;
                trace!("<base> found: {base}");
                base
            }
            None => document_uri.clone(),
        };

        if options.resolve_includes {
            let included = resolve_includes(&mut document)?;
            if included > 0 {
                debug!(included, "materialized include references");
            }
        }

        Ok(Self {
            document,
            document_uri,
            base,
            options,
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn root(&self) -> NodeRef<'_> {
        self.document.root()
    }

    pub fn document_uri(&self) -> &str {
        self.document_uri.as_str()
    }

    /// The IRI relative links resolve against.
    pub fn base(&self) -> &Iri<String> {
        &self.base
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn identity_for(&self, node: NodeRef<'_>) -> Result<BlankNode, Error> {
        crate::identity::identity_for(self.document_uri(), node)
    }

    /// Resolves `link` against the base, or `None` if it is not a valid reference.
    pub fn resolve_uri(&self, link: &str) -> Option<NamedNode> {
        match self.base.resolve(link.trim()) {
            Ok(iri) => Some(NamedNode::new_unchecked(iri.into_inner())),
            Err(err) => {
                debug!(%link, %err, "unresolvable link");
                None
            }
        }
    }
}

fn parse_document_uri(uri: &str) -> Result<Iri<String>, Error> {
    let cleaned = uri.trim().replace(' ', "%20");
    Iri::parse(cleaned).map_err(|source| Error::UnresolvableBaseUri {
        source,
        uri: uri.to_owned(),
    })
}

fn base_href(document: &Document) -> Option<&str> {
    find_by_tag(document.root(), "head")
        .into_iter()
        .flat_map(|head| find_by_tag(head, "base"))
        .find_map(|base| base.attr("href"))
}
