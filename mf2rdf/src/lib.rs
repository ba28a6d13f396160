//! Microformat extraction substrate.
//!
//! Turns tag-soup HTML into a navigable [`Document`], gives every element a
//! canonical positional address and a deterministic blank-node identity, and
//! composes nested extraction results so that independently written grammar
//! modules ([`Extractor`]s) agree on entity identity without coordinating.

use std::io::Read;

pub mod batch;
pub mod closer;
pub mod dom;
pub mod extractor;
pub mod field;
pub mod identity;
pub mod include;
pub mod locate;
pub mod nesting;
pub mod normalize;
pub mod path;
pub mod result;
pub mod session;

pub use batch::{Source, process_batch};
pub use dom::{Document, Element, NodeId, NodeKind, NodeRef};
pub use extractor::{EntityContext, Extractor, Report, extract, run_extractor};
pub use field::{FieldValue, read_field, read_url_field};
pub use identity::identity_for;
pub use locate::{find_by_marker, has_marker};
pub use normalize::{normalize, normalize_str};
pub use path::{CanonicalPath, PathSegment, canonical_path, index_in_parent};
pub use result::{
    Extraction, ExtractionContext, ExtractionResult, Issue, IssueLevel, PropertyPath,
    ResourceRoot, SubResultId, TripleSink,
};
pub use session::{Options, Session};

/// Normalizes `input`, opens a session for it and runs every extractor over it.
pub fn process(
    input: impl Read,
    encoding: Option<&str>,
    document_uri: &str,
    extractors: &[&dyn Extractor],
    options: Options,
) -> Result<Report, Error> {
    let document = normalize::normalize_with_marker(input, encoding, &options.inline_marker)?;
    let session = Session::new(document, document_uri, options)?;
    extract(&session, extractors)
}

#[derive(derive_more::Error, derive_more::Display, derive_more::From, Debug)]
pub enum Error {
    #[display("I/O error while reading the document")]
    Io(std::io::Error),

    #[display("Unresolvable base URI: `{uri}`")]
    #[from(skip)]
    UnresolvableBaseUri {
        source: oxiri::IriParseError,
        uri: String,
    },

    #[display("Internal consistency error: {message}")]
    #[from(skip)]
    InternalConsistency { message: String },

    #[display("Duplicate sub-result context id: {id}")]
    #[from(skip)]
    DuplicateContext { id: String },

    #[display("Sub-results must close innermost first: expected {expected}, found {found}")]
    #[from(skip)]
    SubResultOrder {
        expected: SubResultId,
        found: SubResultId,
    },

    #[display("Sub-result {id} is not open")]
    #[from(skip)]
    SubResultNotOpen { id: SubResultId },

    #[display("Extraction finished with {open} sub-result(s) still open")]
    #[from(skip)]
    UnclosedSubResults { open: usize },
}

impl Error {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Error::InternalConsistency {
            message: message.into(),
        }
    }
}

pub mod sindice_vocab {
    pub static NESTING: oxrdf::NamedNodeRef =
        oxrdf::NamedNodeRef::new_unchecked("http://vocab.sindice.net/any23#nesting");

    pub static NESTING_ORIGINAL: oxrdf::NamedNodeRef =
        oxrdf::NamedNodeRef::new_unchecked("http://vocab.sindice.net/any23#nesting_original");

    pub static NESTING_STRUCTURED: oxrdf::NamedNodeRef =
        oxrdf::NamedNodeRef::new_unchecked("http://vocab.sindice.net/any23#nesting_structured");

    pub static DOMAIN: oxrdf::NamedNodeRef =
        oxrdf::NamedNodeRef::new_unchecked("http://vocab.sindice.net/any23#domain");
}
