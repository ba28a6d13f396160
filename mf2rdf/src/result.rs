//! Nested extraction results.
//!
//! An [`ExtractionResult`] is a stack of frames. The bottom frame belongs to
//! the extractor run itself and is never closed; every discovered entity opens
//! a child frame on top of it. Output always goes to the top frame, and a
//! child that closes is folded into its parent and cannot be written again.
//! Children close strictly innermost first.

use std::collections::HashSet;

use itertools::Itertools;
use oxrdf::{BlankNode, Graph, NamedNode, NamedOrBlankNode, Triple, TripleRef};
use tracing::{debug, trace};

use crate::Error;
use crate::identity::digest_hex;
use crate::path::CanonicalPath;

pub const ROOT_CONTEXT_ID: &str = "root-extraction-result-id";

/// Who produced a group of triples, and for which document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExtractionContext {
    extractor_name: String,
    document_uri: String,
    unique_id: String,
}

impl ExtractionContext {
    pub fn new(extractor_name: &str, document_uri: &str, local_id: &str) -> Self {
        Self {
            extractor_name: extractor_name.to_owned(),
            document_uri: document_uri.to_owned(),
            unique_id: digest_hex(&format!("{extractor_name}#{document_uri}#{local_id}")),
        }
    }

    pub fn extractor_name(&self) -> &str {
        &self.extractor_name
    }

    pub fn document_uri(&self) -> &str {
        &self.document_uri
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, derive_more::Display)]
#[display("#{_0}")]
pub struct SubResultId(usize);

impl SubResultId {
    pub const ROOT: SubResultId = SubResultId(0);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, derive_more::Display)]
pub enum IssueLevel {
    Warning,
    Error,
    Fatal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Issue {
    pub level: IssueLevel,
    pub message: String,
}

/// A tree position recognized as an entity root by an extractor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceRoot {
    pub path: CanonicalPath,
    pub root: BlankNode,
    pub extractor: String,
}

/// Provenance of one emitted triple: the path of the node it was read from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PropertyPath {
    pub path: CanonicalPath,
    pub subject: NamedOrBlankNode,
    pub property: NamedNode,
    pub object: Option<BlankNode>,
    pub extractor: String,
}

#[derive(Default)]
struct Frame {
    id: SubResultId,
    context: usize,
    triples: Vec<(usize, Triple)>,
    resource_roots: Vec<ResourceRoot>,
    property_paths: Vec<PropertyPath>,
    issues: Vec<Issue>,
}

impl Frame {
    fn absorb(&mut self, child: Frame) {
        self.triples.extend(child.triples);
        self.resource_roots.extend(child.resource_roots);
        self.property_paths.extend(child.property_paths);
        self.issues.extend(child.issues);
    }
}

pub struct ExtractionResult {
    contexts: Vec<ExtractionContext>,
    used_ids: HashSet<String>,
    frames: Vec<Frame>,
    next_id: usize,
    namespaces: Vec<(String, String)>,
}

impl ExtractionResult {
    pub fn new(extractor_name: &str, document_uri: &str) -> Self {
        Self {
            contexts: vec![ExtractionContext::new(
                extractor_name,
                document_uri,
                ROOT_CONTEXT_ID,
            )],
            used_ids: HashSet::from([ROOT_CONTEXT_ID.to_owned()]),
            frames: vec![Frame::default()],
            next_id: 1,
            namespaces: Vec::new(),
        }
    }

    /// The context of the innermost open (sub-)result.
    pub fn context(&self) -> &ExtractionContext {
        &self.contexts[self.top().context]
    }

    pub fn root_context(&self) -> &ExtractionContext {
        &self.contexts[0]
    }

    /// The innermost open (sub-)result.
    pub fn current(&self) -> SubResultId {
        self.top().id
    }

    /// Number of open children, the root frame excluded.
    pub fn open_sub_results(&self) -> usize {
        self.frames.len() - 1
    }

    fn top(&self) -> &Frame {
        // the root frame is never popped
        &self.frames[self.frames.len() - 1]
    }

    fn top_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Opens a child of the innermost open result.
    ///
    /// `local_id` names the child within this result and may be used once.
    pub fn open_sub_result(&mut self, local_id: &str) -> Result<SubResultId, Error> {
        if !self.used_ids.insert(local_id.to_owned()) {
            return Err(Error::DuplicateContext {
                id: local_id.to_owned(),
            });
        }

        let root = self.root_context();
        let context = ExtractionContext::new(root.extractor_name(), root.document_uri(), local_id);
        self.contexts.push(context);

        let id = SubResultId(self.next_id);
        self.next_id += 1;
        self.frames.push(Frame {
            id,
            context: self.contexts.len() - 1,
            ..Frame::default()
        });

        trace!(%id, local_id, depth = self.open_sub_results(), "opened sub-result");
        Ok(id)
    }

    /// Closes `id`, which must be the innermost open child, folding its
    /// output into its parent.
    pub fn close_sub_result(&mut self, id: SubResultId) -> Result<(), Error> {
        let top = self.current();
        if id == top && id != SubResultId::ROOT {
            if let Some(child) = self.frames.pop() {
                self.top_mut().absorb(child);
            }
            trace!(%id, depth = self.open_sub_results(), "closed sub-result");
            return Ok(());
        }

        if id != SubResultId::ROOT && self.frames.iter().any(|f| f.id == id) {
            Err(Error::SubResultOrder {
                expected: top,
                found: id,
            })
        } else {
            Err(Error::SubResultNotOpen { id })
        }
    }

    /// Declares a prefix the sink may use for this result's triples.
    pub fn add_namespace(&mut self, prefix: &str, iri: &str) {
        self.namespaces.push((prefix.to_owned(), iri.to_owned()));
    }

    pub fn write_triple(&mut self, triple: TripleRef<'_>) {
        let frame = self.top_mut();
        frame.triples.push((frame.context, triple.into_owned()));
    }

    pub fn add_resource_root(&mut self, path: CanonicalPath, root: BlankNode, extractor: &str) {
        self.top_mut().resource_roots.push(ResourceRoot {
            path,
            root,
            extractor: extractor.to_owned(),
        });
    }

    pub fn add_property_path(
        &mut self,
        extractor: &str,
        subject: impl Into<NamedOrBlankNode>,
        property: impl Into<NamedNode>,
        object: Option<BlankNode>,
        path: CanonicalPath,
    ) {
        self.top_mut().property_paths.push(PropertyPath {
            path,
            subject: subject.into(),
            property: property.into(),
            object,
            extractor: extractor.to_owned(),
        });
    }

    pub fn report_issue(&mut self, level: IssueLevel, message: impl Into<String>) {
        let message = message.into();
        debug!(%level, %message, context = %self.context().unique_id(), "extraction issue");
        self.top_mut().issues.push(Issue { level, message });
    }

    /// Ends the run. Every child must have been closed.
    pub fn finish(mut self) -> Result<Extraction, Error> {
        if self.open_sub_results() > 0 {
            return Err(Error::UnclosedSubResults {
                open: self.open_sub_results(),
            });
        }

        let Some(frame) = self.frames.pop() else {
            return Err(Error::internal("extraction result lost its root frame"));
        };

        Ok(Extraction {
            contexts: self.contexts,
            namespaces: self.namespaces,
            triples: frame.triples,
            resource_roots: frame.resource_roots,
            property_paths: frame.property_paths,
            issues: frame.issues,
        })
    }
}

/// The immutable output of one extractor run over one document.
#[derive(Clone, Debug)]
pub struct Extraction {
    contexts: Vec<ExtractionContext>,
    namespaces: Vec<(String, String)>,
    triples: Vec<(usize, Triple)>,
    resource_roots: Vec<ResourceRoot>,
    property_paths: Vec<PropertyPath>,
    issues: Vec<Issue>,
}

impl Extraction {
    pub fn context(&self) -> &ExtractionContext {
        &self.contexts[0]
    }

    pub fn extractor_name(&self) -> &str {
        self.context().extractor_name()
    }

    pub fn triples(&self) -> impl Iterator<Item = TripleRef<'_>> {
        self.triples.iter().map(|(_, t)| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn resource_roots(&self) -> &[ResourceRoot] {
        &self.resource_roots
    }

    pub fn property_paths(&self) -> &[PropertyPath] {
        &self.property_paths
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn namespaces(&self) -> impl Iterator<Item = (&str, &str)> {
        self.namespaces.iter().map(|(p, i)| (p.as_str(), i.as_str()))
    }

    pub fn graph(&self) -> Graph {
        self.triples().collect()
    }

    /// Replays the triples to `sink`, bracketing each run of triples from
    /// one context with `open_context`/`close_context`. The declared
    /// namespaces are sent after every `open_context`.
    pub fn write_to(&self, sink: &mut impl TripleSink) {
        for (context, group) in &self.triples.iter().chunk_by(|(context, _)| *context) {
            let context = &self.contexts[context];
            sink.open_context(context);
            for (prefix, iri) in self.namespaces() {
                sink.receive_namespace(prefix, iri, context);
            }
            for (_, triple) in group {
                sink.receive_triple(triple.as_ref(), context);
            }
            sink.close_context(context);
        }
    }
}

/// Receiver of extracted triples.
pub trait TripleSink {
    fn open_context(&mut self, _context: &ExtractionContext) {}

    fn receive_namespace(&mut self, _prefix: &str, _iri: &str, _context: &ExtractionContext) {}

    fn receive_triple(&mut self, triple: TripleRef<'_>, context: &ExtractionContext);

    fn close_context(&mut self, _context: &ExtractionContext) {}
}

impl TripleSink for Graph {
    fn receive_triple(&mut self, triple: TripleRef<'_>, _context: &ExtractionContext) {
        self.insert(triple);
    }
}

impl TripleSink for Vec<Triple> {
    fn receive_triple(&mut self, triple: TripleRef<'_>, _context: &ExtractionContext) {
        self.push(triple.into_owned());
    }
}
