//! The contract grammar modules implement, and the loop that drives them.

use oxrdf::vocab::rdf;
use oxrdf::{
    BlankNode, Graph, Literal, NamedNode, NamedNodeRef, NamedOrBlankNodeRef, TermRef, Triple,
    TripleRef,
};
use tracing::{debug, trace, warn};

use crate::Error;
use crate::dom::NodeRef;
use crate::field::FieldValue;
use crate::locate::find_by_marker;
use crate::nesting;
use crate::path::canonical_path;
use crate::result::{
    Extraction, ExtractionContext, ExtractionResult, Issue, IssueLevel, SubResultId, TripleSink,
};
use crate::session::Session;

/// A microformat grammar.
///
/// The dispatch loop calls [`Extractor::extract_entity`] once for every node
/// carrying [`Extractor::base_marker`], inside a sub-result of its own.
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;

    fn base_marker(&self) -> &str;

    /// Names of extractors whose entities this one already links to itself.
    /// No nesting triples are produced for those.
    fn includes(&self) -> &[&'static str] {
        &[]
    }

    /// `(prefix, namespace)` pairs handed to sinks with this extractor's triples.
    fn prefixes(&self) -> &[(&'static str, &'static str)] {
        &[]
    }

    /// Extracts the entity rooted at `node`; returns whether anything was found.
    fn extract_entity(&self, cx: &mut EntityContext<'_>, node: NodeRef<'_>) -> Result<bool, Error>;
}

/// What an extractor sees while processing one entity.
pub struct EntityContext<'s> {
    session: &'s Session,
    out: &'s mut ExtractionResult,
    extractor: &'s str,
}

impl<'s> EntityContext<'s> {
    pub fn new(session: &'s Session, out: &'s mut ExtractionResult, extractor: &'s str) -> Self {
        Self {
            session,
            out,
            extractor,
        }
    }

    pub fn session(&self) -> &'s Session {
        self.session
    }

    pub fn extractor_name(&self) -> &str {
        self.extractor
    }

    pub fn result(&mut self) -> &mut ExtractionResult {
        &mut *self.out
    }

    pub fn identity_for(&self, node: NodeRef<'_>) -> Result<BlankNode, Error> {
        self.session.identity_for(node)
    }

    /// Writes one triple without recording any provenance.
    pub fn emit(
        &mut self,
        subject: NamedOrBlankNodeRef<'_>,
        predicate: NamedNodeRef<'_>,
        object: TermRef<'_>,
    ) {
        self.out.write_triple(TripleRef::new(subject, predicate, object));
    }

    pub fn add_type<'a>(
        &mut self,
        subject: impl Into<NamedOrBlankNodeRef<'a>>,
        class: NamedNodeRef<'_>,
    ) {
        self.emit(subject.into(), rdf::TYPE, class.into());
    }

    /// Adds a trimmed plain literal read from `source`. Empty values are skipped.
    pub fn add_string_property<'a>(
        &mut self,
        source: NodeRef<'_>,
        subject: impl Into<NamedOrBlankNodeRef<'a>>,
        predicate: NamedNodeRef<'_>,
        value: &str,
    ) -> Result<bool, Error> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(false);
        }

        self.add_literal_property(source, subject, predicate, Literal::new_simple_literal(value))
    }

    pub fn add_field<'a>(
        &mut self,
        field: &FieldValue<'_>,
        subject: impl Into<NamedOrBlankNodeRef<'a>>,
        predicate: NamedNodeRef<'_>,
    ) -> Result<bool, Error> {
        self.add_string_property(field.source, subject, predicate, &field.value)
    }

    /// Adds `literal` and records where it was read from.
    ///
    /// Literals carrying a `<script>...</script>` block are refused with a warning.
    pub fn add_literal_property<'a>(
        &mut self,
        source: NodeRef<'_>,
        subject: impl Into<NamedOrBlankNodeRef<'a>>,
        predicate: NamedNodeRef<'_>,
        literal: Literal,
    ) -> Result<bool, Error> {
        if contains_script_block(literal.value()) {
            self.report_issue(
                IssueLevel::Warning,
                format!("Detected script in literal: [{}]", literal.value()),
            );
            return Ok(false);
        }

        let subject = subject.into();
        let path = canonical_path(source)?;
        self.emit(subject, predicate, literal.as_ref().into());
        self.out
            .add_property_path(self.extractor, subject.into_owned(), predicate, None, path);
        Ok(true)
    }

    /// Links `subject` to the blank node of a nested entity read from `source`.
    pub fn add_bnode_property<'a>(
        &mut self,
        source: NodeRef<'_>,
        subject: impl Into<NamedOrBlankNodeRef<'a>>,
        predicate: NamedNodeRef<'_>,
        object: &BlankNode,
    ) -> Result<(), Error> {
        let subject = subject.into();
        let path = canonical_path(source)?;
        self.emit(subject, predicate, object.as_ref().into());
        self.out.add_property_path(
            self.extractor,
            subject.into_owned(),
            predicate,
            Some(object.clone()),
            path,
        );
        Ok(())
    }

    /// Adds a link-valued property; `None` adds nothing.
    pub fn add_resource_property<'a>(
        &mut self,
        subject: impl Into<NamedOrBlankNodeRef<'a>>,
        predicate: NamedNodeRef<'_>,
        object: Option<NamedNode>,
    ) -> bool {
        match object {
            Some(object) => {
                self.emit(subject.into(), predicate, object.as_ref().into());
                true
            }
            None => false,
        }
    }

    /// Records `node` as the root of an entity identified by `root`.
    pub fn add_resource_root(&mut self, node: NodeRef<'_>, root: &BlankNode) -> Result<(), Error> {
        let path = canonical_path(node)?;
        self.out.add_resource_root(path, root.clone(), self.extractor);
        Ok(())
    }

    /// Normalizes whitespace in `link`, prefixes `default_scheme` when it is
    /// missing, and resolves the result against the document base.
    pub fn fix_link(&self, link: &str, default_scheme: Option<&str>) -> Option<NamedNode> {
        let mut link = link.split_whitespace().collect::<Vec<_>>().join(" ");
        if link.is_empty() {
            return None;
        }

        if let Some(scheme) = default_scheme {
            let prefix = format!("{scheme}:");
            if !link.starts_with(&prefix) {
                link.insert_str(0, &prefix);
            }
        }

        self.resolve_uri(&link.replace(' ', "%20"))
    }

    pub fn resolve_uri(&self, link: &str) -> Option<NamedNode> {
        self.session.resolve_uri(link)
    }

    pub fn report_issue(&mut self, level: IssueLevel, message: impl Into<String>) {
        self.out.report_issue(level, message);
    }

    /// Runs `f` inside a sub-result for an entity nested at `node`.
    pub fn nested<T>(
        &mut self,
        node: NodeRef<'_>,
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let local_id = format!("{}>{}", self.out.current(), canonical_path(node)?);
        let id = self.out.open_sub_result(&local_id)?;
        let value = f(self)?;
        self.out.close_sub_result(id)?;
        Ok(value)
    }

    pub fn current_sub_result(&self) -> SubResultId {
        self.out.current()
    }
}

fn contains_script_block(value: &str) -> bool {
    const BEGIN_SCRIPT: &str = "<script>";
    const END_SCRIPT: &str = "</script>";

    let lower = value.to_ascii_lowercase();
    lower
        .find(BEGIN_SCRIPT)
        .is_some_and(|begin| lower[begin + BEGIN_SCRIPT.len()..].contains(END_SCRIPT))
}

/// Runs one extractor over every candidate node of the session's document.
pub fn run_extractor(session: &Session, extractor: &dyn Extractor) -> Result<Extraction, Error> {
    let mut out = ExtractionResult::new(extractor.name(), session.document_uri());
    for (prefix, iri) in extractor.prefixes() {
        out.add_namespace(prefix, iri);
    }
    let candidates = find_by_marker(session.root(), extractor.base_marker(), None);

    let mut found = 0;
    for node in &candidates {
        let path = canonical_path(*node)?;
        let id = out.open_sub_result(&path.to_string())?;
        trace!(extractor = extractor.name(), %path, "extracting entity");

        let mut cx = EntityContext::new(session, &mut out, extractor.name());
        if extractor.extract_entity(&mut cx, *node)? {
            found += 1;
        }

        out.close_sub_result(id)?;
    }

    debug!(
        extractor = extractor.name(),
        candidates = candidates.len(),
        found,
        "extractor finished"
    );
    out.finish()
}

/// Everything extracted from one document.
#[derive(Clone, Debug)]
pub struct Report {
    pub extractions: Vec<Extraction>,
    pub consolidation_context: ExtractionContext,
    /// Triples added by the nesting policy after all extractors ran.
    pub consolidation: Vec<Triple>,
}

impl Report {
    pub fn extraction(&self, extractor: &str) -> Option<&Extraction> {
        self.extractions
            .iter()
            .find(|e| e.extractor_name() == extractor)
    }

    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.extractions.iter().flat_map(|e| e.issues())
    }

    /// Every extracted and consolidation triple, merged.
    pub fn graph(&self) -> Graph {
        let mut graph = Graph::new();
        self.write_to(&mut graph);
        graph
    }

    pub fn write_to(&self, sink: &mut impl TripleSink) {
        for extraction in &self.extractions {
            extraction.write_to(sink);
        }

        if !self.consolidation.is_empty() {
            sink.open_context(&self.consolidation_context);
            for triple in &self.consolidation {
                sink.receive_triple(triple.as_ref(), &self.consolidation_context);
            }
            sink.close_context(&self.consolidation_context);
        }
    }
}

/// Runs every extractor over the session, then applies the nesting policy.
pub fn extract(session: &Session, extractors: &[&dyn Extractor]) -> Result<Report, Error> {
    let extractions = extractors
        .iter()
        .map(|extractor| run_extractor(session, *extractor))
        .collect::<Result<Vec<_>, _>>()?;

    for issue in extractions.iter().flat_map(|e| e.issues()) {
        if issue.level >= IssueLevel::Error {
            warn!(level = %issue.level, message = %issue.message, "extraction issue");
        }
    }

    let consolidation = nesting::consolidate(session, &extractions, extractors);
    Ok(Report {
        extractions,
        consolidation_context: nesting::consolidation_context(session),
        consolidation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::singular_text_field;
    use crate::normalize::normalize_str;
    use crate::session::Options;
    use oxrdf::{Subject, Term};
    use rstest::rstest;

    static NAME: NamedNodeRef = NamedNodeRef::new_unchecked("http://e.org/name");
    static THING: NamedNodeRef = NamedNodeRef::new_unchecked("http://e.org/Thing");

    struct Names;

    impl Extractor for Names {
        fn name(&self) -> &str {
            "names"
        }

        fn base_marker(&self) -> &str {
            "thing"
        }

        fn extract_entity(&self, cx: &mut EntityContext<'_>, node: NodeRef<'_>) -> Result<bool, Error> {
            let id = cx.identity_for(node)?;
            let Some(name) = singular_text_field(node, "name") else {
                return Ok(false);
            };
            if !cx.add_field(&name, id.as_ref(), NAME)? {
                return Ok(false);
            }
            cx.add_type(id.as_ref(), THING);
            cx.add_resource_root(node, &id)?;
            Ok(true)
        }
    }

    fn session(html: &str) -> Session {
        Session::new(normalize_str(html).unwrap(), "http://e.org/doc", Options::default()).unwrap()
    }

    #[test]
    fn one_sub_result_per_candidate() {
        let session = session(
            r#"<p class="thing"><b class="name">A</b></p><p class="thing"><b class="name"> </b></p><p class="thing"></p>"#,
        );
        let extraction = run_extractor(&session, &Names).unwrap();
        assert_eq!(extraction.len(), 2);
        assert_eq!(extraction.resource_roots().len(), 1);
        assert_eq!(extraction.property_paths().len(), 1);
        assert_eq!(
            extraction.property_paths()[0].path.to_string(),
            "/html[1]/body[1]/p[1]/b[1]"
        );
    }

    #[test]
    fn script_literals_are_refused() {
        let session = session(r#"<p class="thing"><b class="name">&lt;SCRIPT&gt;x()&lt;/script&gt;</b></p>"#);
        let extraction = run_extractor(&session, &Names).unwrap();
        assert!(extraction.is_empty());
        assert_eq!(extraction.issues().len(), 1);
        assert_eq!(extraction.issues()[0].level, IssueLevel::Warning);
    }

    #[rstest]
    #[case("<script>", false)]
    #[case("a <script>b</script>", true)]
    #[case("</script><script>", false)]
    #[case("<SCRIPT src=x></script>", false)]
    fn script_block_detection(#[case] value: &str, #[case] expected: bool) {
        assert_eq!(contains_script_block(value), expected);
    }

    #[rstest]
    #[case(" jo@e.org ", Some("mailto"), Some("mailto:jo@e.org"))]
    #[case("mailto:jo@e.org", Some("mailto"), Some("mailto:jo@e.org"))]
    #[case("+1 555\n0100", Some("tel"), Some("tel:+1%20555%200100"))]
    #[case("/about", None, Some("http://e.org/about"))]
    #[case("   ", None, None)]
    fn links_are_fixed(
        #[case] link: &str,
        #[case] scheme: Option<&str>,
        #[case] expected: Option<&str>,
    ) {
        let session = session("<p></p>");
        let mut out = ExtractionResult::new("links", session.document_uri());
        let cx = EntityContext::new(&session, &mut out, "links");
        assert_eq!(
            cx.fix_link(link, scheme).as_ref().map(NamedNode::as_str),
            expected
        );
    }

    #[test]
    fn nested_entities_get_their_own_sub_result() {
        let session = session(r#"<div class="thing"><p class="name">x</p></div>"#);
        let node = find_by_marker(session.root(), "name", None)[0];
        let mut out = ExtractionResult::new("outer", session.document_uri());
        let mut cx = EntityContext::new(&session, &mut out, "outer");

        let outer = cx.current_sub_result();
        let id = cx.identity_for(node).unwrap();
        let inner = cx
            .nested(node, |cx| {
                cx.add_type(id.as_ref(), THING);
                Ok(cx.current_sub_result())
            })
            .unwrap();
        assert_ne!(inner, outer);
        assert_eq!(cx.current_sub_result(), outer);

        let extraction = out.finish().unwrap();
        let triple = extraction.triples().next().unwrap().into_owned();
        assert_eq!(triple.subject, Subject::from(id));
        assert_eq!(triple.object, Term::from(THING.into_owned()));
    }
}
