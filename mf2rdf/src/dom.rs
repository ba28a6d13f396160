//! The node tree every extraction pass navigates.
//!
//! The [`Document`] owns its nodes top-down in an arena. Parent links are
//! plain [`NodeId`]s, so they never own anything, and a [`NodeRef`] pairs a
//! document with an id so that nodes of two different trees cannot be mixed.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;

use crate::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("{_0}")]
pub struct NodeId(usize);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element(Element),
    Text(String),
    Comment(String),
}

impl NodeKind {
    /// The DOM-style node name: the element name, or `#document`, `#text`, `#comment`.
    pub fn name(&self) -> &str {
        match self {
            NodeKind::Document => "#document",
            NodeKind::Element(element) => element.name(),
            NodeKind::Text(_) => "#text",
            NodeKind::Comment(_) => "#comment",
        }
    }

    fn same_type(&self, other: &NodeKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// An element with a lowercased name and lowercased attribute names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    name: String,
    attrs: IndexMap<String, String>,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            attrs: IndexMap::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        if name.bytes().any(|b| b.is_ascii_uppercase()) {
            self.attrs
                .get(&name.to_ascii_lowercase())
                .map(String::as_str)
        } else {
            self.attrs.get(name).map(String::as_str)
        }
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        self.attrs.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        self.attrs.shift_remove(&name.to_ascii_lowercase())
    }
}

#[derive(Clone, Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Creates a document holding only its root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root_id(&self) -> NodeId {
        NodeId(0)
    }

    pub fn root(&self) -> NodeRef<'_> {
        NodeRef {
            document: self,
            id: self.root_id(),
        }
    }

    pub fn get(&self, id: NodeId) -> Option<NodeRef<'_>> {
        (id.0 < self.nodes.len()).then_some(NodeRef { document: self, id })
    }

    /// Number of nodes, the root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    pub fn append_child(&mut self, parent: NodeId, kind: NodeKind) -> Result<NodeId, Error> {
        if matches!(kind, NodeKind::Document) {
            return Err(Error::internal("a document node can only be the root"));
        }

        let Some(parent_data) = self.nodes.get(parent.0) else {
            return Err(Error::internal(format!("no such parent node {parent}")));
        };

        if !matches!(parent_data.kind, NodeKind::Document | NodeKind::Element(_)) {
            return Err(Error::internal(format!(
                "{} node {parent} cannot have children",
                parent_data.kind.name()
            )));
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes.get_mut(id.0)?.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) -> bool {
        match self.element_mut(id) {
            Some(element) => {
                element.set_attr(name, value);
                true
            }
            None => false,
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        self.element_mut(id)?.remove_attr(name)
    }

    /// Appends a deep copy of the subtree rooted at `source` in `from` as the
    /// last child of `parent` in this document.
    ///
    /// `from` is usually an earlier clone of this document, so copying a node
    /// into itself or into one of its descendants terminates and repeated
    /// copies never see each other.
    pub fn append_subtree_from(
        &mut self,
        from: &Document,
        source: NodeId,
        parent: NodeId,
    ) -> Result<NodeId, Error> {
        let snapshot = subtree_snapshot(from, source)?;
        self.append_snapshot(source, snapshot, parent)
    }

    fn append_snapshot(
        &mut self,
        source: NodeId,
        snapshot: Vec<(NodeId, Option<NodeId>, NodeKind)>,
        parent: NodeId,
    ) -> Result<NodeId, Error> {
        let mut copies = HashMap::with_capacity(snapshot.len());
        for (original, original_parent, kind) in snapshot {
            let new_parent = if original == source {
                parent
            } else {
                original_parent
                    .and_then(|p| copies.get(&p).copied())
                    .ok_or_else(|| Error::internal(format!("parent of {original} was not copied")))?
            };

            let copy = self.append_child(new_parent, kind)?;
            copies.insert(original, copy);
        }

        copies
            .get(&source)
            .copied()
            .ok_or_else(|| Error::internal(format!("source node {source} was not copied")))
    }

    /// Finds the first element in document order whose `id` attribute equals `id`.
    pub fn element_by_id(&self, id: &str) -> Option<NodeRef<'_>> {
        if id.is_empty() {
            return None;
        }

        self.root()
            .descendants()
            .find(|node| node.attr("id") == Some(id))
    }

    pub fn to_html(&self) -> String {
        self.root().to_html()
    }

    #[cfg(test)]
    pub(crate) fn detach_from_parent_list(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
    }
}

fn subtree_snapshot(
    document: &Document,
    source: NodeId,
) -> Result<Vec<(NodeId, Option<NodeId>, NodeKind)>, Error> {
    let Some(source) = document.get(source) else {
        return Err(Error::internal(format!("no such source node {source}")));
    };

    Ok(source
        .descendants()
        .map(|node| (node.id(), node.parent_id(), node.kind().clone()))
        .collect())
}

/// A borrowed view of one node of a [`Document`].
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    document: &'a Document,
    id: NodeId,
}

impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.document, other.document) && self.id == other.id
    }
}

impl Eq for NodeRef<'_> {}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.node_name(), self.id)
    }
}

impl<'a> NodeRef<'a> {
    fn data(&self) -> &'a NodeData {
        &self.document.nodes[self.id.0]
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn document(&self) -> &'a Document {
        self.document
    }

    pub fn kind(&self) -> &'a NodeKind {
        &self.data().kind
    }

    pub fn node_name(&self) -> &'a str {
        self.data().kind.name()
    }

    pub fn is_element(&self) -> bool {
        matches!(self.kind(), NodeKind::Element(_))
    }

    pub fn as_element(&self) -> Option<&'a Element> {
        match self.kind() {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    /// `true` if both nodes have the same type and node name.
    pub fn same_type_and_name(&self, other: &NodeRef<'_>) -> bool {
        self.kind().same_type(other.kind()) && self.node_name() == other.node_name()
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.as_element()?.attr(name)
    }

    pub fn parent_id(&self) -> Option<NodeId> {
        self.data().parent
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.parent_id().map(|id| NodeRef {
            document: self.document,
            id,
        })
    }

    pub fn child_ids(&self) -> &'a [NodeId] {
        &self.data().children
    }

    pub fn children(&self) -> impl DoubleEndedIterator<Item = NodeRef<'a>> + use<'a> {
        let document = self.document;
        self.data()
            .children
            .iter()
            .map(move |&id| NodeRef { document, id })
    }

    pub fn ancestors(&self) -> impl Iterator<Item = NodeRef<'a>> + use<'a> {
        std::iter::successors(self.parent(), |node| node.parent())
    }

    /// This node and all of its descendants, in document order.
    pub fn descendants(&self) -> Descendants<'a> {
        Descendants {
            document: self.document,
            stack: vec![self.id],
        }
    }

    /// Concatenation of every descendant text node.
    pub fn text_content(&self) -> String {
        if let Some(text) = self.leaf_text() {
            return text.to_owned();
        }

        let mut text = String::new();
        for node in self.descendants() {
            if let NodeKind::Text(t) = node.kind() {
                text.push_str(t);
            }
        }
        text
    }

    /// The text of a node whose only child is a text node.
    pub fn leaf_text(&self) -> Option<&'a str> {
        match self.child_ids() {
            [only] => match &self.document.nodes[only.0].kind {
                NodeKind::Text(text) => Some(text),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        write_html(&mut out, *self);
        out
    }
}

pub struct Descendants<'a> {
    document: &'a Document,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = NodeRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let node = NodeRef {
            document: self.document,
            id,
        };
        self.stack.extend(node.child_ids().iter().rev());
        Some(node)
    }
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

fn write_html(out: &mut String, start: NodeRef<'_>) {
    enum Step<'a> {
        Open(NodeRef<'a>),
        Close(&'a str),
    }

    let mut steps = vec![Step::Open(start)];
    while let Some(step) = steps.pop() {
        let node = match step {
            Step::Close(name) => {
                out.push_str("</");
                out.push_str(name);
                out.push('>');
                continue;
            }
            Step::Open(node) => node,
        };

        match node.kind() {
            NodeKind::Document => {}
            NodeKind::Text(text) => {
                let raw = node
                    .parent()
                    .is_some_and(|p| RAW_TEXT_ELEMENTS.contains(&p.node_name()));
                if raw {
                    out.push_str(text);
                } else {
                    escape_into(out, text, false);
                }
                continue;
            }
            NodeKind::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
                continue;
            }
            NodeKind::Element(element) => {
                out.push('<');
                out.push_str(element.name());
                for (name, value) in element.attrs() {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_into(out, value, true);
                    out.push('"');
                }
                out.push('>');

                if VOID_ELEMENTS.contains(&element.name()) {
                    continue;
                }
                steps.push(Step::Close(element.name()));
            }
        }

        steps.extend(node.children().rev().map(Step::Open));
    }
}

fn escape_into(out: &mut String, text: &str, attribute: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' if attribute => out.push_str("&quot;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}
