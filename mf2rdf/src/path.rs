//! Canonical positional addresses of elements.

use std::fmt;

use crate::Error;
use crate::dom::NodeRef;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PathSegment {
    pub name: String,
    /// 1-based rank among preceding siblings with the same name.
    pub rank: usize,
}

/// Sequence of `(name, rank)` pairs from the root down to an element,
/// displayed as `/html[1]/body[1]/div[2]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct CanonicalPath(Vec<PathSegment>);

impl CanonicalPath {
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` if `prefix` addresses this element or one of its ancestors.
    pub fn starts_with(&self, prefix: &CanonicalPath) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            write!(f, "/{}[{}]", segment.name, segment.rank)?;
        }
        Ok(())
    }
}

/// Computes the canonical path of `node`.
///
/// Non-element nodes contribute no segment, so a text node shares the path of
/// its parent element and the document root has the empty path.
pub fn canonical_path(node: NodeRef<'_>) -> Result<CanonicalPath, Error> {
    let mut segments = Vec::new();
    for current in std::iter::once(node).chain(node.ancestors()) {
        if let Some(element) = current.as_element() {
            segments.push(PathSegment {
                name: element.name().to_owned(),
                rank: index_in_parent(current)?,
            });
        }
    }

    segments.reverse();
    Ok(CanonicalPath(segments))
}

/// 1-based rank of `node` among its parent's children of the same type and
/// name, counting `node` itself. The root has rank 1.
pub fn index_in_parent(node: NodeRef<'_>) -> Result<usize, Error> {
    let Some(parent) = node.parent() else {
        return Ok(1);
    };

    let mut rank = 0;
    for sibling in parent.children() {
        if sibling.same_type_and_name(&node) {
            rank += 1;
        }
        if sibling == node {
            return Ok(rank);
        }
    }

    Err(Error::internal(format!(
        "{node:?} is not among the children of its parent {parent:?}"
    )))
}
