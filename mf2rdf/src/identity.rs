//! Deterministic blank-node identities for tree positions.
//!
//! The identity of a node is a hash of `documentURI#canonicalPath`, so any
//! two extractors asking about the same node of the same document obtain the
//! same blank node without sharing any state.

use oxrdf::BlankNode;
use sha2::{Digest, Sha256};

use crate::Error;
use crate::dom::NodeRef;
use crate::path::canonical_path;

/// Number of digest bytes kept; the blank node id is twice as many hex digits.
const IDENTITY_BYTES: usize = 16;

pub fn identity_for(document_uri: &str, node: NodeRef<'_>) -> Result<BlankNode, Error> {
    let path = canonical_path(node)?;
    Ok(hashed_blank_node(&format!("{document_uri}#{path}")))
}

/// A blank node whose id is derived from `seed` alone.
pub fn hashed_blank_node(seed: &str) -> BlankNode {
    BlankNode::new_unchecked(format!("node{}", digest_hex(seed)))
}

pub(crate) fn digest_hex(seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    hex::encode(&digest[..IDENTITY_BYTES])
}
