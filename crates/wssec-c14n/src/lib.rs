#![forbid(unsafe_code)]

//! Canonicalization for the wssec WS-Security engine.
//!
//! Implements Exclusive XML Canonicalization 1.0 (with and without comments)
//! over the arena DOM, plus the SwA canonical form of MIME attachment parts.

pub mod exclusive;
pub mod mime;
pub mod render;

use wssec_core::{algorithm, Error};
use wssec_xml::{Document, NodeId, NodeSet};

pub use mime::{canonicalize_attachment, MimePart};

/// The canonicalization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum C14nMode {
    /// Exclusive Canonical XML 1.0
    Exclusive,
    /// Exclusive Canonical XML 1.0 with comments
    ExclusiveWithComments,
}

impl C14nMode {
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Exclusive => algorithm::EXC_C14N,
            Self::ExclusiveWithComments => algorithm::EXC_C14N_WITH_COMMENTS,
        }
    }

    /// Parse a mode from an algorithm URI. Inclusive C14N is not accepted.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            algorithm::EXC_C14N => Some(Self::Exclusive),
            algorithm::EXC_C14N_WITH_COMMENTS => Some(Self::ExclusiveWithComments),
            _ => None,
        }
    }

    pub fn with_comments(&self) -> bool {
        matches!(self, Self::ExclusiveWithComments)
    }
}

/// Options for one canonicalization call.
#[derive(Debug, Clone, Default)]
pub struct ExcC14nOptions {
    pub with_comments: bool,
    /// InclusiveNamespaces PrefixList; `#default` names the default namespace.
    pub inclusive_prefixes: Vec<String>,
    /// Subtree left out of the output (the enveloped signature).
    pub exclude: Option<NodeId>,
}

/// Canonicalize the subtree rooted at `node`. The document is not modified,
/// so repeated calls give identical bytes.
pub fn canonicalize(doc: &Document, node: NodeId, opts: &ExcC14nOptions) -> Result<Vec<u8>, Error> {
    let Some(excluded) = opts.exclude else {
        return exclusive::canonicalize(doc, node, opts.with_comments, None, &opts.inclusive_prefixes);
    };
    let mut set = NodeSet::tree_with_comments(node, doc);
    set.subtract_tree(excluded, doc);
    exclusive::canonicalize(doc, node, opts.with_comments, Some(&set), &opts.inclusive_prefixes)
}

/// Canonicalize an explicit node set with the apex at `node`.
pub fn canonicalize_node_set(
    doc: &Document,
    node: NodeId,
    mode: C14nMode,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    exclusive::canonicalize(doc, node, mode.with_comments(), node_set, inclusive_prefixes)
}
