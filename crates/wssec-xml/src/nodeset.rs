#![forbid(unsafe_code)]

//! NodeSet type for canonicalization and signature transforms.
//!
//! A `NodeSet` is the set of arena nodes visible to a canonicalizer,
//! identified by `NodeId` index. WS-Security references only ever select
//! whole subtrees, optionally minus the enveloping signature, so the set is
//! always built from a subtree and then narrowed.

use std::collections::HashSet;

use crate::document::{Document, NodeId, NodeKind};

/// A set of document nodes.
#[derive(Debug, Clone, Default)]
pub struct NodeSet {
    nodes: HashSet<usize>,
}

impl NodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The subtree rooted at `root`, without comment nodes.
    pub fn tree_without_comments(root: NodeId, doc: &Document) -> Self {
        Self::tree(root, doc, false)
    }

    /// The subtree rooted at `root`, comments included.
    pub fn tree_with_comments(root: NodeId, doc: &Document) -> Self {
        Self::tree(root, doc, true)
    }

    fn tree(root: NodeId, doc: &Document, with_comments: bool) -> Self {
        let mut nodes = HashSet::new();
        nodes.insert(root.index());
        for id in doc.descendants(root) {
            if with_comments || !matches!(doc.node_kind(id), Some(NodeKind::Comment(_))) {
                nodes.insert(id.index());
            }
        }
        Self { nodes }
    }

    /// Remove `root` and its whole subtree from the set.
    pub fn subtract_tree(&mut self, root: NodeId, doc: &Document) {
        self.nodes.remove(&root.index());
        for id in doc.descendants(root) {
            self.nodes.remove(&id.index());
        }
    }

    pub fn contains_id(&self, id: NodeId) -> bool {
        self.nodes.contains(&id.index())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
