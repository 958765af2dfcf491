//! # Path Addressing
//!
//! Stable addresses for document nodes.
//!
//! A [`NodePath`] carries the child-index sequence from the root and, when
//! the node has one, its stable identifier. Resolution prefers the
//! identifier: index paths shift whenever an unrelated sibling is inserted
//! or removed, identifiers do not.
//!
//! Resolution failure is an expected outcome, not an error: the tree may
//! have changed between capture and use.

use crate::dom::Document;
use indextree::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePath {
    /// Child indices from the root
    #[serde(default)]
    pub indices: Vec<usize>,

    /// Stable identifier attribute value, if the node has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl NodePath {
    /// The document root
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_indices(indices: impl Into<Vec<usize>>) -> Self {
        Self {
            indices: indices.into(),
            id: None,
        }
    }

    pub fn from_id(id: impl Into<String>) -> Self {
        Self {
            indices: Vec::new(),
            id: Some(id.into()),
        }
    }

    pub fn is_root(&self) -> bool {
        self.indices.is_empty() && self.id.is_none()
    }

    pub fn depth(&self) -> usize {
        self.indices.len()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indices = self
            .indices
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join("/");
        match &self.id {
            Some(id) => write!(f, "/{} (#{})", indices, id),
            None => write!(f, "/{}", indices),
        }
    }
}

/// Computes and resolves [`NodePath`]s against a tree
#[derive(Debug, Clone, Default)]
pub struct PathResolver;

impl PathResolver {
    pub fn new() -> Self {
        Self
    }

    /// Walk from the node up to the root, collecting sibling indices
    ///
    /// Returns `None` when the node is not attached to the document root.
    pub fn compute_path(&self, doc: &Document, node: NodeId) -> Option<NodePath> {
        if !doc.is_attached(node) {
            return None;
        }

        let mut indices = Vec::new();
        let mut current = node;
        while current != doc.root() {
            indices.push(doc.index_in_parent(current)?);
            current = doc.parent(current)?;
        }
        indices.reverse();

        Some(NodePath {
            indices,
            id: doc.stable_id(node).map(str::to_string),
        })
    }

    /// Resolve a path to a live node
    ///
    /// An identifier, when present, is authoritative: if no attached node
    /// carries it the node was removed, and the index path is not consulted
    /// because it may now address a different node.
    pub fn resolve(&self, doc: &Document, path: &NodePath) -> Option<NodeId> {
        match &path.id {
            Some(id) => doc.find_by_id(id),
            None => self.resolve_indices(doc, &path.indices),
        }
    }

    /// Descend by index; `None` if any index is out of range
    pub fn resolve_indices(&self, doc: &Document, indices: &[usize]) -> Option<NodeId> {
        indices
            .iter()
            .try_fold(doc.root(), |node, &index| doc.child_at(node, index))
    }
}
