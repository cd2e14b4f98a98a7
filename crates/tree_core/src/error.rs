//! Tree store error types

use thiserror::Error;

use crate::node::{EdgeId, NodeId};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(NodeId),

    #[error("Edge not found: {0}")]
    EdgeNotFound(EdgeId),

    #[error("Node {0} already has a parent edge")]
    DuplicateEdge(NodeId),

    #[error("Edge {source_id} -> {target_id} does not match the parent link")]
    EdgeMismatch { source_id: NodeId, target_id: NodeId },

    #[error("Parent link from {0} would create a cycle")]
    Cycle(NodeId),

    #[error("Highlight {index} not found on node {node_id}")]
    HighlightNotFound { node_id: NodeId, index: usize },

    #[error("Invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, TreeError>;
