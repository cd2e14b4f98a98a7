//! tree_core - Core types for the learning tree
//!
//! This crate provides the pieces every other learning-tree crate builds on:
//! - `node` - Node, Edge, highlights and identifiers
//! - `message` - Conversation turns and the branch prompt template
//! - `store` - TreeStore, the canonical node/edge collection
//! - `context` - Ancestor chains, heritage transcripts and active paths
//! - `parser` - Directive extraction from completion text
//! - `migrate` - Normalization of persisted (including legacy) trees
//! - `config` - TreeConfig

pub mod config;
pub mod context;
pub mod error;
pub mod message;
pub mod migrate;
pub mod node;
pub mod parser;
pub mod store;

// Re-export commonly used types
pub use config::TreeConfig;
pub use context::{
    active_node_path, active_path_edge_ids, ancestor_chain, depth, descendants,
    heritage_transcript, AncestorChain, AncestorEntry,
};
pub use error::{Result, TreeError};
pub use message::{branch_prompt, parse_branch_prompt, ImageAttachment, Role, Turn};
pub use node::{
    is_placeholder_label, placeholder_label, DriftSuggestion, Edge, EdgeId, Highlight,
    HighlightTarget, LabelOrigin, Node, NodeId, Position,
};
pub use parser::{parse_response, ParsedResponse};
pub use store::{NodePatch, TreeSnapshot, TreeStore};
