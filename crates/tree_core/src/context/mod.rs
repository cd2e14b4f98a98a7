//! Context module - Ancestry derived from the tree store
//!
//! Pure reads: ancestor chains, the heritage transcript sent with every
//! completion, and the active path used for highlighting.

mod chain;
mod heritage;

pub use chain::{
    active_node_path, active_path_edge_ids, ancestor_chain, depth, descendants, AncestorChain,
    AncestorEntry, Ancestors,
};
pub use heritage::heritage_transcript;
