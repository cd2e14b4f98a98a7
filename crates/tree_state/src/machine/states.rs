//! Node activity states - What a node is waiting on

use serde::{Deserialize, Serialize};

/// In-flight work attached to a single node.
///
/// A node without an entry in the tracker is idle.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeActivity {
    /// Waiting for the answer to a question asked in the node
    Asking,
    /// Waiting for the first answer of a freshly branched child
    Branching,
    /// Waiting for the fresh answer of a root split off by topic drift
    ReAsking,
}

impl NodeActivity {
    pub fn description(&self) -> &'static str {
        match self {
            NodeActivity::Asking => "Waiting for answer",
            NodeActivity::Branching => "Exploring selection",
            NodeActivity::ReAsking => "Starting new topic",
        }
    }
}
