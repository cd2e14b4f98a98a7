use serde::Serialize;
use tree_core::NodeId;
use tree_llm::ErrorKind;

/// Why an action left the tree untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Empty or whitespace-only input
    BlankInput,
    NodeMissing,
    /// Branching needs an answer to select from
    NoAnswerYet,
    /// A completion for the node is already in flight
    NodeBusy,
    NoSuggestion,
    /// Topic drift needs a trailing user/assistant pair
    NotEnoughMessages,
    /// The completion came back after its node was deleted
    Stale,
    /// The store refused the mutation
    Conflict,
}

/// Result of an orchestrator action. Actions never return errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// The action completed; `node_id` is the node it produced or changed
    Applied { node_id: NodeId },
    /// The completion failed and an error turn was written to `node_id`
    Failed { node_id: NodeId, kind: ErrorKind },
    /// Nodes removed by a delete, the deleted node first
    Removed { node_ids: Vec<NodeId> },
    Skipped { reason: SkipReason },
}

impl ActionOutcome {
    pub(crate) fn applied(node_id: &NodeId) -> Self {
        ActionOutcome::Applied {
            node_id: node_id.clone(),
        }
    }

    pub(crate) fn skipped(reason: SkipReason) -> Self {
        ActionOutcome::Skipped { reason }
    }

    /// Node the action produced or wrote to
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            ActionOutcome::Applied { node_id } | ActionOutcome::Failed { node_id, .. } => {
                Some(node_id)
            }
            ActionOutcome::Removed { node_ids } => node_ids.first(),
            ActionOutcome::Skipped { .. } => None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, ActionOutcome::Applied { .. })
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            ActionOutcome::Skipped { reason } => Some(*reason),
            _ => None,
        }
    }
}
