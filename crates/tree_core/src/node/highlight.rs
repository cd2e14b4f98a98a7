//! Highlight - A branch point inside a node's answer

use serde::{Deserialize, Serialize};

use super::NodeId;

/// Child a highlight leads to.
///
/// `Pending` only exists between allocating a highlight and linking the child
/// node; it must be resolved before any other mutation touches the owner.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "state", content = "childId", rename_all = "snake_case")]
pub enum HighlightTarget {
    Pending,
    Resolved(NodeId),
}

impl HighlightTarget {
    pub fn child_id(&self) -> Option<&NodeId> {
        match self {
            Self::Pending => None,
            Self::Resolved(id) => Some(id),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Highlight {
    /// Exact fragment of the owner's answer
    pub text: String,
    pub child: HighlightTarget,
}

impl Highlight {
    pub fn pending(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            child: HighlightTarget::Pending,
        }
    }

    pub fn resolved(text: impl Into<String>, child_id: NodeId) -> Self {
        Self {
            text: text.into(),
            child: HighlightTarget::Resolved(child_id),
        }
    }

    pub fn points_to(&self, id: &NodeId) -> bool {
        self.child.child_id() == Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highlight_target_wire_shape() {
        let resolved = Highlight::resolved("calls itself", NodeId::from("node_b"));
        let json = serde_json::to_value(&resolved).unwrap();
        assert_eq!(json["child"]["state"], "resolved");
        assert_eq!(json["child"]["childId"], "node_b");

        let pending = serde_json::to_value(Highlight::pending("x")).unwrap();
        assert_eq!(pending["child"]["state"], "pending");
    }
}
