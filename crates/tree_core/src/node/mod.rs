//! Node module - Nodes and edges of the knowledge tree

mod highlight;
mod id;
mod label;

use serde::{Deserialize, Serialize};

use crate::message::Turn;

pub use highlight::{Highlight, HighlightTarget};
pub use id::{EdgeId, NodeId};
pub use label::{is_placeholder_label, placeholder_label, preview_label, LabelOrigin};

/// Canvas coordinate, owned by the presentation layer
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Point `distance` away from `self` in direction `angle` (radians)
    pub fn offset(&self, angle: f64, distance: f64) -> Self {
        Self {
            x: self.x + angle.cos() * distance,
            y: self.y + angle.sin() * distance,
        }
    }
}

/// Transient "this looks like a new topic" annotation
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DriftSuggestion {
    pub concept: String,
}

/// One question/answer exchange point in the tree
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,

    pub label: String,

    pub label_origin: LabelOrigin,

    /// None for roots
    pub parent_id: Option<NodeId>,

    pub position: Position,

    /// Fragment of the parent's answer this node was branched from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_anchor: Option<String>,

    #[serde(default)]
    pub messages: Vec<Turn>,

    #[serde(default)]
    pub highlights: Vec<Highlight>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggest_new_node: Option<DriftSuggestion>,
}

impl Node {
    /// Create a root node with no messages
    pub fn root(
        id: NodeId,
        label: impl Into<String>,
        label_origin: LabelOrigin,
        position: Position,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            label_origin,
            parent_id: None,
            position,
            context_anchor: None,
            messages: Vec::new(),
            highlights: Vec::new(),
            suggest_new_node: None,
        }
    }

    /// Create a child branched from `anchor` in the parent's answer
    pub fn branch(
        id: NodeId,
        parent_id: NodeId,
        anchor: impl Into<String>,
        position: Position,
    ) -> Self {
        let anchor = anchor.into();
        Self {
            id,
            label: preview_label(&anchor),
            label_origin: LabelOrigin::Preview,
            parent_id: Some(parent_id),
            position,
            context_anchor: Some(anchor),
            messages: Vec::new(),
            highlights: Vec::new(),
            suggest_new_node: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// True while the label is still the auto-generated default
    pub fn carries_placeholder_label(&self) -> bool {
        self.label_origin == LabelOrigin::Placeholder
    }

    pub fn has_answer(&self) -> bool {
        self.messages.iter().any(Turn::is_assistant)
    }

    pub fn user_turn_count(&self) -> usize {
        self.messages.iter().filter(|t| t.is_user()).count()
    }

    pub fn first_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|t| t.is_user())
            .map(|t| t.content.as_str())
    }

    pub fn latest_answer(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|t| t.is_assistant())
            .map(|t| t.content.as_str())
    }

    /// Child the highlight for `text` leads to, if any
    pub fn highlight_child(&self, text: &str) -> Option<&NodeId> {
        self.highlights
            .iter()
            .find(|h| h.text == text)
            .and_then(|h| h.child.child_id())
    }
}

/// Directed parent -> child edge
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source_id: NodeId,
    pub target_id: NodeId,
}

impl Edge {
    pub fn link(source_id: NodeId, target_id: NodeId) -> Self {
        Self {
            id: EdgeId::between(&source_id, &target_id),
            source_id,
            target_id,
        }
    }

    pub fn touches(&self, id: &NodeId) -> bool {
        &self.source_id == id || &self.target_id == id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_offset() {
        let p = Position::new(10.0, 20.0).offset(0.0, 150.0);
        assert!((p.x - 160.0).abs() < 1e-9);
        assert!((p.y - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_node_turn_queries() {
        let origin = LabelOrigin::Placeholder;
        let mut node = Node::root(NodeId::from("a"), "Node 1", origin, Position::default());
        assert!(!node.has_answer());
        node.messages.push(Turn::user("What is recursion?"));
        node.messages.push(Turn::assistant("It calls itself."));
        node.messages.push(Turn::user("And?"));
        assert!(node.has_answer());
        assert_eq!(node.user_turn_count(), 2);
        assert_eq!(node.first_user_message(), Some("What is recursion?"));
        assert_eq!(node.latest_answer(), Some("It calls itself."));
    }

    #[test]
    fn test_branch_node_uses_preview_label() {
        let node = Node::branch(
            NodeId::from("b"),
            NodeId::from("a"),
            "calls itself",
            Position::default(),
        );
        assert_eq!(node.label, "calls itself");
        assert_eq!(node.label_origin, LabelOrigin::Preview);
        assert_eq!(node.context_anchor.as_deref(), Some("calls itself"));
        assert!(!node.carries_placeholder_label());
    }

    #[test]
    fn test_node_wire_keys_are_camel_case() {
        let node = Node::branch(NodeId::from("b"), NodeId::from("a"), "x", Position::default());
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["parentId"], "a");
        assert_eq!(json["contextAnchor"], "x");
        assert_eq!(json["labelOrigin"], "preview");
    }
}
