//! Normalization of persisted trees
//!
//! Older saves carried `question` / `aiResponse` fields next to (or instead
//! of) `messages`, string `childId` highlights, snake_case row keys and no
//! label origin. Everything is folded into the current shape once, on load,
//! so the rest of the system only ever sees normalized nodes.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::message::Turn;
use crate::node::{
    is_placeholder_label, DriftSuggestion, Edge, Highlight, HighlightTarget, LabelOrigin, Node,
    NodeId, Position,
};
use crate::store::TreeSnapshot;

/// Lenient on-disk tree shape
#[derive(Deserialize, Debug, Default)]
pub struct StoredTree {
    #[serde(default)]
    pub nodes: Vec<StoredNode>,
    #[serde(default)]
    pub edges: Vec<StoredEdge>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StoredNode {
    pub id: NodeId,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub label_origin: Option<LabelOrigin>,
    #[serde(default, alias = "parent_id")]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub position: Position,
    #[serde(default, alias = "context_anchor")]
    pub context_anchor: Option<String>,
    #[serde(default)]
    pub messages: Vec<Turn>,
    #[serde(default)]
    pub highlights: Vec<StoredHighlight>,
    #[serde(default)]
    pub suggest_new_node: Option<DriftSuggestion>,
    /// Legacy single-question field
    #[serde(default)]
    pub question: Option<String>,
    /// Legacy single-answer field
    #[serde(default, alias = "ai_response")]
    pub ai_response: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StoredHighlight {
    pub text: String,
    #[serde(default)]
    pub child: Option<HighlightTarget>,
    /// Legacy flat child reference (may be "pending" or empty)
    #[serde(default, alias = "child_id")]
    pub child_id: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StoredEdge {
    pub id: Option<String>,
    #[serde(alias = "source_id")]
    pub source_id: NodeId,
    #[serde(alias = "target_id")]
    pub target_id: NodeId,
}

const LEGACY_PENDING: &str = "pending";

impl StoredHighlight {
    fn target(self) -> Option<Highlight> {
        let child = match (self.child, self.child_id) {
            (Some(HighlightTarget::Resolved(id)), _) => Some(id),
            (_, Some(id)) if !id.is_empty() && id != LEGACY_PENDING => Some(NodeId::from(id)),
            _ => None,
        }?;
        Some(Highlight::resolved(self.text, child))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl StoredNode {
    fn normalize(self) -> Node {
        let mut messages = self.messages;
        if messages.is_empty() {
            if let Some(question) = non_blank(self.question) {
                messages.push(Turn::user(question));
            }
            if let Some(answer) = non_blank(self.ai_response) {
                messages.push(Turn::assistant(answer));
            }
        }
        let label_origin = self.label_origin.unwrap_or_else(|| {
            if is_placeholder_label(&self.label) {
                LabelOrigin::Placeholder
            } else {
                LabelOrigin::Concept
            }
        });
        Node {
            id: self.id,
            label: self.label,
            label_origin,
            parent_id: self.parent_id,
            position: self.position,
            context_anchor: non_blank(self.context_anchor),
            messages,
            highlights: self.highlights.into_iter().filter_map(StoredHighlight::target).collect(),
            suggest_new_node: self.suggest_new_node,
        }
    }
}

/// Fold a stored tree into a snapshot that satisfies every store invariant
pub fn normalize(stored: StoredTree) -> TreeSnapshot {
    let mut seen = HashSet::new();
    let mut nodes: Vec<Node> = Vec::with_capacity(stored.nodes.len());
    for raw in stored.nodes {
        if !seen.insert(raw.id.clone()) {
            warn!(node_id = %raw.id, "dropping duplicate node on load");
            continue;
        }
        nodes.push(raw.normalize());
    }

    clear_broken_parents(&mut nodes);

    let parents: HashMap<NodeId, Option<NodeId>> = nodes
        .iter()
        .map(|n| (n.id.clone(), n.parent_id.clone()))
        .collect();
    for node in &mut nodes {
        let owner = node.id.clone();
        node.highlights.retain(|h| match &h.child {
            HighlightTarget::Resolved(child) => {
                parents.get(child).and_then(Option::as_ref) == Some(&owner)
            }
            HighlightTarget::Pending => false,
        });
    }

    let edges = rebuild_edges(&nodes, stored.edges);
    debug!(nodes = nodes.len(), edges = edges.len(), "normalized stored tree");
    TreeSnapshot { nodes, edges }
}

/// Clear parent links that point nowhere or close a cycle.
///
/// Each walk up the parent chain stops at a node already known to reach a
/// root. A cycle is broken at the node where the walk entered it, so nodes
/// that merely lead into a cycle keep their parent.
fn clear_broken_parents(nodes: &mut [Node]) {
    let slots: HashMap<NodeId, usize> = nodes
        .iter()
        .enumerate()
        .map(|(slot, n)| (n.id.clone(), slot))
        .collect();
    let mut settled = vec![false; nodes.len()];

    for start in 0..nodes.len() {
        let mut path: Vec<usize> = Vec::new();
        let mut on_path: HashMap<usize, usize> = HashMap::new();
        let mut current = start;
        while !settled[current] {
            if let Some(&entry) = on_path.get(&current) {
                let cycle_len = path.len() - entry;
                warn!(node_id = %nodes[current].id, cycle_len, "breaking parent cycle on load");
                nodes[current].parent_id = None;
                break;
            }
            on_path.insert(current, path.len());
            path.push(current);

            let Some(parent) = nodes[current].parent_id.clone() else {
                break;
            };
            match slots.get(&parent) {
                Some(&slot) => current = slot,
                None => {
                    let node_id = &nodes[current].id;
                    warn!(node_id = %node_id, %parent, "clearing dangling parent on load");
                    nodes[current].parent_id = None;
                    break;
                }
            }
        }
        for slot in path {
            settled[slot] = true;
        }
    }
}

fn rebuild_edges(nodes: &[Node], stored: Vec<StoredEdge>) -> Vec<Edge> {
    let mut stored_ids: HashMap<(NodeId, NodeId), String> = HashMap::new();
    for edge in stored {
        if let Some(id) = edge.id.filter(|id| !id.is_empty()) {
            stored_ids.entry((edge.source_id, edge.target_id)).or_insert(id);
        }
    }
    nodes
        .iter()
        .filter_map(|node| {
            let parent = node.parent_id.clone()?;
            let mut edge = Edge::link(parent.clone(), node.id.clone());
            if let Some(id) = stored_ids.remove(&(parent, node.id.clone())) {
                edge.id = id.into();
            }
            Some(edge)
        })
        .collect()
}

/// Parse and normalize a serialized tree
pub fn normalize_json(json: &str) -> serde_json::Result<TreeSnapshot> {
    let stored: StoredTree = serde_json::from_str(json)?;
    Ok(normalize(stored))
}
