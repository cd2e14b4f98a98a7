//! TreeStore - Canonical node and edge collections
//!
//! Every mutation keeps the forest invariants intact:
//! - the parent relation is acyclic
//! - each non-root node has exactly one incoming edge, matching its parent
//! - resolved highlights point at children of their owner

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TreeError};
use crate::message::Turn;
use crate::node::{
    DriftSuggestion, Edge, EdgeId, Highlight, HighlightTarget, LabelOrigin, Node, NodeId, Position,
};

/// Serializable copy of a whole tree
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct TreeSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Field-level update for `TreeStore::update_node`.
///
/// Structural fields (parent, messages, highlights) are deliberately absent;
/// they change only through the dedicated primitives.
#[derive(Clone, Debug, Default)]
pub struct NodePatch {
    pub label: Option<(String, LabelOrigin)>,
    pub position: Option<Position>,
    /// `Some(None)` clears the suggestion
    pub suggest_new_node: Option<Option<DriftSuggestion>>,
}

impl NodePatch {
    pub fn label(mut self, label: impl Into<String>, origin: LabelOrigin) -> Self {
        self.label = Some((label.into(), origin));
        self
    }

    pub fn position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn suggestion(mut self, suggestion: Option<DriftSuggestion>) -> Self {
        self.suggest_new_node = Some(suggestion);
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct TreeStore {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    /// node id -> index into `nodes`
    node_slots: HashMap<NodeId, usize>,
    /// target node id -> index into `edges`
    parent_edges: HashMap<NodeId, usize>,
}

impl TreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a snapshot, rejecting snapshots that break invariants
    pub fn from_snapshot(snapshot: TreeSnapshot) -> Result<Self> {
        let mut store = Self {
            nodes: snapshot.nodes,
            edges: snapshot.edges,
            node_slots: HashMap::new(),
            parent_edges: HashMap::new(),
        };
        for (slot, node) in store.nodes.iter().enumerate() {
            if store.node_slots.insert(node.id.clone(), slot).is_some() {
                return Err(TreeError::DuplicateNode(node.id.clone()));
            }
        }
        for (slot, edge) in store.edges.iter().enumerate() {
            if store.parent_edges.insert(edge.target_id.clone(), slot).is_some() {
                return Err(TreeError::DuplicateEdge(edge.target_id.clone()));
            }
        }
        store.check_invariants()?;
        Ok(store)
    }

    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }

    // ========== Reads ==========

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.node_slots.get(id).map(|&slot| &self.nodes[slot])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node_slots.contains_key(id)
    }

    /// Edge linking `id` to its parent
    pub fn parent_edge(&self, id: &str) -> Option<&Edge> {
        self.parent_edges.get(id).map(|&slot| &self.edges[slot])
    }

    /// Parent -> children adjacency, built once per call
    pub fn children_index(&self) -> HashMap<&NodeId, Vec<&NodeId>> {
        let mut index: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
        for node in &self.nodes {
            if let Some(parent) = &node.parent_id {
                index.entry(parent).or_default().push(&node.id);
            }
        }
        index
    }

    fn node_mut(&mut self, id: &NodeId) -> Result<&mut Node> {
        match self.node_slots.get(id) {
            Some(&slot) => Ok(&mut self.nodes[slot]),
            None => Err(TreeError::NodeNotFound(id.clone())),
        }
    }

    // ========== Node primitives ==========

    /// Insert a node. A node with a parent still needs `add_edge`.
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if self.contains(node.id.as_str()) {
            return Err(TreeError::DuplicateNode(node.id));
        }
        if let Some(parent) = &node.parent_id {
            if !self.contains(parent.as_str()) {
                return Err(TreeError::NodeNotFound(parent.clone()));
            }
        }
        debug!(node_id = %node.id, parent = ?node.parent_id, "adding node");
        self.node_slots.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    pub fn update_node(&mut self, id: &NodeId, patch: NodePatch) -> Result<()> {
        let node = self.node_mut(id)?;
        if let Some((label, origin)) = patch.label {
            node.label = label;
            node.label_origin = origin;
        }
        if let Some(position) = patch.position {
            node.position = position;
        }
        if let Some(suggestion) = patch.suggest_new_node {
            node.suggest_new_node = suggestion;
        }
        Ok(())
    }

    pub fn push_turn(&mut self, id: &NodeId, turn: Turn) -> Result<()> {
        self.node_mut(id)?.messages.push(turn);
        Ok(())
    }

    /// Remove and return the last `count` turns, oldest first
    pub fn take_trailing_turns(&mut self, id: &NodeId, count: usize) -> Result<Vec<Turn>> {
        let node = self.node_mut(id)?;
        if node.messages.len() < count {
            return Err(TreeError::Invariant(format!(
                "node {} has {} turns, cannot take {}",
                id,
                node.messages.len(),
                count
            )));
        }
        let split = node.messages.len() - count;
        Ok(node.messages.split_off(split))
    }

    /// Replace the newest turn, or append when there are none
    pub fn replace_last_turn(&mut self, id: &NodeId, turn: Turn) -> Result<()> {
        let node = self.node_mut(id)?;
        match node.messages.last_mut() {
            Some(last) => *last = turn,
            None => node.messages.push(turn),
        }
        Ok(())
    }

    /// Delete one node.
    ///
    /// Children are promoted to roots, highlights pointing at the node are
    /// dropped and every edge touching it is removed. Descendants are not
    /// deleted; see `remove_subtree`.
    pub fn remove_node(&mut self, id: &NodeId) -> Option<Node> {
        let slot = *self.node_slots.get(id)?;
        let removed = self.nodes.remove(slot);
        for node in &mut self.nodes {
            if node.parent_id.as_ref() == Some(id) {
                node.parent_id = None;
            }
            node.highlights.retain(|h| !h.points_to(id));
        }
        self.edges.retain(|e| !e.touches(id));
        self.reindex();
        debug!(node_id = %id, "removed node");
        Some(removed)
    }

    /// Delete a node and all of its descendants in one pass.
    ///
    /// Returns the removed ids, the given node first.
    pub fn remove_subtree(&mut self, id: &NodeId) -> Vec<NodeId> {
        if !self.contains(id.as_str()) {
            return Vec::new();
        }
        let doomed: Vec<NodeId> = {
            let children = self.children_index();
            let mut order = Vec::new();
            let mut stack = vec![id];
            let mut seen = HashSet::new();
            while let Some(current) = stack.pop() {
                if !seen.insert(current) {
                    continue;
                }
                order.push(current.clone());
                if let Some(kids) = children.get(current) {
                    stack.extend(kids.iter().rev().copied());
                }
            }
            order
        };
        let doomed_set: HashSet<&NodeId> = doomed.iter().collect();

        self.nodes.retain(|n| !doomed_set.contains(&n.id));
        for node in &mut self.nodes {
            if node.parent_id.as_ref().is_some_and(|p| doomed_set.contains(p)) {
                node.parent_id = None;
            }
            node.highlights
                .retain(|h| h.child.child_id().map_or(true, |c| !doomed_set.contains(c)));
        }
        self.edges
            .retain(|e| !doomed_set.contains(&e.source_id) && !doomed_set.contains(&e.target_id));
        self.reindex();
        debug!(node_id = %id, removed = doomed.len(), "removed subtree");
        doomed
    }

    // ========== Edge primitives ==========

    /// Link an existing child to its parent; the child's `parent_id` must already say so
    pub fn add_edge(&mut self, source_id: &NodeId, target_id: &NodeId) -> Result<EdgeId> {
        if !self.contains(source_id.as_str()) {
            return Err(TreeError::NodeNotFound(source_id.clone()));
        }
        let target = self
            .get(target_id.as_str())
            .ok_or_else(|| TreeError::NodeNotFound(target_id.clone()))?;
        if target.parent_id.as_ref() != Some(source_id) {
            return Err(TreeError::EdgeMismatch {
                source_id: source_id.clone(),
                target_id: target_id.clone(),
            });
        }
        if self.parent_edges.contains_key(target_id.as_str()) {
            return Err(TreeError::DuplicateEdge(target_id.clone()));
        }
        let edge = Edge::link(source_id.clone(), target_id.clone());
        let id = edge.id.clone();
        self.parent_edges.insert(target_id.clone(), self.edges.len());
        self.edges.push(edge);
        Ok(id)
    }

    /// Remove an edge, detaching its target into a root.
    ///
    /// The parent's highlight for that child is dropped with it.
    pub fn remove_edge(&mut self, edge_id: &EdgeId) -> Result<Edge> {
        let slot = self
            .edges
            .iter()
            .position(|e| &e.id == edge_id)
            .ok_or_else(|| TreeError::EdgeNotFound(edge_id.clone()))?;
        let edge = self.edges.remove(slot);
        if let Ok(target) = self.node_mut(&edge.target_id) {
            target.parent_id = None;
        }
        if let Ok(source) = self.node_mut(&edge.source_id) {
            source.highlights.retain(|h| !h.points_to(&edge.target_id));
        }
        self.reindex();
        Ok(edge)
    }

    // ========== Highlight primitives ==========

    /// Record a branch point with a pending child; returns its index
    pub fn add_highlight(&mut self, owner: &NodeId, text: impl Into<String>) -> Result<usize> {
        let node = self.node_mut(owner)?;
        node.highlights.push(Highlight::pending(text));
        Ok(node.highlights.len() - 1)
    }

    /// Point a pending highlight at the child created for it
    pub fn resolve_highlight(
        &mut self,
        owner: &NodeId,
        index: usize,
        child_id: &NodeId,
    ) -> Result<()> {
        let is_child = self
            .get(child_id.as_str())
            .map(|c| c.parent_id.as_ref() == Some(owner))
            .ok_or_else(|| TreeError::NodeNotFound(child_id.clone()))?;
        if !is_child {
            return Err(TreeError::EdgeMismatch {
                source_id: owner.clone(),
                target_id: child_id.clone(),
            });
        }
        let node = self.node_mut(owner)?;
        let highlight = node
            .highlights
            .get_mut(index)
            .ok_or_else(|| TreeError::HighlightNotFound {
                node_id: owner.clone(),
                index,
            })?;
        highlight.child = HighlightTarget::Resolved(child_id.clone());
        Ok(())
    }

    /// Drop highlights still pending on `owner`
    pub fn discard_pending_highlights(&mut self, owner: &NodeId) -> Result<usize> {
        let node = self.node_mut(owner)?;
        let before = node.highlights.len();
        node.highlights.retain(|h| !h.child.is_pending());
        Ok(before - node.highlights.len())
    }

    // ========== Invariants ==========

    /// Verify every forest invariant; used on load and in tests
    pub fn check_invariants(&self) -> Result<()> {
        for node in &self.nodes {
            match &node.parent_id {
                Some(parent) => {
                    if !self.contains(parent.as_str()) {
                        return Err(TreeError::Invariant(format!(
                            "node {} has missing parent {}",
                            node.id, parent
                        )));
                    }
                    match self.parent_edge(node.id.as_str()) {
                        Some(edge) if &edge.source_id == parent => {}
                        _ => {
                            return Err(TreeError::Invariant(format!(
                                "node {} has no edge from its parent {}",
                                node.id, parent
                            )))
                        }
                    }
                }
                None => {
                    if self.parent_edge(node.id.as_str()).is_some() {
                        return Err(TreeError::Invariant(format!(
                            "root {} has an incoming edge",
                            node.id
                        )));
                    }
                }
            }
            for highlight in &node.highlights {
                if let HighlightTarget::Resolved(child) = &highlight.child {
                    let linked = self
                        .get(child.as_str())
                        .is_some_and(|c| c.parent_id.as_ref() == Some(&node.id));
                    if !linked {
                        return Err(TreeError::Invariant(format!(
                            "highlight on {} points at non-child {}",
                            node.id, child
                        )));
                    }
                }
            }
        }
        for edge in &self.edges {
            if !self.contains(edge.source_id.as_str()) || !self.contains(edge.target_id.as_str()) {
                return Err(TreeError::Invariant(format!("edge {} is dangling", edge.id)));
            }
        }
        for node in &self.nodes {
            let mut seen = HashSet::new();
            let mut current = node.parent_id.as_ref();
            while let Some(id) = current {
                if id == &node.id || !seen.insert(id) {
                    return Err(TreeError::Cycle(node.id.clone()));
                }
                current = self.get(id.as_str()).and_then(|n| n.parent_id.as_ref());
            }
        }
        Ok(())
    }

    fn reindex(&mut self) {
        self.node_slots = self
            .nodes
            .iter()
            .enumerate()
            .map(|(slot, n)| (n.id.clone(), slot))
            .collect();
        self.parent_edges = self
            .edges
            .iter()
            .enumerate()
            .map(|(slot, e)| (e.target_id.clone(), slot))
            .collect();
    }
}
