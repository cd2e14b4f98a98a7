//! Ancestor walks over the tree store

use std::collections::HashSet;

use crate::node::{EdgeId, Node, NodeId};
use crate::store::TreeStore;

/// What the heritage transcript needs to know about one ancestor
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AncestorEntry {
    pub id: NodeId,
    pub label: String,
    pub context_anchor: Option<String>,
    pub first_user_message: Option<String>,
}

impl From<&Node> for AncestorEntry {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            label: node.label.clone(),
            context_anchor: node.context_anchor.clone(),
            first_user_message: node.first_user_message().map(str::to_string),
        }
    }
}

/// Root-first path ending at the requested node
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AncestorChain {
    entries: Vec<AncestorEntry>,
}

impl AncestorChain {
    pub fn entries(&self) -> &[AncestorEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn root(&self) -> Option<&AncestorEntry> {
        self.entries.first()
    }

    pub fn target(&self) -> Option<&AncestorEntry> {
        self.entries.last()
    }
}

/// Lazy walk from a node up towards its root (node first).
///
/// Stops at a dangling parent reference, and at a repeated id should the
/// store ever contain a cycle.
pub struct Ancestors<'a> {
    store: &'a TreeStore,
    next: Option<&'a Node>,
    seen: HashSet<&'a NodeId>,
}

impl<'a> Ancestors<'a> {
    pub fn new(store: &'a TreeStore, node_id: &str) -> Self {
        Self {
            store,
            next: store.get(node_id),
            seen: HashSet::new(),
        }
    }
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        if !self.seen.insert(&current.id) {
            return None;
        }
        self.next = current
            .parent_id
            .as_ref()
            .and_then(|parent| self.store.get(parent.as_str()));
        Some(current)
    }
}

/// Root-to-node chain; empty when the node does not exist
pub fn ancestor_chain(store: &TreeStore, node_id: &str) -> AncestorChain {
    let mut entries: Vec<AncestorEntry> = Ancestors::new(store, node_id)
        .map(AncestorEntry::from)
        .collect();
    entries.reverse();
    AncestorChain { entries }
}

/// Ids from root to node, inclusive
pub fn active_node_path(store: &TreeStore, node_id: &str) -> Vec<NodeId> {
    let mut path: Vec<NodeId> = Ancestors::new(store, node_id).map(|n| n.id.clone()).collect();
    path.reverse();
    path
}

/// Edge ids from node up to its root, node-side first.
///
/// Only edges whose endpoints both exist and match the parent link are
/// returned; a root yields nothing.
pub fn active_path_edge_ids(store: &TreeStore, node_id: &str) -> Vec<EdgeId> {
    Ancestors::new(store, node_id)
        .filter_map(|node| {
            let parent = node.parent_id.as_ref()?;
            let edge = store.parent_edge(node.id.as_str())?;
            let intact = &edge.source_id == parent && store.contains(parent.as_str());
            intact.then(|| edge.id.clone())
        })
        .collect()
}

/// Number of ancestors above the node (0 for roots and unknown ids)
pub fn depth(store: &TreeStore, node_id: &str) -> usize {
    Ancestors::new(store, node_id).count().saturating_sub(1)
}

/// Every node below `node_id`, depth-first, excluding the node itself
pub fn descendants(store: &TreeStore, node_id: &str) -> Vec<NodeId> {
    let children = store.children_index();
    let mut found = Vec::new();
    let mut seen = HashSet::new();
    let mut stack: Vec<&NodeId> = match store.get(node_id) {
        Some(node) => children.get(&node.id).cloned().unwrap_or_default(),
        None => return found,
    };
    while let Some(current) = stack.pop() {
        if !seen.insert(current) {
            continue;
        }
        found.push(current.clone());
        if let Some(kids) = children.get(current) {
            stack.extend(kids.iter().copied());
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Turn;
    use crate::node::{LabelOrigin, Position};

    fn sample() -> TreeStore {
        let mut store = TreeStore::new();
        let origin = LabelOrigin::Concept;
        let mut root = Node::root(NodeId::from("a"), "Recursion", origin, Position::default());
        root.messages.push(Turn::user("What is recursion?"));
        store.add_node(root).unwrap();
        for (parent, id) in [("a", "b"), ("b", "c"), ("a", "d")] {
            let node = Node::branch(
                NodeId::from(id),
                NodeId::from(parent),
                format!("anchor {id}"),
                Position::default(),
            );
            store.add_node(node).unwrap();
            store.add_edge(&NodeId::from(parent), &NodeId::from(id)).unwrap();
        }
        store
    }

    #[test]
    fn test_chain_is_root_first_and_depth_plus_one_long() {
        let store = sample();
        for id in ["a", "b", "c", "d"] {
            let chain = ancestor_chain(&store, id);
            assert_eq!(chain.len(), depth(&store, id) + 1);
            assert_eq!(chain.target().unwrap().id.as_str(), id);
            let root = chain.root().unwrap();
            assert!(store.get(root.id.as_str()).unwrap().is_root());
        }
        let chain = ancestor_chain(&store, "c");
        let ids: Vec<&str> = chain.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(chain.root().unwrap().first_user_message.as_deref(), Some("What is recursion?"));
    }

    #[test]
    fn test_chain_for_unknown_node_is_empty() {
        let store = sample();
        assert!(ancestor_chain(&store, "nope").is_empty());
        assert!(active_path_edge_ids(&store, "nope").is_empty());
    }

    #[test]
    fn test_chain_stops_at_promoted_root() {
        let mut store = sample();
        store.remove_node(&NodeId::from("a"));
        let chain = ancestor_chain(&store, "c");
        let ids: Vec<&str> = chain.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["b", "c"]);
        assert_eq!(depth(&store, "c"), 1);
    }

    #[test]
    fn test_active_path_edges() {
        let store = sample();
        assert!(active_path_edge_ids(&store, "a").is_empty());
        let edges = active_path_edge_ids(&store, "c");
        let ids: Vec<&str> = edges.iter().map(EdgeId::as_str).collect();
        assert_eq!(ids, ["edge_b_c", "edge_a_b"]);
    }

    #[test]
    fn test_active_node_path() {
        let store = sample();
        let path: Vec<String> = active_node_path(&store, "c")
            .iter()
            .map(|id| id.to_string())
            .collect();
        assert_eq!(path, ["a", "b", "c"]);
    }

    #[test]
    fn test_descendants() {
        let store = sample();
        let mut found: Vec<String> = descendants(&store, "a")
            .iter()
            .map(|id| id.to_string())
            .collect();
        found.sort();
        assert_eq!(found, ["b", "c", "d"]);
        assert!(descendants(&store, "c").is_empty());
    }
}
