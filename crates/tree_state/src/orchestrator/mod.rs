//! TreeOrchestrator - The only entry point for tree mutations
//!
//! Every action is a discrete awaitable operation that never returns an
//! error; see `ActionOutcome`. The tree lives behind one `RwLock` that is
//! never held across a completion call. Completion calls for the same node
//! are serialized through the `ActivityTracker`, and results for nodes
//! deleted in the meantime are discarded.

mod ask;
mod branch;
mod drift;
mod outcome;

use std::collections::HashSet;
use std::f64::consts::TAU;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};
use tree_core::{
    active_node_path, active_path_edge_ids, ancestor_chain, heritage_transcript,
    placeholder_label, Edge, EdgeId, LabelOrigin, Node, NodeId, NodePatch, Position,
    TreeConfig, TreeError, TreeSnapshot, TreeStore, Turn,
};
use tree_llm::{CompletionGateway, CompletionRequest};

use crate::error::{Result, StorageError};
use crate::machine::{ActivityTracker, NodeActivity};
use crate::saver::{DebouncedSaver, SaveWarning};
use crate::storage::TreeRepository;

pub use outcome::{ActionOutcome, SkipReason};

/// Tree plus presentation selection, guarded together
#[derive(Debug, Default)]
struct TreeState {
    store: TreeStore,
    selected: Option<NodeId>,
}

pub struct TreeOrchestrator {
    config: TreeConfig,
    gateway: Arc<dyn CompletionGateway>,
    state: RwLock<TreeState>,
    activity: ActivityTracker,
    saver: Option<DebouncedSaver>,
}

impl TreeOrchestrator {
    /// Orchestrator over an empty, unpersisted tree
    pub fn new(config: TreeConfig, gateway: Arc<dyn CompletionGateway>) -> Self {
        Self::with_store(config, gateway, TreeStore::new(), None)
    }

    /// Load `tree_id` from `repository` and persist every later mutation to it.
    ///
    /// A tree that does not exist yet starts empty.
    pub async fn open(
        config: TreeConfig,
        gateway: Arc<dyn CompletionGateway>,
        repository: Arc<dyn TreeRepository>,
        tree_id: impl Into<String>,
    ) -> Result<Self> {
        let tree_id = tree_id.into();
        let store = match repository.load(&tree_id).await {
            Ok(snapshot) => TreeStore::from_snapshot(snapshot)
                .map_err(|e| StorageError::InvalidData(e.to_string()))?,
            Err(StorageError::NotFound(_)) => {
                info!(tree_id = %tree_id, "starting new tree");
                TreeStore::new()
            }
            Err(e) => return Err(e),
        };
        info!(tree_id = %tree_id, nodes = store.len(), "opened tree");

        let debounce = Duration::from_millis(config.save_debounce_ms);
        let saver = DebouncedSaver::spawn(repository, tree_id, debounce);
        Ok(Self::with_store(config, gateway, store, Some(saver)))
    }

    fn with_store(
        config: TreeConfig,
        gateway: Arc<dyn CompletionGateway>,
        store: TreeStore,
        saver: Option<DebouncedSaver>,
    ) -> Self {
        Self {
            config,
            gateway,
            state: RwLock::new(TreeState {
                store,
                selected: None,
            }),
            activity: ActivityTracker::new(),
            saver,
        }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    // ========== Simple actions ==========

    /// Add a new empty root labeled `Node <n>`
    pub async fn create_root(&self, position: Position) -> NodeId {
        let mut state = self.state.write().await;
        let id = NodeId::generate();
        let label = placeholder_label(state.store.len() + 1);
        let node = Node::root(id.clone(), label.clone(), LabelOrigin::Placeholder, position);
        match state.store.add_node(node) {
            Ok(()) => {
                info!(node_id = %id, label = %label, "created root node");
                self.persist(&state.store);
            }
            Err(e) => warn!(node_id = %id, "failed to create root: {}", e),
        }
        id
    }

    /// Rename a node; blank names are ignored
    pub async fn rename_node(&self, node_id: &str, label: &str) -> ActionOutcome {
        let label = label.trim();
        if label.is_empty() {
            return skip(SkipReason::BlankInput, node_id);
        }
        let mut state = self.state.write().await;
        let Some(id) = state.store.get(node_id).map(|n| n.id.clone()) else {
            return skip(SkipReason::NodeMissing, node_id);
        };
        let patch = NodePatch::default().label(label, LabelOrigin::User);
        if let Err(e) = state.store.update_node(&id, patch) {
            return conflict(&id, e);
        }
        info!(node_id = %id, label, "renamed node");
        self.persist(&state.store);
        ActionOutcome::applied(&id)
    }

    /// Delete a node with its whole subtree.
    ///
    /// In-flight completions for removed nodes are discarded when they return.
    pub async fn delete_node(&self, node_id: &str) -> ActionOutcome {
        let mut state = self.state.write().await;
        let Some(id) = state.store.get(node_id).map(|n| n.id.clone()) else {
            return skip(SkipReason::NodeMissing, node_id);
        };

        let removed = state.store.remove_subtree(&id);
        for removed_id in &removed {
            if self.activity.forget(removed_id.as_str()) {
                debug!(node_id = %removed_id, "dropped in-flight activity for deleted node");
            }
        }
        let removed_set: HashSet<&NodeId> = removed.iter().collect();
        if state
            .selected
            .as_ref()
            .is_some_and(|selected| removed_set.contains(selected))
        {
            state.selected = None;
        }

        info!(node_id = %id, removed = removed.len(), "deleted node and descendants");
        self.persist(&state.store);
        ActionOutcome::Removed { node_ids: removed }
    }

    /// Presentation-owned placement change
    pub async fn move_node(&self, node_id: &str, position: Position) -> ActionOutcome {
        let mut state = self.state.write().await;
        let Some(id) = state.store.get(node_id).map(|n| n.id.clone()) else {
            return skip(SkipReason::NodeMissing, node_id);
        };
        if let Err(e) = state.store.update_node(&id, NodePatch::default().position(position)) {
            return conflict(&id, e);
        }
        self.persist(&state.store);
        ActionOutcome::applied(&id)
    }

    /// Select a node, or clear the selection with `None`.
    ///
    /// Returns false (and keeps the old selection) for an unknown id.
    pub async fn select(&self, node_id: Option<&str>) -> bool {
        let mut state = self.state.write().await;
        match node_id {
            None => {
                state.selected = None;
                true
            }
            Some(node_id) => match state.store.get(node_id).map(|n| n.id.clone()) {
                Some(id) => {
                    state.selected = Some(id);
                    true
                }
                None => false,
            },
        }
    }

    // ========== Accessors ==========

    pub async fn nodes(&self) -> Vec<Node> {
        self.state.read().await.store.nodes().to_vec()
    }

    pub async fn edges(&self) -> Vec<Edge> {
        self.state.read().await.store.edges().to_vec()
    }

    pub async fn node(&self, node_id: &str) -> Option<Node> {
        self.state.read().await.store.get(node_id).cloned()
    }

    pub async fn selected(&self) -> Option<NodeId> {
        self.state.read().await.selected.clone()
    }

    pub async fn snapshot(&self) -> TreeSnapshot {
        self.state.read().await.store.snapshot()
    }

    /// Edge ids from the selected node up to its root
    pub async fn active_path_edge_ids(&self) -> Vec<EdgeId> {
        let state = self.state.read().await;
        match &state.selected {
            Some(id) => active_path_edge_ids(&state.store, id.as_str()),
            None => Vec::new(),
        }
    }

    /// Node ids from the root down to the selected node
    pub async fn active_node_path(&self) -> Vec<NodeId> {
        let state = self.state.read().await;
        match &state.selected {
            Some(id) => active_node_path(&state.store, id.as_str()),
            None => Vec::new(),
        }
    }

    pub fn is_loading(&self) -> bool {
        !self.activity.is_empty()
    }

    /// Most recently started node still waiting on a completion
    pub fn loading_node_id(&self) -> Option<NodeId> {
        self.activity.latest()
    }

    pub fn loading_node_ids(&self) -> Vec<NodeId> {
        self.activity.active_nodes()
    }

    pub fn node_activity(&self, node_id: &str) -> Option<NodeActivity> {
        self.activity.state(node_id)
    }

    // ========== Persistence ==========

    pub fn save_warnings(&self) -> Option<watch::Receiver<Option<SaveWarning>>> {
        self.saver.as_ref().map(DebouncedSaver::warnings)
    }

    pub fn dismiss_save_warning(&self) {
        if let Some(saver) = &self.saver {
            saver.dismiss_warning();
        }
    }

    /// Write pending changes now instead of after the debounce window
    pub async fn flush(&self) -> Result<()> {
        match &self.saver {
            Some(saver) => saver.flush().await,
            None => Ok(()),
        }
    }

    fn persist(&self, store: &TreeStore) {
        if let Some(saver) = &self.saver {
            saver.schedule(store.snapshot());
        }
    }

    // ========== Shared helpers ==========

    /// Request carrying the configured instruction and model
    fn completion_request(&self, heritage: String, turns: Vec<Turn>) -> CompletionRequest {
        CompletionRequest::new(self.config.system_instruction.clone(), heritage, turns)
            .with_model(Some(self.config.model.clone()))
    }
}

/// Heritage for `node_id` as it stands in `store`
fn heritage_for(store: &TreeStore, node_id: &str) -> String {
    heritage_transcript(&ancestor_chain(store, node_id))
}

/// Cosmetic placement `distance` away from `origin` at a random angle
fn scatter(origin: Position, distance: f64) -> Position {
    let angle = rand::thread_rng().gen_range(0.0..TAU);
    origin.offset(angle, distance)
}

fn skip(reason: SkipReason, node_id: &str) -> ActionOutcome {
    warn!(node_id, ?reason, "action skipped");
    ActionOutcome::skipped(reason)
}

fn conflict(node_id: &NodeId, error: TreeError) -> ActionOutcome {
    warn!(node_id = %node_id, "tree rejected mutation: {}", error);
    ActionOutcome::skipped(SkipReason::Conflict)
}
