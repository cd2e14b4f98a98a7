use tracing::{debug, info, warn};
use tree_core::{parse_response, LabelOrigin, Node, NodeId, NodePatch, Turn};

use super::ask::apply_directives;
use super::{conflict, heritage_for, scatter, skip, ActionOutcome, SkipReason, TreeOrchestrator};
use crate::machine::NodeActivity;

/// Number of trailing turns a drift acceptance moves
const DRIFT_PAIR: usize = 2;

fn ends_with_exchange(messages: &[Turn]) -> bool {
    matches!(
        messages,
        [.., question, answer] if question.is_user() && answer.is_assistant()
    )
}

impl TreeOrchestrator {
    /// Fork the drifted exchange into a new root and ask it again there.
    ///
    /// The trailing user/assistant pair leaves the source node, the new root
    /// is labeled with the suggested concept, and the moved question is
    /// re-asked as that root's first exchange. A successful re-ask replaces
    /// the moved answer; a failed one keeps it and appends the error.
    pub async fn accept_topic_drift(&self, node_id: &str) -> ActionOutcome {
        let (new_id, guard, request) = {
            let mut state = self.state.write().await;
            let Some(source) = state.store.get(node_id) else {
                return skip(SkipReason::NodeMissing, node_id);
            };
            let source_id = source.id.clone();
            if self.activity.is_busy(source_id.as_str()) {
                return skip(SkipReason::NodeBusy, node_id);
            }
            let Some(suggestion) = source.suggest_new_node.clone() else {
                return skip(SkipReason::NoSuggestion, node_id);
            };
            if !ends_with_exchange(&source.messages) {
                return skip(SkipReason::NotEnoughMessages, node_id);
            }
            let position = scatter(source.position, self.config.drift_distance);

            let new_id = NodeId::generate();
            let Some(guard) = self.activity.begin(&new_id, NodeActivity::ReAsking) else {
                return skip(SkipReason::NodeBusy, new_id.as_str());
            };
            let root = Node::root(
                new_id.clone(),
                suggestion.concept.clone(),
                LabelOrigin::Suggested,
                position,
            );
            if let Err(e) = state.store.add_node(root) {
                return conflict(&new_id, e);
            }

            let moved = match state.store.take_trailing_turns(&source_id, DRIFT_PAIR) {
                Ok(moved) => moved,
                Err(e) => return conflict(&source_id, e),
            };
            let question = moved[0].clone();
            for turn in moved {
                if let Err(e) = state.store.push_turn(&new_id, turn) {
                    return conflict(&new_id, e);
                }
            }
            if let Err(e) = state
                .store
                .update_node(&source_id, NodePatch::default().suggestion(None))
            {
                return conflict(&source_id, e);
            }
            info!(
                source = %source_id,
                node_id = %new_id,
                concept = %suggestion.concept,
                "split drifted exchange into new root"
            );

            let heritage = heritage_for(&state.store, new_id.as_str());
            self.persist(&state.store);

            let image = question.image.clone();
            let request = self.completion_request(heritage, vec![question]).with_image(image);
            (new_id, guard, request)
        };

        debug!(
            node_id = %new_id,
            heritage_chars = request.heritage.len(),
            "re-asking drifted question"
        );
        let result = self.gateway.complete(request).await;

        let mut state = self.state.write().await;
        if !guard.is_current() || !state.store.contains(new_id.as_str()) {
            warn!(node_id = %new_id, "discarding answer for deleted drift root");
            return ActionOutcome::skipped(SkipReason::Stale);
        }

        let outcome = match result {
            Ok(completion) => {
                let parsed = parse_response(&completion.text);
                let answer = Turn::assistant(parsed.content.clone());
                if let Err(e) = state.store.replace_last_turn(&new_id, answer) {
                    return conflict(&new_id, e);
                }
                if let Err(e) = apply_directives(&mut state.store, &new_id, &parsed, true) {
                    return conflict(&new_id, e);
                }
                ActionOutcome::applied(&new_id)
            }
            Err(e) => {
                warn!(node_id = %new_id, kind = ?e.kind, "drift re-ask failed: {}", e);
                let error_turn = Turn::assistant(e.to_turn_text());
                if let Err(err) = state.store.push_turn(&new_id, error_turn) {
                    return conflict(&new_id, err);
                }
                ActionOutcome::Failed {
                    node_id: new_id.clone(),
                    kind: e.kind,
                }
            }
        };
        self.persist(&state.store);
        drop(state);
        drop(guard);
        outcome
    }

    /// Clear a node's drift suggestion without touching anything else
    pub async fn dismiss_topic_drift(&self, node_id: &str) -> ActionOutcome {
        let mut state = self.state.write().await;
        let Some(node) = state.store.get(node_id) else {
            return skip(SkipReason::NodeMissing, node_id);
        };
        if node.suggest_new_node.is_none() {
            return skip(SkipReason::NoSuggestion, node_id);
        }
        let id = node.id.clone();
        if let Err(e) = state.store.update_node(&id, NodePatch::default().suggestion(None)) {
            return conflict(&id, e);
        }
        debug!(node_id = %id, "dismissed topic drift");
        self.persist(&state.store);
        ActionOutcome::applied(&id)
    }
}
