use tracing::{debug, info, warn};
use tree_core::{
    parse_response, DriftSuggestion, ImageAttachment, LabelOrigin, NodeId, NodePatch,
    ParsedResponse, TreeStore, Turn,
};

use super::{conflict, heritage_for, skip, ActionOutcome, SkipReason, TreeOrchestrator};
use crate::machine::NodeActivity;

impl TreeOrchestrator {
    /// Ask a question in an existing node.
    ///
    /// The user turn is visible immediately; the answer (or a visible error
    /// turn) is appended once the completion returns.
    pub async fn ask_question(
        &self,
        node_id: &str,
        text: &str,
        image: Option<ImageAttachment>,
    ) -> ActionOutcome {
        let text = text.trim();
        if text.is_empty() {
            return skip(SkipReason::BlankInput, node_id);
        }

        let (id, guard, request, first_exchange) = {
            let mut state = self.state.write().await;
            let Some(id) = state.store.get(node_id).map(|n| n.id.clone()) else {
                return skip(SkipReason::NodeMissing, node_id);
            };
            let Some(guard) = self.activity.begin(&id, NodeActivity::Asking) else {
                return skip(SkipReason::NodeBusy, node_id);
            };

            let turn = Turn::user(text).with_image(image.clone());
            if let Err(e) = state.store.push_turn(&id, turn) {
                return conflict(&id, e);
            }
            let Some(node) = state.store.get(id.as_str()) else {
                return skip(SkipReason::NodeMissing, node_id);
            };
            let first_exchange = node.user_turn_count() == 1;
            let messages = node.messages.clone();
            let heritage = heritage_for(&state.store, id.as_str());
            self.persist(&state.store);

            let request = self.completion_request(heritage, messages).with_image(image);
            (id, guard, request, first_exchange)
        };

        debug!(
            node_id = %id,
            turns = request.turns.len(),
            heritage_chars = request.heritage.len(),
            first_exchange,
            "asking question"
        );
        let result = self.gateway.complete(request).await;

        let mut state = self.state.write().await;
        if !guard.is_current() || !state.store.contains(id.as_str()) {
            warn!(node_id = %id, "discarding answer for deleted node");
            return ActionOutcome::skipped(SkipReason::Stale);
        }

        let outcome = match result {
            Ok(completion) => {
                let parsed = parse_response(&completion.text);
                let answer = Turn::assistant(parsed.content.clone());
                if let Err(e) = state.store.push_turn(&id, answer) {
                    return conflict(&id, e);
                }
                if let Err(e) = apply_directives(&mut state.store, &id, &parsed, first_exchange) {
                    return conflict(&id, e);
                }
                ActionOutcome::applied(&id)
            }
            Err(e) => {
                warn!(node_id = %id, kind = ?e.kind, "completion failed: {}", e);
                if let Err(err) = state.store.push_turn(&id, Turn::assistant(e.to_turn_text())) {
                    return conflict(&id, err);
                }
                ActionOutcome::Failed {
                    node_id: id.clone(),
                    kind: e.kind,
                }
            }
        };
        self.persist(&state.store);
        drop(state);
        drop(guard);
        outcome
    }
}

/// Apply the label and drift side effects of a parsed answer.
///
/// - A node still carrying its placeholder label takes either directive as
///   its name and is never told it drifted.
/// - On a node's first exchange a concept becomes the label, unless the user
///   chose the label. A first exchange never carries a drift suggestion.
/// - Later exchanges attach a drift directive as the node's suggestion.
pub(super) fn apply_directives(
    store: &mut TreeStore,
    id: &NodeId,
    parsed: &ParsedResponse,
    first_exchange: bool,
) -> tree_core::Result<()> {
    let Some(node) = store.get(id.as_str()) else {
        return Err(tree_core::TreeError::NodeNotFound(id.clone()));
    };

    if node.carries_placeholder_label() {
        if let Some(label) = parsed.concept.as_ref().or(parsed.suggest_new_node.as_ref()) {
            info!(node_id = %id, label = %label, "named node from answer");
            store.update_node(id, NodePatch::default().label(label.clone(), LabelOrigin::Concept))?;
        }
        return Ok(());
    }

    if first_exchange {
        let user_named = node.label_origin == LabelOrigin::User;
        if let Some(concept) = parsed.concept.as_ref().filter(|_| !user_named) {
            info!(node_id = %id, label = %concept, "adopted concept label");
            let patch = NodePatch::default().label(concept.clone(), LabelOrigin::Concept);
            store.update_node(id, patch)?;
        }
        return Ok(());
    }

    if let Some(concept) = &parsed.suggest_new_node {
        info!(node_id = %id, concept = %concept, "topic drift suggested");
        let suggestion = DriftSuggestion {
            concept: concept.clone(),
        };
        store.update_node(id, NodePatch::default().suggestion(Some(suggestion)))?;
    }
    Ok(())
}
