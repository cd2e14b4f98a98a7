use tracing::{debug, info, warn};
use tree_core::{branch_prompt, parse_response, Node, NodeId, TreeStore, Turn};

use super::ask::apply_directives;
use super::{conflict, heritage_for, scatter, skip, ActionOutcome, SkipReason, TreeOrchestrator};
use crate::machine::NodeActivity;

/// Trim and collapse internal whitespace runs to single spaces
fn normalize_selection(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Highlight, child node and edge for a new branch, all or nothing
fn link_child(store: &mut TreeStore, parent_id: &NodeId, child: Node) -> tree_core::Result<()> {
    let child_id = child.id.clone();
    let anchor = child.context_anchor.clone().unwrap_or_default();
    let index = store.add_highlight(parent_id, anchor)?;
    if let Err(e) = store.add_node(child) {
        store.discard_pending_highlights(parent_id)?;
        return Err(e);
    }
    let linked = match store.add_edge(parent_id, &child_id) {
        Ok(_) => store.resolve_highlight(parent_id, index, &child_id),
        Err(e) => Err(e),
    };
    if let Err(e) = linked {
        store.remove_node(&child_id);
        store.discard_pending_highlights(parent_id)?;
        return Err(e);
    }
    Ok(())
}

impl TreeOrchestrator {
    /// Branch a child node from a fragment of the parent's answer.
    ///
    /// The child, its edge and the parent's resolved highlight exist before
    /// the completion call starts; the completion only fills the child's
    /// conversation. Only the child is claimed while waiting.
    pub async fn branch_from_selection(
        &self,
        parent_id: &str,
        selected_text: &str,
        question: &str,
    ) -> ActionOutcome {
        let anchor = normalize_selection(selected_text);
        let question = question.trim();
        if anchor.is_empty() || question.is_empty() {
            return skip(SkipReason::BlankInput, parent_id);
        }

        let (child_id, guard, request) = {
            let mut state = self.state.write().await;
            let Some(parent) = state.store.get(parent_id) else {
                return skip(SkipReason::NodeMissing, parent_id);
            };
            if !parent.has_answer() {
                return skip(SkipReason::NoAnswerYet, parent_id);
            }
            let parent_key = parent.id.clone();
            let position = scatter(parent.position, self.config.branch_distance);

            let child_id = NodeId::generate();
            let Some(guard) = self.activity.begin(&child_id, NodeActivity::Branching) else {
                return skip(SkipReason::NodeBusy, child_id.as_str());
            };
            let child =
                Node::branch(child_id.clone(), parent_key.clone(), anchor.clone(), position);
            if let Err(e) = link_child(&mut state.store, &parent_key, child) {
                return conflict(&parent_key, e);
            }
            info!(parent = %parent_key, child = %child_id, anchor = %anchor, "branched node");

            let prompt = Turn::user(branch_prompt(&anchor, question));
            if let Err(e) = state.store.push_turn(&child_id, prompt.clone()) {
                return conflict(&child_id, e);
            }
            // The child is not part of its own heritage yet
            let heritage = heritage_for(&state.store, parent_key.as_str());
            self.persist(&state.store);

            (child_id, guard, self.completion_request(heritage, vec![prompt]))
        };

        debug!(
            node_id = %child_id,
            heritage_chars = request.heritage.len(),
            "asking branch question"
        );
        let result = self.gateway.complete(request).await;

        let mut state = self.state.write().await;
        if !guard.is_current() || !state.store.contains(child_id.as_str()) {
            warn!(node_id = %child_id, "discarding answer for deleted branch");
            return ActionOutcome::skipped(SkipReason::Stale);
        }

        let outcome = match result {
            Ok(completion) => {
                let parsed = parse_response(&completion.text);
                let answer = Turn::assistant(parsed.content.clone());
                if let Err(e) = state.store.push_turn(&child_id, answer) {
                    return conflict(&child_id, e);
                }
                // The child may have been renamed while the answer was pending
                if let Err(e) = apply_directives(&mut state.store, &child_id, &parsed, true) {
                    return conflict(&child_id, e);
                }
                ActionOutcome::applied(&child_id)
            }
            Err(e) => {
                warn!(node_id = %child_id, kind = ?e.kind, "branch completion failed: {}", e);
                let error_turn = Turn::assistant(e.to_turn_text());
                if let Err(err) = state.store.push_turn(&child_id, error_turn) {
                    return conflict(&child_id, err);
                }
                ActionOutcome::Failed {
                    node_id: child_id.clone(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use tree_core::{HighlightTarget, LabelOrigin, Position};

    fn parent_store(parent: &NodeId) -> TreeStore {
        let mut store = TreeStore::new();
        let origin = LabelOrigin::Concept;
        let root = Node::root(parent.clone(), "Recursion", origin, Position::default());
        store.add_node(root).unwrap();
        store
    }

    #[test]
    fn test_normalize_selection() {
        assert_eq!(normalize_selection("  calls \n\t itself  "), "calls itself");
        assert_eq!(normalize_selection(" \n "), "");
    }

    #[test]
    fn test_link_child_resolves_highlight() {
        let parent = NodeId::from("p");
        let mut store = parent_store(&parent);

        let position = Position::new(1.0, 0.0);
        let child = Node::branch(NodeId::from("c"), parent.clone(), "calls itself", position);
        link_child(&mut store, &parent, child).unwrap();

        let highlights = &store.get("p").unwrap().highlights;
        assert_eq!(highlights.len(), 1);
        assert_eq!(highlights[0].child, HighlightTarget::Resolved(NodeId::from("c")));
        store.check_invariants().unwrap();
    }

    #[test]
    fn test_link_child_rolls_back_on_conflict() {
        let parent = NodeId::from("p");
        let mut store = parent_store(&parent);
        // Same id as the parent: add_node refuses it
        let child = Node::branch(parent.clone(), parent.clone(), "x", Position::default());

        assert!(link_child(&mut store, &parent, child).is_err());
        assert!(store.get("p").unwrap().highlights.is_empty());
        assert_eq!(store.len(), 1);
    }
}
