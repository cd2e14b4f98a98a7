//! Completion gateway contract
//!
//! The orchestrator only ever talks to `CompletionGateway`; provider wire
//! formats stay behind it. A gateway performs exactly one attempt per call.

use async_trait::async_trait;
use tracing::warn;
use tree_core::{ImageAttachment, Role, Turn};

use crate::error::Result;

/// Text returned by a successful completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub finish_reason: Option<String>,
}

impl Completion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_instruction: String,
    pub heritage: String,
    pub turns: Vec<Turn>,
    /// Attached to the last user turn only
    pub image: Option<ImageAttachment>,
    /// Overrides the gateway's default model
    pub model: Option<String>,
}

/// A turn as it goes on the wire
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingTurn<'a> {
    pub role: Role,
    pub content: &'a str,
    pub image: Option<&'a ImageAttachment>,
}

impl CompletionRequest {
    pub fn new(
        system_instruction: impl Into<String>,
        heritage: impl Into<String>,
        turns: Vec<Turn>,
    ) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            heritage: heritage.into(),
            turns,
            image: None,
            model: None,
        }
    }

    pub fn with_image(mut self, image: Option<ImageAttachment>) -> Self {
        self.image = image;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Turns with stored images stripped and the request image placed on the
    /// last user turn
    pub fn outgoing_turns(&self) -> Vec<OutgoingTurn<'_>> {
        let last_user = self.turns.iter().rposition(Turn::is_user);
        if self.image.is_some() && last_user.is_none() {
            warn!("dropping image: request has no user turn to carry it");
        }
        self.turns
            .iter()
            .enumerate()
            .map(|(i, turn)| OutgoingTurn {
                role: turn.role,
                content: &turn.content,
                image: if Some(i) == last_user { self.image.as_ref() } else { None },
            })
            .collect()
    }
}

#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Run one completion. Failures come back as typed errors, never panics.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;
}
