//! Google Gemini `generateContent` wire types.
//!
//! Gemini specifics:
//! - Messages are called "contents"
//! - Role is "user" or "model" (not "assistant")
//! - Content is an array of "parts"; images travel as `inlineData`
//! - The system instruction is separate from the contents
//!
//! The heritage transcript is sent as the first user content, ahead of the
//! node's own turns.

use serde::{Deserialize, Serialize};
use tree_core::Role;

use crate::gateway::{CompletionRequest, OutgoingTurn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: Option<GeminiContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Error envelope returned with non-success statuses
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiErrorBody {
    pub error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl GeminiContent {
    fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: Some(role.to_string()),
            parts: vec![GeminiPart {
                text: Some(text.into()),
                inline_data: None,
            }],
        }
    }
}

impl From<OutgoingTurn<'_>> for GeminiContent {
    fn from(turn: OutgoingTurn<'_>) -> Self {
        let role = match turn.role {
            Role::User => "user",
            Role::Assistant => "model",
        };
        let mut content = GeminiContent::text(role, turn.content);
        if let Some(image) = turn.image {
            content.parts.push(GeminiPart {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: image.mime_type.clone(),
                    data: image.data.clone(),
                }),
            });
        }
        content
    }
}

impl GenerateContentRequest {
    pub fn from_request(request: &CompletionRequest, config: GenerationConfig) -> Self {
        let mut contents = vec![GeminiContent::text("user", request.heritage.clone())];
        contents.extend(request.outgoing_turns().into_iter().map(GeminiContent::from));
        Self {
            contents,
            system_instruction: Some(GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: Some(request.system_instruction.clone()),
                    inline_data: None,
                }],
            }),
            generation_config: Some(config),
        }
    }
}

impl GenerateContentResponse {
    /// Joined text of the first candidate and its finish reason
    pub fn first_text(&self) -> Option<(String, Option<String>)> {
        let candidate = self.candidates.first()?;
        let text = candidate
            .content
            .as_ref()
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        Some((text, candidate.finish_reason.clone()))
    }
}
