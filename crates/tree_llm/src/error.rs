use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Distinguishable failure classes of a completion call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or rejected credentials
    Auth,
    /// Rate limit or quota exhausted
    Quota,
    /// Transport failure or timeout
    Network,
    /// Body could not be understood
    MalformedResponse,
    /// Provider returned no text
    EmptyOutput,
    /// Any other non-success status
    Provider,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct CompletionError {
    pub kind: ErrorKind,
    /// Human-readable reason; never contains credentials
    pub message: String,
}

impl CompletionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn quota(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Quota, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedResponse, message)
    }

    pub fn empty(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EmptyOutput, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Provider, message)
    }

    /// Text written into the node's conversation in place of an answer
    pub fn to_turn_text(&self) -> String {
        format!(
            "Error: {}. Please check your API key and connection.",
            self.message.trim_end_matches('.')
        )
    }
}

pub type Result<T> = std::result::Result<T, CompletionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_message() {
        let err = CompletionError::quota("Resource exhausted");
        assert_eq!(err.to_string(), "Resource exhausted");
        assert_eq!(err.kind, ErrorKind::Quota);
    }

    #[test]
    fn test_turn_text() {
        let err = CompletionError::network("request timed out.");
        assert_eq!(
            err.to_turn_text(),
            "Error: request timed out. Please check your API key and connection."
        );
    }
}
