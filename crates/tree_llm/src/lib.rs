//! tree_llm - Completion gateway for the learning tree
//!
//! - `gateway` - the `CompletionGateway` contract and request type
//! - `error` - typed completion failures
//! - `providers` - concrete gateways (Gemini)
//! - `protocol` - provider wire types

pub mod error;
pub mod gateway;
pub mod protocol;
pub mod providers;
pub mod redact;

pub use error::{CompletionError, ErrorKind, Result};
pub use gateway::{Completion, CompletionGateway, CompletionRequest, OutgoingTurn};
pub use providers::GeminiGateway;
pub use redact::redact_secret;
