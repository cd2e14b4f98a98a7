//! Completion gateway implementations

mod gemini;

pub use gemini::GeminiGateway;
