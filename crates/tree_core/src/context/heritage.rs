//! Heritage transcript rendering
//!
//! The transcript is the only ancestry the completion call sees. Its layout
//! is part of the prompting convention and must stay byte-stable.

use std::fmt::Write;

use super::chain::AncestorChain;

const HEADER: &str = "Contextual Heritage:\n";

/// Render a chain as nested heritage narration
pub fn heritage_transcript(chain: &AncestorChain) -> String {
    let mut out = String::from(HEADER);
    for (depth, entry) in chain.entries().iter().enumerate() {
        if depth == 0 {
            let _ = write!(out, "Root Topic: \"{}\"", entry.label);
            if let Some(question) = &entry.first_user_message {
                let _ = write!(out, " (Original question: \"{}\")", question);
            }
        } else {
            let _ = write!(out, "  ↳ Level {}: \"{}\"", depth, entry.label);
            if let Some(anchor) = entry.context_anchor.as_deref().filter(|a| !a.is_empty()) {
                let _ = write!(out, " (branched from: \"{}\")", anchor);
            }
            if let Some(question) = &entry.first_user_message {
                let _ = write!(out, " - Asked: \"{}\"", question);
            }
        }
        out.push('\n');
    }
    out
}
