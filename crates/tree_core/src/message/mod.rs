//! Message module - Conversation turns
//!
//! Also owns the synthetic prompt used when branching from a selection.
//! Rendering code pattern-matches that prompt, so its wording is fixed.

mod turn;

use once_cell::sync::Lazy;
use regex::Regex;

pub use turn::{ImageAttachment, Role, Turn};

const BRANCH_PREFIX: &str = "The student selected this from the previous answer: \"";
const BRANCH_INFIX: &str = "\". Their follow-up question: ";

static BRANCH_PROMPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)^The student selected this from the previous answer: "(.*)"\. Their follow-up question: (.*)$"#,
    )
    .expect("branch prompt pattern is valid")
});

/// Compose the user turn sent when branching from a selection
pub fn branch_prompt(selection: &str, question: &str) -> String {
    format!("{BRANCH_PREFIX}{selection}{BRANCH_INFIX}{question}")
}

/// Recover `(selection, question)` from a branch prompt, if `content` is one
pub fn parse_branch_prompt(content: &str) -> Option<(&str, &str)> {
    let captures = BRANCH_PROMPT.captures(content)?;
    let selection = captures.get(1)?.as_str();
    let question = captures.get(2)?.as_str();
    Some((selection, question))
}
