//! Node labels and where they came from

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Node \d+$").expect("placeholder pattern is valid"));

const PREVIEW_CHARS: usize = 40;

/// Source of a node's current label.
///
/// Only `Placeholder` labels are consumed by directives purely for renaming;
/// every other origin makes the node eligible for topic-drift suggestions.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LabelOrigin {
    /// Auto-generated `Node <n>`
    #[default]
    Placeholder,
    /// Truncated preview of the selection a branch was created from
    Preview,
    /// Concept proposed by a topic-drift suggestion
    Suggested,
    /// Concept named by a completion
    Concept,
    /// Chosen by the user
    User,
}

/// Default label for the `n`th node
pub fn placeholder_label(n: usize) -> String {
    format!("Node {n}")
}

pub fn is_placeholder_label(label: &str) -> bool {
    PLACEHOLDER.is_match(label)
}

/// Short preview of a selection, used as a branch node's initial label
pub fn preview_label(text: &str) -> String {
    let mut chars = text.chars();
    let preview: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}…", preview.trim_end())
    } else {
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_detection() {
        assert!(is_placeholder_label(&placeholder_label(3)));
        assert!(is_placeholder_label("Node 12"));
        assert!(!is_placeholder_label("Node"));
        assert!(!is_placeholder_label("Nodes 1"));
        assert!(!is_placeholder_label("Recursion"));
    }

    #[test]
    fn test_preview_label_short_text_unchanged() {
        assert_eq!(preview_label("calls itself"), "calls itself");
    }

    #[test]
    fn test_preview_label_truncates_on_char_boundary() {
        let text = "é".repeat(60);
        let preview = preview_label(&text);
        assert!(preview.ends_with('…'));
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 1);
    }
}
