//! Response parser - Splits completion text into display content and directives
//!
//! A completion may end with directive lines:
//! `CONCEPT: <short phrase>` names the node, `SUGGEST_NEW_NODE: <concept>`
//! flags topic drift. Keywords are case-insensitive; directive lines are
//! removed from the displayed content.

use once_cell::sync::Lazy;
use regex::Regex;

pub const CONCEPT_DIRECTIVE: &str = "CONCEPT";
pub const DRIFT_DIRECTIVE: &str = "SUGGEST_NEW_NODE";

static CONCEPT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^CONCEPT:\s*(.+)$").expect("concept pattern is valid"));
static DRIFT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^SUGGEST_NEW_NODE:\s*(.+)$").expect("drift pattern is valid")
});

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    pub content: String,
    pub concept: Option<String>,
    pub suggest_new_node: Option<String>,
}

impl ParsedResponse {
    pub fn has_directives(&self) -> bool {
        self.concept.is_some() || self.suggest_new_node.is_some()
    }
}

/// Captured, trimmed directive value. A blank value still strips the line.
fn directive_value(pattern: &Regex, line: &str) -> Option<Option<String>> {
    let captures = pattern.captures(line)?;
    let value = captures.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
    Some((!value.is_empty()).then(|| value.to_string()))
}

/// Extract directives from `raw`; the last occurrence of each wins
pub fn parse_response(raw: &str) -> ParsedResponse {
    let mut concept = None;
    let mut suggest_new_node = None;
    let mut keep = Vec::new();

    for line in raw.split('\n') {
        if let Some(value) = directive_value(&CONCEPT_LINE, line) {
            if value.is_some() {
                concept = value;
            }
        } else if let Some(value) = directive_value(&DRIFT_LINE, line) {
            if value.is_some() {
                suggest_new_node = value;
            }
        } else {
            keep.push(line);
        }
    }

    ParsedResponse {
        content: keep.join("\n").trim().to_string(),
        concept,
        suggest_new_node,
    }
}
