//! Secret redaction for provider-supplied text

use once_cell::sync::Lazy;
use regex::Regex;

const MASK: &str = "***";

/// `key` query parameters in request URLs echoed back by transport errors
static QUERY_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)([?&]key=)[^&\s)"]+"#).expect("query key pattern is valid"));

/// Replace every occurrence of `secret` in `text`, including `key=` query values
pub fn redact_secret(text: &str, secret: Option<&str>) -> String {
    let out = match secret.filter(|s| !s.is_empty()) {
        Some(secret) => text.replace(secret, MASK),
        None => text.to_string(),
    };
    QUERY_KEY
        .replace_all(&out, format!("${{1}}{}", MASK).as_str())
        .into_owned()
}
