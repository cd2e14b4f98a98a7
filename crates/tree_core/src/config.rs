use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const CONFIG_JSON: &str = "config.json";
const CONFIG_TOML: &str = "learning-tree.toml";

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a specialized Knowledge Graph Tutor. You receive a 'Contextual Heritage' string showing the learning path, then the conversation in this node.

Your role:
1. Answer the current question thoroughly while keeping continuity with the heritage and prior messages
2. Do not repeat facts already established in the heritage path or earlier in the conversation
3. Give a complete answer and take the space needed to explain properly
4. Format the answer in clear Markdown with headings, lists and code examples where useful
5. Keep the conversational learning flow encouraging
6. If the student asks about a concept they selected from a previous answer, go deep on just that concept
7. The student selects parts of your answer to explore further, so favour complete explanations

**Node title (first response only):** End the response with exactly one line: CONCEPT: <short phrase>
where <short phrase> is one or two words naming the main concept you explained, e.g. \"React Hooks\", \"Binary Search\".

**Unrelated topic only:** Add SUGGEST_NEW_NODE only when the latest question is clearly unrelated to the current conversation. For related questions or natural follow-ups answer in place and do not add it. When you do add it, end with one line: SUGGEST_NEW_NODE: <concept name>
where <concept name> is a short name for the new topic.";

/// Runtime configuration handed to the orchestrator and gateway at construction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub system_instruction: String,
    pub model: String,
    pub api_key: Option<String>,
    pub api_base: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub request_timeout_secs: u64,
    pub save_debounce_ms: u64,
    /// Radial distance of a branch child from its parent
    pub branch_distance: f64,
    /// Radial distance of a drift root from its source node
    pub drift_distance: f64,
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".learning-tree")
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            temperature: 0.7,
            max_output_tokens: 8192,
            request_timeout_secs: 60,
            save_debounce_ms: 800,
            branch_distance: 150.0,
            drift_distance: 320.0,
            data_dir: default_data_dir(),
        }
    }
}

impl TreeConfig {
    /// Load from `<data_dir>/config.json`, else `./learning-tree.toml`, then
    /// apply environment overrides. Unreadable files fall back to defaults.
    pub fn load() -> Self {
        let data_dir = std::env::var_os("LEARNING_TREE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);
        let mut config = Self::from_files(&data_dir.join(CONFIG_JSON), Path::new(CONFIG_TOML))
            .unwrap_or_default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    fn from_files(json_path: &Path, toml_path: &Path) -> Option<Self> {
        if let Ok(content) = std::fs::read_to_string(json_path) {
            match serde_json::from_str::<TreeConfig>(&content) {
                Ok(config) => return Some(config),
                Err(e) => debug!("ignoring malformed {}: {}", json_path.display(), e),
            }
        }
        if let Ok(content) = std::fs::read_to_string(toml_path) {
            match toml::from_str::<TreeConfig>(&content) {
                Ok(config) => return Some(config),
                Err(e) => debug!("ignoring malformed {}: {}", toml_path.display(), e),
            }
        }
        None
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(api_key) = var("GEMINI_API_KEY").filter(|v| !v.trim().is_empty()) {
            self.api_key = Some(api_key);
        }
        if let Some(model) = var("LEARNING_TREE_MODEL").filter(|v| !v.trim().is_empty()) {
            self.model = model;
        }
        if let Some(api_base) = var("LEARNING_TREE_API_BASE").filter(|v| !v.trim().is_empty()) {
            self.api_base = api_base;
        }
        if let Some(data_dir) = var("LEARNING_TREE_DATA_DIR").filter(|v| !v.trim().is_empty()) {
            self.data_dir = PathBuf::from(data_dir);
        }
    }

    /// Directory holding persisted trees
    pub fn trees_dir(&self) -> PathBuf {
        self.data_dir.join("trees")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = TreeConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(config.api_key.is_none());
        assert!(config.system_instruction.contains("CONCEPT:"));
        assert!(config.system_instruction.contains("SUGGEST_NEW_NODE:"));
        assert!(config.drift_distance > config.branch_distance);
    }

    #[test]
    fn test_json_file_is_preferred_over_toml() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join(CONFIG_JSON);
        let toml_path = dir.path().join(CONFIG_TOML);
        std::fs::write(&json_path, r#"{"model": "from-json"}"#).unwrap();
        std::fs::write(&toml_path, "model = \"from-toml\"\n").unwrap();

        let config = TreeConfig::from_files(&json_path, &toml_path).unwrap();
        assert_eq!(config.model, "from-json");
        assert_eq!(config.max_output_tokens, 8192);
    }

    #[test]
    fn test_malformed_json_falls_back_to_toml() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join(CONFIG_JSON);
        let toml_path = dir.path().join(CONFIG_TOML);
        std::fs::write(&json_path, "{not json").unwrap();
        std::fs::write(&toml_path, "save_debounce_ms = 50\n").unwrap();

        let config = TreeConfig::from_files(&json_path, &toml_path).unwrap();
        assert_eq!(config.save_debounce_ms, 50);
    }

    #[test]
    fn test_missing_files_yield_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TreeConfig::from_files(&dir.path().join("a"), &dir.path().join("b")).is_none());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("GEMINI_API_KEY", "secret"),
            ("LEARNING_TREE_MODEL", "gemini-2.0-flash"),
            ("LEARNING_TREE_API_BASE", "  "),
        ]);
        let mut config = TreeConfig::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.api_base, DEFAULT_API_BASE);
    }
}
