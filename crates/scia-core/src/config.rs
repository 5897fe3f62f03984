use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SciaError};

/// Top-level scia configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub specialists: SpecialistsConfig,
    #[serde(default)]
    pub web_search: Option<WebSearchConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Extra HTTP headers sent with every request (filled from presets or by the user).
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
}

fn default_provider() -> String { "ollama".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.0 }

/// How selected specialist units are executed.
///
/// Chosen once when the graph is built; never re-evaluated mid-run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchPolicy {
    /// One unit at a time, in selection order.
    Sequential,
    /// Every selected unit as its own task, joined before synthesis.
    #[default]
    Concurrent,
}

impl std::fmt::Display for DispatchPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Concurrent => write!(f, "concurrent"),
        }
    }
}

/// Graph execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    #[serde(default)]
    pub dispatch: DispatchPolicy,
    /// Upper bound on simultaneously running units under the concurrent policy.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Caller-level timeout for a whole run (unset = no timeout).
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchPolicy::default(),
            max_concurrency: default_max_concurrency(),
            run_timeout_secs: None,
        }
    }
}

fn default_max_concurrency() -> usize { 3 }

/// Retry policy for external capability calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// The active backend is a rate-limited free tier. Retries only happen when set.
    #[serde(default)]
    pub free_tier: bool,
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff before retry `n` (0-based) is `backoff_base_secs * 2^n`.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            free_tier: false,
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base(),
        }
    }
}

fn default_max_attempts() -> u32 { 3 }
fn default_backoff_base() -> u64 { 30 }

/// Settings shared by the built-in specialist units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistsConfig {
    /// CSV file with sales, inventory and supplier columns.
    #[serde(default = "default_data_path")]
    pub data_path: String,
    /// Maximum model turns inside one specialist's tool loop.
    #[serde(default = "default_specialist_max_turns")]
    pub max_turns: usize,
}

impl Default for SpecialistsConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            max_turns: default_specialist_max_turns(),
        }
    }
}

fn default_data_path() -> String { "data/sample_data.csv".to_string() }
fn default_specialist_max_turns() -> usize { 8 }

/// Web search provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    #[serde(default = "default_search_provider")]
    pub provider: String,
    pub api_key: String,
}

fn default_search_provider() -> String { "tavily".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SciaError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| SciaError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.orchestration.max_concurrency == 0 {
            return Err(SciaError::Config(
                "orchestration.max_concurrency must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(SciaError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.specialists.max_turns == 0 {
            return Err(SciaError::Config("specialists.max_turns must be at least 1".into()));
        }
        Ok(())
    }

    /// Resolve the dataset path (expand ~).
    pub fn data_path(&self) -> PathBuf {
        let path = &self.specialists.data_path;
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    /// A copy safe to print: secrets replaced by a mask.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.model.api_key.is_some() {
            copy.model.api_key = Some(mask_secret());
        }
        if let Some(ref mut search) = copy.web_search {
            search.api_key = mask_secret();
        }
        copy
    }
}

fn mask_secret() -> String {
    "********".to_string()
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_SCIA_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_SCIA_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_SCIA_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_SCIA_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_SCIA_VAR}\"");
    }

    #[test]
    fn test_defaults_from_minimal_toml() {
        let toml_str = r#"
[model]
model_id = "llama3.1"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.model.provider, "ollama");
        assert_eq!(config.orchestration.dispatch, DispatchPolicy::Concurrent);
        assert_eq!(config.orchestration.max_concurrency, 3);
        assert!(config.orchestration.run_timeout_secs.is_none());
        assert!(!config.retry.free_tier);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff_base_secs, 30);
        assert_eq!(config.specialists.max_turns, 8);
        assert!(config.web_search.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sequential_policy_parses() {
        let toml_str = r#"
[model]
model_id = "llama-3.3-70b-versatile"
provider = "groq"

[orchestration]
dispatch = "sequential"

[retry]
free_tier = true
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.orchestration.dispatch, DispatchPolicy::Sequential);
        assert!(config.retry.free_tier);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let toml_str = r#"
[model]
model_id = "llama3.1"

[orchestration]
max_concurrency = 0
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(matches!(config.validate(), Err(SciaError::Config(_))));
    }

    #[test]
    fn test_redacted_masks_keys() {
        let toml_str = r#"
[model]
model_id = "gpt-4o"
provider = "openai"
api_key = "sk-secret"

[web_search]
api_key = "tvly-secret"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        let shown = config.redacted();
        assert_eq!(shown.model.api_key.as_deref(), Some("********"));
        assert_eq!(shown.web_search.unwrap().api_key, "********");
        assert_eq!(config.model.api_key.as_deref(), Some("sk-secret"));
    }
}
