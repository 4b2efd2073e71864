//! Configuration management for tagtally
//!
//! Handles model selection, token budgets, prompts and persistence of user
//! preferences. Fixed at process start; nothing here changes during a run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::llm::openai::DEFAULT_BASE_URL;
use crate::llm::TokenBudget;
use crate::tokenizer::TokenizerKind;

/// Default model name.
pub const DEFAULT_MODEL: &str = "deepseek-chat";

/// Default system instructions for the analysis requests.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You analyse chat messages and count hashtags. \
Reply with JSON only, no commentary.";

/// Default user prompt template. `{prompt}` receives the analysis prompt,
/// `{hashtags}` the known tags, one per line.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "{prompt}

Known hashtags (reuse them when they fit):
{hashtags}

For each hashtag that applies to the messages below, count how many messages it applies to.
Respond with JSON of the form {\"hashtags\": [{\"tag\": \"#example\", \"count\": 1}]}.

Messages:";

/// Model endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelSettings {
    /// Model name sent to the endpoint and used to pick the tokenizer
    #[serde(default = "default_model")]
    pub name: String,
    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-call timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// API key; usually supplied through the environment instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            name: default_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
        }
    }
}

/// Prompt texts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptSettings {
    #[serde(default = "default_system_prompt")]
    pub system: String,
    #[serde(default = "default_template")]
    pub template: String,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_template() -> String {
    DEFAULT_PROMPT_TEMPLATE.to_string()
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            system: default_system_prompt(),
            template: default_template(),
        }
    }
}

/// tagtally configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Version of config schema (for future migrations)
    #[serde(default = "default_version")]
    pub version: u32,
    /// Token counting strategy (bpe, estimate)
    #[serde(default)]
    pub tokenizer: TokenizerKind,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub budget: TokenBudget,
    #[serde(default)]
    pub prompts: PromptSettings,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            tokenizer: TokenizerKind::default(),
            model: ModelSettings::default(),
            budget: TokenBudget::default(),
            prompts: PromptSettings::default(),
        }
    }
}

impl Config {
    /// Get the config file path (~/.tagtally/config.toml)
    pub fn path() -> Result<PathBuf> {
        Ok(tagtally_dir()?.join("config.toml"))
    }

    /// Check if config exists
    pub fn exists() -> bool {
        Self::path().map(|p| p.exists()).unwrap_or(false)
    }

    /// Load config from disk, or return None if it doesn't exist
    pub fn load() -> Result<Option<Self>> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    /// Load config from a specific file
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Load from disk (or defaults), then apply `.env` and environment overrides
    pub fn resolve() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::load()?.unwrap_or_default();
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from environment-style lookups
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(key) = get("TAGTALLY_API_KEY").or_else(|| get("DEEPSEEK_API_KEY")) {
            self.model.api_key = Some(key);
        }
        if let Some(url) = get("TAGTALLY_BASE_URL") {
            self.model.base_url = url;
        }
        if let Some(model) = get("TAGTALLY_MODEL") {
            self.model.name = model;
        }
    }

    /// Reject settings that cannot produce a valid request
    pub fn validate(&self) -> Result<()> {
        self.budget.validate()?;
        if self.model.timeout_secs == 0 {
            anyhow::bail!("model.timeout_secs must be positive");
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            anyhow::bail!("model.temperature must be between 0 and 2");
        }
        Ok(())
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    /// Save config to a specific file
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }
}

/// Get the base tagtally directory path (~/.tagtally)
pub fn tagtally_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".tagtally"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.name, "deepseek-chat");
        assert_eq!(config.tokenizer, TokenizerKind::Bpe);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Config = toml::from_str(
            "tokenizer = \"estimate\"\n[budget]\nmax_total_tokens = 8000\nmax_output_tokens = 1000\n\
             max_input_tokens = 7000\nsafety_margin = 0\ntokens_per_message = 4\ntokens_per_request = 3\n",
        )
        .unwrap();
        assert_eq!(parsed.tokenizer, TokenizerKind::Estimate);
        assert_eq!(parsed.budget.max_input_tokens, 7000);
        assert_eq!(parsed.model, ModelSettings::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(|name| match name {
            "DEEPSEEK_API_KEY" => Some("sk-test".to_string()),
            "TAGTALLY_MODEL" => Some("  ".to_string()),
            "TAGTALLY_BASE_URL" => Some("http://localhost:9000/v1".to_string()),
            _ => None,
        });
        assert_eq!(config.model.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model.name, "deepseek-chat");
        assert_eq!(config.model.base_url, "http://localhost:9000/v1");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.model.temperature = 0.5;
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects_bad_budget() {
        let mut config = Config::default();
        config.budget.max_output_tokens = 10_000;
        assert!(config.validate().is_err());
    }
}
