//! Configuration for order-dependency runs
//!
//! Defines the `order-dependency.toml` schema: evaluation settings, the model
//! clients to build, and the option styles to present.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "order-dependency.toml";

/// Identifier of a model under evaluation
///
/// This is the name stored with every answer, not the provider's model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelId {
    /// Local Llama 3.2 3B
    Llama,
    /// OpenAI gpt-4o-mini
    Gpt4mini,
    /// OpenAI gpt-4o
    Gpt4o,
}

impl ModelId {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Llama => "llama",
            Self::Gpt4mini => "gpt4mini",
            Self::Gpt4o => "gpt4o",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "llama" => Some(Self::Llama),
            "gpt4mini" | "gpt-4o-mini" => Some(Self::Gpt4mini),
            "gpt4o" | "gpt-4o" => Some(Self::Gpt4o),
            _ => None,
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the model is asked for structured output
///
/// - `Tools`: forced function call whose schema restricts the answer to the options
/// - `MdJson`: plain completion; the JSON answer is pulled out of a markdown block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelMode {
    #[default]
    Tools,
    MdJson,
}

impl ModelMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tools => "tools",
            Self::MdJson => "md_json",
        }
    }
}

/// A named scheme of positional option prefixes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionStyle {
    /// Style name stored with every answer (e.g. "Lettered Options")
    pub name: String,
    /// One prefix per option slot
    pub prefixes: Vec<String>,
}

impl OptionStyle {
    pub fn new(name: impl Into<String>, prefixes: Vec<&str>) -> Self {
        Self {
            name: name.into(),
            prefixes: prefixes.into_iter().map(String::from).collect(),
        }
    }

    /// The default three styles: lettered, numbered, bulleted
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("Lettered Options", vec!["A. ", "B. ", "C. ", "D. "]),
            Self::new("Numbered Options", vec!["1. ", "2. ", "3. ", "4. "]),
            Self::new("Bullet Points", vec!["- ", "- ", "- ", "- "]),
        ]
    }
}

/// One model client to build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Identifier stored with answers
    pub id: ModelId,
    /// Provider model name (e.g. "gpt-4o-mini")
    pub model: String,
    /// OpenAI-compatible base URL
    pub api_base: String,
    /// Environment variable holding the API key (omit for local servers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Structured output mode
    #[serde(default)]
    pub mode: ModelMode,
}

/// Evaluation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSettings {
    /// Trials per rotation
    #[serde(default = "default_n_evals")]
    pub n_evals: usize,

    /// Attempts per trial before the trial is given up
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Completion token limit
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// SQLite database path
    #[serde(default = "default_database")]
    pub database: PathBuf,
}

fn default_n_evals() -> usize { 5 }
fn default_max_retries() -> usize { 10 }
fn default_temperature() -> f64 { 0.9 }
fn default_max_tokens() -> u32 { 256 }
fn default_request_timeout_secs() -> u64 { 60 }
fn default_database() -> PathBuf { PathBuf::from("order-dependency.db") }

impl Default for EvalSettings {
    fn default() -> Self {
        Self {
            n_evals: default_n_evals(),
            max_retries: default_max_retries(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
            database: default_database(),
        }
    }
}

/// Top-level configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub eval: EvalSettings,

    #[serde(default)]
    pub models: Vec<ModelConfig>,

    #[serde(default = "OptionStyle::defaults")]
    pub option_styles: Vec<OptionStyle>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            eval: EvalSettings::default(),
            models: vec![
                ModelConfig {
                    id: ModelId::Gpt4mini,
                    model: "gpt-4o-mini".to_string(),
                    api_base: "https://api.openai.com/v1".to_string(),
                    api_key_env: Some("OPENAI_API_KEY".to_string()),
                    mode: ModelMode::Tools,
                },
                ModelConfig {
                    id: ModelId::Gpt4o,
                    model: "gpt-4o".to_string(),
                    api_base: "https://api.openai.com/v1".to_string(),
                    api_key_env: Some("OPENAI_API_KEY".to_string()),
                    mode: ModelMode::Tools,
                },
                ModelConfig {
                    id: ModelId::Llama,
                    model: "llama-3.2-3b-instruct".to_string(),
                    api_base: "http://localhost:1234/v1".to_string(),
                    api_key_env: None,
                    mode: ModelMode::MdJson,
                },
            ],
            option_styles: OptionStyle::defaults(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default location (./order-dependency.toml) or return defaults
    pub fn load_default() -> Result<Self> {
        let local_path = Path::new(DEFAULT_CONFIG_FILE);
        if local_path.exists() {
            return Self::load(local_path);
        }
        Ok(Self::default())
    }

    /// Save config to TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {:?}", path))?;
        Ok(())
    }

    /// Reject settings an evaluation run cannot use
    pub fn validate(&self) -> Result<()> {
        if self.eval.n_evals == 0 {
            anyhow::bail!("eval.n_evals must be at least 1");
        }
        if self.eval.max_retries == 0 {
            anyhow::bail!("eval.max_retries must be at least 1");
        }

        let mut ids = HashSet::new();
        for model in &self.models {
            if !ids.insert(model.id) {
                anyhow::bail!("Model '{}' is configured more than once", model.id);
            }
        }

        let mut names = HashSet::new();
        for style in &self.option_styles {
            if style.prefixes.is_empty() {
                anyhow::bail!("Option style '{}' has no prefixes", style.name);
            }
            if !names.insert(style.name.as_str()) {
                anyhow::bail!("Option style '{}' is defined more than once", style.name);
            }
        }
        Ok(())
    }

    /// Look up a configured option style by name
    pub fn option_style(&self, name: &str) -> Option<&OptionStyle> {
        self.option_styles.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_model_id_from_str() {
        assert_eq!(ModelId::from_str("llama"), Some(ModelId::Llama));
        assert_eq!(ModelId::from_str("GPT4o"), Some(ModelId::Gpt4o));
        assert_eq!(ModelId::from_str("gpt-4o-mini"), Some(ModelId::Gpt4mini));
        assert_eq!(ModelId::from_str("claude"), None);
        assert_eq!(ModelId::Gpt4mini.to_string(), "gpt4mini");
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.eval.n_evals, 5);
        assert_eq!(config.eval.max_retries, 10);
        assert_eq!(config.models.len(), 3);
        assert_eq!(config.option_styles.len(), 3);

        let llama = config.models.iter().find(|m| m.id == ModelId::Llama).unwrap();
        assert_eq!(llama.mode, ModelMode::MdJson);
        assert!(llama.api_key_env.is_none());

        let lettered = config.option_style("Lettered Options").unwrap();
        assert_eq!(lettered.prefixes, vec!["A. ", "B. ", "C. ", "D. "]);
    }

    #[test]
    fn test_config_toml() {
        let toml_str = r#"
[eval]
n_evals = 3
max_retries = 4

[[models]]
id = "gpt4o"
model = "gpt-4o"
api_base = "https://api.openai.com/v1"
api_key_env = "OPENAI_API_KEY"

[[models]]
id = "llama"
model = "llama-3.2-3b-instruct"
api_base = "http://localhost:1234/v1"
mode = "md_json"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        config.validate().unwrap();
        assert_eq!(config.eval.n_evals, 3);
        assert_eq!(config.eval.max_retries, 4);
        assert_eq!(config.eval.temperature, 0.9);
        assert_eq!(config.models.len(), 2);
        assert_eq!(config.models[0].mode, ModelMode::Tools);
        assert_eq!(config.models[1].mode, ModelMode::MdJson);
        // Styles fall back to the defaults when omitted
        assert_eq!(config.option_styles.len(), 3);
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = Config::default();
        config.eval.max_retries = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.eval.n_evals = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        let dup = config.models[0].clone();
        config.models.push(dup);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.option_styles.push(OptionStyle::new("Lettered Options", vec!["a) "]));
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.option_styles.push(OptionStyle::new("Empty", vec![]));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        Config::default().save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.models.len(), 3);
        assert_eq!(loaded.option_styles, OptionStyle::defaults());
    }
}
