//! Configuration loading and validation for ADA.
//!
//! Loads configuration from `~/.ada/config.toml` with environment variable
//! overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ada/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Log filter used when neither `RUST_LOG` nor `--verbose` is given
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Display label for the operator; also used as the stop sequence
    #[serde(default = "default_operator")]
    pub operator: String,

    /// Display label for backend responses
    #[serde(default = "default_assistant")]
    pub assistant: String,

    /// Persona active at startup
    #[serde(default = "default_persona")]
    pub persona: String,

    /// Backend active at startup (key into `backends`)
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Persist conversations to `history_dir`
    #[serde(default)]
    pub history: bool,

    #[serde(default = "default_history_dir")]
    pub history_dir: String,

    /// Root of the per-persona memory directories
    #[serde(default = "default_memory_dir")]
    pub memory_dir: String,

    /// Cap on memory text placed in a single prompt
    #[serde(default = "default_memory_limit")]
    pub memory_limit_bytes: usize,

    /// Backend configurations keyed by name
    #[serde(default = "default_backends")]
    pub backends: BTreeMap<String, BackendConfig>,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_operator() -> String {
    "USER".into()
}
fn default_assistant() -> String {
    "ADA".into()
}
fn default_persona() -> String {
    "default".into()
}
fn default_backend() -> String {
    "ollama".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_history_dir() -> String {
    "~/.ada/history".into()
}
fn default_memory_dir() -> String {
    "~/.ada/memories".into()
}
fn default_memory_limit() -> usize {
    32 * 1024
}
fn default_backends() -> BTreeMap<String, BackendConfig> {
    let mut backends = BTreeMap::new();
    backends.insert(default_backend(), BackendConfig::Ollama(OllamaConfig::default()));
    backends
}

/// Configuration for one backend, selected by its `type` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// In-process GGUF inference
    Llama(LlamaConfig),
    /// Remote Ollama server
    Ollama(OllamaConfig),
}

impl BackendConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Llama(_) => "llama",
            BackendConfig::Ollama(_) => "ollama",
        }
    }

    pub fn model(&self) -> Option<&str> {
        match self {
            BackendConfig::Llama(c) => c.model.as_deref(),
            BackendConfig::Ollama(c) => c.model.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlamaConfig {
    /// Name of the entry in `models` to load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default)]
    pub models: Vec<ModelDefinition>,

    /// Chat template: tinyllama, chatml, llama2, llama3
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Where downloaded model files are kept
    #[serde(default = "default_model_cache_dir")]
    pub cache_dir: String,
}

fn default_model_cache_dir() -> String {
    "~/.ada/models".into()
}

/// A model the in-process backend can load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Local path, `http(s)://` URL, or `hf://<repo>/<file>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Context window in tokens; read from the model file when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u32>,

    /// Tokenizer path or HF repo; defaults to `tokenizer.json` next to the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default = "default_ollama_url")]
    pub url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_ollama_url() -> String {
    "http://localhost:11434".into()
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            model: Some("llama3.2".into()),
            url: default_ollama_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location.
    ///
    /// Environment variables take precedence over the file:
    /// - `ADA_BACKEND`
    /// - `ADA_PERSONA`
    /// - `ADA_LOG_LEVEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(backend) = std::env::var("ADA_BACKEND") {
            self.backend = backend;
        }
        if let Ok(persona) = std::env::var("ADA_PERSONA") {
            self.persona = persona;
        }
        if let Ok(level) = std::env::var("ADA_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ada")
    }

    pub fn history_path(&self) -> PathBuf {
        expand_home(&self.history_dir)
    }

    pub fn memory_path(&self) -> PathBuf {
        expand_home(&self.memory_dir)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.memory_limit_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "memory_limit_bytes must be > 0".into(),
            ));
        }

        if self.operator.trim().is_empty() {
            return Err(ConfigError::ValidationError("operator must not be empty".into()));
        }

        if !self.backends.contains_key(&self.backend) {
            return Err(ConfigError::ValidationError(format!(
                "backend '{}' is not configured (available: {})",
                self.backend,
                self.backends.keys().cloned().collect::<Vec<_>>().join(", ")
            )));
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            operator: default_operator(),
            assistant: default_assistant(),
            persona: default_persona(),
            backend: default_backend(),
            temperature: default_temperature(),
            max_tokens: None,
            history: false,
            history_dir: default_history_dir(),
            memory_dir: default_memory_dir(),
            memory_limit_bytes: default_memory_limit(),
            backends: default_backends(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs_home();
    }
    match path.strip_prefix("~/") {
        Some(rest) => dirs_home().join(rest),
        None => PathBuf::from(path),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
