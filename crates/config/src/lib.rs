//! Configuration loading, validation, and management for TARS.
//!
//! Loads configuration from `~/.tars/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.tars/config.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Anthropic API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Completion model settings
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Embedding model settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chunking and retrieval settings
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Conversation and prompt budget settings
    #[serde(default)]
    pub context: ContextConfig,

    /// Timeouts for external calls
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("anthropic", &self.anthropic)
            .field("embedding", &self.embedding)
            .field("knowledge", &self.knowledge)
            .field("context", &self.context)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

// ── Completion ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default = "default_anthropic_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Max tokens per answer
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens for the intent classification call
    #[serde(default = "default_classifier_max_tokens")]
    pub classifier_max_tokens: u32,
}

fn default_anthropic_url() -> String {
    "https://api.anthropic.com".into()
}
fn default_model() -> String {
    "claude-3-5-sonnet-20241022".into()
}
fn default_max_response_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.7
}
fn default_classifier_max_tokens() -> u32 {
    10
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_url: default_anthropic_url(),
            model: default_model(),
            max_response_tokens: default_max_response_tokens(),
            temperature: default_temperature(),
            classifier_max_tokens: default_classifier_max_tokens(),
        }
    }
}

// ── Embeddings ─────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible `/embeddings` base URL
    #[serde(default = "default_embedding_url")]
    pub api_url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Requested output dimensions, if the model supports truncation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

fn default_embedding_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_url: default_embedding_url(),
            model: default_embedding_model(),
            api_key: None,
            dimensions: None,
        }
    }
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

// ── Knowledge base ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// SQLite database path. Defaults to `~/.tars/knowledge.sqlite`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,

    /// Max characters per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters repeated between adjacent chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_knowledge_top_k")]
    pub knowledge_top_k: usize,

    #[serde(default = "default_analysis_top_k")]
    pub analysis_top_k: usize,

    /// Cosine similarity floor in [-1, 1]
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    /// Concurrent embedding requests during ingestion
    #[serde(default = "default_embed_concurrency")]
    pub embed_concurrency: usize,
}

fn default_chunk_size() -> usize {
    1200
}
fn default_chunk_overlap() -> usize {
    150
}
fn default_knowledge_top_k() -> usize {
    12
}
fn default_analysis_top_k() -> usize {
    15
}
fn default_min_score() -> f32 {
    0.2
}
fn default_embed_concurrency() -> usize {
    4
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            knowledge_top_k: default_knowledge_top_k(),
            analysis_top_k: default_analysis_top_k(),
            min_score: default_min_score(),
            embed_concurrency: default_embed_concurrency(),
        }
    }
}

// ── Context ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Conversation turns retained (10 exchanges)
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Search result batches retained
    #[serde(default = "default_max_search_batches")]
    pub max_search_batches: usize,

    /// Prompt ceiling, leaving headroom below the model's window
    #[serde(default = "default_max_prompt_tokens")]
    pub max_prompt_tokens: usize,

    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: f32,

    /// Recent turns shown to the intent classifier
    #[serde(default = "default_history_hint_turns")]
    pub history_hint_turns: usize,
}

fn default_max_turns() -> usize {
    20
}
fn default_max_search_batches() -> usize {
    10
}
fn default_max_prompt_tokens() -> usize {
    180_000
}
fn default_chars_per_token() -> f32 {
    4.0
}
fn default_history_hint_turns() -> usize {
    4
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_search_batches: default_max_search_batches(),
            max_prompt_tokens: default_max_prompt_tokens(),
            chars_per_token: default_chars_per_token(),
            history_hint_turns: default_history_hint_turns(),
        }
    }
}

// ── Timeouts ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_embedding_secs")]
    pub embedding_secs: u64,

    #[serde(default = "default_completion_secs")]
    pub completion_secs: u64,

    #[serde(default = "default_search_secs")]
    pub search_secs: u64,

    /// Calendar and email calls
    #[serde(default = "default_collaborator_secs")]
    pub collaborator_secs: u64,
}

fn default_embedding_secs() -> u64 {
    30
}
fn default_completion_secs() -> u64 {
    120
}
fn default_search_secs() -> u64 {
    10
}
fn default_collaborator_secs() -> u64 {
    30
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            embedding_secs: default_embedding_secs(),
            completion_secs: default_completion_secs(),
            search_secs: default_search_secs(),
            collaborator_secs: default_collaborator_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn embedding(&self) -> Duration {
        Duration::from_secs(self.embedding_secs)
    }

    pub fn completion(&self) -> Duration {
        Duration::from_secs(self.completion_secs)
    }

    pub fn search(&self) -> Duration {
        Duration::from_secs(self.search_secs)
    }

    pub fn collaborator(&self) -> Duration {
        Duration::from_secs(self.collaborator_secs)
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.tars/config.toml).
    ///
    /// Environment overrides:
    /// - `TARS_API_KEY`, then `ANTHROPIC_API_KEY`
    /// - `TARS_MODEL`
    /// - `TARS_EMBEDDING_API_KEY`, then `OPENAI_API_KEY`
    /// - `TARS_DB_PATH`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
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

    /// Apply environment overrides through `lookup` (usually `std::env::var`).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("TARS_API_KEY").or_else(|| lookup("ANTHROPIC_API_KEY"));
        }

        if let Some(model) = lookup("TARS_MODEL") {
            self.anthropic.model = model;
        }

        if self.embedding.api_key.is_none() {
            self.embedding.api_key =
                lookup("TARS_EMBEDDING_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(path) = lookup("TARS_DB_PATH") {
            self.knowledge.db_path = Some(PathBuf::from(path));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".tars")
    }

    /// Resolved knowledge database path.
    pub fn db_path(&self) -> PathBuf {
        self.knowledge
            .db_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("knowledge.sqlite"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let k = &self.knowledge;
        if k.chunk_size == 0 {
            return Err(ConfigError::ValidationError("chunk_size must be > 0".into()));
        }
        if k.chunk_overlap >= k.chunk_size {
            return Err(ConfigError::ValidationError(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                k.chunk_overlap, k.chunk_size
            )));
        }
        if k.knowledge_top_k == 0 || k.analysis_top_k == 0 {
            return Err(ConfigError::ValidationError("top_k values must be > 0".into()));
        }
        if !(-1.0..=1.0).contains(&k.min_score) {
            return Err(ConfigError::ValidationError(
                "min_score must be a cosine similarity between -1.0 and 1.0".into(),
            ));
        }
        if k.embed_concurrency == 0 {
            return Err(ConfigError::ValidationError("embed_concurrency must be > 0".into()));
        }

        let c = &self.context;
        if c.max_turns == 0 || c.max_search_batches == 0 {
            return Err(ConfigError::ValidationError(
                "max_turns and max_search_batches must be > 0".into(),
            ));
        }
        if c.chars_per_token <= 0.0 {
            return Err(ConfigError::ValidationError("chars_per_token must be > 0".into()));
        }

        if self.anthropic.temperature < 0.0 || self.anthropic.temperature > 1.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 1.0".into(),
            ));
        }

        Ok(())
    }

    /// Check if a completion API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
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

impl From<ConfigError> for tars_core::Error {
    fn from(e: ConfigError) -> Self {
        tars_core::Error::InvalidConfig(e.to_string())
    }
}
