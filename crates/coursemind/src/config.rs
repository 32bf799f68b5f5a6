//! Configuration handling for coursemind.
//!
//! Settings come from a TOML file; every field has a default, so a missing or
//! partial file is fine. Credentials never live in the file: each section names
//! the environment variable that holds its key.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Storage backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Embedding provider
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chunking parameters
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Document parsing and file fetching
    #[serde(default)]
    pub parser: ParserConfig,

    /// Language model and retrieval sizes
    #[serde(default)]
    pub generation: GenerationConfig,

    /// HTTP server
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Lancedb,
    Memory,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// LanceDB directory (default: `<data dir>/coursemind.lance`)
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl StoreConfig {
    /// Effective database path.
    pub fn resolved_db_path(&self) -> Result<PathBuf> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()
                .context("Failed to get data directory")?
                .join("coursemind.lance")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    Openai,
    /// Offline feature hashing, for development
    Hash,
}

/// Embedding-related configuration.
///
/// Model and dimension are not configurable; see `coursemind_core::EMBEDDING`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    #[serde(default = "default_openai_base")]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,

    /// Inputs per embedding request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Max concurrent embedding requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_batch_size() -> usize {
    64
}

fn default_max_concurrent() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> usize {
    3
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            base_url: default_openai_base(),
            api_key_env: default_openai_key_env(),
            batch_size: default_batch_size(),
            max_concurrent: default_max_concurrent(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// Chunking-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Window length (characters)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Fraction of each window repeated in the next
    #[serde(default = "default_overlap_fraction")]
    pub overlap_fraction: f64,
}

fn default_chunk_size() -> usize {
    800
}

fn default_overlap_fraction() -> f64 {
    0.2
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap_fraction: default_overlap_fraction(),
        }
    }
}

/// Parsing and fetching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Parsing service URL; local parsers only when unset
    #[serde(default)]
    pub remote_url: Option<String>,

    #[serde(default = "default_parser_key_env")]
    pub remote_api_key_env: String,

    #[serde(default = "default_ocr_languages")]
    pub ocr_languages: Vec<String>,

    #[serde(default = "default_remote_timeout_secs")]
    pub remote_timeout_secs: u64,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Largest file accepted for download (bytes)
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

fn default_parser_key_env() -> String {
    "COURSEMIND_PARSER_API_KEY".to_string()
}

fn default_ocr_languages() -> Vec<String> {
    vec!["en".to_string()]
}

fn default_remote_timeout_secs() -> u64 {
    300
}

fn default_fetch_timeout_secs() -> u64 {
    60
}

fn default_max_file_bytes() -> u64 {
    52_428_800 // 50MB
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            remote_api_key_env: default_parser_key_env(),
            ocr_languages: default_ocr_languages(),
            remote_timeout_secs: default_remote_timeout_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

/// Language model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_openai_base")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Output bound for answers and short content
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Output bound for long-form content
    #[serde(default = "default_document_max_tokens")]
    pub document_max_tokens: u32,

    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,

    /// Chunks retrieved for short-form content
    #[serde(default = "default_enhanced_top_k")]
    pub enhanced_top_k: usize,

    /// Chunks retrieved for long-form content
    #[serde(default = "default_document_top_k")]
    pub document_top_k: usize,

    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_document_max_tokens() -> u32 {
    4000
}

fn default_top_k() -> usize {
    5
}

fn default_max_top_k() -> usize {
    20
}

fn default_enhanced_top_k() -> usize {
    10
}

fn default_document_top_k() -> usize {
    15
}

fn default_generation_timeout_secs() -> u64 {
    120
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base(),
            model: default_model(),
            api_key_env: default_openai_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            document_max_tokens: default_document_max_tokens(),
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            enhanced_top_k: default_enhanced_top_k(),
            document_top_k: default_document_top_k(),
            timeout_secs: default_generation_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind (host:port)
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Environment variable holding the bearer token; no auth when unset
    #[serde(default = "default_token_env")]
    pub api_token_env: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_token_env() -> String {
    "COURSEMIND_API_TOKEN".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_token_env: default_token_env(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or `tracing_subscriber` filter directive
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load from `path`, or the default location when `None`.
    ///
    /// A missing file yields the defaults.
    pub fn load_from(path: Option<PathBuf>) -> Result<Self> {
        let Some(path) = path.or_else(Self::config_path) else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Write the defaults to `path`. Refuses to overwrite.
    pub fn write_default(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists: {}", path.display());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, Self::sample_toml()?)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Default config file path.
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("config.toml"))
    }

    /// The default configuration as TOML.
    pub fn sample_toml() -> Result<String> {
        toml::to_string_pretty(&Self::default()).context("Failed to serialize config")
    }
}

/// Read a credential from the named environment variable.
///
/// Unset and blank are both `None`.
pub fn credential(env_var: &str) -> Option<String> {
    std::env::var(env_var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Get the XDG data directory for coursemind.
pub fn data_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("COURSEMIND_DATA_DIR") {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from("", "", "coursemind").map(|dirs| dirs.data_dir().to_path_buf())
}

/// Get the XDG config directory for coursemind.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("COURSEMIND_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from("", "", "coursemind").map(|dirs| dirs.config_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.store.backend, StoreBackend::Lancedb);
        assert_eq!(config.chunking.chunk_size, 800);
        assert!((config.chunking.overlap_fraction - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.generation.model, "gpt-4o-mini");
        assert_eq!(config.generation.max_tokens, 1000);
        assert_eq!(config.generation.enhanced_top_k, 10);
        assert_eq!(config.generation.document_top_k, 15);
        assert_eq!(config.parser.ocr_languages, vec!["en".to_string()]);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [store]
            backend = "memory"

            [embedding]
            provider = "hash"

            [generation]
            default_top_k = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.embedding.provider, EmbeddingProvider::Hash);
        assert_eq!(config.embedding.batch_size, 64);
        assert_eq!(config.generation.default_top_k, 8);
        assert_eq!(config.generation.max_top_k, 20);
        assert_eq!(config.server.bind, "127.0.0.1:8080");
    }

    #[test]
    fn test_write_default_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::write_default(&path).unwrap();
        assert!(Config::write_default(&path).is_err());

        let loaded = Config::load_from(Some(path)).unwrap();
        assert_eq!(loaded.generation.model, "gpt-4o-mini");
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempdir().unwrap();
        let loaded = Config::load_from(Some(dir.path().join("absent.toml"))).unwrap();
        assert_eq!(loaded.logging.level, "info");
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[store]\nbackend = \"sqlite\"\n").unwrap();
        assert!(Config::load_from(Some(path)).is_err());
    }

    #[test]
    fn test_explicit_db_path() {
        let store = StoreConfig {
            backend: StoreBackend::Lancedb,
            db_path: Some(PathBuf::from("/tmp/cm.lance")),
        };
        assert_eq!(
            store.resolved_db_path().unwrap(),
            PathBuf::from("/tmp/cm.lance")
        );
    }
}
