/// Configuration system for repo-ingest
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
use crate::error::{ConfigError, IngestError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Remote source host (API) configuration
    #[serde(default)]
    pub source_host: SourceHostConfig,

    /// Commit and change detection configuration
    #[serde(default)]
    pub change_detection: ChangeDetectionConfig,

    /// Batched loader configuration
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Semantic chunker configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Chunk postprocessor configuration
    #[serde(default)]
    pub postprocess: PostprocessConfig,

    /// Metadata governor configuration
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Vector storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Embedding model configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Domain terminology catalog configuration
    #[serde(default)]
    pub terminology: TerminologyConfig,
}

/// Source host API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHostConfig {
    /// Base URL of the REST API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Access token for authenticated requests (falls back to GITHUB_TOKEN)
    #[serde(default, skip_serializing)]
    pub token: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Change detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeDetectionConfig {
    /// Allow the local git strategy. Set to false in constrained environments
    /// to force the remote API path.
    #[serde(default = "default_true")]
    pub local_git: bool,

    /// Local clone used by the local git strategy
    #[serde(default)]
    pub local_repo_path: Option<PathBuf>,
}

/// Batched loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Timeout for one batch attempt in seconds
    #[serde(default = "default_batch_timeout")]
    pub batch_timeout_secs: u64,

    /// Pause between batches in milliseconds
    #[serde(default = "default_inter_batch_delay")]
    pub inter_batch_delay_ms: u64,

    /// Maximum file size to load (in bytes)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    /// Extra exclude patterns applied to every batch
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

/// Semantic chunker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_min_tokens")]
    pub min_tokens: usize,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Trailing context copied into the next slice of an oversized unit
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,

    #[serde(default = "default_max_units_per_chunk")]
    pub max_units_per_chunk: usize,

    /// Lines per window for the line-based fallback
    #[serde(default = "default_fallback_lines")]
    pub fallback_lines: usize,
}

/// Chunk postprocessor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostprocessConfig {
    /// Chunks scoring below this are dropped (0.0 to 1.0)
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f32,

    /// Jaccard similarity above which a chunk is a near-duplicate (0.0 to 1.0)
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    #[serde(default = "default_max_questions")]
    pub max_questions: usize,

    #[serde(default = "default_keyword_count")]
    pub keyword_count: usize,

    /// Lines spliced from a related neighboring chunk
    #[serde(default = "default_neighbor_context_lines")]
    pub neighbor_context_lines: usize,
}

/// Metadata governor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Maximum serialized size of a chunk's metadata in bytes
    #[serde(default = "default_byte_budget")]
    pub byte_budget: usize,
}

/// Vector storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// LanceDB data directory path
    #[serde(default = "default_lancedb_path")]
    pub lancedb_path: PathBuf,

    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Writes allowed per refill interval
    #[serde(default = "default_reservoir_capacity")]
    pub reservoir_capacity: usize,

    #[serde(default = "default_refill_interval")]
    pub refill_interval_ms: u64,

    /// Writes allowed in flight at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Records per write
    #[serde(default = "default_write_batch_size")]
    pub write_batch_size: usize,
}

/// Embedding model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name (e.g., "all-MiniLM-L6-v2", "BAAI/bge-small-en-v1.5")
    #[serde(default = "default_model_name")]
    pub model_name: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

/// Domain terminology catalog configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerminologyConfig {
    /// TOML or JSON catalog file; absent means no terminology tagging
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_request_timeout() -> u64 {
    20
}

fn default_user_agent() -> String {
    format!("repo-ingest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_batch_timeout() -> u64 {
    30
}

fn default_inter_batch_delay() -> u64 {
    500
}

fn default_max_file_size() -> usize {
    1_048_576 // 1 MB
}

fn default_min_tokens() -> usize {
    30
}

fn default_max_tokens() -> usize {
    400
}

fn default_overlap_tokens() -> usize {
    40
}

fn default_max_units_per_chunk() -> usize {
    5
}

fn default_fallback_lines() -> usize {
    50
}

fn default_quality_threshold() -> f32 {
    0.4
}

fn default_similarity_threshold() -> f32 {
    0.95
}

fn default_max_questions() -> usize {
    5
}

fn default_keyword_count() -> usize {
    10
}

fn default_neighbor_context_lines() -> usize {
    3
}

fn default_byte_budget() -> usize {
    25_600 // 25 KB
}

fn default_lancedb_path() -> PathBuf {
    crate::paths::PlatformPaths::default_lancedb_path()
}

fn default_table_name() -> String {
    "repo_chunks".to_string()
}

fn default_reservoir_capacity() -> usize {
    10
}

fn default_refill_interval() -> u64 {
    1000
}

fn default_max_concurrent() -> usize {
    1
}

fn default_write_batch_size() -> usize {
    50
}

fn default_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_embedding_timeout() -> u64 {
    30
}

impl Default for SourceHostConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            token: None,
            request_timeout_secs: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for ChangeDetectionConfig {
    fn default() -> Self {
        Self {
            local_git: default_true(),
            local_repo_path: None,
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_timeout_secs: default_batch_timeout(),
            inter_batch_delay_ms: default_inter_batch_delay(),
            max_file_size: default_max_file_size(),
            exclude_patterns: Vec::new(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_tokens: default_min_tokens(),
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap_tokens(),
            max_units_per_chunk: default_max_units_per_chunk(),
            fallback_lines: default_fallback_lines(),
        }
    }
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            quality_threshold: default_quality_threshold(),
            similarity_threshold: default_similarity_threshold(),
            max_questions: default_max_questions(),
            keyword_count: default_keyword_count(),
            neighbor_context_lines: default_neighbor_context_lines(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            byte_budget: default_byte_budget(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            lancedb_path: default_lancedb_path(),
            table_name: default_table_name(),
            reservoir_capacity: default_reservoir_capacity(),
            refill_interval_ms: default_refill_interval(),
            max_concurrent: default_max_concurrent(),
            write_batch_size: default_write_batch_size(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> IngestError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
    .into()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, IngestError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location or fall back to defaults
    pub fn load_or_default() -> Result<Self, IngestError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), IngestError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.source_host.api_base_url.trim().is_empty() {
            return Err(invalid("source_host.api_base_url", "must not be empty"));
        }

        if self.loader.batch_timeout_secs == 0 {
            return Err(invalid("loader.batch_timeout_secs", "must be greater than 0"));
        }

        if self.loader.max_file_size == 0 {
            return Err(invalid("loader.max_file_size", "must be greater than 0"));
        }

        let chunking = &self.chunking;
        if chunking.min_tokens == 0 {
            return Err(invalid("chunking.min_tokens", "must be greater than 0"));
        }
        if chunking.max_tokens <= chunking.min_tokens {
            return Err(invalid(
                "chunking.max_tokens",
                format!(
                    "must be greater than min_tokens ({}), got {}",
                    chunking.min_tokens, chunking.max_tokens
                ),
            ));
        }
        if chunking.overlap_tokens >= chunking.max_tokens / 2 {
            return Err(invalid(
                "chunking.overlap_tokens",
                format!(
                    "must be less than half of max_tokens ({}), got {}",
                    chunking.max_tokens, chunking.overlap_tokens
                ),
            ));
        }
        if chunking.max_units_per_chunk == 0 {
            return Err(invalid("chunking.max_units_per_chunk", "must be greater than 0"));
        }
        if chunking.fallback_lines == 0 {
            return Err(invalid("chunking.fallback_lines", "must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.postprocess.quality_threshold) {
            return Err(invalid(
                "postprocess.quality_threshold",
                format!(
                    "must be between 0.0 and 1.0, got {}",
                    self.postprocess.quality_threshold
                ),
            ));
        }
        if !(0.0..=1.0).contains(&self.postprocess.similarity_threshold) {
            return Err(invalid(
                "postprocess.similarity_threshold",
                format!(
                    "must be between 0.0 and 1.0, got {}",
                    self.postprocess.similarity_threshold
                ),
            ));
        }

        if self.metadata.byte_budget < 1024 {
            return Err(invalid(
                "metadata.byte_budget",
                format!("must be at least 1024 bytes, got {}", self.metadata.byte_budget),
            ));
        }

        if self.storage.reservoir_capacity == 0 {
            return Err(invalid("storage.reservoir_capacity", "must be greater than 0"));
        }
        if self.storage.refill_interval_ms == 0 {
            return Err(invalid("storage.refill_interval_ms", "must be greater than 0"));
        }
        if self.storage.max_concurrent == 0 {
            return Err(invalid("storage.max_concurrent", "must be greater than 0"));
        }
        if self.storage.write_batch_size == 0 {
            return Err(invalid("storage.write_batch_size", "must be greater than 0"));
        }

        if self.embedding.batch_size == 0 {
            return Err(invalid("embedding.batch_size", "must be greater than 0"));
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("REPO_INGEST_API_URL") {
            self.source_host.api_base_url = url;
        }

        if let Ok(token) = std::env::var("REPO_INGEST_TOKEN") {
            self.source_host.token = Some(token);
        } else if self.source_host.token.is_none()
            && let Ok(token) = std::env::var("GITHUB_TOKEN")
            && !token.is_empty()
        {
            self.source_host.token = Some(token);
        }

        if let Ok(flag) = std::env::var("REPO_INGEST_LOCAL_GIT")
            && let Ok(enabled) = flag.parse()
        {
            self.change_detection.local_git = enabled;
        }

        if let Ok(path) = std::env::var("REPO_INGEST_LANCEDB_PATH") {
            self.storage.lancedb_path = PathBuf::from(path);
        }

        if let Ok(model) = std::env::var("REPO_INGEST_MODEL") {
            self.embedding.model_name = model;
        }

        if let Ok(budget) = std::env::var("REPO_INGEST_BYTE_BUDGET")
            && let Ok(budget) = budget.parse()
        {
            self.metadata.byte_budget = budget;
        }

        if let Ok(path) = std::env::var("REPO_INGEST_TERMINOLOGY") {
            self.terminology.catalog_path = Some(PathBuf::from(path));
        }
    }

    /// Create a new Config with defaults and environment overrides
    pub fn new() -> Result<Self, IngestError> {
        let mut config = Self::load_or_default()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}
