/// Centralized error types for repo-ingest using thiserror
///
/// Only `ValidationError` (and collaborator construction failures) ever reach the
/// caller of an ingestion; everything else is recovered by the stage that hit it
/// and recorded in the per-stage summary.
use thiserror::Error;

/// Main error type for the ingestion engine
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Source host error: {0}")]
    SourceHost(#[from] SourceHostError),

    #[error("Vector database error: {0}")]
    VectorDb(#[from] VectorDbError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by a source host (remote API or local checkout)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceHostError {
    #[error("Rate limit exceeded{}", reset_suffix(.reset_at))]
    RateLimited { reset_at: Option<i64> },

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Operation not supported by this source: {0}")]
    Unsupported(String),

    #[error("Response truncated by the source: {0}")]
    Truncated(String),
}

/// Errors related to vector database operations
#[derive(Error, Debug)]
pub enum VectorDbError {
    #[error("Failed to initialize vector database: {0}")]
    InitializationFailed(String),

    #[error("Failed to store records in namespace '{namespace}': {reason}")]
    StoreFailed { namespace: String, reason: String },

    #[error("Failed to delete records: {0}")]
    DeleteFailed(String),

    #[error("Failed to query namespace '{0}'")]
    QueryFailed(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Database is not initialized")]
    NotInitialized,
}

/// Errors related to embedding generation
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Failed to initialize embedding model: {0}")]
    InitializationFailed(String),

    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),

    #[error("Embedding generation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Embedding count mismatch: expected {expected}, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

/// Errors related to code chunking. Never surfaced past the chunker: a parse
/// failure downgrades the document to line-based chunking.
#[derive(Error, Debug)]
pub enum ChunkingError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("AST parsing failed: {0}")]
    AstParsingFailed(String),

    #[error("Syntax tree for '{0}' contains errors")]
    SyntaxErrors(String),
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

/// Errors related to input validation. These abort an ingestion before any work starts.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid repository URL: {0}")]
    InvalidRepoUrl(String),

    #[error("Invalid branch name: {0}")]
    InvalidBranch(String),

    #[error("Path does not exist: {0}")]
    PathNotFound(String),

    #[error("Namespace '{0}' is being ingested by another process")]
    NamespaceBusy(String),
}

/// Errors related to local git inspection
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Git repository not found at: {0}")]
    RepoNotFound(String),

    #[error("Failed to resolve revision '{0}'")]
    RevisionNotFound(String),

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    #[error("Failed to compute diff: {0}")]
    DiffFailed(String),
}

fn reset_suffix(reset_at: &Option<i64>) -> String {
    reset_at
        .map(|t| format!(" (resets at {})", t))
        .unwrap_or_default()
}

impl From<anyhow::Error> for IngestError {
    fn from(err: anyhow::Error) -> Self {
        IngestError::Other(format!("{:#}", err))
    }
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => GitError::RevisionNotFound(err.message().to_string()),
            _ => GitError::DiffFailed(err.message().to_string()),
        }
    }
}

impl IngestError {
    /// Create a new error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        IngestError::Other(msg.into())
    }

    /// Check if this is a caller error (bad input) vs a system error
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            IngestError::Validation(_) | IngestError::Config(ConfigError::InvalidValue { .. })
        )
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IngestError::SourceHost(SourceHostError::RateLimited { .. })
                | IngestError::SourceHost(SourceHostError::Http(_))
                | IngestError::Embedding(EmbeddingError::Timeout(_))
                | IngestError::Io(_)
        )
    }
}

impl SourceHostError {
    /// Rate-limit and auth failures mean the next strategy should be tried
    /// rather than retrying this one.
    pub fn is_access_denied(&self) -> bool {
        matches!(
            self,
            SourceHostError::RateLimited { .. } | SourceHostError::AuthFailed(_)
        )
    }
}
