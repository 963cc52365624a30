//! Library entry point for repo-ingest
//!
//! [`IngestClient`] wires the change detector, loader, chunker,
//! postprocessor, metadata governor and storage coordinator together and runs
//! them for one repository branch at a time.

mod ingestion;
mod namespace_lock;
mod observer;

pub use namespace_lock::NamespaceLock;
pub use observer::{IngestEvent, IngestObserver, NoopObserver, RecordingObserver, TracingObserver};

use crate::change_detector::{ChangeDetector, parse_repo_url};
use crate::config::Config;
use crate::embedding::{EmbeddingProvider, FastEmbedManager};
use crate::error::{IngestError, ValidationError};
use crate::indexer::SemanticChunker;
use crate::paths::PlatformPaths;
use crate::postprocess::ChunkPostprocessor;
use crate::source_host::{GitHubClient, LocalCheckout, SourceHost};
use crate::storage::StorageCoordinator;
use crate::terminology::TermCatalog;
use crate::types::{IngestRequest, IngestResponse};
use crate::vector_db::{LanceVectorIndex, VectorIndex};
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Change detector and loading host used instead of the configured ones
#[derive(Clone)]
struct SourceOverride {
    detector: ChangeDetector,
    host: Arc<dyn SourceHost>,
}

/// Main client for ingesting repositories
///
/// # Example
///
/// ```no_run
/// use repo_ingest::{IngestClient, IngestRequest, Config};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = IngestClient::with_config(Config::default()).await?;
///
///     let response = client
///         .ingest(IngestRequest {
///             repo_url: "https://github.com/acme/widgets".to_string(),
///             branch: "main".to_string(),
///             ..Default::default()
///         })
///         .await?;
///     println!("Stored {} chunks in {}", response.chunks_stored, response.namespace);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct IngestClient {
    pub(crate) config: Arc<Config>,
    pub(crate) chunker: Arc<SemanticChunker>,
    pub(crate) postprocessor: Arc<ChunkPostprocessor>,
    pub(crate) storage: Arc<StorageCoordinator>,
    pub(crate) lock_dir: PathBuf,
    source: Option<SourceOverride>,
}

impl IngestClient {
    /// Create a client from the configuration file, environment and defaults
    pub async fn new() -> Result<Self, IngestError> {
        let config = Config::new()?;
        Self::with_config(config).await
    }

    /// Create a client backed by FastEmbed and LanceDB as configured
    pub async fn with_config(config: Config) -> Result<Self, IngestError> {
        config.validate()?;
        tracing::info!("Initializing ingest client");
        tracing::debug!("Embedding model: {}", config.embedding.model_name);
        tracing::debug!("LanceDB path: {}", config.storage.lancedb_path.display());

        let model_name = config.embedding.model_name.clone();
        let embedder = tokio::task::spawn_blocking(move || FastEmbedManager::from_model_name(&model_name))
            .await
            .context("Embedding initialization task failed")?
            .context("Failed to initialize embedding provider")?;

        let index = LanceVectorIndex::with_path(
            &config.storage.lancedb_path.to_string_lossy(),
            &config.storage.table_name,
        )
        .await
        .context("Failed to initialize LanceDB vector index")?;

        Ok(Self::with_components(config, Arc::new(index), Arc::new(embedder)))
    }

    /// Create a client around an existing index and embedding provider
    pub fn with_components(
        config: Config,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let catalog = Arc::new(TermCatalog::from_config(&config.terminology));
        let storage = StorageCoordinator::new(index, embedder, &config.storage, &config.embedding);

        Self {
            chunker: Arc::new(SemanticChunker::new(config.chunking.clone())),
            postprocessor: Arc::new(ChunkPostprocessor::new(config.postprocess.clone(), catalog)),
            storage: Arc::new(storage),
            lock_dir: PlatformPaths::lock_dir(),
            config: Arc::new(config),
            source: None,
        }
    }

    /// Use a fixed change detector and loading host for every request
    pub fn with_source(mut self, detector: ChangeDetector, host: Arc<dyn SourceHost>) -> Self {
        self.source = Some(SourceOverride { detector, host });
        self
    }

    /// Directory for namespace lock files
    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = dir.into();
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        self.storage.index()
    }

    /// Ingest one repository branch
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestResponse, IngestError> {
        self.ingest_with_observer(request, &NoopObserver).await
    }

    /// Ingest one repository branch, reporting progress to `observer`
    pub async fn ingest_with_observer(
        &self,
        request: IngestRequest,
        observer: &dyn IngestObserver,
    ) -> Result<IngestResponse, IngestError> {
        let target = validate_request(&request)?;
        let (detector, host) = self.source_for(&request)?;
        ingestion::run(self, &request, target, detector, host, observer).await
    }

    /// Detector and host for a request: the override, a local checkout, or the remote API
    fn source_for(
        &self,
        request: &IngestRequest,
    ) -> Result<(ChangeDetector, Arc<dyn SourceHost>), IngestError> {
        if let Some(source) = &self.source {
            return Ok((source.detector.clone(), Arc::clone(&source.host)));
        }

        let local_path = request.local_path.as_deref().map(Path::new);
        let detector = ChangeDetector::from_config(&self.config, local_path)?;

        let host: Arc<dyn SourceHost> = match local_path {
            Some(path) => Arc::new(LocalCheckout::new(path, self.config.loader.max_file_size)),
            None => match self.config.source_host.token.as_deref().filter(|t| !t.is_empty()) {
                Some(token) => Arc::new(GitHubClient::authenticated(&self.config.source_host, token)?),
                None => Arc::new(GitHubClient::public(&self.config.source_host)?),
            },
        };
        Ok((detector, host))
    }
}

/// Owner and repository of a validated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Target {
    pub owner: String,
    pub repo: String,
}

/// Reject malformed requests before any work starts
pub(crate) fn validate_request(request: &IngestRequest) -> Result<Target, ValidationError> {
    let (owner, repo) = parse_repo_url(&request.repo_url)?;
    validate_branch(&request.branch)?;

    if let Some(path) = &request.local_path
        && !Path::new(path).is_dir()
    {
        return Err(ValidationError::PathNotFound(path.clone()));
    }
    if let Some(since) = &request.since_commit
        && since.trim().is_empty()
    {
        return Err(ValidationError::MissingField("since_commit".to_string()));
    }

    Ok(Target { owner, repo })
}

/// Branch names follow git's ref rules closely enough to catch typos
fn validate_branch(branch: &str) -> Result<(), ValidationError> {
    if branch.trim().is_empty() {
        return Err(ValidationError::MissingField("branch".to_string()));
    }
    let invalid = branch.starts_with('-')
        || branch.starts_with('/')
        || branch.ends_with('/')
        || branch.ends_with(".lock")
        || branch.contains("..")
        || branch.contains("//")
        || branch.contains("@{")
        || branch
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || "~^:?*[\\".contains(c));
    if invalid {
        return Err(ValidationError::InvalidBranch(branch.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
