//! Namespace-scoped, rate-limited writes into the vector index
//!
//! The coordinator embeds chunk text off the async runtime, derives stable
//! chunk ids and pushes records through a [`ReservoirLimiter`]. Failures are
//! counted per write batch and never abort the caller.

mod limiter;

pub use limiter::ReservoirLimiter;

use crate::config::{EmbeddingConfig, StorageConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::EmbeddingError;
use crate::metadata::GovernedMetadata;
use crate::types::EnrichedChunk;
use crate::vector_db::{VectorIndex, VectorRecord};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Storage key for one repository branch: `{owner}_{repo}_{branch}`, lowercase,
/// with every non-alphanumeric character replaced by `_`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(owner: &str, repo: &str, branch: &str) -> Self {
        let raw = format!("{}_{}_{}", owner, repo, branch);
        let sanitized = raw
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        Self(sanitized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Repository-relative path with forward slashes and no leading `./` or `/`
pub fn sanitize_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// First 32 hex chars of SHA-256 over `namespace:path:index`
pub fn chunk_id(namespace: &Namespace, source_path: &str, chunk_index: usize) -> String {
    let key = format!(
        "{}:{}:{}",
        namespace.as_str(),
        sanitize_path(source_path),
        chunk_index
    );
    let digest = Sha256::digest(key.as_bytes());
    let mut hex = format!("{:x}", digest);
    hex.truncate(32);
    hex
}

/// A chunk ready for storage
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub source_path: String,
    pub chunk_index: usize,
    pub content: String,
    pub metadata: GovernedMetadata,
}

impl StoredChunk {
    pub fn new(chunk: &EnrichedChunk, metadata: GovernedMetadata) -> Self {
        Self {
            source_path: sanitize_path(&chunk.chunk.source_path),
            chunk_index: chunk.chunk.chunk_index,
            content: chunk.chunk.content.clone(),
            metadata,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpsertReport {
    pub written: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeleteReport {
    pub deleted: usize,
    /// Paths whose delete failed
    pub failed: Vec<String>,
    pub errors: Vec<String>,
}

pub struct StorageCoordinator {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    limiter: ReservoirLimiter,
    write_batch_size: usize,
    embed_batch_size: usize,
    embed_timeout: Duration,
    initialized: OnceCell<()>,
}

impl StorageCoordinator {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        storage: &StorageConfig,
        embedding: &EmbeddingConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            limiter: ReservoirLimiter::new(
                storage.reservoir_capacity,
                Duration::from_millis(storage.refill_interval_ms),
                storage.max_concurrent,
            ),
            write_batch_size: storage.write_batch_size.max(1),
            embed_batch_size: embedding.batch_size.max(1),
            embed_timeout: Duration::from_secs(embedding.timeout_secs),
            initialized: OnceCell::new(),
        }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    async fn ensure_initialized(&self) -> anyhow::Result<()> {
        self.initialized
            .get_or_try_init(|| async { self.index.initialize(self.embedder.dimension()).await })
            .await
            .map(|_| ())
    }

    /// Embed and write `chunks` under `namespace`, re-using ids so unchanged
    /// chunks overwrite themselves
    pub async fn upsert(&self, namespace: &Namespace, chunks: Vec<StoredChunk>) -> UpsertReport {
        let mut report = UpsertReport::default();
        if chunks.is_empty() {
            return report;
        }

        if let Err(e) = self.ensure_initialized().await {
            warn!("Vector index initialization failed: {:#}", e);
            report.failed = chunks.len();
            report.errors.push(format!("initialize: {:#}", e));
            return report;
        }

        let total = chunks.len();
        let mut remaining = chunks.into_iter();
        loop {
            let batch: Vec<StoredChunk> = remaining.by_ref().take(self.write_batch_size).collect();
            if batch.is_empty() {
                break;
            }
            let batch_len = batch.len();

            let texts = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = match self.embed(texts).await {
                Ok(vectors) => vectors,
                Err(e) => {
                    warn!(
                        "Skipping {} chunks in '{}': {}",
                        batch_len, namespace, e
                    );
                    report.failed += batch_len;
                    report.errors.push(format!("embedding: {}", e));
                    continue;
                }
            };

            let records: Vec<VectorRecord> = batch
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| VectorRecord {
                    id: chunk_id(namespace, &chunk.source_path, chunk.chunk_index),
                    vector,
                    metadata: chunk.metadata.to_json(),
                    source: chunk.source_path,
                    content: chunk.content,
                })
                .collect();

            let result = match self.limiter.acquire().await {
                Ok(_permit) => self.index.upsert(namespace.as_str(), records).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(written) => {
                    debug!("Wrote {} records to '{}'", written, namespace);
                    report.written += written;
                }
                Err(e) => {
                    warn!("Write of {} records to '{}' failed: {:#}", batch_len, namespace, e);
                    report.failed += batch_len;
                    report.errors.push(format!("write: {:#}", e));
                }
            }
        }

        info!(
            "Stored {}/{} chunks in '{}' ({} failed)",
            report.written, total, namespace, report.failed
        );
        report
    }

    /// Remove every chunk of the given source files from `namespace`, one
    /// limiter token per write batch of paths
    pub async fn delete_sources(&self, namespace: &Namespace, paths: &[String]) -> DeleteReport {
        let mut report = DeleteReport::default();
        let paths: Vec<String> = paths.iter().map(|p| sanitize_path(p)).collect();
        for batch in paths.chunks(self.write_batch_size) {
            let result = match self.limiter.acquire().await {
                Ok(_permit) => self.index.delete_by_sources(namespace.as_str(), batch).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(deleted) => {
                    debug!(
                        "Deleted {} chunks of {} files from '{}'",
                        deleted,
                        batch.len(),
                        namespace
                    );
                    report.deleted += deleted;
                }
                Err(e) => {
                    warn!("Failed to delete chunks of {} files: {:#}", batch.len(), e);
                    report.errors.push(format!("delete {} files: {:#}", batch.len(), e));
                    report.failed.extend(batch.iter().cloned());
                }
            }
        }
        report
    }

    /// Embed in provider-sized batches on the blocking pool, each under the timeout
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.embed_batch_size) {
            let expected = batch.len();
            let embedder = Arc::clone(&self.embedder);
            let batch = batch.to_vec();
            let task = tokio::task::spawn_blocking(move || embedder.embed_batch(batch));

            let embedded = match tokio::time::timeout(self.embed_timeout, task).await {
                Err(_) => return Err(EmbeddingError::Timeout(self.embed_timeout.as_secs())),
                Ok(Err(join)) => return Err(EmbeddingError::GenerationFailed(join.to_string())),
                Ok(Ok(Err(e))) => return Err(EmbeddingError::GenerationFailed(format!("{:#}", e))),
                Ok(Ok(Ok(embedded))) => embedded,
            };
            if embedded.len() != expected {
                return Err(EmbeddingError::CountMismatch {
                    expected,
                    actual: embedded.len(),
                });
            }
            vectors.extend(embedded);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests;
