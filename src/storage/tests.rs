use super::*;
use crate::embedding::HashEmbedder;
use crate::metadata::{GovernContext, govern};
use crate::testutil::{chunk, commit};
use crate::types::CommitSource;
use crate::vector_db::{InMemoryIndex, IndexStats};
use anyhow::{Result, bail};
use std::collections::BTreeSet;

fn namespace() -> Namespace {
    Namespace::new("acme", "widgets", "main")
}

fn stored(path: &str, index: usize, body: &str) -> StoredChunk {
    let enriched = EnrichedChunk::from_chunk(chunk(path, "Rust", index, body));
    let ctx = GovernContext {
        namespace: namespace().to_string(),
        repo_owner: "acme".to_string(),
        repo_name: "widgets".to_string(),
        branch: "main".to_string(),
        commit: commit("abc123", CommitSource::LocalGit),
        batch: None,
    };
    let metadata = govern(&enriched, &ctx, 25_600);
    StoredChunk::new(&enriched, metadata)
}

fn fast_storage() -> StorageConfig {
    StorageConfig {
        refill_interval_ms: 10,
        write_batch_size: 2,
        ..StorageConfig::default()
    }
}

fn coordinator(
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
) -> StorageCoordinator {
    StorageCoordinator::new(index, embedder, &fast_storage(), &EmbeddingConfig::default())
}

struct FailingEmbedder;

impl EmbeddingProvider for FailingEmbedder {
    fn embed_batch(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        bail!("model unavailable")
    }
    fn dimension(&self) -> usize {
        4
    }
    fn model_name(&self) -> &str {
        "failing"
    }
}

/// Returns one vector fewer than asked for
struct ShortEmbedder;

impl EmbeddingProvider for ShortEmbedder {
    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(vec![vec![0.0; 4]; texts.len().saturating_sub(1)])
    }
    fn dimension(&self) -> usize {
        4
    }
    fn model_name(&self) -> &str {
        "short"
    }
}

struct SlowEmbedder;

impl EmbeddingProvider for SlowEmbedder {
    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        std::thread::sleep(Duration::from_millis(1500));
        Ok(vec![vec![0.0; 4]; texts.len()])
    }
    fn dimension(&self) -> usize {
        4
    }
    fn model_name(&self) -> &str {
        "slow"
    }
}

struct ReadOnlyIndex;

#[async_trait::async_trait]
impl VectorIndex for ReadOnlyIndex {
    async fn initialize(&self, _dimension: usize) -> Result<()> {
        Ok(())
    }
    async fn upsert(&self, _namespace: &str, _records: Vec<VectorRecord>) -> Result<usize> {
        bail!("index is read-only")
    }
    async fn exists(&self, _namespace: &str) -> Result<bool> {
        Ok(false)
    }
    async fn count(&self, _namespace: &str) -> Result<usize> {
        Ok(0)
    }
    async fn sources(&self, _namespace: &str) -> Result<BTreeSet<String>> {
        Ok(BTreeSet::new())
    }
    async fn delete_by_sources(&self, _namespace: &str, _source_paths: &[String]) -> Result<usize> {
        bail!("index is read-only")
    }
    async fn get_statistics(&self) -> Result<IndexStats> {
        Ok(IndexStats::default())
    }
}

/// In-memory index that records the size of every delete call
#[derive(Default)]
struct DeleteCounting {
    inner: InMemoryIndex,
    deletes: std::sync::Mutex<Vec<usize>>,
}

#[async_trait::async_trait]
impl VectorIndex for DeleteCounting {
    async fn initialize(&self, dimension: usize) -> Result<()> {
        self.inner.initialize(dimension).await
    }
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<usize> {
        self.inner.upsert(namespace, records).await
    }
    async fn exists(&self, namespace: &str) -> Result<bool> {
        self.inner.exists(namespace).await
    }
    async fn count(&self, namespace: &str) -> Result<usize> {
        self.inner.count(namespace).await
    }
    async fn sources(&self, namespace: &str) -> Result<BTreeSet<String>> {
        self.inner.sources(namespace).await
    }
    async fn delete_by_sources(&self, namespace: &str, source_paths: &[String]) -> Result<usize> {
        self.deletes.lock().unwrap().push(source_paths.len());
        self.inner.delete_by_sources(namespace, source_paths).await
    }
    async fn get_statistics(&self) -> Result<IndexStats> {
        self.inner.get_statistics().await
    }
}

#[test]
fn test_namespace_sanitizing() {
    let ns = Namespace::new("Acme-Corp", "Widgets.rs", "feature/Login-2");
    assert_eq!(ns.as_str(), "acme_corp_widgets_rs_feature_login_2");
    assert_eq!(ns.to_string(), "acme_corp_widgets_rs_feature_login_2");
    assert_eq!(Namespace::new("a", "b", "main"), Namespace::new("A", "B", "MAIN"));
}

#[test]
fn test_sanitize_path() {
    assert_eq!(sanitize_path("./src//lib.rs"), "src/lib.rs");
    assert_eq!(sanitize_path("/src/lib.rs"), "src/lib.rs");
    assert_eq!(sanitize_path("src\\win\\mod.rs"), "src/win/mod.rs");
}

#[test]
fn test_chunk_ids_are_stable() {
    let ns = namespace();
    let id = chunk_id(&ns, "src/lib.rs", 0);
    assert_eq!(id.len(), 32);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(id, chunk_id(&ns, "./src/lib.rs", 0));
    assert_ne!(id, chunk_id(&ns, "src/lib.rs", 1));
    assert_ne!(id, chunk_id(&Namespace::new("acme", "widgets", "dev"), "src/lib.rs", 0));

    let expected = format!("{:x}", Sha256::digest(b"acme_widgets_main:src/lib.rs:0"));
    assert_eq!(id, expected[..32]);
}

#[tokio::test]
async fn test_upsert_writes_and_overwrites() {
    let index = Arc::new(InMemoryIndex::new());
    let storage = coordinator(index.clone(), Arc::new(HashEmbedder::new(4)));
    let chunks: Vec<StoredChunk> = (0..5)
        .map(|i| stored("src/lib.rs", i, &format!("fn f{}() {{}}", i)))
        .collect();

    let report = storage.upsert(&namespace(), chunks.clone()).await;
    assert_eq!(
        report,
        UpsertReport {
            written: 5,
            failed: 0,
            errors: Vec::new()
        }
    );

    let again = storage.upsert(&namespace(), chunks).await;
    assert_eq!(again.written, 5);
    assert_eq!(index.count("acme_widgets_main").await.unwrap(), 5);

    let record = &index.records_for("acme_widgets_main", "src/lib.rs")[0];
    let metadata: serde_json::Value = serde_json::from_str(&record.metadata).unwrap();
    assert_eq!(metadata["namespace"], "acme_widgets_main");
    assert_eq!(record.vector.len(), 4);
}

#[tokio::test]
async fn test_empty_upsert_does_nothing() {
    let index = Arc::new(InMemoryIndex::new());
    let storage = coordinator(index.clone(), Arc::new(HashEmbedder::new(4)));
    assert_eq!(storage.upsert(&namespace(), Vec::new()).await, UpsertReport::default());
    assert!(!index.exists("acme_widgets_main").await.unwrap());
}

#[tokio::test]
async fn test_embedding_failure_skips_batches() {
    let index = Arc::new(InMemoryIndex::new());
    let storage = coordinator(index.clone(), Arc::new(FailingEmbedder));
    let chunks = vec![stored("a.rs", 0, "fn a() {}"), stored("a.rs", 1, "fn b() {}"), stored("b.rs", 0, "fn c() {}")];

    let report = storage.upsert(&namespace(), chunks).await;
    assert_eq!(report.written, 0);
    assert_eq!(report.failed, 3);
    // write_batch_size is 2, so two batches failed
    assert_eq!(report.errors.len(), 2);
    assert!(report.errors[0].contains("model unavailable"));
    assert_eq!(index.count("acme_widgets_main").await.unwrap(), 0);
}

#[tokio::test]
async fn test_embedding_count_mismatch_is_a_failure() {
    let storage = coordinator(Arc::new(InMemoryIndex::new()), Arc::new(ShortEmbedder));
    let report = storage
        .upsert(&namespace(), vec![stored("a.rs", 0, "fn a() {}")])
        .await;
    assert_eq!(report.failed, 1);
    assert!(report.errors[0].contains("count mismatch"));
}

#[tokio::test]
async fn test_embedding_timeout() {
    let embedding = EmbeddingConfig {
        timeout_secs: 1,
        ..EmbeddingConfig::default()
    };
    let storage = StorageCoordinator::new(
        Arc::new(InMemoryIndex::new()),
        Arc::new(SlowEmbedder),
        &fast_storage(),
        &embedding,
    );
    let report = storage
        .upsert(&namespace(), vec![stored("a.rs", 0, "fn a() {}")])
        .await;
    assert_eq!(report.failed, 1);
    assert!(report.errors[0].contains("timed out"));
}

#[tokio::test]
async fn test_write_failures_are_counted() {
    let storage = coordinator(Arc::new(ReadOnlyIndex), Arc::new(HashEmbedder::new(4)));
    let chunks = vec![stored("a.rs", 0, "fn a() {}"), stored("b.rs", 0, "fn b() {}")];

    let report = storage.upsert(&namespace(), chunks).await;
    assert_eq!(report.written, 0);
    assert_eq!(report.failed, 2);
    assert!(report.errors[0].contains("read-only"));

    let deleted = storage
        .delete_sources(&namespace(), &["a.rs".to_string()])
        .await;
    assert_eq!(deleted.failed, vec!["a.rs"]);
}

#[tokio::test]
async fn test_delete_sources() {
    let index = Arc::new(InMemoryIndex::new());
    let storage = coordinator(index.clone(), Arc::new(HashEmbedder::new(4)));
    storage
        .upsert(
            &namespace(),
            vec![
                stored("a.rs", 0, "fn a() {}"),
                stored("a.rs", 1, "fn b() {}"),
                stored("b.rs", 0, "fn c() {}"),
            ],
        )
        .await;

    let report = storage
        .delete_sources(&namespace(), &["./a.rs".to_string(), "gone.rs".to_string()])
        .await;
    assert_eq!(report.deleted, 2);
    assert!(report.failed.is_empty());
    assert_eq!(index.records("acme_widgets_main").len(), 1);
}

#[tokio::test]
async fn test_deletes_go_out_in_write_batches() {
    let index = Arc::new(DeleteCounting::default());
    let storage = coordinator(index.clone(), Arc::new(HashEmbedder::new(4)));
    let chunks: Vec<StoredChunk> = (0..5)
        .map(|i| stored(&format!("src/f{}.rs", i), 0, &format!("fn f{}() {{}}", i)))
        .collect();
    storage.upsert(&namespace(), chunks).await;

    let paths: Vec<String> = (0..5).map(|i| format!("src/f{}.rs", i)).collect();
    let report = storage.delete_sources(&namespace(), &paths).await;

    assert_eq!(report.deleted, 5);
    // write_batch_size is 2
    assert_eq!(*index.deletes.lock().unwrap(), vec![2, 2, 1]);
    assert_eq!(index.count("acme_widgets_main").await.unwrap(), 0);
}
