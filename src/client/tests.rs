use super::*;
use crate::change_detector::CommitStrategy;
use crate::embedding::HashEmbedder;
use crate::error::SourceHostError;
use crate::testutil::{MockHost, commit};
use crate::types::{ChangeRecord, ChangeStatus, CommitSource, IngestMode};
use crate::vector_db::InMemoryIndex;
use tempfile::TempDir;

const NAMESPACE: &str = "acme_widgets_main";

const LIB_V1: &str = "/// Adds two line totals for the cart.\npub fn add(left: u64, right: u64) -> u64 {\n    let total = left + right;\n    total\n}\n\n/// Applies a percentage discount to a cart total.\npub fn discount(total: u64, percent: u64) -> u64 {\n    total - total * percent / 100\n}\n";

const LIB_V2: &str = "/// Multiplies a line price by its quantity.\npub fn line_total(price: u64, quantity: u64) -> u64 {\n    let total = price * quantity;\n    total\n}\n";

const README: &str = "# Widgets\n\nWidgets computes cart totals for the storefront service.\n\n## Usage\n\nRun `cargo run` to start the widget server and open the dashboard.\n";

const OLD: &str = "/// Legacy rounding helper kept for the invoice exporter.\npub fn round_cents(amount: f64) -> f64 {\n    (amount * 100.0).round() / 100.0\n}\n";

fn test_config() -> Config {
    let mut config = Config::default();
    config.loader.inter_batch_delay_ms = 0;
    config.storage.refill_interval_ms = 10;
    config.storage.reservoir_capacity = 100;
    config
}

fn request(since: Option<&str>) -> IngestRequest {
    IngestRequest {
        repo_url: "https://github.com/acme/widgets".to_string(),
        branch: "main".to_string(),
        since_commit: since.map(str::to_string),
        local_path: None,
    }
}

fn client(host: Arc<MockHost>, index: Arc<InMemoryIndex>, locks: &TempDir) -> IngestClient {
    let detector = ChangeDetector::new().with_strategy(CommitStrategy::PublicApi, host.clone());
    IngestClient::with_components(test_config(), index, Arc::new(HashEmbedder::new(16)))
        .with_source(detector, host)
        .with_lock_dir(locks.path())
}

fn first_version() -> MockHost {
    MockHost::named("mock")
        .with_head(Ok(commit("c1", CommitSource::PublicApi)))
        .with_file("README.md", README)
        .with_file("src/lib.rs", LIB_V1)
        .with_file("src/old.rs", OLD)
}

// ===== Request validation =====

#[test]
fn test_validate_request_accepts_common_forms() {
    let target = validate_request(&request(None)).unwrap();
    assert_eq!(
        target,
        Target {
            owner: "acme".to_string(),
            repo: "widgets".to_string()
        }
    );

    let mut ssh = request(None);
    ssh.repo_url = "git@github.com:acme/widgets.git".to_string();
    ssh.branch = "feature/cart-v2".to_string();
    assert!(validate_request(&ssh).is_ok());
}

#[test]
fn test_validate_request_rejects_bad_input() {
    let mut bad_url = request(None);
    bad_url.repo_url = "not a url".to_string();
    assert!(validate_request(&bad_url).is_err());

    let mut empty = request(None);
    empty.repo_url = String::new();
    assert!(matches!(
        validate_request(&empty),
        Err(ValidationError::MissingField(_))
    ));

    for branch in ["", "-x", "a..b", "has space", "ends/", "x.lock", "a:b"] {
        let mut req = request(None);
        req.branch = branch.to_string();
        assert!(validate_request(&req).is_err(), "branch {:?} accepted", branch);
    }

    let mut missing = request(None);
    missing.local_path = Some("/nonexistent/checkout/12345".to_string());
    assert!(matches!(
        validate_request(&missing),
        Err(ValidationError::PathNotFound(_))
    ));

    let mut blank_since = request(Some("  "));
    blank_since.since_commit = Some("  ".to_string());
    assert!(validate_request(&blank_since).is_err());
}

// ===== Ingestion runs =====

#[tokio::test]
async fn test_full_ingestion() {
    let locks = TempDir::new().unwrap();
    let index = Arc::new(InMemoryIndex::new());
    let client = client(Arc::new(first_version()), index.clone(), &locks);

    let response = client.ingest(request(None)).await.unwrap();

    assert_eq!(response.namespace, NAMESPACE);
    assert_eq!(response.mode, IngestMode::Full);
    assert_eq!(response.commit.hash, "c1");
    assert_eq!(response.documents_loaded, 3);
    assert!(response.chunks_stored > 0);
    assert_eq!(response.chunks_deleted, 0);
    assert!(response.errors().is_empty(), "{:?}", response.errors());
    assert_eq!(index.count(NAMESPACE).await.unwrap(), response.chunks_stored);

    let stages: Vec<&str> = response.stages.iter().map(|s| s.stage.as_str()).collect();
    assert_eq!(
        stages,
        vec!["change_detection", "load", "chunk", "postprocess", "metadata", "delete", "store"]
    );

    let record = &index.records_for(NAMESPACE, "src/lib.rs")[0];
    let metadata: serde_json::Value = serde_json::from_str(&record.metadata).unwrap();
    assert_eq!(metadata["commit_hash"], "c1");
    assert_eq!(metadata["batch"], "primary_source");
    assert!(record.content.starts_with("// File: src/lib.rs (Rust)"));
}

#[tokio::test]
async fn test_reingesting_full_overwrites_instead_of_duplicating() {
    let locks = TempDir::new().unwrap();
    let index = Arc::new(InMemoryIndex::new());
    let client = client(Arc::new(first_version()), index.clone(), &locks);

    let first = client.ingest(request(None)).await.unwrap();
    let second = client.ingest(request(None)).await.unwrap();

    assert_eq!(first.chunks_stored, second.chunks_stored);
    assert_eq!(second.chunks_deleted, first.chunks_stored);
    assert_eq!(index.count(NAMESPACE).await.unwrap(), first.chunks_stored);
}

#[tokio::test]
async fn test_same_commit_is_skipped() {
    let locks = TempDir::new().unwrap();
    let host = Arc::new(first_version());
    let client = client(host.clone(), Arc::new(InMemoryIndex::new()), &locks);

    let response = client.ingest(request(Some("c1"))).await.unwrap();

    assert_eq!(response.mode, IngestMode::Skipped);
    assert_eq!(response.documents_loaded, 0);
    assert_eq!(response.chunks_stored, 0);
    assert!(!host.calls().iter().any(|c| c.starts_with("list_tree")));
    assert!(!host.calls().iter().any(|c| c.starts_with("compare")));
}

#[tokio::test]
async fn test_incremental_ingestion_touches_only_changed_files() {
    let locks = TempDir::new().unwrap();
    let index = Arc::new(InMemoryIndex::new());
    client(Arc::new(first_version()), index.clone(), &locks)
        .ingest(request(None))
        .await
        .unwrap();
    let readme_before = index.records_for(NAMESPACE, "README.md");
    assert!(!readme_before.is_empty());
    assert!(!index.records_for(NAMESPACE, "src/old.rs").is_empty());

    let second = MockHost::named("mock")
        .with_head(Ok(commit("c2", CommitSource::PublicApi)))
        .with_comparison(Ok(vec![
            ChangeRecord::new("src/lib.rs", ChangeStatus::Modified),
            ChangeRecord::new("src/old.rs", ChangeStatus::Removed),
        ]))
        .with_file("README.md", README)
        .with_file("src/lib.rs", LIB_V2);
    let host = Arc::new(second);
    let response = client(host.clone(), index.clone(), &locks)
        .ingest(request(Some("c1")))
        .await
        .unwrap();

    assert_eq!(response.mode, IngestMode::Incremental);
    assert_eq!(response.documents_loaded, 1);
    assert!(host.calls().contains(&"fetch src/lib.rs".to_string()));
    assert!(!host.calls().contains(&"fetch README.md".to_string()));

    assert!(index.records_for(NAMESPACE, "src/old.rs").is_empty());
    assert_eq!(index.records_for(NAMESPACE, "README.md"), readme_before);
    let lib = index.records_for(NAMESPACE, "src/lib.rs");
    assert!(lib.iter().all(|r| r.metadata.contains("\"commit_hash\":\"c2\"")));
    assert!(lib.iter().any(|r| r.content.contains("line_total")));
    assert!(!lib.iter().any(|r| r.content.contains("discount")));
}

#[tokio::test]
async fn test_failed_comparison_reloads_everything() {
    let locks = TempDir::new().unwrap();
    let host = first_version()
        .with_comparison(Err(SourceHostError::RateLimited { reset_at: None }));
    let response = client(Arc::new(host), Arc::new(InMemoryIndex::new()), &locks)
        .ingest(request(Some("c0")))
        .await
        .unwrap();

    assert_eq!(response.mode, IngestMode::Full);
    assert_eq!(response.documents_loaded, 3);
    let detection = response.stage("change_detection").unwrap();
    assert_eq!(detection.failed, 1);
    assert!(detection.errors[0].contains("reloading everything"));
}

#[tokio::test]
async fn test_full_reload_retires_files_missing_from_the_tree() {
    let locks = TempDir::new().unwrap();
    let index = Arc::new(InMemoryIndex::new());
    client(Arc::new(first_version()), index.clone(), &locks)
        .ingest(request(None))
        .await
        .unwrap();
    let old_chunks = index.records_for(NAMESPACE, "src/old.rs").len();
    assert!(old_chunks > 0);

    // comparison fails, so the run falls back to a full reload without src/old.rs
    let second = MockHost::named("mock")
        .with_head(Ok(commit("c2", CommitSource::PublicApi)))
        .with_comparison(Err(SourceHostError::Http("503".to_string())))
        .with_file("README.md", README)
        .with_file("src/lib.rs", LIB_V2);
    let response = client(Arc::new(second), index.clone(), &locks)
        .ingest(request(Some("c1")))
        .await
        .unwrap();

    assert_eq!(response.mode, IngestMode::Full);
    assert!(index.records_for(NAMESPACE, "src/old.rs").is_empty());
    assert!(!index.records_for(NAMESPACE, "src/lib.rs").is_empty());
    let delete = response.stage("delete").unwrap();
    assert_eq!(delete.succeeded, 3);
    assert_eq!(delete.failed, 0);
}

#[tokio::test]
async fn test_degraded_full_reload_keeps_unlisted_files() {
    let locks = TempDir::new().unwrap();
    let index = Arc::new(InMemoryIndex::new());
    client(Arc::new(first_version()), index.clone(), &locks)
        .ingest(request(None))
        .await
        .unwrap();

    // every listing fails: nothing proves src/old.rs is gone
    let mut broken = first_version();
    broken.listing_error = Some(SourceHostError::Http("502".to_string()));
    let response = client(Arc::new(broken), index.clone(), &locks)
        .ingest(request(None))
        .await
        .unwrap();

    assert_eq!(response.documents_loaded, 0);
    assert_eq!(response.chunks_deleted, 0);
    assert!(!index.records_for(NAMESPACE, "src/old.rs").is_empty());
}

#[tokio::test]
async fn test_unresolvable_commit_still_ingests() {
    let locks = TempDir::new().unwrap();
    let host = MockHost::named("mock")
        .with_head(Err(SourceHostError::AuthFailed("bad token".to_string())))
        .with_file("src/lib.rs", LIB_V1);
    let response = client(Arc::new(host), Arc::new(InMemoryIndex::new()), &locks)
        .ingest(request(Some("c1")))
        .await
        .unwrap();

    assert!(response.commit.is_synthetic());
    assert_eq!(response.mode, IngestMode::Full);
    assert_eq!(response.documents_loaded, 1);
}

#[tokio::test]
async fn test_busy_namespace_is_rejected() {
    let locks = TempDir::new().unwrap();
    let _held = NamespaceLock::try_acquire(locks.path(), NAMESPACE)
        .unwrap()
        .unwrap();

    let index = Arc::new(InMemoryIndex::new());
    let result = client(Arc::new(first_version()), index.clone(), &locks)
        .ingest(request(None))
        .await;

    assert!(matches!(
        result,
        Err(IngestError::Validation(ValidationError::NamespaceBusy(_)))
    ));
    assert_eq!(index.count(NAMESPACE).await.unwrap(), 0);
}

#[tokio::test]
async fn test_invalid_request_does_no_work() {
    let locks = TempDir::new().unwrap();
    let host = Arc::new(first_version());
    let mut bad = request(None);
    bad.branch = "bad branch".to_string();

    let result = client(host.clone(), Arc::new(InMemoryIndex::new()), &locks)
        .ingest(bad)
        .await;

    assert!(result.unwrap_err().is_user_error());
    assert!(host.calls().is_empty());
}

#[tokio::test]
async fn test_observer_sees_every_stage() {
    let locks = TempDir::new().unwrap();
    let observer = RecordingObserver::new();
    client(Arc::new(first_version()), Arc::new(InMemoryIndex::new()), &locks)
        .ingest_with_observer(request(None), &observer)
        .await
        .unwrap();

    let events = observer.events();
    assert_eq!(
        events.first(),
        Some(&IngestEvent::Started {
            namespace: NAMESPACE.to_string()
        })
    );
    assert!(matches!(events.last(), Some(IngestEvent::Finished { mode: IngestMode::Full, .. })));
    assert!(events.iter().any(|e| matches!(e, IngestEvent::CommitResolved(c) if c.hash == "c1")));
    let batches = events
        .iter()
        .filter(|e| matches!(e, IngestEvent::BatchLoaded(_)))
        .count();
    assert_eq!(batches, 3);
    assert!(events.iter().any(|e| matches!(e, IngestEvent::Stored(r) if r.failed == 0)));
}

#[tokio::test]
async fn test_accessors() {
    let locks = TempDir::new().unwrap();
    let index = Arc::new(InMemoryIndex::new());
    let client = client(Arc::new(first_version()), index, &locks);
    assert_eq!(client.config().metadata.byte_budget, 25_600);
    assert!(!client.index().exists(NAMESPACE).await.unwrap());
    let _cloned = client.clone();
}
