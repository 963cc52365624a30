use super::*;

fn sample_commit() -> CommitInfo {
    CommitInfo {
        hash: "0123456789abcdef0123456789abcdef01234567".to_string(),
        author: "Dev".to_string(),
        email: "dev@example.com".to_string(),
        date: "2024-01-01T00:00:00+00:00".to_string(),
        subject: "Initial commit".to_string(),
        source: CommitSource::RemoteApi,
    }
}

#[test]
fn test_synthetic_commit_is_tagged() {
    let commit = CommitInfo::synthetic("main");
    assert!(commit.hash.starts_with(CommitInfo::SYNTHETIC_PREFIX));
    assert!(commit.is_synthetic());
    assert_eq!(commit.source, CommitSource::Synthetic);
    assert!(commit.subject.contains("main"));
    assert!(!commit.date.is_empty());
}

#[test]
fn test_short_hash() {
    let commit = sample_commit();
    assert_eq!(commit.short_hash(), "0123456789ab");

    let mut short = sample_commit();
    short.hash = "abc".to_string();
    assert_eq!(short.short_hash(), "abc");
}

#[test]
fn test_change_record_needs_load() {
    assert!(ChangeRecord::new("a.rs", ChangeStatus::Added).needs_load());
    assert!(ChangeRecord::new("a.rs", ChangeStatus::Modified).needs_load());
    assert!(!ChangeRecord::new("a.rs", ChangeStatus::Removed).needs_load());
}

#[test]
fn test_change_set_predicates() {
    assert!(ChangeSet::FullReload.is_full_reload());
    assert!(!ChangeSet::FullReload.is_empty());
    assert!(ChangeSet::Files(vec![]).is_empty());
    assert!(!ChangeSet::Files(vec![ChangeRecord::new("b", ChangeStatus::Modified)]).is_empty());
}

#[test]
fn test_load_scope_from_change_set() {
    assert_eq!(LoadScope::from(ChangeSet::FullReload), LoadScope::Full);
    let files = vec![ChangeRecord::new("b.rs", ChangeStatus::Modified)];
    assert_eq!(
        LoadScope::from(ChangeSet::Files(files.clone())),
        LoadScope::Changes(files)
    );
}

#[test]
fn test_change_status_serialization() {
    let record = ChangeRecord::new("src/lib.rs", ChangeStatus::Modified);
    let json = serde_json::to_string(&record).unwrap();
    assert!(json.contains("\"status\":\"modified\""));

    let parsed: ChangeRecord =
        serde_json::from_str(r#"{"filename":"x.py","status":"removed"}"#).unwrap();
    assert_eq!(parsed.status, ChangeStatus::Removed);
    assert_eq!(parsed.additions, 0);
}

#[test]
fn test_document_extension() {
    let doc = Document {
        source_path: "src/app.test.ts".to_string(),
        content: String::new(),
        repo_owner: "o".to_string(),
        repo_name: "r".to_string(),
        branch: "main".to_string(),
        commit_info: sample_commit(),
        file_type: "TypeScript".to_string(),
        batch: "primary_source".to_string(),
    };
    assert_eq!(doc.extension(), Some("ts"));

    let dotfile = Document {
        source_path: ".gitignore".to_string(),
        ..doc.clone()
    };
    assert_eq!(dotfile.extension(), None);

    let bare = Document {
        source_path: "Makefile".to_string(),
        ..doc
    };
    assert_eq!(bare.extension(), None);
}

#[test]
fn test_enum_labels() {
    assert_eq!(SemanticRole::ModuleLevel.as_str(), "module_level");
    assert_eq!(SemanticRole::Route.to_string(), "route");
    assert_eq!(SplittingMethod::AstBased.as_str(), "ast_based");
    assert_eq!(SplittingMethod::LineBased.as_str(), "line_based");
    assert_eq!(ContentCategory::Doc.as_str(), "doc");
    assert_eq!(ComplexityLevel::Moderate.as_str(), "moderate");
    assert_eq!(CommitSource::LocalGit.as_str(), "local_git");
}

#[test]
fn test_stage_summary_record_error() {
    let mut summary = StageSummary::new("load");
    summary.succeeded = 3;
    summary.record_error("batch secondary timed out");
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.stage, "load");
}

#[test]
fn test_ingest_response_errors_flatten() {
    let mut load = StageSummary::new("load");
    load.record_error("a");
    let mut store = StageSummary::new("store");
    store.record_error("b");

    let response = IngestResponse {
        namespace: "o_r_main".to_string(),
        commit: sample_commit(),
        mode: IngestMode::Full,
        documents_loaded: 1,
        chunks_created: 2,
        chunks_stored: 2,
        chunks_deleted: 0,
        duration_ms: 5,
        stages: vec![load, store],
    };

    assert_eq!(response.errors(), vec!["a", "b"]);
    assert!(response.stage("store").is_some());
    assert!(response.stage("chunk").is_none());
}

#[test]
fn test_ingest_request_deserialize_defaults() {
    let req: IngestRequest =
        serde_json::from_str(r#"{"repo_url":"acme/widgets","branch":"main"}"#).unwrap();
    assert_eq!(req.repo_url, "acme/widgets");
    assert!(req.since_commit.is_none());
    assert!(req.local_path.is_none());
}
