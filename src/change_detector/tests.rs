use super::*;
use crate::error::SourceHostError;
use crate::testutil::{MockHost, TestRepo, commit};
use crate::types::{ChangeRecord, ChangeStatus, CommitSource};

fn rate_limited() -> SourceHostError {
    SourceHostError::RateLimited {
        reset_at: Some(1_700_000_000),
    }
}

#[test]
fn test_parse_repo_url_forms() {
    let expected = ("acme".to_string(), "widgets".to_string());
    for url in [
        "https://github.com/acme/widgets",
        "https://github.com/acme/widgets.git",
        "https://github.com/acme/widgets/",
        "http://git.example.com/acme/widgets",
        "ssh://git@github.com/acme/widgets.git",
        "git@github.com:acme/widgets.git",
        "acme/widgets",
        "  acme/widgets  ",
    ] {
        assert_eq!(parse_repo_url(url).unwrap(), expected, "url: {}", url);
    }
}

#[test]
fn test_parse_repo_url_rejects_garbage() {
    assert!(matches!(
        parse_repo_url(""),
        Err(ValidationError::MissingField(_))
    ));
    for url in [
        "widgets",
        "https://github.com",
        "https://github.com/acme",
        "https://github.com/acme/widgets/tree/main",
        "acme/wid gets",
        "/widgets",
    ] {
        assert!(
            matches!(parse_repo_url(url), Err(ValidationError::InvalidRepoUrl(_))),
            "url: {}",
            url
        );
    }
}

#[test]
fn test_strategy_order_independent_of_registration() {
    let detector = ChangeDetector::new()
        .with_strategy(CommitStrategy::LocalGit, Arc::new(MockHost::named("local")))
        .with_strategy(CommitStrategy::Synthetic, Arc::new(MockHost::named("ignored")))
        .with_strategy(CommitStrategy::AuthenticatedApi, Arc::new(MockHost::named("auth")))
        .with_strategy(CommitStrategy::PublicApi, Arc::new(MockHost::named("public")));

    assert_eq!(
        detector.strategies(),
        vec![
            CommitStrategy::AuthenticatedApi,
            CommitStrategy::PublicApi,
            CommitStrategy::LocalGit,
            CommitStrategy::Synthetic,
        ]
    );
}

#[tokio::test]
async fn test_preferred_strategy_answers_first() {
    let api = Arc::new(MockHost::named("api").with_head(Ok(commit("remote", CommitSource::PublicApi))));
    let local = Arc::new(MockHost::named("local").with_head(Ok(commit("local", CommitSource::LocalGit))));
    let detector = ChangeDetector::new()
        .with_strategy(CommitStrategy::PublicApi, api.clone())
        .with_preferred(CommitStrategy::LocalGit)
        .with_strategy(CommitStrategy::LocalGit, local.clone());

    assert_eq!(
        detector.strategies(),
        vec![
            CommitStrategy::LocalGit,
            CommitStrategy::PublicApi,
            CommitStrategy::Synthetic
        ]
    );
    let head = detector.resolve_commit("acme/widgets", "main").await;
    assert_eq!(head.hash, "local");
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_resolve_commit_first_success_wins() {
    let auth = Arc::new(MockHost::named("auth").with_head(Ok(commit("aaa", CommitSource::RemoteApi))));
    let public = Arc::new(MockHost::named("public").with_head(Ok(commit("bbb", CommitSource::PublicApi))));
    let detector = ChangeDetector::new()
        .with_strategy(CommitStrategy::AuthenticatedApi, auth.clone())
        .with_strategy(CommitStrategy::PublicApi, public.clone());

    let resolved = detector.resolve_commit("acme/widgets", "main").await;
    assert_eq!(resolved.hash, "aaa");
    assert!(public.calls().is_empty());
}

#[tokio::test]
async fn test_resolve_commit_falls_through_rate_limit_and_auth() {
    let auth = Arc::new(MockHost::named("auth").with_head(Err(rate_limited())));
    let public = Arc::new(
        MockHost::named("public").with_head(Err(SourceHostError::AuthFailed("401".to_string()))),
    );
    let local = Arc::new(MockHost::named("local").with_head(Ok(commit("ccc", CommitSource::LocalGit))));
    let detector = ChangeDetector::new()
        .with_strategy(CommitStrategy::AuthenticatedApi, auth.clone())
        .with_strategy(CommitStrategy::PublicApi, public.clone())
        .with_strategy(CommitStrategy::LocalGit, local.clone());

    let resolved = detector.resolve_commit("https://github.com/acme/widgets", "main").await;
    assert_eq!(resolved.hash, "ccc");
    assert_eq!(resolved.source, CommitSource::LocalGit);
    assert_eq!(auth.calls(), vec!["branch_head main"]);
    assert_eq!(public.calls(), vec!["branch_head main"]);
}

#[tokio::test]
async fn test_resolve_commit_never_fails() {
    let detector = ChangeDetector::new()
        .with_strategy(CommitStrategy::PublicApi, Arc::new(MockHost::named("public").with_head(Err(rate_limited()))));

    let resolved = detector.resolve_commit("acme/widgets", "main").await;
    assert!(resolved.is_synthetic());
    assert!(resolved.hash.starts_with("synthetic-"));
    assert_eq!(resolved.source, CommitSource::Synthetic);

    // an unparseable URL still yields a commit
    let resolved = detector.resolve_commit("not a url", "main").await;
    assert!(resolved.is_synthetic());
}

#[tokio::test]
async fn test_changed_files_same_commit_is_empty_without_calls() {
    let host = Arc::new(MockHost::named("public").with_comparison(Err(rate_limited())));
    let detector = ChangeDetector::new().with_strategy(CommitStrategy::PublicApi, host.clone());

    let changes = detector.changed_files("acme", "widgets", "abc", "abc").await;
    assert_eq!(changes, ChangeSet::Files(Vec::new()));
    assert!(changes.is_empty());
    assert!(host.calls().is_empty());
}

#[tokio::test]
async fn test_changed_files_falls_back_to_next_strategy() {
    let auth = Arc::new(MockHost::named("auth").with_comparison(Err(rate_limited())));
    let public = Arc::new(MockHost::named("public").with_comparison(Ok(vec![ChangeRecord::new(
        "src/b.rs",
        ChangeStatus::Modified,
    )])));
    let detector = ChangeDetector::new()
        .with_strategy(CommitStrategy::AuthenticatedApi, auth)
        .with_strategy(CommitStrategy::PublicApi, public.clone());

    let changes = detector.changed_files("acme", "widgets", "c1", "c2").await;
    assert_eq!(
        changes,
        ChangeSet::Files(vec![ChangeRecord::new("src/b.rs", ChangeStatus::Modified)])
    );
    assert_eq!(public.calls(), vec!["compare c1...c2"]);
}

#[tokio::test]
async fn test_changed_files_total_failure_is_full_reload() {
    let detector = ChangeDetector::new()
        .with_strategy(
            CommitStrategy::AuthenticatedApi,
            Arc::new(MockHost::named("auth").with_comparison(Err(rate_limited()))),
        )
        .with_strategy(
            CommitStrategy::PublicApi,
            Arc::new(MockHost::named("public").with_comparison(Err(SourceHostError::Http(
                "502".to_string(),
            )))),
        );

    let changes = detector.changed_files("acme", "widgets", "c1", "c2").await;
    assert!(changes.is_full_reload());

    // no host at all
    let changes = ChangeDetector::new().changed_files("acme", "widgets", "c1", "c2").await;
    assert!(changes.is_full_reload());
}

#[tokio::test]
async fn test_changed_files_synthetic_commit_is_full_reload() {
    let host = Arc::new(MockHost::named("public").with_comparison(Ok(Vec::new())));
    let detector = ChangeDetector::new().with_strategy(CommitStrategy::PublicApi, host.clone());

    let changes = detector
        .changed_files("acme", "widgets", "synthetic-1700000000000", "c2")
        .await;
    assert!(changes.is_full_reload());
    assert!(host.calls().is_empty());
}

#[tokio::test]
async fn test_local_git_strategy_end_to_end() {
    let repo = TestRepo::new();
    let c1 = repo.commit(&[("a.rs", "fn a() {}\n"), ("b.rs", "fn b() {}\n")], &[], "c1");
    let c2 = repo.commit(&[("b.rs", "fn b() { 2; }\n")], &[], "c2");

    let detector = ChangeDetector::new().with_strategy(
        CommitStrategy::LocalGit,
        Arc::new(LocalCheckout::new(repo.path(), 1024 * 1024)),
    );

    let head = detector.resolve_commit("acme/widgets", "main").await;
    assert_eq!(head.hash, c2.to_string());

    let changes = detector
        .changed_files("acme", "widgets", &c1.to_string(), &c2.to_string())
        .await;
    let ChangeSet::Files(files) = changes else {
        panic!("expected a file list");
    };
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].filename, "b.rs");
    assert_eq!(files[0].status, ChangeStatus::Modified);
}

#[test]
fn test_local_probe_can_be_forced_off() {
    let repo = TestRepo::new();
    repo.commit(&[("a.rs", "fn a() {}\n")], &[], "c1");

    let mut config = Config::default();
    assert!(local_git_available(&config, repo.path()));

    config.change_detection.local_git = false;
    assert!(!local_git_available(&config, repo.path()));

    let detector = ChangeDetector::from_config(&config, Some(repo.path())).unwrap();
    assert!(!detector.strategies().contains(&CommitStrategy::LocalGit));
}

#[test]
fn test_from_config_chain() {
    let repo = TestRepo::new();
    repo.commit(&[("a.rs", "fn a() {}\n")], &[], "c1");

    let mut config = Config::default();
    config.source_host.token = Some("ghp_test".to_string());

    // a checkout that files are read from is consulted first
    let detector = ChangeDetector::from_config(&config, Some(repo.path())).unwrap();
    assert_eq!(
        detector.strategies(),
        vec![
            CommitStrategy::LocalGit,
            CommitStrategy::AuthenticatedApi,
            CommitStrategy::PublicApi,
            CommitStrategy::Synthetic,
        ]
    );

    // a configured repository path only backs up the API
    config.change_detection.local_repo_path = Some(repo.path().to_path_buf());
    let detector = ChangeDetector::from_config(&config, None).unwrap();
    assert_eq!(
        detector.strategies(),
        vec![
            CommitStrategy::AuthenticatedApi,
            CommitStrategy::PublicApi,
            CommitStrategy::LocalGit,
            CommitStrategy::Synthetic,
        ]
    );

    config.change_detection.local_repo_path = None;
    config.source_host.token = None;
    let detector = ChangeDetector::from_config(&config, None).unwrap();
    assert_eq!(
        detector.strategies(),
        vec![CommitStrategy::PublicApi, CommitStrategy::Synthetic]
    );
}
