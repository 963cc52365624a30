//! Scratch git repositories and a scriptable source host for unit tests

use crate::error::SourceHostError;
use crate::source_host::{SourceHost, TreeEntry};
use crate::indexer::estimate_tokens;
use crate::types::{
    ChangeRecord, Chunk, CommitInfo, CommitSource, SemanticRole, SplittingMethod,
};
use async_trait::async_trait;
use git2::{Oid, Repository, Signature};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

pub struct TestRepo {
    pub dir: TempDir,
    pub repo: Repository,
}

impl TestRepo {
    /// Empty repository whose initial branch is `main`
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut opts = git2::RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(dir.path(), &opts).unwrap();
        Self { dir, repo }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write files, stage everything, remove `deleted` and commit on HEAD
    pub fn commit(&self, files: &[(&str, &str)], deleted: &[&str], message: &str) -> Oid {
        let mut index = self.repo.index().unwrap();
        for (path, content) in files {
            let full = self.path().join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&full, content).unwrap();
            index.add_path(Path::new(path)).unwrap();
        }
        for path in deleted {
            std::fs::remove_file(self.path().join(path)).unwrap();
            index.remove_path(Path::new(path)).unwrap();
        }
        index.write().unwrap();

        let tree_id = index.write_tree().unwrap();
        let tree = self.repo.find_tree(tree_id).unwrap();
        let sig = Signature::now("Test Dev", "dev@example.com").unwrap();
        let parent = self
            .repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
    }
}

/// Scriptable in-memory source host
#[derive(Default)]
pub struct MockHost {
    pub label: String,
    pub head: Option<Result<CommitInfo, SourceHostError>>,
    pub comparison: Option<Result<Vec<ChangeRecord>, SourceHostError>>,
    pub files: BTreeMap<String, String>,
    /// Paths whose fetch fails
    pub broken: Vec<String>,
    /// Delay applied to recursive tree listings
    pub recursive_delay: Option<Duration>,
    /// Error returned by every tree listing
    pub listing_error: Option<SourceHostError>,
    pub calls: Mutex<Vec<String>>,
}

impl MockHost {
    pub fn named(label: &str) -> Self {
        Self {
            label: label.to_string(),
            ..Default::default()
        }
    }

    pub fn with_head(mut self, head: Result<CommitInfo, SourceHostError>) -> Self {
        self.head = Some(head);
        self
    }

    pub fn with_comparison(mut self, result: Result<Vec<ChangeRecord>, SourceHostError>) -> Self {
        self.comparison = Some(result);
        self
    }

    pub fn with_file(mut self, path: &str, content: &str) -> Self {
        self.files.insert(path.to_string(), content.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Commit with a fixed hash and the given source
pub fn commit(hash: &str, source: CommitSource) -> CommitInfo {
    CommitInfo {
        hash: hash.to_string(),
        author: "Test Dev".to_string(),
        email: "dev@example.com".to_string(),
        date: "2024-01-01T00:00:00+00:00".to_string(),
        subject: "test".to_string(),
        source,
    }
}

#[async_trait]
impl SourceHost for MockHost {
    fn name(&self) -> &str {
        &self.label
    }

    async fn branch_head(
        &self,
        _owner: &str,
        _repo: &str,
        branch: &str,
    ) -> Result<CommitInfo, SourceHostError> {
        self.record(format!("branch_head {}", branch));
        self.head
            .clone()
            .unwrap_or_else(|| Err(SourceHostError::NotFound(branch.to_string())))
    }

    async fn compare(
        &self,
        _owner: &str,
        _repo: &str,
        from: &str,
        to: &str,
    ) -> Result<Vec<ChangeRecord>, SourceHostError> {
        self.record(format!("compare {}...{}", from, to));
        self.comparison
            .clone()
            .unwrap_or_else(|| Err(SourceHostError::NotFound(format!("{}...{}", from, to))))
    }

    async fn list_tree(
        &self,
        _owner: &str,
        _repo: &str,
        _git_ref: &str,
        recursive: bool,
    ) -> Result<Vec<TreeEntry>, SourceHostError> {
        self.record(format!("list_tree recursive={}", recursive));
        if let Some(error) = &self.listing_error {
            return Err(error.clone());
        }
        if recursive && let Some(delay) = self.recursive_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .files
            .iter()
            .filter(|(path, _)| recursive || !path.contains('/'))
            .map(|(path, content)| TreeEntry::new(path.clone(), Some(content.len() as u64)))
            .collect())
    }

    async fn fetch_file(
        &self,
        _owner: &str,
        _repo: &str,
        _git_ref: &str,
        path: &str,
    ) -> Result<String, SourceHostError> {
        self.record(format!("fetch {}", path));
        if self.broken.iter().any(|p| p == path) {
            return Err(SourceHostError::Http(format!("{} failed", path)));
        }
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| SourceHostError::NotFound(path.to_string()))
    }
}

/// AST chunk of a single function named `f`
pub fn chunk(path: &str, language: &str, index: usize, content: &str) -> Chunk {
    Chunk {
        content: content.to_string(),
        token_count: estimate_tokens(content),
        start_line: 1,
        end_line: content.lines().count().max(1),
        semantic_role: SemanticRole::Function,
        unit_name: "f".to_string(),
        parent_class_name: None,
        splitting_method: SplittingMethod::AstBased,
        source_path: path.to_string(),
        chunk_index: index,
        language: language.to_string(),
        is_async: false,
        is_static: false,
    }
}
