//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use git2::{Oid, Repository, RepositoryInitOptions, Signature};
use repo_ingest::error::SourceHostError;
use repo_ingest::source_host::{LocalCheckout, SourceHost, TreeEntry};
use repo_ingest::types::{ChangeRecord, CommitInfo};
use repo_ingest::Config;
use std::path::Path;
use tempfile::TempDir;

pub const NAMESPACE: &str = "acme_widgets_main";

pub const PRICING_V1: &str = "/// Price of a single widget in cents, before tax.\npub fn unit_price(sku: &str) -> u64 {\n    match sku {\n        \"basic\" => 1_250,\n        \"deluxe\" => 4_900,\n        _ => 0,\n    }\n}\n";

pub const PRICING_V2: &str = "/// Price of a single widget in cents, before tax.\npub fn unit_price(sku: &str) -> u64 {\n    match sku {\n        \"basic\" => 1_300,\n        \"deluxe\" => 5_100,\n        \"premium\" => 9_900,\n        _ => 0,\n    }\n}\n";

pub const INVENTORY: &str = "/// Number of widgets left in the warehouse for a SKU.\npub fn stock_level(sku: &str, shelves: &[(String, u32)]) -> u32 {\n    shelves\n        .iter()\n        .filter(|(s, _)| s == sku)\n        .map(|(_, count)| *count)\n        .sum()\n}\n";

/// A scratch git repository on branch `main`
pub struct GitFixture {
    pub dir: TempDir,
    pub repo: Repository,
}

impl GitFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(dir.path(), &opts).unwrap();
        Self { dir, repo }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `files`, stage them and commit on HEAD
    pub fn commit(&self, files: &[(&str, &str)], message: &str) -> Oid {
        let mut index = self.repo.index().unwrap();
        for (path, content) in files {
            let full = self.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(&full, content).unwrap();
            index.add_path(Path::new(path)).unwrap();
        }
        index.write().unwrap();

        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Test Dev", "dev@example.com").unwrap();
        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
    }

    /// Delete `paths` from the work tree and the index, then commit
    pub fn remove(&self, paths: &[&str], message: &str) -> Oid {
        let mut index = self.repo.index().unwrap();
        for path in paths {
            std::fs::remove_file(self.path().join(path)).unwrap();
            index.remove_path(Path::new(path)).unwrap();
        }
        index.write().unwrap();
        self.commit(&[], message)
    }
}

/// Configuration with no pacing so tests run quickly
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.loader.inter_batch_delay_ms = 0;
    config.storage.refill_interval_ms = 10;
    config.storage.reservoir_capacity = 100;
    config
}

/// A local checkout whose comparisons always fail
pub struct NoCompare(pub LocalCheckout);

#[async_trait]
impl SourceHost for NoCompare {
    fn name(&self) -> &str {
        "no-compare"
    }

    async fn branch_head(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<CommitInfo, SourceHostError> {
        self.0.branch_head(owner, repo, branch).await
    }

    async fn compare(
        &self,
        _owner: &str,
        _repo: &str,
        _from: &str,
        _to: &str,
    ) -> Result<Vec<ChangeRecord>, SourceHostError> {
        Err(SourceHostError::Http("503 Service Unavailable".to_string()))
    }

    async fn list_tree(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
        recursive: bool,
    ) -> Result<Vec<TreeEntry>, SourceHostError> {
        self.0.list_tree(owner, repo, git_ref, recursive).await
    }

    async fn fetch_file(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<String, SourceHostError> {
        self.0.fetch_file(owner, repo, git_ref, path).await
    }
}
