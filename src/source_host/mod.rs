//! Access to repository contents and history
//!
//! [`SourceHost`] is the seam between the pipeline and wherever the
//! repository lives: the GitHub REST API ([`GitHubClient`]) or a working tree
//! on disk ([`LocalCheckout`]).

mod github;
mod local;

pub use github::GitHubClient;
pub use local::LocalCheckout;

use crate::error::SourceHostError;
use crate::types::{ChangeRecord, CommitInfo};
use async_trait::async_trait;

/// A file (blob) in a repository tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Path relative to the repository root, `/`-separated
    pub path: String,
    pub size: Option<u64>,
}

impl TreeEntry {
    pub fn new(path: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }
}

/// Read access to a hosted repository
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Short label used in logs
    fn name(&self) -> &str;

    /// Latest commit on `branch`
    async fn branch_head(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<CommitInfo, SourceHostError>;

    /// Files changed between two commits
    async fn compare(
        &self,
        owner: &str,
        repo: &str,
        from: &str,
        to: &str,
    ) -> Result<Vec<ChangeRecord>, SourceHostError>;

    /// Files in the tree at `git_ref`; only root-level files unless `recursive`
    async fn list_tree(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
        recursive: bool,
    ) -> Result<Vec<TreeEntry>, SourceHostError>;

    /// UTF-8 content of one file at `git_ref`
    async fn fetch_file(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<String, SourceHostError>;
}

/// Heuristic used for both remote and local content: binary when more than
/// 30% of the bytes are control characters or any byte is NUL.
pub(crate) fn looks_binary(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return false;
    }
    if bytes.contains(&0) {
        return true;
    }
    let non_printable = bytes
        .iter()
        .filter(|&&b| b < 0x20 && b != b'\n' && b != b'\r' && b != b'\t')
        .count();
    (non_printable as f64 / bytes.len() as f64) >= 0.3
}
