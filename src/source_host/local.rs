//! A working tree on disk used as a source host

use super::{SourceHost, TreeEntry, looks_binary};
use crate::error::{GitError, SourceHostError};
use crate::git::LocalGit;
use crate::types::{ChangeRecord, CommitInfo};
use async_trait::async_trait;
use ignore::WalkBuilder;
use std::path::{Component, Path, PathBuf};

/// Reads files from a local checkout. The `git_ref` passed to tree and file
/// calls is informational: content always comes from the working tree, while
/// history questions go to the repository through git2.
pub struct LocalCheckout {
    root: PathBuf,
    max_file_size: usize,
}

impl LocalCheckout {
    pub fn new(root: impl AsRef<Path>, max_file_size: usize) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            max_file_size,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the tree, respecting ignore files and skipping `.git`
    fn walk(&self, recursive: bool) -> Result<Vec<TreeEntry>, SourceHostError> {
        if !self.root.is_dir() {
            return Err(SourceHostError::NotFound(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }

        let mut builder = WalkBuilder::new(&self.root);
        builder
            .standard_filters(true)
            .hidden(false)
            .git_ignore(true)
            .git_exclude(true)
            .git_global(false)
            .require_git(false);
        if !recursive {
            builder.max_depth(Some(1));
        }

        let mut entries = Vec::new();
        for entry in builder.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            if path.components().any(|c| c.as_os_str() == ".git") {
                continue;
            }

            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            let size = entry.metadata().ok().map(|m| m.len());
            entries.push(TreeEntry::new(
                relative.to_string_lossy().replace('\\', "/"),
                size,
            ));
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Resolve a repository-relative path, refusing anything that escapes the root
    fn resolve(&self, relative: &str) -> Result<PathBuf, SourceHostError> {
        let candidate = Path::new(relative);
        let escapes = candidate
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(SourceHostError::NotFound(format!(
                "{} is outside the checkout",
                relative
            )));
        }
        Ok(self.root.join(candidate))
    }

    async fn with_git<T, F>(&self, op: F) -> Result<T, SourceHostError>
    where
        T: Send + 'static,
        F: FnOnce(&LocalGit) -> Result<T, GitError> + Send + 'static,
    {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            let git = LocalGit::discover(&root)?;
            op(&git)
        })
        .await
        .map_err(|e| SourceHostError::Unsupported(format!("git task failed: {}", e)))?
        .map_err(git_error)
    }
}

fn git_error(err: GitError) -> SourceHostError {
    match err {
        GitError::RepoNotFound(path) => {
            SourceHostError::Unsupported(format!("no git repository at {}", path))
        }
        GitError::RevisionNotFound(rev) | GitError::BranchNotFound(rev) => {
            SourceHostError::NotFound(rev)
        }
        GitError::DiffFailed(reason) => SourceHostError::Decode(reason),
    }
}

#[async_trait]
impl SourceHost for LocalCheckout {
    fn name(&self) -> &str {
        "local-checkout"
    }

    async fn branch_head(
        &self,
        _owner: &str,
        _repo: &str,
        branch: &str,
    ) -> Result<CommitInfo, SourceHostError> {
        let branch = branch.to_string();
        self.with_git(move |git| git.head_commit(&branch)).await
    }

    async fn compare(
        &self,
        _owner: &str,
        _repo: &str,
        from: &str,
        to: &str,
    ) -> Result<Vec<ChangeRecord>, SourceHostError> {
        let (from, to) = (from.to_string(), to.to_string());
        self.with_git(move |git| git.diff(&from, &to)).await
    }

    async fn list_tree(
        &self,
        _owner: &str,
        _repo: &str,
        _git_ref: &str,
        recursive: bool,
    ) -> Result<Vec<TreeEntry>, SourceHostError> {
        let checkout = Self::new(&self.root, self.max_file_size);
        tokio::task::spawn_blocking(move || checkout.walk(recursive))
            .await
            .map_err(|e| SourceHostError::Unsupported(format!("walk task failed: {}", e)))?
    }

    async fn fetch_file(
        &self,
        _owner: &str,
        _repo: &str,
        _git_ref: &str,
        path: &str,
    ) -> Result<String, SourceHostError> {
        let full = self.resolve(path)?;
        let bytes = tokio::fs::read(&full)
            .await
            .map_err(|e| SourceHostError::NotFound(format!("{}: {}", path, e)))?;

        if bytes.len() > self.max_file_size {
            return Err(SourceHostError::Unsupported(format!(
                "{} exceeds {} bytes",
                path, self.max_file_size
            )));
        }
        if looks_binary(&bytes) {
            return Err(SourceHostError::Decode(format!("{} is binary", path)));
        }
        String::from_utf8(bytes)
            .map_err(|_| SourceHostError::Decode(format!("{} is not valid UTF-8", path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestRepo;
    use crate::types::{ChangeStatus, CommitSource};

    fn paths(entries: &[TreeEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.path.as_str()).collect()
    }

    #[tokio::test]
    async fn test_list_tree_recursive_and_root_only() {
        let repo = TestRepo::new();
        repo.commit(
            &[
                ("README.md", "# Demo\n"),
                ("src/lib.rs", "pub fn a() {}\n"),
                ("src/nested/deep.rs", "pub fn b() {}\n"),
            ],
            &[],
            "init",
        );
        let checkout = LocalCheckout::new(repo.path(), 1024 * 1024);

        let all = checkout.list_tree("o", "r", "main", true).await.unwrap();
        assert_eq!(
            paths(&all),
            vec!["README.md", "src/lib.rs", "src/nested/deep.rs"]
        );
        assert!(all.iter().all(|e| e.size.is_some()));

        let root_only = checkout.list_tree("o", "r", "main", false).await.unwrap();
        assert_eq!(paths(&root_only), vec!["README.md"]);
    }

    #[tokio::test]
    async fn test_list_tree_respects_gitignore() {
        let repo = TestRepo::new();
        repo.commit(&[(".gitignore", "build/\n"), ("a.rs", "fn a() {}\n")], &[], "init");
        std::fs::create_dir_all(repo.path().join("build")).unwrap();
        std::fs::write(repo.path().join("build/out.rs"), "fn out() {}\n").unwrap();

        let checkout = LocalCheckout::new(repo.path(), 1024 * 1024);
        let all = checkout.list_tree("o", "r", "main", true).await.unwrap();
        assert_eq!(paths(&all), vec![".gitignore", "a.rs"]);
    }

    #[tokio::test]
    async fn test_fetch_file_guards() {
        let repo = TestRepo::new();
        let big = "x".repeat(200);
        repo.commit(&[("a.rs", "fn a() {}\n"), ("big.txt", big.as_str())], &[], "init");
        std::fs::write(repo.path().join("blob.bin"), [0u8, 1, 2, 3]).unwrap();
        let checkout = LocalCheckout::new(repo.path(), 100);

        assert_eq!(
            checkout.fetch_file("o", "r", "main", "a.rs").await.unwrap(),
            "fn a() {}\n"
        );
        assert!(matches!(
            checkout.fetch_file("o", "r", "main", "big.txt").await,
            Err(SourceHostError::Unsupported(_))
        ));
        assert!(matches!(
            checkout.fetch_file("o", "r", "main", "blob.bin").await,
            Err(SourceHostError::Decode(_))
        ));
        assert!(matches!(
            checkout.fetch_file("o", "r", "main", "../etc/passwd").await,
            Err(SourceHostError::NotFound(_))
        ));
        assert!(matches!(
            checkout.fetch_file("o", "r", "main", "missing.rs").await,
            Err(SourceHostError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_history_through_git() {
        let repo = TestRepo::new();
        let c1 = repo.commit(&[("a.rs", "fn a() {}\n")], &[], "c1");
        let c2 = repo.commit(&[("a.rs", "fn a() { 1; }\n")], &[], "c2");
        let checkout = LocalCheckout::new(repo.path(), 1024);

        let head = checkout.branch_head("o", "r", "main").await.unwrap();
        assert_eq!(head.hash, c2.to_string());
        assert_eq!(head.source, CommitSource::LocalGit);

        let changes = checkout
            .compare("o", "r", &c1.to_string(), &c2.to_string())
            .await
            .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].status, ChangeStatus::Modified);
    }

    #[tokio::test]
    async fn test_history_without_repository() {
        let dir = tempfile::TempDir::new().unwrap();
        let checkout = LocalCheckout::new(dir.path(), 1024);
        assert!(matches!(
            checkout.branch_head("o", "r", "main").await,
            Err(SourceHostError::Unsupported(_))
        ));
    }
}
