use crate::error::GitError;
use crate::types::{ChangeRecord, ChangeStatus, CommitInfo, CommitSource};
use git2::{BranchType, Delta, DiffFindOptions, DiffOptions, Patch, Repository};
use std::path::{Path, PathBuf};

/// Read-only view of a local git repository
pub struct LocalGit {
    repo: Repository,
    repo_path: PathBuf,
}

impl LocalGit {
    /// Discover and open a git repository from any path within it
    pub fn discover<P: AsRef<Path>>(path: P) -> Result<Self, GitError> {
        let path = path.as_ref();

        let repo = Repository::discover(path)
            .map_err(|_| GitError::RepoNotFound(path.display().to_string()))?;
        let repo_path = repo
            .workdir()
            .unwrap_or_else(|| repo.path())
            .to_path_buf();

        tracing::debug!("Opened git repository at: {}", repo_path.display());

        Ok(Self { repo, repo_path })
    }

    /// Capability probe: whether a usable repository with at least one commit exists at `path`
    pub fn probe<P: AsRef<Path>>(path: P) -> bool {
        Self::discover(path).is_ok_and(|git| git.has_commits())
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Get the current branch name, or None if detached HEAD
    pub fn current_branch(&self) -> Option<String> {
        self.repo.head().ok()?.shorthand().map(|s| s.to_string())
    }

    pub fn has_commits(&self) -> bool {
        self.repo.head().is_ok()
    }

    /// Head commit of `branch`: local branch first, then `origin/<branch>`,
    /// then HEAD when it points at that branch name.
    pub fn head_commit(&self, branch: &str) -> Result<CommitInfo, GitError> {
        let commit = if let Ok(local) = self.repo.find_branch(branch, BranchType::Local) {
            local.get().peel_to_commit()?
        } else if let Ok(remote) = self
            .repo
            .find_branch(&format!("origin/{}", branch), BranchType::Remote)
        {
            remote.get().peel_to_commit()?
        } else if branch.is_empty() || branch == "HEAD" || self.current_branch().as_deref() == Some(branch) {
            self.repo.head()?.peel_to_commit()?
        } else {
            return Err(GitError::BranchNotFound(branch.to_string()));
        };

        Ok(commit_info(&commit))
    }

    /// Files changed between two revisions, renames reported as remove + add
    pub fn diff(&self, from: &str, to: &str) -> Result<Vec<ChangeRecord>, GitError> {
        let old_tree = self.tree_of(from)?;
        let new_tree = self.tree_of(to)?;

        let mut diff_opts = DiffOptions::new();
        diff_opts.context_lines(0).ignore_whitespace(false);

        let mut diff = self
            .repo
            .diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut diff_opts))
            .map_err(|e| GitError::DiffFailed(e.message().to_string()))?;
        diff.find_similar(Some(DiffFindOptions::new().renames(true)))
            .map_err(|e| GitError::DiffFailed(e.message().to_string()))?;

        let mut records = Vec::new();
        for (idx, delta) in diff.deltas().enumerate() {
            let (additions, deletions) = match Patch::from_diff(&diff, idx) {
                Ok(Some(patch)) => patch
                    .line_stats()
                    .map(|(_, added, deleted)| (added, deleted))
                    .unwrap_or((0, 0)),
                _ => (0, 0),
            };

            let new_path = delta.new_file().path().map(path_string);
            let old_path = delta.old_file().path().map(path_string);

            let mut push = |path: Option<String>, status: ChangeStatus| {
                if let Some(filename) = path {
                    records.push(ChangeRecord {
                        filename,
                        status,
                        additions,
                        deletions,
                    });
                }
            };

            match delta.status() {
                Delta::Added | Delta::Copied => push(new_path, ChangeStatus::Added),
                Delta::Deleted => push(old_path, ChangeStatus::Removed),
                Delta::Modified | Delta::Typechange => push(new_path, ChangeStatus::Modified),
                Delta::Renamed => {
                    push(old_path, ChangeStatus::Removed);
                    push(new_path, ChangeStatus::Added);
                }
                _ => {}
            }
        }

        tracing::debug!(
            "Local diff {}..{}: {} changed files",
            short(from),
            short(to),
            records.len()
        );
        Ok(records)
    }

    fn tree_of(&self, rev: &str) -> Result<git2::Tree<'_>, GitError> {
        let object = self
            .repo
            .revparse_single(rev)
            .map_err(|_| GitError::RevisionNotFound(rev.to_string()))?;
        object
            .peel_to_tree()
            .map_err(|_| GitError::RevisionNotFound(rev.to_string()))
    }
}

fn commit_info(commit: &git2::Commit) -> CommitInfo {
    let author = commit.author();
    let date = chrono::DateTime::from_timestamp(commit.time().seconds(), 0)
        .map(|d| d.to_rfc3339())
        .unwrap_or_default();

    CommitInfo {
        hash: commit.id().to_string(),
        author: author.name().unwrap_or("Unknown").to_string(),
        email: author.email().unwrap_or("").to_string(),
        date,
        subject: commit.summary().unwrap_or("").to_string(),
        source: CommitSource::LocalGit,
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn short(rev: &str) -> &str {
    rev.get(..12).unwrap_or(rev)
}
