//! Commit resolution and change detection with graceful degradation
//!
//! Every call walks an ordered list of [`CommitStrategy`] values and takes the
//! first answer. Commit resolution always ends in a synthetic commit; change
//! detection ends in [`ChangeSet::FullReload`] instead.

use crate::config::Config;
use crate::error::{IngestError, ValidationError};
use crate::git::LocalGit;
use crate::source_host::{GitHubClient, LocalCheckout, SourceHost};
use crate::types::{ChangeSet, CommitInfo};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where commit and diff information may come from, in order of preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommitStrategy {
    AuthenticatedApi,
    PublicApi,
    LocalGit,
    /// Terminal step of commit resolution; never used for diffs
    Synthetic,
}

impl CommitStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitStrategy::AuthenticatedApi => "authenticated_api",
            CommitStrategy::PublicApi => "public_api",
            CommitStrategy::LocalGit => "local_git",
            CommitStrategy::Synthetic => "synthetic",
        }
    }
}

/// Resolves commits and changed files through an ordered strategy chain
#[derive(Clone, Default)]
pub struct ChangeDetector {
    chain: Vec<(CommitStrategy, Arc<dyn SourceHost>)>,
    /// Strategy moved ahead of the standard order
    preferred: Option<CommitStrategy>,
}

impl ChangeDetector {
    /// Detector with no host-backed strategies; only synthetic commits
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host for a strategy. The chain stays sorted by strategy
    /// order regardless of registration order. Synthetic needs no host and
    /// is ignored here.
    pub fn with_strategy(mut self, strategy: CommitStrategy, host: Arc<dyn SourceHost>) -> Self {
        if strategy == CommitStrategy::Synthetic {
            return self;
        }
        self.chain.retain(|(s, _)| *s != strategy);
        self.chain.push((strategy, host));
        self.sort();
        self
    }

    /// Consult `strategy` before every other one, e.g. local git when files
    /// are read from that checkout
    pub fn with_preferred(mut self, strategy: CommitStrategy) -> Self {
        self.preferred = Some(strategy);
        self.sort();
        self
    }

    fn sort(&mut self) {
        let preferred = self.preferred;
        self.chain.sort_by_key(|(s, _)| (Some(*s) != preferred, *s));
    }

    /// Build the standard chain: authenticated API when a token is configured,
    /// the public API, then local git when enabled and the probe succeeds.
    ///
    /// `checkout` is the directory files are read from. When it is a usable
    /// git repository, local git goes first so commits and diffs describe
    /// the same tree the loader reads.
    pub fn from_config(config: &Config, checkout: Option<&Path>) -> Result<Self, IngestError> {
        let mut detector = Self::new();

        if let Some(token) = config.source_host.token.as_deref().filter(|t| !t.is_empty()) {
            let client = GitHubClient::authenticated(&config.source_host, token)?;
            detector = detector.with_strategy(CommitStrategy::AuthenticatedApi, Arc::new(client));
        }

        let public = GitHubClient::public(&config.source_host)?;
        detector = detector.with_strategy(CommitStrategy::PublicApi, Arc::new(public));

        let local_path = checkout.or(config.change_detection.local_repo_path.as_deref());
        if let Some(path) = local_path {
            if local_git_available(config, path) {
                let local = LocalCheckout::new(path, config.loader.max_file_size);
                detector = detector.with_strategy(CommitStrategy::LocalGit, Arc::new(local));
                if checkout.is_some() {
                    detector = detector.with_preferred(CommitStrategy::LocalGit);
                }
            } else {
                debug!("Local git strategy unavailable for {}", path.display());
            }
        }

        Ok(detector)
    }

    /// Strategies evaluated by [`resolve_commit`](Self::resolve_commit), in order
    pub fn strategies(&self) -> Vec<CommitStrategy> {
        self.chain
            .iter()
            .map(|(s, _)| *s)
            .chain(std::iter::once(CommitStrategy::Synthetic))
            .collect()
    }

    /// Latest commit of `branch`. Never fails: when every host-backed
    /// strategy errors, a synthetic commit is generated.
    pub async fn resolve_commit(&self, repo_url: &str, branch: &str) -> CommitInfo {
        let (owner, repo) = match parse_repo_url(repo_url) {
            Ok(parts) => parts,
            Err(e) => {
                warn!("{}; skipping host lookups", e);
                return CommitInfo::synthetic(branch);
            }
        };

        for (strategy, host) in &self.chain {
            debug!(
                "Resolving {}/{}@{} via {} ({})",
                owner,
                repo,
                branch,
                strategy.as_str(),
                host.name()
            );
            match host.branch_head(&owner, &repo, branch).await {
                Ok(commit) => {
                    info!(
                        "Resolved {}/{}@{} to {} via {}",
                        owner,
                        repo,
                        branch,
                        commit.short_hash(),
                        strategy.as_str()
                    );
                    return commit;
                }
                Err(e) => warn!(
                    "Commit lookup via {} failed: {}",
                    strategy.as_str(),
                    e
                ),
            }
        }

        let commit = CommitInfo::synthetic(branch);
        warn!(
            "No strategy resolved {}/{}@{}; using synthetic commit {}",
            owner, repo, branch, commit.hash
        );
        commit
    }

    /// Files changed between two commits. Identical commits yield an empty
    /// set without consulting any host; total failure yields `FullReload`.
    pub async fn changed_files(&self, owner: &str, repo: &str, from: &str, to: &str) -> ChangeSet {
        if from == to {
            debug!("Commits are identical; nothing changed");
            return ChangeSet::Files(Vec::new());
        }
        if is_synthetic_hash(from) || is_synthetic_hash(to) {
            info!("Synthetic commit involved; falling back to full reload");
            return ChangeSet::FullReload;
        }

        for (strategy, host) in &self.chain {
            debug!(
                "Comparing {}..{} via {} ({})",
                from,
                to,
                strategy.as_str(),
                host.name()
            );
            match host.compare(owner, repo, from, to).await {
                Ok(changes) => {
                    info!(
                        "{} changed files between {} and {} via {}",
                        changes.len(),
                        from,
                        to,
                        strategy.as_str()
                    );
                    return ChangeSet::Files(changes);
                }
                Err(e) => warn!("Comparison via {} failed: {}", strategy.as_str(), e),
            }
        }

        warn!(
            "No strategy could compare {}..{}; falling back to full reload",
            from, to
        );
        ChangeSet::FullReload
    }
}

fn is_synthetic_hash(hash: &str) -> bool {
    hash.starts_with(CommitInfo::SYNTHETIC_PREFIX)
}

/// Capability probe for the local strategy; configuration can force it off
pub fn local_git_available(config: &Config, path: &Path) -> bool {
    config.change_detection.local_git && LocalGit::probe(path)
}

/// Split a repository URL into `(owner, repo)`.
///
/// Accepts `https://host/owner/repo(.git)`, `ssh://git@host/owner/repo`,
/// `git@host:owner/repo(.git)` and the bare `owner/repo` form.
pub fn parse_repo_url(url: &str) -> Result<(String, String), ValidationError> {
    let invalid = || ValidationError::InvalidRepoUrl(url.to_string());
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField("repo_url".to_string()));
    }

    let path = if let Some((_, rest)) = trimmed.split_once("://") {
        // drop the host (and any user info)
        rest.split_once('/').map(|(_, p)| p).ok_or_else(invalid)?
    } else if let Some((prefix, rest)) = trimmed.split_once(':')
        && prefix.contains('@')
    {
        rest
    } else {
        trimmed
    };

    let mut segments = path.trim_matches('/').split('/');
    let (Some(owner), Some(repo), None) = (segments.next(), segments.next(), segments.next())
    else {
        return Err(invalid());
    };
    let repo = repo.strip_suffix(".git").unwrap_or(repo);

    let valid = |s: &str| {
        !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    if !valid(owner) || !valid(repo) {
        return Err(invalid());
    }

    Ok((owner.to_string(), repo.to_string()))
}

#[cfg(test)]
mod tests;
