//! Batched, filtered document loading
//!
//! Files are assigned to the first batch of a priority-ordered plan that
//! wants them. Batches run one after another; inside a batch, fetches run
//! concurrently up to the batch's cap. A batch that times out is retried once
//! in degraded mode (root-level files only, one fetch at a time) and then
//! abandoned. Nothing here aborts the run.

pub mod batches;

pub use batches::{BatchSpec, CompiledPlan, GLOBAL_EXCLUDES, default_plan};

use crate::config::LoaderConfig;
use crate::error::SourceHostError;
use crate::indexer::file_type_for_path;
use crate::source_host::{SourceHost, TreeEntry};
use crate::types::{ChangeStatus, CommitInfo, Document, LoadScope};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How one batch went
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub tag: String,
    pub priority: u8,
    /// Files assigned to this batch
    pub attempted: usize,
    pub loaded: usize,
    /// Files skipped for size
    pub skipped: usize,
    /// Per-file and per-attempt failures
    pub errors: Vec<String>,
    /// The first attempt failed and the root-only retry ran
    pub degraded: bool,
    /// Both attempts failed; nothing was loaded
    pub abandoned: bool,
    pub duration_ms: u64,
}

/// Documents loaded by one run plus what happened to each batch
#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    pub documents: Vec<Document>,
    pub batches: Vec<BatchReport>,
    /// Paths removed between the compared commits; their chunks must be deleted
    pub removed: Vec<String>,
    /// Every path a full load found at the commit, when each batch listed the
    /// whole tree. `None` for incremental loads and degraded batches.
    pub listed: Option<BTreeSet<String>>,
}

impl LoadOutcome {
    pub fn failed_files(&self) -> usize {
        self.batches.iter().map(|b| b.errors.len()).sum()
    }
}

/// Repository coordinates shared by every document of a run
#[derive(Debug, Clone)]
struct Target<'a> {
    owner: &'a str,
    repo: &'a str,
    branch: &'a str,
    commit: &'a CommitInfo,
}

/// Result of a single batch attempt
struct Attempt {
    documents: Vec<Document>,
    /// Paths the attempt assigned to its batch, loaded or not
    listed: Vec<String>,
    attempted: usize,
    skipped: usize,
    errors: Vec<String>,
}

pub struct BatchedLoader {
    host: Arc<dyn SourceHost>,
    plan: CompiledPlan,
    max_file_size: usize,
    batch_timeout: Duration,
    inter_batch_delay: Duration,
}

impl BatchedLoader {
    pub fn new(host: Arc<dyn SourceHost>, config: &LoaderConfig) -> Self {
        Self {
            host,
            plan: CompiledPlan::new(default_plan(), &config.exclude_patterns),
            max_file_size: config.max_file_size,
            batch_timeout: Duration::from_secs(config.batch_timeout_secs),
            inter_batch_delay: Duration::from_millis(config.inter_batch_delay_ms),
        }
    }

    /// Replace the batch plan; the configured extra excludes are kept
    pub fn with_plan(mut self, plan: Vec<BatchSpec>, extra_excludes: &[String]) -> Self {
        self.plan = CompiledPlan::new(plan, extra_excludes);
        self
    }

    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = timeout;
        self
    }

    pub fn with_inter_batch_delay(mut self, delay: Duration) -> Self {
        self.inter_batch_delay = delay;
        self
    }

    /// Load the documents `scope` asks for at `commit`
    pub async fn load_repository(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        commit: &CommitInfo,
        scope: LoadScope,
    ) -> LoadOutcome {
        let target = Target {
            owner,
            repo,
            branch,
            commit,
        };
        let mut outcome = LoadOutcome::default();

        // Explicit candidates for incremental loads; None means list the tree
        let changed: Option<Vec<TreeEntry>> = match scope {
            LoadScope::Full => None,
            LoadScope::Changes(records) => {
                let mut fetch = Vec::new();
                for record in records {
                    match record.status {
                        ChangeStatus::Removed => outcome.removed.push(record.filename),
                        ChangeStatus::Added | ChangeStatus::Modified => {
                            fetch.push(TreeEntry::new(record.filename, None))
                        }
                    }
                }
                Some(fetch)
            }
        };

        info!(
            "Loading {}/{}@{} ({}) through {}",
            owner,
            repo,
            commit.short_hash(),
            if changed.is_some() { "changes" } else { "full" },
            self.host.name()
        );

        let full = changed.is_none();
        let mut listed = BTreeSet::new();
        let batch_count = self.plan.specs().len();
        for index in 0..batch_count {
            let report = self
                .run_batch(
                    index,
                    &target,
                    changed.as_deref(),
                    &mut outcome.documents,
                    &mut listed,
                )
                .await;
            outcome.batches.push(report);

            if index + 1 < batch_count && !self.inter_batch_delay.is_zero() {
                tokio::time::sleep(self.inter_batch_delay).await;
            }
        }

        if full && outcome.batches.iter().all(|b| !b.degraded) {
            outcome.listed = Some(listed);
        }

        info!(
            "Loaded {} documents in {} batches ({} file failures, {} removed)",
            outcome.documents.len(),
            outcome.batches.len(),
            outcome.failed_files(),
            outcome.removed.len()
        );
        outcome
    }

    async fn run_batch(
        &self,
        index: usize,
        target: &Target<'_>,
        changed: Option<&[TreeEntry]>,
        documents: &mut Vec<Document>,
        listed: &mut BTreeSet<String>,
    ) -> BatchReport {
        let spec = &self.plan.specs()[index];
        let started = Instant::now();
        let mut report = BatchReport {
            tag: spec.tag.clone(),
            priority: spec.priority,
            ..Default::default()
        };

        let first = self
            .timed_attempt(index, target, changed, true, spec.concurrency.max(1))
            .await;
        let attempt = match first {
            Ok(attempt) => Some(attempt),
            Err(reason) => {
                warn!(
                    "Batch '{}' failed ({}); retrying root-level files with concurrency 1",
                    spec.tag, reason
                );
                report.degraded = true;
                report.errors.push(reason);
                match self.timed_attempt(index, target, changed, false, 1).await {
                    Ok(attempt) => Some(attempt),
                    Err(reason) => {
                        warn!("Batch '{}' abandoned: {}", spec.tag, reason);
                        report.errors.push(reason);
                        report.abandoned = true;
                        None
                    }
                }
            }
        };

        if let Some(attempt) = attempt {
            report.attempted = attempt.attempted;
            report.skipped = attempt.skipped;
            report.loaded = attempt.documents.len();
            report.errors.extend(attempt.errors);
            documents.extend(attempt.documents);
            listed.extend(attempt.listed);
        }
        report.duration_ms = started.elapsed().as_millis() as u64;

        debug!(
            "Batch '{}': {} loaded, {} skipped, {} errors in {}ms",
            report.tag,
            report.loaded,
            report.skipped,
            report.errors.len(),
            report.duration_ms
        );
        report
    }

    async fn timed_attempt(
        &self,
        index: usize,
        target: &Target<'_>,
        changed: Option<&[TreeEntry]>,
        recursive: bool,
        concurrency: usize,
    ) -> Result<Attempt, String> {
        match tokio::time::timeout(
            self.batch_timeout,
            self.attempt(index, target, changed, recursive, concurrency),
        )
        .await
        {
            Ok(Ok(attempt)) => Ok(attempt),
            Ok(Err(e)) => Err(format!("listing failed: {}", e)),
            Err(_) => Err(format!(
                "timed out after {}ms",
                self.batch_timeout.as_millis()
            )),
        }
    }

    async fn attempt(
        &self,
        index: usize,
        target: &Target<'_>,
        changed: Option<&[TreeEntry]>,
        recursive: bool,
        concurrency: usize,
    ) -> Result<Attempt, SourceHostError> {
        let entries = match changed {
            Some(entries) => entries
                .iter()
                .filter(|e| recursive || !e.path.contains('/'))
                .cloned()
                .collect(),
            None => {
                self.host
                    .list_tree(target.owner, target.repo, &target.commit.hash, recursive)
                    .await?
            }
        };

        let mut skipped = 0;
        let mut selected = Vec::new();
        let mut listed = Vec::new();
        for entry in entries {
            if self.plan.assign(&entry.path) != Some(index) {
                continue;
            }
            listed.push(entry.path.clone());
            if entry.size.is_some_and(|size| size > self.max_file_size as u64) {
                debug!("Skipping large file: {}", entry.path);
                skipped += 1;
                continue;
            }
            selected.push(entry.path);
        }
        let attempted = selected.len() + skipped;

        let tag = &self.plan.specs()[index].tag;
        let results: Vec<(String, Result<String, SourceHostError>)> = stream::iter(selected)
            .map(|path| async move {
                let result = self
                    .host
                    .fetch_file(target.owner, target.repo, &target.commit.hash, &path)
                    .await;
                (path, result)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut documents = Vec::new();
        let mut errors = Vec::new();
        for (path, result) in results {
            match result {
                Ok(content) if content.len() > self.max_file_size => {
                    debug!("Skipping large file after fetch: {}", path);
                    skipped += 1;
                }
                Ok(content) => documents.push(Document {
                    file_type: file_type_for_path(&path),
                    source_path: path,
                    content,
                    repo_owner: target.owner.to_string(),
                    repo_name: target.repo.to_string(),
                    branch: target.branch.to_string(),
                    commit_info: target.commit.clone(),
                    batch: tag.clone(),
                }),
                Err(e) => {
                    debug!("Failed to fetch {}: {}", path, e);
                    errors.push(format!("{}: {}", path, e));
                }
            }
        }
        documents.sort_by(|a, b| a.source_path.cmp(&b.source_path));

        Ok(Attempt {
            documents,
            listed,
            attempted,
            skipped,
            errors,
        })
    }
}
