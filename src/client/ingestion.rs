//! The ingestion run: detect, load, chunk, postprocess, govern, store
//!
//! Only validation and lock contention end a run early with an error. Every
//! other failure lands in the stage summaries of the response.

use super::namespace_lock::NamespaceLock;
use super::observer::{IngestEvent, IngestObserver};
use super::{IngestClient, Target};
use crate::change_detector::ChangeDetector;
use crate::error::{IngestError, ValidationError};
use crate::loader::BatchedLoader;
use crate::metadata::{GovernContext, govern};
use crate::source_host::SourceHost;
use crate::storage::{Namespace, StoredChunk};
use crate::types::{
    ChangeSet, Chunk, CommitInfo, Document, IngestMode, IngestRequest, IngestResponse, LoadScope,
    StageSummary,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// What the change detector decided for this run
struct Plan {
    mode: IngestMode,
    scope: LoadScope,
}

pub(crate) async fn run(
    client: &IngestClient,
    request: &IngestRequest,
    target: Target,
    detector: ChangeDetector,
    host: Arc<dyn SourceHost>,
    observer: &dyn IngestObserver,
) -> Result<IngestResponse, IngestError> {
    let started = Instant::now();
    let namespace = Namespace::new(&target.owner, &target.repo, &request.branch);

    let lock_dir = client.lock_dir.clone();
    let lock_name = namespace.to_string();
    let _lock = tokio::task::spawn_blocking(move || NamespaceLock::try_acquire(&lock_dir, &lock_name))
        .await
        .map_err(|e| IngestError::other(format!("Lock task failed: {}", e)))??
        .ok_or_else(|| ValidationError::NamespaceBusy(namespace.to_string()))?;

    observer.on_event(&IngestEvent::Started {
        namespace: namespace.to_string(),
    });
    info!(
        "Ingesting {}/{}@{} into '{}'",
        target.owner, target.repo, request.branch, namespace
    );

    let commit = detector.resolve_commit(&request.repo_url, &request.branch).await;
    observer.on_event(&IngestEvent::CommitResolved(commit.clone()));

    let mut stages = Vec::new();
    let plan = detect_changes(&detector, request, &target, &commit, &mut stages).await;
    observer.on_event(&IngestEvent::ChangesDetected {
        mode: plan.mode,
        files: match &plan.scope {
            LoadScope::Full => None,
            LoadScope::Changes(records) => Some(records.len()),
        },
    });

    let mut response = IngestResponse {
        namespace: namespace.to_string(),
        commit: commit.clone(),
        mode: plan.mode,
        documents_loaded: 0,
        chunks_created: 0,
        chunks_stored: 0,
        chunks_deleted: 0,
        duration_ms: 0,
        stages: Vec::new(),
    };

    if plan.mode == IngestMode::Skipped {
        info!("'{}' is already at {}; nothing to do", namespace, commit.short_hash());
        response.stages = stages;
        return Ok(finish(response, started, observer));
    }

    // load
    let loader = BatchedLoader::new(host, &client.config.loader);
    let outcome = loader
        .load_repository(&target.owner, &target.repo, &request.branch, &commit, plan.scope)
        .await;
    let mut load = StageSummary::new("load");
    load.succeeded = outcome.documents.len();
    for batch in &outcome.batches {
        for error in &batch.errors {
            load.record_error(format!("{}: {}", batch.tag, error));
        }
        observer.on_event(&IngestEvent::BatchLoaded(batch.clone()));
    }
    stages.push(load);
    response.documents_loaded = outcome.documents.len();

    let documents = outcome.documents;
    let batch_of: HashMap<String, String> = documents
        .iter()
        .map(|d| (d.source_path.clone(), d.batch.clone()))
        .collect();

    // stale chunks: removed files plus every file about to be rewritten.
    // Files that failed to load keep their previous chunks.
    let mut stale: BTreeSet<String> = outcome
        .removed
        .iter()
        .cloned()
        .chain(documents.iter().map(|d| d.source_path.clone()))
        .collect();
    let mut delete_stage = StageSummary::new("delete");

    // a complete full listing also retires indexed files no longer in the tree
    if let Some(listed) = &outcome.listed {
        match client.storage.index().sources(namespace.as_str()).await {
            Ok(indexed) => {
                let vanished: Vec<String> = indexed
                    .into_iter()
                    .filter(|path| !listed.contains(path))
                    .collect();
                if !vanished.is_empty() {
                    info!(
                        "{} indexed files are gone from {}",
                        vanished.len(),
                        commit.short_hash()
                    );
                }
                stale.extend(vanished);
            }
            Err(e) => delete_stage.record_error(format!("listing indexed files: {:#}", e)),
        }
    }
    let stale: Vec<String> = stale.into_iter().collect();

    // chunk
    let mut chunk_stage = StageSummary::new("chunk");
    let chunks = chunk_documents(client, documents, &mut chunk_stage).await;
    response.chunks_created = chunks.len();
    observer.on_event(&IngestEvent::Chunked {
        documents: response.documents_loaded,
        chunks: chunks.len(),
    });
    stages.push(chunk_stage);

    // postprocess
    let mut post_stage = StageSummary::new("postprocess");
    let postprocessor = Arc::clone(&client.postprocessor);
    let enriched = match tokio::task::spawn_blocking(move || postprocessor.process(chunks)).await {
        Ok((enriched, report)) => {
            post_stage.succeeded = report.output;
            observer.on_event(&IngestEvent::Postprocessed(report));
            enriched
        }
        Err(e) => {
            post_stage.record_error(format!("postprocessing task failed: {}", e));
            Vec::new()
        }
    };
    stages.push(post_stage);

    // govern
    let mut meta_stage = StageSummary::new("metadata");
    let budget = client.config.metadata.byte_budget;
    let mut emergencies = 0;
    let stored: Vec<StoredChunk> = enriched
        .iter()
        .map(|chunk| {
            let ctx = GovernContext {
                namespace: namespace.to_string(),
                repo_owner: target.owner.clone(),
                repo_name: target.repo.clone(),
                branch: request.branch.clone(),
                commit: commit.clone(),
                batch: batch_of.get(&chunk.chunk.source_path).cloned(),
            };
            let metadata = govern(chunk, &ctx, budget);
            if metadata.is_emergency() {
                emergencies += 1;
            }
            StoredChunk::new(chunk, metadata)
        })
        .collect();
    meta_stage.succeeded = stored.len();
    if emergencies > 0 {
        warn!("{} chunks fell back to emergency metadata", emergencies);
    }
    stages.push(meta_stage);

    // remove stale chunks before writing replacements
    if !stale.is_empty() {
        let report = client.storage.delete_sources(&namespace, &stale).await;
        delete_stage.succeeded = stale.len() - report.failed.len();
        for error in report.errors {
            delete_stage.record_error(error);
        }
        response.chunks_deleted = report.deleted;
        observer.on_event(&IngestEvent::StaleRemoved {
            chunks: report.deleted,
        });
    }
    stages.push(delete_stage);

    // store
    let mut store_stage = StageSummary::new("store");
    let report = client.storage.upsert(&namespace, stored).await;
    store_stage.succeeded = report.written;
    store_stage.failed = report.failed;
    store_stage.errors = report.errors.clone();
    response.chunks_stored = report.written;
    observer.on_event(&IngestEvent::Stored(report));
    stages.push(store_stage);

    response.stages = stages;
    Ok(finish(response, started, observer))
}

fn finish(
    mut response: IngestResponse,
    started: Instant,
    observer: &dyn IngestObserver,
) -> IngestResponse {
    response.duration_ms = started.elapsed().as_millis() as u64;
    observer.on_event(&IngestEvent::Finished {
        mode: response.mode,
        duration_ms: response.duration_ms,
    });
    info!(
        "Ingestion of '{}' done: {} documents, {} chunks stored, {} deleted, {} errors in {}ms",
        response.namespace,
        response.documents_loaded,
        response.chunks_stored,
        response.chunks_deleted,
        response.errors().len(),
        response.duration_ms
    );
    response
}

/// Full when there is no previous commit or the comparison failed; skipped when
/// nothing changed; incremental otherwise.
async fn detect_changes(
    detector: &ChangeDetector,
    request: &IngestRequest,
    target: &Target,
    commit: &CommitInfo,
    stages: &mut Vec<StageSummary>,
) -> Plan {
    let mut stage = StageSummary::new("change_detection");

    let plan = match request.since_commit.as_deref() {
        None => Plan {
            mode: IngestMode::Full,
            scope: LoadScope::Full,
        },
        Some(since) => {
            match detector
                .changed_files(&target.owner, &target.repo, since, &commit.hash)
                .await
            {
                ChangeSet::Files(records) if records.is_empty() => Plan {
                    mode: IngestMode::Skipped,
                    scope: LoadScope::Changes(Vec::new()),
                },
                ChangeSet::Files(records) => {
                    stage.succeeded = records.len();
                    Plan {
                        mode: IngestMode::Incremental,
                        scope: LoadScope::Changes(records),
                    }
                }
                ChangeSet::FullReload => {
                    stage.record_error(format!(
                        "could not compare {}..{}; reloading everything",
                        since, commit.hash
                    ));
                    Plan {
                        mode: IngestMode::Full,
                        scope: LoadScope::Full,
                    }
                }
            }
        }
    };

    stages.push(stage);
    plan
}

/// Split documents on the blocking pool; chunk order follows document order
async fn chunk_documents(
    client: &IngestClient,
    documents: Vec<Document>,
    stage: &mut StageSummary,
) -> Vec<Chunk> {
    let chunker = Arc::clone(&client.chunker);
    let paths: Vec<String> = documents.iter().map(|d| d.source_path.clone()).collect();

    match tokio::task::spawn_blocking(move || chunker.split_all(&documents)).await {
        Ok(per_document) => {
            let mut chunks = Vec::new();
            for (path, document_chunks) in paths.iter().zip(per_document) {
                if document_chunks.is_empty() {
                    tracing::debug!("{} produced no chunks", path);
                } else {
                    stage.succeeded += 1;
                }
                chunks.extend(document_chunks);
            }
            chunks
        }
        Err(e) => {
            stage.record_error(format!("chunking task failed: {}", e));
            Vec::new()
        }
    }
}
