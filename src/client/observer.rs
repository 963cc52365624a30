//! Typed progress reporting for an ingestion run

use crate::loader::BatchReport;
use crate::postprocess::PostprocessReport;
use crate::storage::UpsertReport;
use crate::types::{CommitInfo, IngestMode};
use std::sync::Mutex;

/// Milestones of one run, emitted in order
#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    Started {
        namespace: String,
    },
    CommitResolved(CommitInfo),
    ChangesDetected {
        mode: IngestMode,
        /// Changed files, or `None` for a full load
        files: Option<usize>,
    },
    BatchLoaded(BatchReport),
    Chunked {
        documents: usize,
        chunks: usize,
    },
    Postprocessed(PostprocessReport),
    StaleRemoved {
        chunks: usize,
    },
    Stored(UpsertReport),
    Finished {
        mode: IngestMode,
        duration_ms: u64,
    },
}

/// Receives [`IngestEvent`]s; passed explicitly into an ingestion run
pub trait IngestObserver: Send + Sync {
    fn on_event(&self, event: &IngestEvent);
}

/// Ignores every event
pub struct NoopObserver;

impl IngestObserver for NoopObserver {
    fn on_event(&self, _event: &IngestEvent) {}
}

/// Logs each event through `tracing`
pub struct TracingObserver;

impl IngestObserver for TracingObserver {
    fn on_event(&self, event: &IngestEvent) {
        match event {
            IngestEvent::Started { namespace } => tracing::info!("Ingesting into '{}'", namespace),
            IngestEvent::CommitResolved(commit) => tracing::info!(
                "Commit {} ({}) via {}",
                commit.short_hash(),
                commit.subject,
                commit.source.as_str()
            ),
            IngestEvent::ChangesDetected { mode, files } => match files {
                Some(n) => tracing::info!("{:?} ingestion of {} changed files", mode, n),
                None => tracing::info!("{:?} ingestion", mode),
            },
            IngestEvent::BatchLoaded(batch) => tracing::info!(
                "Batch '{}': {}/{} loaded{}",
                batch.tag,
                batch.loaded,
                batch.attempted,
                if batch.abandoned {
                    " (abandoned)"
                } else if batch.degraded {
                    " (degraded)"
                } else {
                    ""
                }
            ),
            IngestEvent::Chunked { documents, chunks } => {
                tracing::info!("{} documents split into {} chunks", documents, chunks)
            }
            IngestEvent::Postprocessed(report) => tracing::info!(
                "{} of {} chunks kept after postprocessing",
                report.output,
                report.input
            ),
            IngestEvent::StaleRemoved { chunks } => {
                tracing::info!("Removed {} stale chunks", chunks)
            }
            IngestEvent::Stored(report) => tracing::info!(
                "Stored {} chunks ({} failed)",
                report.written,
                report.failed
            ),
            IngestEvent::Finished { mode, duration_ms } => {
                tracing::info!("{:?} ingestion finished in {}ms", mode, duration_ms)
            }
        }
    }
}

/// Keeps every event in memory
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<IngestEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<IngestEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl IngestObserver for RecordingObserver {
    fn on_event(&self, event: &IngestEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
