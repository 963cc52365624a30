//! # repo-ingest - incremental repository ingestion for code-aware retrieval
//!
//! Detects what changed in a repository since the last ingestion, loads the
//! affected files in prioritized batches, splits them into AST-aware chunks,
//! enriches and bounds their metadata, and writes them into a vector index
//! under a per-repository, per-branch namespace.
//!
//! ## Pipeline
//!
//! ```text
//! change_detector ──► loader ──► indexer ──► postprocess ──► metadata ──► storage
//!  (API / git /        (batched,   (tree-sitter   (context, quality,  (byte-budget   (rate-limited
//!   synthetic)          timed)      + fallback)    dedup, questions)   governance)    upsert)
//! ```
//!
//! ## Modules
//!
//! - [`client`]: the orchestrator ([`IngestClient`]) and progress events
//! - [`change_detector`]: commit resolution and changed-file detection
//! - [`source_host`]: the GitHub API client and local checkouts
//! - [`loader`]: batched, filtered document loading
//! - [`indexer`]: semantic and line-based chunking
//! - [`postprocess`]: chunk enrichment, filtering and deduplication
//! - [`metadata`]: metadata flattening and size governance
//! - [`storage`]: namespaces, chunk ids and rate-limited writes
//! - [`vector_db`]: vector index backends (LanceDB and in-memory)
//! - [`embedding`]: embedding providers (FastEmbed and feature hashing)
//! - [`terminology`]: domain-term catalogs
//! - [`config`]: configuration with environment overrides
//!
//! ## Usage Example
//!
//! ```no_run
//! use repo_ingest::{Config, IngestClient, IngestRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = IngestClient::with_config(Config::new()?).await?;
//!     let response = client
//!         .ingest(IngestRequest {
//!             repo_url: "acme/widgets".to_string(),
//!             branch: "main".to_string(),
//!             since_commit: Some("4f2a9c1".to_string()),
//!             local_path: None,
//!         })
//!         .await?;
//!     println!("{:?}: {} chunks stored", response.mode, response.chunks_stored);
//!     Ok(())
//! }
//! ```

/// Commit resolution and change detection with ordered fallbacks
pub mod change_detector;

/// Ingestion orchestrator
pub mod client;

/// Configuration management with environment variable overrides
pub mod config;

/// Embedding providers
pub mod embedding;

/// Error types and utilities
pub mod error;

/// Local git inspection
pub mod git;

/// Glob pattern matching shared by the loader
pub mod glob_utils;

/// AST parsing and chunking
pub mod indexer;

/// Batched document loading
pub mod loader;

/// Metadata size governance
pub mod metadata;

/// Platform directories
pub mod paths;

/// Chunk post-processing
pub mod postprocess;

/// Where repository files come from
pub mod source_host;

/// Namespaced, rate-limited vector writes
pub mod storage;

/// Domain terminology catalogs
pub mod terminology;

/// Data model and request/response types
pub mod types;

/// Vector index abstraction
pub mod vector_db;

#[cfg(test)]
mod testutil;

pub use client::{IngestClient, IngestEvent, IngestObserver};
pub use config::Config;
pub use error::IngestError;
pub use types::{IngestMode, IngestRequest, IngestResponse};
