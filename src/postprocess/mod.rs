//! Chunk post-processing
//!
//! Five stages run in a fixed order: context enrichment, quality filtering,
//! deduplication, synthetic questions and retrieval metadata. Filtering sees
//! enriched text, deduplication compares bodies without headers, and the
//! metadata stages only run on survivors.

pub mod context;
pub mod dedup;
pub mod questions;
pub mod quality;
pub mod retrieval;

use crate::config::PostprocessConfig;
use crate::terminology::TermCatalog;
use crate::types::{Chunk, EnrichedChunk};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Counts through the pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostprocessReport {
    pub input: usize,
    pub dropped_low_quality: usize,
    pub dropped_duplicates: usize,
    pub output: usize,
}

pub struct ChunkPostprocessor {
    config: PostprocessConfig,
    catalog: Arc<TermCatalog>,
}

impl ChunkPostprocessor {
    pub fn new(config: PostprocessConfig, catalog: Arc<TermCatalog>) -> Self {
        Self { config, catalog }
    }

    /// Run every stage over `chunks` (one or more documents, each in line order)
    pub fn process(&self, chunks: Vec<Chunk>) -> (Vec<EnrichedChunk>, PostprocessReport) {
        let mut report = PostprocessReport {
            input: chunks.len(),
            ..Default::default()
        };

        // 1. context
        let enriched = context::enrich(chunks, self.config.neighbor_context_lines);

        // 2. quality
        let threshold = self.config.quality_threshold;
        let scored: Vec<(Chunk, f32)> = enriched
            .into_iter()
            .filter_map(|chunk| {
                let score = quality::score(&chunk);
                if score < threshold {
                    debug!(
                        "Dropping low-quality chunk {}#{} (score {:.2})",
                        chunk.source_path, chunk.chunk_index, score
                    );
                    None
                } else {
                    Some((chunk, score))
                }
            })
            .collect();
        report.dropped_low_quality = report.input - scored.len();

        // 3. dedup
        let keep = dedup::retain_unique(
            scored.iter().map(|(c, _)| c.content.as_str()),
            self.config.similarity_threshold,
        );
        report.dropped_duplicates = scored.len() - keep.len();
        let mut keep = keep.into_iter().peekable();
        let survivors: Vec<(Chunk, f32)> = scored
            .into_iter()
            .enumerate()
            .filter_map(|(i, item)| {
                if keep.peek() == Some(&i) {
                    keep.next();
                    Some(item)
                } else {
                    None
                }
            })
            .collect();

        // 4 + 5. questions and retrieval metadata
        let output: Vec<EnrichedChunk> = survivors
            .into_iter()
            .map(|(chunk, score)| self.annotate(chunk, score))
            .collect();
        report.output = output.len();

        info!(
            "Postprocessed {} chunks: {} low quality, {} duplicates, {} kept",
            report.input, report.dropped_low_quality, report.dropped_duplicates, report.output
        );
        (output, report)
    }

    fn annotate(&self, chunk: Chunk, quality_score: f32) -> EnrichedChunk {
        let synthetic_questions = questions::generate(&chunk, self.config.max_questions);
        let keywords = retrieval::keywords(&chunk.content, self.config.keyword_count);
        let content_category = retrieval::content_category(&chunk);
        let complexity_level = retrieval::complexity_level(&chunk.content);
        let ul_terms = self
            .catalog
            .tags_for(context::strip_header(&chunk.content));

        EnrichedChunk {
            quality_score,
            keywords,
            content_category,
            complexity_level,
            synthetic_questions,
            ul_terms,
            ..EnrichedChunk::from_chunk(chunk)
        }
    }
}
