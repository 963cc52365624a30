use super::tokens::estimate_tokens;
use crate::types::{Chunk, Document, SemanticRole, SplittingMethod};

/// Line-window chunker used when no syntax tree is available
///
/// Windows never overlap and are never skipped, so every line of the
/// document lands in exactly one chunk.
pub struct LineChunker {
    lines_per_chunk: usize,
}

impl LineChunker {
    pub fn new(lines_per_chunk: usize) -> Self {
        Self {
            lines_per_chunk: lines_per_chunk.max(1),
        }
    }

    /// Chunk a document into consecutive fixed-size line windows
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        let lines: Vec<&str> = document.content.lines().collect();

        lines
            .chunks(self.lines_per_chunk)
            .enumerate()
            .map(|(chunk_idx, chunk_lines)| {
                let start_line = chunk_idx * self.lines_per_chunk + 1;
                let end_line = start_line + chunk_lines.len() - 1;
                let content = chunk_lines.join("\n");

                Chunk {
                    token_count: estimate_tokens(&content),
                    content,
                    start_line,
                    end_line,
                    semantic_role: SemanticRole::Block,
                    unit_name: format!("lines {}-{}", start_line, end_line),
                    parent_class_name: None,
                    splitting_method: SplittingMethod::LineBased,
                    source_path: document.source_path.clone(),
                    chunk_index: chunk_idx,
                    language: document.file_type.clone(),
                    is_async: false,
                    is_static: false,
                }
            })
            .collect()
    }
}

impl Default for LineChunker {
    fn default() -> Self {
        Self::new(50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CommitInfo;

    fn document(content: &str) -> Document {
        Document {
            source_path: "notes.txt".to_string(),
            content: content.to_string(),
            repo_owner: "acme".to_string(),
            repo_name: "widgets".to_string(),
            branch: "main".to_string(),
            commit_info: CommitInfo::synthetic("main"),
            file_type: "Text".to_string(),
            batch: "secondary".to_string(),
        }
    }

    #[test]
    fn test_fixed_windows() {
        let content = (1..=100).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        let chunks = LineChunker::new(10).split(&document(&content));

        assert_eq!(chunks.len(), 10);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 10);
        assert_eq!(chunks[9].start_line, 91);
        assert_eq!(chunks[9].end_line, 100);
        assert!(chunks.iter().all(|c| c.splitting_method == SplittingMethod::LineBased));
    }

    #[test]
    fn test_every_line_covered_once() {
        // blank stretches included
        let mut lines: Vec<String> = (1..=123).map(|i| format!("value {}", i)).collect();
        for line in lines.iter_mut().skip(50).take(60) {
            line.clear();
        }
        let content = lines.join("\n");
        let chunks = LineChunker::default().split(&document(&content));

        let mut covered = vec![0usize; 123];
        for chunk in &chunks {
            for line in chunk.start_line..=chunk.end_line {
                covered[line - 1] += 1;
            }
        }
        assert!(covered.iter().all(|&n| n == 1));
        assert_eq!(chunks.len(), 3);
        assert_eq!(
            chunks.iter().map(|c| c.chunk_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_empty_document() {
        assert!(LineChunker::default().split(&document("")).is_empty());
    }

    #[test]
    fn test_zero_lines_per_chunk_is_clamped() {
        let chunks = LineChunker::new(0).split(&document("a\nb"));
        assert_eq!(chunks.len(), 2);
    }
}
