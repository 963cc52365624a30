//! Stage 2: heuristic quality scoring

use super::context::strip_header;
use crate::indexer::{comment_prefixes, is_markup};
use crate::types::Chunk;
use regex::Regex;
use std::sync::LazyLock;

const MIN_SUBSTANCE_CHARS: usize = 50;
const SHORT_PENALTY: f32 = 0.3;
const COMMENT_RATIO_LIMIT: f32 = 0.5;
const COMMENT_PENALTY: f32 = 0.25;
const WHITESPACE_RATIO_LIMIT: f32 = 0.4;
const WHITESPACE_PENALTY: f32 = 0.2;
const STRUCTURE_BONUS: f32 = 0.1;
const DOC_BONUS: f32 = 0.1;

static STRUCTURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(fn|func|function|def|class|impl|struct|enum|trait|interface|return|module|namespace|type)\b",
    )
    .unwrap()
});

static MARKDOWN_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+\S").unwrap());

/// Score in [0, 1]; higher is more useful for retrieval
pub fn score(chunk: &Chunk) -> f32 {
    let body = strip_header(&chunk.content);
    let mut score = 1.0_f32;

    let substance = body.chars().filter(|c| !c.is_whitespace()).count();
    if substance < MIN_SUBSTANCE_CHARS {
        score -= SHORT_PENALTY;
    }

    if comment_ratio(body, &chunk.language) > COMMENT_RATIO_LIMIT {
        score -= COMMENT_PENALTY;
    }

    let total = body.chars().count();
    if total > 0 {
        let whitespace = body.chars().filter(|c| c.is_whitespace()).count();
        if whitespace as f32 / total as f32 > WHITESPACE_RATIO_LIMIT {
            score -= WHITESPACE_PENALTY;
        }
    }

    if !is_markup(&chunk.language) && STRUCTURE_RE.is_match(body) {
        score += STRUCTURE_BONUS;
    }
    if has_doc_markers(body, &chunk.language) {
        score += DOC_BONUS;
    }

    score.clamp(0.0, 1.0)
}

/// Share of non-blank lines that are comments
fn comment_ratio(body: &str, language: &str) -> f32 {
    if is_markup(language) && language != "YAML" && language != "TOML" {
        return 0.0;
    }
    let prefixes = comment_prefixes(language);

    let mut lines = 0;
    let mut comments = 0;
    for line in body.lines().map(str::trim_start) {
        if line.is_empty() {
            continue;
        }
        lines += 1;
        if prefixes.iter().any(|p| line.starts_with(p)) {
            comments += 1;
        }
    }

    if lines == 0 {
        0.0
    } else {
        comments as f32 / lines as f32
    }
}

fn has_doc_markers(body: &str, language: &str) -> bool {
    if language == "Markdown" {
        return MARKDOWN_HEADING_RE.is_match(body);
    }
    body.contains("///")
        || body.contains("//!")
        || body.contains("/**")
        || body.contains("\"\"\"")
        || body.contains("'''")
}
