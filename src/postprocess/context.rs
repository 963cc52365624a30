//! Stage 1: file headers and neighbor context

use crate::indexer::{estimate_tokens, is_markup};
use crate::types::Chunk;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap());

/// More than two shared identifiers make two chunks related
const MIN_SHARED_IDENTIFIERS: usize = 3;

const CODE_HEADER: &str = "// File: ";
const MARKUP_HEADER: &str = "# File: ";
const CONTEXT_MARKER: &str = "// Related context:";

/// Keywords across the supported languages; never significant identifiers
const KEYWORDS: &[&str] = &[
    "abstract", "and", "as", "async", "await", "bool", "break", "case", "catch", "char", "class",
    "const", "continue", "def", "default", "defer", "del", "do", "elif", "else", "enum", "except",
    "export", "extends", "extern", "false", "final", "finally", "float", "fn", "for", "foreach",
    "from", "func", "function", "go", "if", "impl", "implements", "import", "in", "int",
    "interface", "is", "let", "loop", "match", "mod", "module", "mut", "namespace", "new", "nil",
    "none", "not", "null", "object", "or", "package", "pass", "private", "protected", "pub",
    "public", "raise", "readonly", "ref", "return", "self", "static", "str", "string", "struct",
    "super", "switch", "this", "throw", "throws", "trait", "true", "try", "type", "typeof", "use",
    "usize", "var", "void", "where", "while", "with", "yield",
];

/// Identifiers of at least three characters that are not keywords
pub fn significant_identifiers(text: &str) -> HashSet<String> {
    IDENT_RE
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|ident| ident.len() >= 3)
        .filter(|ident| !KEYWORDS.contains(&ident.to_ascii_lowercase().as_str()))
        .map(str::to_string)
        .collect()
}

/// The header line prepended to a chunk of `path`
pub fn header_for(path: &str, language: &str) -> String {
    let prefix = if is_markup(language) {
        MARKUP_HEADER
    } else {
        CODE_HEADER
    };
    format!("{}{} ({})", prefix, path, language)
}

/// Chunk text without the file header, for scoring and comparison
pub fn strip_header(content: &str) -> &str {
    let starts_with_header =
        content.starts_with(CODE_HEADER) || content.starts_with(MARKUP_HEADER);
    if !starts_with_header {
        return content;
    }
    match content.split_once('\n') {
        Some((_, body)) => body,
        None => "",
    }
}

/// Prepend file headers and, for code, splice a few lines from the next
/// chunk of the same document when the two are related. Relatedness is
/// judged on the original texts, before any header is added.
pub fn enrich(chunks: Vec<Chunk>, neighbor_lines: usize) -> Vec<Chunk> {
    let originals: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let paths: Vec<String> = chunks.iter().map(|c| c.source_path.clone()).collect();

    let mut enriched = Vec::with_capacity(chunks.len());
    for (i, mut chunk) in chunks.into_iter().enumerate() {
        let mut content = header_for(&chunk.source_path, &chunk.language);
        content.push('\n');
        content.push_str(&originals[i]);

        let next = i + 1;
        let has_code_neighbor = neighbor_lines > 0
            && !is_markup(&chunk.language)
            && next < originals.len()
            && paths[next] == chunk.source_path;
        if has_code_neighbor {
            let own = significant_identifiers(&originals[i]);
            let theirs = significant_identifiers(&originals[next]);
            let shared = own.intersection(&theirs).count();

            if shared >= MIN_SHARED_IDENTIFIERS {
                let lines: Vec<&str> = originals[next]
                    .lines()
                    .filter(|l| !l.trim().is_empty())
                    .take(neighbor_lines)
                    .collect();
                if !lines.is_empty() {
                    content.push('\n');
                    content.push_str(CONTEXT_MARKER);
                    for line in lines {
                        content.push('\n');
                        content.push_str(line);
                    }
                }
            }
        }

        chunk.token_count = estimate_tokens(&content);
        chunk.content = content;
        enriched.push(chunk);
    }
    enriched
}
