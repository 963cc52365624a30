//! Stage 5: retrieval metadata (keywords, category, complexity)

use super::context::strip_header;
use crate::types::{Chunk, ComplexityLevel, ContentCategory, SemanticRole};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]{2,}").unwrap());

static CONTROL_FLOW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(if|else|elif|for|foreach|while|loop|match|switch|case|catch|except|rescue|when)\b|&&|\|\|")
        .unwrap()
});

static TEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#\[(tokio::)?test\]|@Test\b|\bdef test_|\bfunc Test[A-Z]|\b(describe|it|test)\(\s*['`]")
        .unwrap()
});

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(use |import |from \S+ import|#include|require\(|const \w+ = require\(|package |using )")
        .unwrap()
});

/// Common English words and language keywords that make poor keywords
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "has", "her", "was",
    "one", "our", "out", "this", "that", "with", "from", "have", "will", "your", "into", "then",
    "than", "them", "they", "when", "what", "which", "there", "their", "about", "would", "these",
    "other", "some", "also", "only", "more", "most", "such", "each", "file", "let", "mut", "pub",
    "use", "crate", "self", "super", "impl", "struct", "enum", "const", "static", "return", "true",
    "false", "null", "none", "nil", "def", "class", "function", "func", "var", "new", "else",
    "elif", "while", "break", "continue", "match", "import", "export", "async", "await", "public",
    "private", "protected", "void", "int", "string", "str", "bool", "usize", "u32", "u64", "i32",
    "i64", "f32", "f64", "type", "interface", "package", "try", "catch", "throw", "where",
];

/// Directory segments and file suffixes that mark test code
const TEST_PATH_MARKERS: &[&str] = &["tests/", "test/", "__tests__/", "spec/", "_test.", ".test.", ".spec.", "test_"];

/// The `count` most frequent non-stopword words, ties broken by first occurrence
pub fn keywords(content: &str, count: usize) -> Vec<String> {
    let body = strip_header(content);
    let mut frequency: HashMap<String, (usize, usize)> = HashMap::new();

    for (position, m) in WORD_RE.find_iter(body).enumerate() {
        let word = m.as_str().to_lowercase();
        if STOPWORDS.contains(&word.as_str()) {
            continue;
        }
        frequency
            .entry(word)
            .and_modify(|(n, _)| *n += 1)
            .or_insert((1, position));
    }

    let mut ranked: Vec<(String, usize, usize)> = frequency
        .into_iter()
        .map(|(word, (n, first))| (word, n, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.into_iter().take(count).map(|(w, _, _)| w).collect()
}

/// Coarse topic of a chunk
pub fn content_category(chunk: &Chunk) -> ContentCategory {
    let body = strip_header(&chunk.content);
    let path = chunk.source_path.to_lowercase();

    if TEST_PATH_MARKERS.iter().any(|m| path.contains(m)) || TEST_RE.is_match(body) {
        return ContentCategory::Test;
    }

    match chunk.language.as_str() {
        "Markdown" | "reStructuredText" | "AsciiDoc" | "Text" => return ContentCategory::Doc,
        "JSON" | "YAML" | "TOML" | "Config" | "Properties" | "XML" => {
            return ContentCategory::Config;
        }
        _ => {}
    }

    match chunk.semantic_role {
        SemanticRole::Function | SemanticRole::Method | SemanticRole::Route => {
            ContentCategory::Function
        }
        SemanticRole::Class | SemanticRole::Interface | SemanticRole::Type | SemanticRole::Module => {
            ContentCategory::Class
        }
        SemanticRole::ModuleLevel | SemanticRole::Block if mostly_imports(body) => {
            ContentCategory::Import
        }
        _ => ContentCategory::General,
    }
}

fn mostly_imports(body: &str) -> bool {
    let lines: Vec<&str> = body.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return false;
    }
    let imports = lines.iter().filter(|l| IMPORT_RE.is_match(l)).count();
    imports * 2 > lines.len()
}

/// Complexity from control-flow keyword count and maximum indentation depth
pub fn complexity_level(content: &str) -> ComplexityLevel {
    let body = strip_header(content);
    let control_flow = CONTROL_FLOW_RE.find_iter(body).count();
    let depth = max_indent_depth(body);

    if control_flow > 10 || depth >= 5 {
        ComplexityLevel::Complex
    } else if control_flow > 3 || depth >= 3 {
        ComplexityLevel::Moderate
    } else {
        ComplexityLevel::Simple
    }
}

/// Deepest indentation in levels, counting a tab or four spaces as one level.
/// The shallowest non-blank line is level zero.
fn max_indent_depth(body: &str) -> usize {
    let widths: Vec<usize> = body
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            l.chars()
                .take_while(|c| c.is_whitespace())
                .map(|c| if c == '\t' { 4 } else { 1 })
                .sum()
        })
        .collect();
    let Some(base) = widths.iter().min().copied() else {
        return 0;
    };
    widths.iter().map(|w| (w - base) / 4).max().unwrap_or(0)
}
