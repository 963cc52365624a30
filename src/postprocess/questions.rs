//! Stage 4: synthetic questions a chunk can answer

use super::context::strip_header;
use crate::types::{Chunk, SemanticRole};
use regex::Regex;
use std::sync::LazyLock;

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+(.+?)\s*#*\s*$").unwrap());
static INSTALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(install|installation|setup|getting started)\b").unwrap());
static USAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(usage|example|examples|quickstart)\b").unwrap());
static CONFIG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(config|configure|configuration|settings|environment variables?)\b")
        .unwrap()
});

/// Up to `max` distinct questions for `chunk`
pub fn generate(chunk: &Chunk, max: usize) -> Vec<String> {
    let mut questions: Vec<String> = Vec::new();
    let mut push = |question: String| {
        if !questions.contains(&question) {
            questions.push(question);
        }
    };

    for name in unit_names(chunk) {
        let qualified = match &chunk.parent_class_name {
            Some(parent) if chunk.semantic_role == SemanticRole::Method => {
                format!("{}.{}", parent, name)
            }
            _ => name.to_string(),
        };
        match chunk.semantic_role {
            SemanticRole::Function | SemanticRole::Method => {
                push(format!("What does `{}` do?", qualified));
                push(format!("How is `{}` used?", qualified));
            }
            SemanticRole::Class | SemanticRole::Interface | SemanticRole::Type => {
                push(format!(
                    "What is the purpose of the `{}` {}?",
                    name, chunk.semantic_role
                ));
            }
            SemanticRole::Module => push(format!("What does the `{}` module contain?", name)),
            SemanticRole::Route => push(format!("How does the `{}` endpoint work?", name)),
            SemanticRole::ModuleLevel | SemanticRole::Block => {}
        }
    }

    let body = strip_header(&chunk.content);
    if chunk.language == "Markdown" {
        for caps in HEADING_RE.captures_iter(body) {
            push(format!(
                "What does the documentation say about {}?",
                caps[1].trim()
            ));
        }
    }

    if INSTALL_RE.is_match(body) {
        push("How do I install or set up this project?".to_string());
    }
    if USAGE_RE.is_match(body) {
        push("How is this used?".to_string());
    }
    if CONFIG_RE.is_match(body) {
        push("How is this configured?".to_string());
    }

    questions.truncate(max);
    questions
}

/// Individual unit names; merged chunks carry a comma-separated list
fn unit_names(chunk: &Chunk) -> impl Iterator<Item = &str> {
    chunk
        .unit_name
        .split(", ")
        .map(str::trim)
        .filter(|n| !n.is_empty() && *n != "anonymous" && *n != "module_level")
        .filter(|n| !n.starts_with("lines "))
}
