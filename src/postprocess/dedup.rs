//! Stage 3: exact and near-duplicate removal

use super::context::strip_header;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// SHA-256 of a chunk body, ignoring its file header
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(strip_header(content).trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Lowercased alphanumeric words of a chunk body
pub fn word_set(content: &str) -> HashSet<String> {
    strip_header(content)
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Jaccard similarity of two word sets; 0 when both are empty
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

/// Indices of the items to keep, in input order. An item is dropped when its
/// body hashes like a kept one or its word-level Jaccard similarity to any
/// kept item exceeds `threshold`.
pub fn retain_unique<'a, I>(contents: I, threshold: f32) -> Vec<usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut hashes = HashSet::new();
    let mut kept_words: Vec<HashSet<String>> = Vec::new();
    let mut kept = Vec::new();

    for (index, content) in contents.into_iter().enumerate() {
        if !hashes.insert(content_hash(content)) {
            tracing::debug!("Dropping exact duplicate chunk #{}", index);
            continue;
        }

        let words = word_set(content);
        if let Some(similarity) = kept_words
            .iter()
            .map(|other| jaccard(&words, other))
            .find(|s| *s > threshold)
        {
            tracing::debug!(
                "Dropping near-duplicate chunk #{} (similarity {:.3})",
                index,
                similarity
            );
            continue;
        }

        kept_words.push(words);
        kept.push(index);
    }
    kept
}
