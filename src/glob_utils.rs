//! Glob pattern matching utilities for repository-relative paths

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// Compile patterns into one set. `*` never crosses a `/`, so `*.md` only
/// matches root-level files while `**/*.md` matches at any depth.
///
/// Invalid patterns are skipped with a warning.
///
/// # Examples
///
/// ```
/// use repo_ingest::glob_utils::{compile_set, matches_path};
///
/// let set = compile_set(&["*.md", "docs/**/*.md"]);
/// assert!(matches_path(&set, "README.md"));
/// assert!(matches_path(&set, "docs/guide/setup.md"));
/// assert!(!matches_path(&set, "src/notes.md"));
/// ```
pub fn compile_set<S: AsRef<str>>(patterns: &[S]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        match GlobBuilder::new(pattern).literal_separator(true).build() {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => {
                tracing::warn!("Skipping invalid glob pattern '{}': {}", pattern, e);
            }
        }
    }

    builder.build().unwrap_or_else(|e| {
        tracing::warn!("Failed to build glob set: {}", e);
        GlobSet::empty()
    })
}

/// Check a repository-relative path against a set, with or without a leading slash
pub fn matches_path(set: &GlobSet, path: &str) -> bool {
    set.is_match(path) || set.is_match(path.trim_start_matches('/'))
}
