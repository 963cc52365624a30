//! Progressive trimming steps, applied in order until a record fits

use super::{MetadataMap, TERM_SEPARATOR, tail_bytes, truncate_bytes};
use serde_json::Value;

/// One reduction of an oversized record
#[derive(Clone, Copy)]
pub struct TrimStep {
    pub name: &'static str,
    /// Whether the step would change anything
    pub applies: fn(&MetadataMap) -> bool,
    pub reduce: fn(&mut MetadataMap),
}

impl std::fmt::Debug for TrimStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrimStep").field("name", &self.name).finish()
    }
}

const TIMESTAMP_FIELDS: &[&str] = &["postprocessed_at", "commit_date"];
const TERM_FIELDS: &[&str] = &["keywords", "synthetic_questions", "ul_terms"];
const SCORE_FIELDS: &[&str] = &["quality_score", "complexity_level"];
const PATH_FIELDS: &[&str] = &["source", "file_path"];
const LEGACY_FIELDS: &[&str] = &["file_path", "repo", "commit_subject", "commit_author"];

fn has_any(map: &MetadataMap, fields: &[&str]) -> bool {
    fields.iter().any(|f| map.contains_key(*f))
}

fn remove_all(map: &mut MetadataMap, fields: &[&str]) {
    for field in fields {
        map.remove(*field);
    }
}

fn any_longer(map: &MetadataMap, fields: &[&str], max_bytes: usize) -> bool {
    fields
        .iter()
        .filter_map(|f| map.get(*f).and_then(Value::as_str))
        .any(|s| s.len() > max_bytes)
}

/// Cut each joined term list to whole terms within `max_bytes`
fn cap_terms(map: &mut MetadataMap, max_bytes: usize) {
    for field in TERM_FIELDS {
        let Some(current) = map.get(*field).and_then(Value::as_str) else {
            continue;
        };
        if current.len() <= max_bytes {
            continue;
        }
        let cut = truncate_bytes(current, max_bytes);
        // drop a partial trailing term when at least one whole term remains
        let capped = match cut.rfind(TERM_SEPARATOR) {
            Some(pos) if pos > 0 => &cut[..pos],
            _ => cut,
        };
        let capped = capped.to_string();
        map.insert((*field).to_string(), capped.into());
    }
}

fn shrink_paths(map: &mut MetadataMap, max_bytes: usize) {
    for field in PATH_FIELDS {
        if let Some(current) = map.get(*field).and_then(Value::as_str)
            && current.len() > max_bytes
        {
            let tail = tail_bytes(current, max_bytes).to_string();
            map.insert((*field).to_string(), tail.into());
        }
    }
}

/// The trimming plan, cheapest information loss first
pub fn trim_steps() -> Vec<TrimStep> {
    vec![
        TrimStep {
            name: "drop_timestamps",
            applies: |m| has_any(m, TIMESTAMP_FIELDS),
            reduce: |m| remove_all(m, TIMESTAMP_FIELDS),
        },
        TrimStep {
            name: "cap_terms_500",
            applies: |m| any_longer(m, TERM_FIELDS, 500),
            reduce: |m| cap_terms(m, 500),
        },
        TrimStep {
            name: "cap_terms_200",
            applies: |m| any_longer(m, TERM_FIELDS, 200),
            reduce: |m| cap_terms(m, 200),
        },
        TrimStep {
            name: "cap_terms_100",
            applies: |m| any_longer(m, TERM_FIELDS, 100),
            reduce: |m| cap_terms(m, 100),
        },
        TrimStep {
            name: "cap_terms_50",
            applies: |m| any_longer(m, TERM_FIELDS, 50),
            reduce: |m| cap_terms(m, 50),
        },
        TrimStep {
            name: "drop_scores",
            applies: |m| has_any(m, SCORE_FIELDS),
            reduce: |m| remove_all(m, SCORE_FIELDS),
        },
        TrimStep {
            name: "shrink_paths_200",
            applies: |m| any_longer(m, PATH_FIELDS, 200),
            reduce: |m| shrink_paths(m, 200),
        },
        TrimStep {
            name: "shrink_paths_100",
            applies: |m| any_longer(m, PATH_FIELDS, 100),
            reduce: |m| shrink_paths(m, 100),
        },
        TrimStep {
            name: "drop_legacy",
            applies: |m| has_any(m, LEGACY_FIELDS),
            reduce: |m| remove_all(m, LEGACY_FIELDS),
        },
        TrimStep {
            name: "drop_questions",
            applies: |m| m.contains_key("synthetic_questions"),
            reduce: |m| {
                m.remove("synthetic_questions");
            },
        },
        TrimStep {
            name: "drop_terms",
            applies: |m| has_any(m, &["keywords", "ul_terms"]),
            reduce: |m| remove_all(m, &["keywords", "ul_terms"]),
        },
    ]
}
