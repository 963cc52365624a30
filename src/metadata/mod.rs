//! Metadata governance for a byte-constrained index
//!
//! [`govern`] turns an enriched chunk into a flat map of primitives whose
//! JSON serialization never exceeds the byte budget. Oversized records are
//! cut down by an ordered list of [`TrimStep`]s; when that is not enough a
//! fixed-shape emergency record takes over.

mod trim;

pub use trim::{TrimStep, trim_steps};

use crate::types::{CommitInfo, EnrichedChunk};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Flat metadata map: every value is a string, number or bool
pub type MetadataMap = Map<String, Value>;

/// Term lists are joined with this separator
pub const TERM_SEPARATOR: &str = "|";

/// Cap on a joined term list before any trimming
pub const TERM_LIST_CAP: usize = 1000;

/// Fields that stay even when empty or zero
const IDENTITY_FIELDS: &[&str] = &[
    "source",
    "namespace",
    "chunk_index",
    "file_type",
    "start_line",
    "end_line",
    "semantic_role",
    "splitting_method",
];

/// String fields of the emergency record, in serialization order
const EMERGENCY_FIELDS: &[&str] = &["file_type", "namespace", "path", "source", "terms"];

/// Repository-level values shared by every chunk of a document
#[derive(Debug, Clone)]
pub struct GovernContext {
    pub namespace: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub branch: String,
    pub commit: CommitInfo,
    /// Loader batch of the originating document
    pub batch: Option<String>,
}

impl GovernContext {
    pub fn repo(&self) -> String {
        format!("{}/{}", self.repo_owner, self.repo_name)
    }
}

/// Metadata guaranteed to fit its byte budget
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct GovernedMetadata {
    fields: MetadataMap,
    #[serde(skip)]
    applied_steps: Vec<&'static str>,
}

impl GovernedMetadata {
    pub fn fields(&self) -> &MetadataMap {
        &self.fields
    }

    pub fn into_fields(self) -> MetadataMap {
        self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Names of the trim steps that ran, in order
    pub fn applied_steps(&self) -> &[&'static str] {
        &self.applied_steps
    }

    pub fn is_emergency(&self) -> bool {
        self.applied_steps.last() == Some(&"emergency")
    }

    pub fn byte_len(&self) -> usize {
        byte_len(&self.fields)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.fields).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Serialized JSON size of a map in bytes
pub fn byte_len(map: &MetadataMap) -> usize {
    serde_json::to_vec(map).map(|v| v.len()).unwrap_or(usize::MAX)
}

/// Longest prefix of `s` within `max_bytes`, cut on a char boundary
pub fn truncate_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Longest suffix of `s` within `max_bytes`, cut on a char boundary
pub fn tail_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut start = s.len() - max_bytes;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

fn join_terms(terms: &[String]) -> String {
    let joined = terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(TERM_SEPARATOR);
    truncate_bytes(&joined, TERM_LIST_CAP).to_string()
}

/// Project an enriched chunk and its context into primitives. Empty strings,
/// zero numbers and false flags are dropped unless the field is an identity field.
pub fn flatten(chunk: &EnrichedChunk, ctx: &GovernContext) -> MetadataMap {
    let c = &chunk.chunk;
    let mut map = MetadataMap::new();

    map.insert("source".into(), c.source_path.clone().into());
    map.insert("namespace".into(), ctx.namespace.clone().into());
    map.insert("chunk_index".into(), c.chunk_index.into());
    map.insert("file_type".into(), c.language.clone().into());
    map.insert("start_line".into(), c.start_line.into());
    map.insert("end_line".into(), c.end_line.into());
    map.insert("semantic_role".into(), c.semantic_role.as_str().into());
    map.insert("splitting_method".into(), c.splitting_method.as_str().into());

    map.insert("unit_name".into(), c.unit_name.clone().into());
    if let Some(parent) = &c.parent_class_name {
        map.insert("parent_class_name".into(), parent.clone().into());
    }
    map.insert("is_async".into(), c.is_async.into());
    map.insert("is_static".into(), c.is_static.into());
    map.insert("token_count".into(), c.token_count.into());

    map.insert("quality_score".into(), f64::from(chunk.quality_score).into());
    map.insert("content_category".into(), chunk.content_category.as_str().into());
    map.insert("complexity_level".into(), chunk.complexity_level.as_str().into());
    map.insert("keywords".into(), join_terms(&chunk.keywords).into());
    map.insert(
        "synthetic_questions".into(),
        join_terms(&chunk.synthetic_questions).into(),
    );
    map.insert("ul_terms".into(), join_terms(&chunk.ul_terms).into());
    map.insert("postprocessed_at".into(), chunk.postprocessed_at.into());

    map.insert("repo_owner".into(), ctx.repo_owner.clone().into());
    map.insert("repo_name".into(), ctx.repo_name.clone().into());
    map.insert("branch".into(), ctx.branch.clone().into());
    map.insert("commit_hash".into(), ctx.commit.hash.clone().into());
    map.insert("commit_source".into(), ctx.commit.source.as_str().into());
    map.insert("commit_date".into(), ctx.commit.date.clone().into());
    map.insert("commit_subject".into(), ctx.commit.subject.clone().into());
    map.insert("commit_author".into(), ctx.commit.author.clone().into());
    if let Some(batch) = &ctx.batch {
        map.insert("batch".into(), batch.clone().into());
    }

    // legacy names kept for older readers of the index
    map.insert("file_path".into(), c.source_path.clone().into());
    map.insert("repo".into(), ctx.repo().into());

    map.retain(|key, value| IDENTITY_FIELDS.contains(&key.as_str()) || !is_blank(value));
    map
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Governed metadata for one chunk; never fails and never exceeds `byte_budget`.
///
/// A budget too small for `{"emergency":true}` yields an empty map, and a
/// budget under 2 bytes cannot be met at all. Configuration rejects budgets
/// below 1024 bytes.
pub fn govern(chunk: &EnrichedChunk, ctx: &GovernContext, byte_budget: usize) -> GovernedMetadata {
    let mut fields = flatten(chunk, ctx);
    let mut applied_steps = Vec::new();

    for step in trim_steps() {
        if byte_len(&fields) <= byte_budget {
            return GovernedMetadata {
                fields,
                applied_steps,
            };
        }
        if (step.applies)(&fields) {
            (step.reduce)(&mut fields);
            applied_steps.push(step.name);
            debug!(
                "Trim step '{}' on {}#{}: {} bytes",
                step.name,
                chunk.chunk.source_path,
                chunk.chunk.chunk_index,
                byte_len(&fields)
            );
        }
    }

    if byte_len(&fields) <= byte_budget {
        return GovernedMetadata {
            fields,
            applied_steps,
        };
    }

    warn!(
        "Metadata for {}#{} still exceeds {} bytes after trimming; using emergency record",
        chunk.chunk.source_path, chunk.chunk.chunk_index, byte_budget
    );
    applied_steps.push("emergency");
    GovernedMetadata {
        fields: emergency_record(chunk, ctx, byte_budget),
        applied_steps,
    }
}

/// Characters that would grow under JSON escaping
fn escape_free(s: &str) -> String {
    s.chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect()
}

/// Fixed-shape record that fits any budget of at least 256 bytes. Smaller
/// budgets get `{"emergency":true}`, or `{}` when even that does not fit.
pub fn emergency_record(chunk: &EnrichedChunk, ctx: &GovernContext, byte_budget: usize) -> MetadataMap {
    let minimal = || {
        let mut map = MetadataMap::new();
        map.insert("emergency".into(), true.into());
        if byte_len(&map) > byte_budget {
            map.clear();
        }
        map
    };

    let mut skeleton = MetadataMap::new();
    skeleton.insert("emergency".into(), true.into());
    for field in EMERGENCY_FIELDS {
        skeleton.insert((*field).into(), String::new().into());
    }
    let overhead = byte_len(&skeleton);
    if byte_budget <= overhead {
        return minimal();
    }

    let per_field = (byte_budget - overhead) / EMERGENCY_FIELDS.len();
    let terms = if chunk.ul_terms.is_empty() {
        join_terms(&chunk.keywords)
    } else {
        join_terms(&chunk.ul_terms)
    };

    let values = [
        ("file_type", escape_free(&chunk.chunk.language)),
        ("namespace", escape_free(&ctx.namespace)),
        ("path", escape_free(&chunk.chunk.source_path)),
        ("source", escape_free(&ctx.repo())),
        ("terms", escape_free(&terms)),
    ];

    let mut record = minimal();
    for (key, value) in values {
        let value = if key == "path" {
            tail_bytes(&value, per_field)
        } else {
            truncate_bytes(&value, per_field)
        };
        record.insert(key.into(), value.into());
    }

    if byte_len(&record) > byte_budget {
        return minimal();
    }
    record
}
