use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a [`CommitInfo`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitSource {
    /// Authenticated remote API lookup
    RemoteApi,
    /// Unauthenticated (public) remote API lookup
    PublicApi,
    /// Local git repository inspection
    LocalGit,
    /// Generated locally because no other source answered
    Synthetic,
}

impl CommitSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitSource::RemoteApi => "remote_api",
            CommitSource::PublicApi => "public_api",
            CommitSource::LocalGit => "local_git",
            CommitSource::Synthetic => "synthetic",
        }
    }
}

/// Identity of the commit a document was loaded at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Full commit hash, or `synthetic-<millis>` for generated commits
    pub hash: String,
    pub author: String,
    pub email: String,
    /// RFC 3339 timestamp
    pub date: String,
    /// First line of the commit message
    pub subject: String,
    pub source: CommitSource,
}

impl CommitInfo {
    pub const SYNTHETIC_PREFIX: &'static str = "synthetic-";

    /// Build a clearly tagged synthetic commit from the current time
    pub fn synthetic(branch: &str) -> Self {
        let now = chrono::Utc::now();
        Self {
            hash: format!("{}{}", Self::SYNTHETIC_PREFIX, now.timestamp_millis()),
            author: "repo-ingest".to_string(),
            email: String::new(),
            date: now.to_rfc3339(),
            subject: format!("Synthetic commit for branch {}", branch),
            source: CommitSource::Synthetic,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.source == CommitSource::Synthetic || self.hash.starts_with(Self::SYNTHETIC_PREFIX)
    }

    /// Abbreviated hash for logs
    pub fn short_hash(&self) -> &str {
        let end = self
            .hash
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.hash.len());
        &self.hash[..end]
    }
}

/// Kind of change a file went through between two commits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Added,
    Modified,
    Removed,
}

/// One changed file between two commits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub filename: String,
    pub status: ChangeStatus,
    #[serde(default)]
    pub additions: usize,
    #[serde(default)]
    pub deletions: usize,
}

impl ChangeRecord {
    pub fn new(filename: impl Into<String>, status: ChangeStatus) -> Self {
        Self {
            filename: filename.into(),
            status,
            additions: 0,
            deletions: 0,
        }
    }

    /// Whether the file has content at the target commit
    pub fn needs_load(&self) -> bool {
        !matches!(self.status, ChangeStatus::Removed)
    }
}

/// Result of change detection between two commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSet {
    /// The exact set of changed files (possibly empty)
    Files(Vec<ChangeRecord>),
    /// No strategy could compute a diff; treat the whole repository as new
    FullReload,
}

impl ChangeSet {
    pub fn is_full_reload(&self) -> bool {
        matches!(self, ChangeSet::FullReload)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ChangeSet::Files(files) if files.is_empty())
    }
}

/// What the loader should fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadScope {
    Full,
    Changes(Vec<ChangeRecord>),
}

impl From<ChangeSet> for LoadScope {
    fn from(changes: ChangeSet) -> Self {
        match changes {
            ChangeSet::Files(files) => LoadScope::Changes(files),
            ChangeSet::FullReload => LoadScope::Full,
        }
    }
}

/// A repository file loaded at a specific commit
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Path relative to the repository root, `/`-separated
    pub source_path: String,
    pub content: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub branch: String,
    pub commit_info: CommitInfo,
    /// Detected language name, or the bare extension when unknown
    pub file_type: String,
    /// Tag of the loader batch that produced this document
    pub batch: String,
}

impl Document {
    pub fn extension(&self) -> Option<&str> {
        let name = self.source_path.rsplit('/').next().unwrap_or(&self.source_path);
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() { None } else { Some(ext) }
    }
}

/// What a chunk represents in its source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticRole {
    Function,
    Method,
    Class,
    Interface,
    Type,
    Module,
    Route,
    /// Code between units (imports, constants, top-level statements)
    ModuleLevel,
    /// A line window produced without a syntax tree
    Block,
}

impl SemanticRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticRole::Function => "function",
            SemanticRole::Method => "method",
            SemanticRole::Class => "class",
            SemanticRole::Interface => "interface",
            SemanticRole::Type => "type",
            SemanticRole::Module => "module",
            SemanticRole::Route => "route",
            SemanticRole::ModuleLevel => "module_level",
            SemanticRole::Block => "block",
        }
    }
}

impl fmt::Display for SemanticRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a chunk's boundaries were chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplittingMethod {
    AstBased,
    LineBased,
}

impl SplittingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplittingMethod::AstBased => "ast_based",
            SplittingMethod::LineBased => "line_based",
        }
    }
}

/// A token-bounded slice of exactly one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub token_count: usize,
    /// 1-based, inclusive
    pub start_line: usize,
    /// 1-based, inclusive
    pub end_line: usize,
    pub semantic_role: SemanticRole,
    pub unit_name: String,
    pub parent_class_name: Option<String>,
    pub splitting_method: SplittingMethod,
    /// Path of the originating document
    pub source_path: String,
    /// Position of this chunk within its document, starting at 0
    pub chunk_index: usize,
    pub language: String,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default)]
    pub is_static: bool,
}

/// Coarse topic of a chunk used for retrieval filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentCategory {
    Function,
    Class,
    Import,
    Test,
    Config,
    Doc,
    General,
}

impl ContentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCategory::Function => "function",
            ContentCategory::Class => "class",
            ContentCategory::Import => "import",
            ContentCategory::Test => "test",
            ContentCategory::Config => "config",
            ContentCategory::Doc => "doc",
            ContentCategory::General => "general",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Simple,
    Moderate,
    Complex,
}

impl ComplexityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityLevel::Simple => "simple",
            ComplexityLevel::Moderate => "moderate",
            ComplexityLevel::Complex => "complex",
        }
    }
}

/// A chunk that survived post-processing, with its retrieval metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedChunk {
    pub chunk: Chunk,
    pub quality_score: f32,
    pub keywords: Vec<String>,
    pub content_category: ContentCategory,
    pub complexity_level: ComplexityLevel,
    pub synthetic_questions: Vec<String>,
    /// Ubiquitous-language terms found in the chunk
    #[serde(default)]
    pub ul_terms: Vec<String>,
    /// Unix epoch seconds
    pub postprocessed_at: i64,
}

impl EnrichedChunk {
    /// Wrap a chunk with neutral metadata; later stages fill it in
    pub fn from_chunk(chunk: Chunk) -> Self {
        Self {
            chunk,
            quality_score: 0.0,
            keywords: Vec::new(),
            content_category: ContentCategory::General,
            complexity_level: ComplexityLevel::Simple,
            synthetic_questions: Vec::new(),
            ul_terms: Vec::new(),
            postprocessed_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Request to ingest one repository branch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestRequest {
    /// Repository URL (`https://github.com/owner/repo`, `git@host:owner/repo.git` or `owner/repo`)
    pub repo_url: String,
    pub branch: String,
    /// Commit of the previous ingestion; absent means full ingestion
    #[serde(default)]
    pub since_commit: Option<String>,
    /// Local working tree to read instead of the remote API
    #[serde(default)]
    pub local_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// Every file was (re)processed
    Full,
    /// Only changed files were processed
    Incremental,
    /// Nothing changed since the previous ingestion
    Skipped,
}

/// Outcome of one pipeline stage; failures are recorded here instead of aborting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: String,
    pub succeeded: usize,
    pub failed: usize,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl StageSummary {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            ..Default::default()
        }
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.failed += 1;
        self.errors.push(error.into());
    }
}

/// Response from an ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub namespace: String,
    pub commit: CommitInfo,
    pub mode: IngestMode,
    pub documents_loaded: usize,
    pub chunks_created: usize,
    pub chunks_stored: usize,
    pub chunks_deleted: usize,
    pub duration_ms: u64,
    pub stages: Vec<StageSummary>,
}

impl IngestResponse {
    /// All non-fatal errors across stages
    pub fn errors(&self) -> Vec<&str> {
        self.stages
            .iter()
            .flat_map(|s| s.errors.iter().map(String::as_str))
            .collect()
    }

    pub fn stage(&self, name: &str) -> Option<&StageSummary> {
        self.stages.iter().find(|s| s.stage == name)
    }
}

#[cfg(test)]
mod tests;
