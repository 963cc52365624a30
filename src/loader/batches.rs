//! The priority-ordered batch plan

use crate::glob_utils::{compile_set, matches_path};
use crate::indexer::AST_EXTENSIONS;
use globset::GlobSet;

/// Paths no batch ever loads
pub const GLOBAL_EXCLUDES: &[&str] = &[
    "**/.git/**",
    "**/node_modules/**",
    "**/target/**",
    "**/dist/**",
    "**/build/**",
    "**/vendor/**",
    "**/__pycache__/**",
    "**/.venv/**",
    "**/*.lock",
    "**/package-lock.json",
    "**/pnpm-lock.yaml",
    "**/*.min.js",
    "**/*.min.css",
    "**/*.map",
    "**/*.{png,jpg,jpeg,gif,bmp,ico,svg,webp,pdf}",
    "**/*.{zip,gz,tgz,tar,7z,rar,jar,war}",
    "**/*.{exe,dll,so,dylib,a,o,class,pyc,wasm,bin}",
    "**/*.{woff,woff2,ttf,otf,eot,mp3,mp4,mov}",
];

/// One batch of the load plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSpec {
    pub tag: String,
    /// Lower runs first
    pub priority: u8,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Concurrent fetches inside the batch
    pub concurrency: usize,
}

impl BatchSpec {
    pub fn new(tag: &str, priority: u8, concurrency: usize) -> Self {
        Self {
            tag: tag.to_string(),
            priority,
            include: Vec::new(),
            exclude: Vec::new(),
            concurrency,
        }
    }

    pub fn include<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(patterns.into_iter().map(Into::into));
        self
    }
}

/// Documentation first, then parseable source, then configuration and markup
pub fn default_plan() -> Vec<BatchSpec> {
    vec![
        BatchSpec::new("core_docs", 1, 2).include([
            "README*",
            "*.md",
            "*.rst",
            "docs/**/*.md",
            "docs/**/*.rst",
            "docs/**/*.adoc",
        ]),
        BatchSpec::new("primary_source", 2, 4)
            .include(AST_EXTENSIONS.iter().map(|ext| format!("**/*.{}", ext)))
            .exclude(["**/*.d.ts", "**/*.generated.*", "**/*_pb2.py"]),
        BatchSpec::new("secondary", 3, 2).include([
            "**/*.md",
            "**/*.rst",
            "**/*.txt",
            "**/*.json",
            "**/*.toml",
            "**/*.yaml",
            "**/*.yml",
            "**/*.ini",
            "**/*.cfg",
            "**/*.properties",
            "**/*.xml",
            "**/*.sql",
            "**/*.sh",
            "**/*.graphql",
            "**/*.proto",
            "**/Dockerfile",
            "**/Makefile",
        ]),
    ]
}

struct CompiledBatch {
    include: GlobSet,
    exclude: GlobSet,
}

/// A plan compiled for repeated path assignment
pub struct CompiledPlan {
    specs: Vec<BatchSpec>,
    global_exclude: GlobSet,
    batches: Vec<CompiledBatch>,
}

impl CompiledPlan {
    /// Compile `plan` (sorted by priority) with the global excludes plus `extra_excludes`
    pub fn new(mut plan: Vec<BatchSpec>, extra_excludes: &[String]) -> Self {
        plan.sort_by_key(|b| b.priority);

        let mut excludes: Vec<String> = GLOBAL_EXCLUDES.iter().map(|p| p.to_string()).collect();
        excludes.extend(extra_excludes.iter().cloned());

        let batches = plan
            .iter()
            .map(|spec| CompiledBatch {
                include: compile_set(spec.include.as_slice()),
                exclude: compile_set(spec.exclude.as_slice()),
            })
            .collect();

        Self {
            specs: plan,
            global_exclude: compile_set(excludes.as_slice()),
            batches,
        }
    }

    pub fn specs(&self) -> &[BatchSpec] {
        &self.specs
    }

    /// Index of the first batch that takes `path`, or `None` when the path
    /// is globally excluded or no batch wants it
    pub fn assign(&self, path: &str) -> Option<usize> {
        if matches_path(&self.global_exclude, path) {
            return None;
        }
        self.batches.iter().position(|batch| {
            matches_path(&batch.include, path) && !matches_path(&batch.exclude, path)
        })
    }
}
