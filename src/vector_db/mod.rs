// LanceDB is the default embedded index; the in-memory index backs dry runs and tests
pub mod lance_client;
pub use lance_client::LanceVectorIndex;

mod memory;
pub use memory::InMemoryIndex;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One stored chunk: vector, text and governed metadata (serialized JSON)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    /// Repository-relative path of the originating file
    pub source: String,
    pub content: String,
    pub metadata: String,
}

/// Trait for a namespace-scoped vector index
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Prepare storage for vectors of `dimension`; idempotent
    async fn initialize(&self, dimension: usize) -> Result<()>;

    /// Insert or overwrite records by id within `namespace`
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<usize>;

    /// Whether `namespace` holds any records
    async fn exists(&self, namespace: &str) -> Result<bool>;

    async fn count(&self, namespace: &str) -> Result<usize>;

    /// Distinct source paths with records in `namespace`
    async fn sources(&self, namespace: &str) -> Result<BTreeSet<String>>;

    /// Remove every record of the given source files, returning how many went
    async fn delete_by_sources(&self, namespace: &str, source_paths: &[String]) -> Result<usize>;

    async fn delete_by_source(&self, namespace: &str, source_path: &str) -> Result<usize> {
        self.delete_by_sources(namespace, &[source_path.to_string()])
            .await
    }

    async fn get_statistics(&self) -> Result<IndexStats>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub total_records: usize,
    /// Records per namespace, largest first
    pub namespaces: Vec<(String, usize)>,
}

/// Quote a value for a SQL-like filter expression
pub(crate) fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
