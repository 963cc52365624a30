//! LanceDB vector index
//!
//! One table holds every namespace; the `namespace` column scopes reads,
//! deletes and overwrites. Upserts replace existing ids within the namespace
//! before appending, so re-ingesting an unchanged chunk overwrites it.

use crate::error::VectorDbError;
use crate::vector_db::{IndexStats, VectorIndex, VectorRecord, sql_literal};
use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray,
    types::Float32Type,
};
use arrow_schema::{DataType, Field, Schema};
use futures::stream::TryStreamExt;
use lancedb::Table;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

/// Values per `IN (...)` delete filter
const ID_FILTER_CHUNK: usize = 200;

/// LanceDB index (embedded, no server required)
pub struct LanceVectorIndex {
    connection: Connection,
    table_name: String,
    db_path: String,
    dimension: RwLock<Option<usize>>,
}

impl LanceVectorIndex {
    /// Create an index at the default data path
    pub async fn new() -> Result<Self> {
        let db_path = Self::default_lancedb_path();
        Self::with_path(&db_path, "repo_chunks").await
    }

    /// Create an index at a custom path and table
    pub async fn with_path(db_path: &str, table_name: &str) -> Result<Self> {
        tracing::info!("Connecting to LanceDB at: {}", db_path);

        let connection = lancedb::connect(db_path)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self {
            connection,
            table_name: table_name.to_string(),
            db_path: db_path.to_string(),
            dimension: RwLock::new(None),
        })
    }

    pub fn default_lancedb_path() -> String {
        crate::paths::PlatformPaths::default_lancedb_path()
            .to_string_lossy()
            .to_string()
    }

    fn create_schema(dimension: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension as i32,
                ),
                false,
            ),
            Field::new("id", DataType::Utf8, false),
            Field::new("namespace", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
        ]))
    }

    async fn get_table(&self) -> Result<Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .context("Failed to open table")
    }

    async fn table_exists(&self) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .context("Failed to list tables")?;
        Ok(table_names.contains(&self.table_name))
    }

    fn expected_dimension(&self) -> Result<usize> {
        let dimension = self
            .dimension
            .read()
            .map_err(|e| anyhow::anyhow!("Failed to acquire dimension lock: {}", e))?;
        Ok((*dimension).ok_or(VectorDbError::NotInitialized)?)
    }

    fn create_record_batch(
        namespace: &str,
        records: Vec<VectorRecord>,
        dimension: usize,
        schema: Arc<Schema>,
    ) -> Result<RecordBatch> {
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let id_array = StringArray::from(ids);
        let namespace_array = StringArray::from(vec![namespace; records.len()]);
        let source_array =
            StringArray::from(records.iter().map(|r| r.source.as_str()).collect::<Vec<_>>());
        let content_array =
            StringArray::from(records.iter().map(|r| r.content.as_str()).collect::<Vec<_>>());
        let metadata_array =
            StringArray::from(records.iter().map(|r| r.metadata.as_str()).collect::<Vec<_>>());

        let vector_array = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
            records
                .into_iter()
                .map(|r| Some(r.vector.into_iter().map(Some))),
            dimension as i32,
        );

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(vector_array),
                Arc::new(id_array),
                Arc::new(namespace_array),
                Arc::new(source_array),
                Arc::new(content_array),
                Arc::new(metadata_array),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    fn namespace_filter(namespace: &str) -> String {
        format!("namespace = {}", sql_literal(namespace))
    }
}

#[async_trait::async_trait]
impl VectorIndex for LanceVectorIndex {
    async fn initialize(&self, dimension: usize) -> Result<()> {
        tracing::info!(
            "Initializing LanceDB with dimension {} at {}",
            dimension,
            self.db_path
        );

        {
            let mut current = self
                .dimension
                .write()
                .map_err(|e| anyhow::anyhow!("Failed to acquire dimension lock: {}", e))?;
            if let Some(existing) = *current
                && existing != dimension
            {
                return Err(VectorDbError::DimensionMismatch {
                    expected: existing,
                    actual: dimension,
                }
                .into());
            }
            *current = Some(dimension);
        }

        if self.table_exists().await? {
            tracing::info!("Table '{}' already exists", self.table_name);
            return Ok(());
        }

        let schema = Self::create_schema(dimension);
        let empty_batch = RecordBatch::new_empty(schema.clone());
        let batches =
            RecordBatchIterator::new(vec![empty_batch].into_iter().map(Ok), schema.clone());

        self.connection
            .create_table(&self.table_name, Box::new(batches))
            .execute()
            .await
            .map_err(|e| VectorDbError::InitializationFailed(e.to_string()))?;

        tracing::info!("Created table '{}'", self.table_name);
        Ok(())
    }

    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let dimension = self.expected_dimension()?;
        if let Some(bad) = records.iter().find(|r| r.vector.len() != dimension) {
            return Err(VectorDbError::DimensionMismatch {
                expected: dimension,
                actual: bad.vector.len(),
            }
            .into());
        }

        let table = self.get_table().await?;

        // overwrite: clear the ids first, then append
        for ids in records.chunks(ID_FILTER_CHUNK) {
            let id_list = ids
                .iter()
                .map(|r| sql_literal(&r.id))
                .collect::<Vec<_>>()
                .join(", ");
            let filter = format!("{} AND id IN ({})", Self::namespace_filter(namespace), id_list);
            table
                .delete(&filter)
                .await
                .context("Failed to clear existing ids")?;
        }

        let schema = Self::create_schema(dimension);
        let batch = Self::create_record_batch(namespace, records, dimension, schema.clone())?;
        let count = batch.num_rows();
        let batches = RecordBatchIterator::new(vec![batch].into_iter().map(Ok), schema);

        table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| VectorDbError::StoreFailed {
                namespace: namespace.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!("Upserted {} records into namespace '{}'", count, namespace);
        Ok(count)
    }

    async fn exists(&self, namespace: &str) -> Result<bool> {
        Ok(self.count(namespace).await? > 0)
    }

    async fn count(&self, namespace: &str) -> Result<usize> {
        if !self.table_exists().await? {
            return Ok(0);
        }
        let table = self.get_table().await?;
        table
            .count_rows(Some(Self::namespace_filter(namespace)))
            .await
            .with_context(|| VectorDbError::QueryFailed(namespace.to_string()))
    }

    async fn sources(&self, namespace: &str) -> Result<BTreeSet<String>> {
        if !self.table_exists().await? {
            return Ok(BTreeSet::new());
        }
        let table = self.get_table().await?;

        let batches: Vec<RecordBatch> = table
            .query()
            .only_if(Self::namespace_filter(namespace))
            .select(lancedb::query::Select::Columns(vec!["source".to_string()]))
            .execute()
            .await
            .with_context(|| VectorDbError::QueryFailed(namespace.to_string()))?
            .try_collect()
            .await
            .context("Failed to collect source paths")?;

        let mut sources = BTreeSet::new();
        for batch in batches {
            let source_array = batch
                .column_by_name("source")
                .context("Missing source column")?
                .as_any()
                .downcast_ref::<StringArray>()
                .context("Invalid source type")?;
            sources.extend((0..batch.num_rows()).map(|i| source_array.value(i).to_string()));
        }
        Ok(sources)
    }

    async fn delete_by_sources(&self, namespace: &str, source_paths: &[String]) -> Result<usize> {
        if source_paths.is_empty() || !self.table_exists().await? {
            return Ok(0);
        }
        let table = self.get_table().await?;

        let mut deleted = 0;
        for paths in source_paths.chunks(ID_FILTER_CHUNK) {
            let path_list = paths
                .iter()
                .map(|p| sql_literal(p))
                .collect::<Vec<_>>()
                .join(", ");
            let filter = format!(
                "{} AND source IN ({})",
                Self::namespace_filter(namespace),
                path_list
            );

            // LanceDB doesn't report deleted rows, so count around the delete
            let before = table
                .count_rows(Some(filter.clone()))
                .await
                .context("Failed to count records")?;
            table
                .delete(&filter)
                .await
                .map_err(|e| VectorDbError::DeleteFailed(e.to_string()))?;
            deleted += before;
        }

        tracing::debug!(
            "Deleted {} records of {} sources in namespace '{}'",
            deleted,
            source_paths.len(),
            namespace
        );
        Ok(deleted)
    }

    async fn get_statistics(&self) -> Result<IndexStats> {
        if !self.table_exists().await? {
            return Ok(IndexStats::default());
        }
        let table = self.get_table().await?;

        let stream = table
            .query()
            .select(lancedb::query::Select::Columns(vec![
                "namespace".to_string(),
            ]))
            .execute()
            .await
            .context("Failed to query namespaces")?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .context("Failed to collect namespace data")?;

        let mut counts: HashMap<String, usize> = HashMap::new();
        for batch in batches {
            let namespace_array = batch
                .column_by_name("namespace")
                .context("Missing namespace column")?
                .as_any()
                .downcast_ref::<StringArray>()
                .context("Invalid namespace type")?;

            for i in 0..batch.num_rows() {
                *counts.entry(namespace_array.value(i).to_string()).or_insert(0) += 1;
            }
        }

        let mut namespaces: Vec<(String, usize)> = counts.into_iter().collect();
        namespaces.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Ok(IndexStats {
            total_records: namespaces.iter().map(|(_, n)| n).sum(),
            namespaces,
        })
    }
}
