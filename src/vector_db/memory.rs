//! In-process index keyed by namespace then record id

use super::{IndexStats, VectorIndex, VectorRecord};
use crate::error::VectorDbError;
use anyhow::{Result, anyhow};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryIndex {
    dimension: RwLock<Option<usize>>,
    namespaces: RwLock<HashMap<String, BTreeMap<String, VectorRecord>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a namespace's records ordered by id
    pub fn records(&self, namespace: &str) -> Vec<VectorRecord> {
        self.namespaces
            .read()
            .map(|ns| {
                ns.get(namespace)
                    .map(|records| records.values().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Snapshot of the records of one source file, in id order
    pub fn records_for(&self, namespace: &str, source_path: &str) -> Vec<VectorRecord> {
        self.records(namespace)
            .into_iter()
            .filter(|r| r.source == source_path)
            .collect()
    }
}

fn poisoned<T>(err: std::sync::PoisonError<T>) -> anyhow::Error {
    anyhow!("In-memory index lock poisoned: {}", err)
}

#[async_trait::async_trait]
impl VectorIndex for InMemoryIndex {
    async fn initialize(&self, dimension: usize) -> Result<()> {
        let mut current = self.dimension.write().map_err(poisoned)?;
        match *current {
            Some(existing) if existing != dimension => Err(VectorDbError::DimensionMismatch {
                expected: existing,
                actual: dimension,
            }
            .into()),
            _ => {
                *current = Some(dimension);
                Ok(())
            }
        }
    }

    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<usize> {
        let dimension = (*self.dimension.read().map_err(poisoned)?)
            .ok_or(VectorDbError::NotInitialized)?;
        if let Some(bad) = records.iter().find(|r| r.vector.len() != dimension) {
            return Err(VectorDbError::DimensionMismatch {
                expected: dimension,
                actual: bad.vector.len(),
            }
            .into());
        }

        let count = records.len();
        let mut namespaces = self.namespaces.write().map_err(poisoned)?;
        let entries = namespaces.entry(namespace.to_string()).or_default();
        for record in records {
            entries.insert(record.id.clone(), record);
        }
        Ok(count)
    }

    async fn exists(&self, namespace: &str) -> Result<bool> {
        Ok(self.count(namespace).await? > 0)
    }

    async fn count(&self, namespace: &str) -> Result<usize> {
        let namespaces = self.namespaces.read().map_err(poisoned)?;
        Ok(namespaces.get(namespace).map_or(0, BTreeMap::len))
    }

    async fn sources(&self, namespace: &str) -> Result<BTreeSet<String>> {
        let namespaces = self.namespaces.read().map_err(poisoned)?;
        Ok(namespaces
            .get(namespace)
            .map(|records| records.values().map(|r| r.source.clone()).collect())
            .unwrap_or_default())
    }

    async fn delete_by_sources(&self, namespace: &str, source_paths: &[String]) -> Result<usize> {
        let mut namespaces = self.namespaces.write().map_err(poisoned)?;
        let Some(entries) = namespaces.get_mut(namespace) else {
            return Ok(0);
        };
        let before = entries.len();
        entries.retain(|_, r| !source_paths.contains(&r.source));
        Ok(before - entries.len())
    }

    async fn get_statistics(&self) -> Result<IndexStats> {
        let namespaces = self.namespaces.read().map_err(poisoned)?;
        let mut counts: Vec<(String, usize)> = namespaces
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(name, records)| (name.clone(), records.len()))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(IndexStats {
            total_records: counts.iter().map(|(_, n)| n).sum(),
            namespaces: counts,
        })
    }
}
