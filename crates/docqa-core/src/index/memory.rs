//! In-memory [`VectorIndex`] for tests and embedded use.
//!
//! Namespaces live in a `HashMap` behind a `std::sync::RwLock`; a batch is
//! appended under a single write lock, so readers see all of it or none of
//! it. Search is brute-force cosine similarity.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{rank_entries, IndexEntry, IndexError, Namespace, VectorIndex};
use crate::models::RetrievedChunk;

#[derive(Default)]
pub struct InMemoryIndex {
    namespaces: RwLock<HashMap<String, Vec<IndexEntry>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> IndexError {
    IndexError::Storage(anyhow::anyhow!("in-memory index lock poisoned"))
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn add_entries(
        &self,
        namespace: &Namespace,
        entries: Vec<IndexEntry>,
    ) -> Result<usize, IndexError> {
        let count = entries.len();
        let mut map = self.namespaces.write().map_err(|_| poisoned())?;
        map.entry(namespace.as_str().to_string())
            .or_default()
            .extend(entries);
        Ok(count)
    }

    async fn search(
        &self,
        namespace: &Namespace,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, IndexError> {
        let map = self.namespaces.read().map_err(|_| poisoned())?;
        let entries = map
            .get(namespace.as_str())
            .ok_or_else(|| IndexError::NamespaceNotFound(namespace.to_string()))?;
        Ok(rank_entries(entries, query, k))
    }

    async fn entries(&self, namespace: &Namespace) -> Result<Vec<IndexEntry>, IndexError> {
        let map = self.namespaces.read().map_err(|_| poisoned())?;
        map.get(namespace.as_str())
            .cloned()
            .ok_or_else(|| IndexError::NamespaceNotFound(namespace.to_string()))
    }

    async fn contains(&self, namespace: &Namespace) -> Result<bool, IndexError> {
        let map = self.namespaces.read().map_err(|_| poisoned())?;
        Ok(map.contains_key(namespace.as_str()))
    }

    async fn drop_namespace(&self, namespace: &Namespace) -> Result<bool, IndexError> {
        let mut map = self.namespaces.write().map_err(|_| poisoned())?;
        Ok(map.remove(namespace.as_str()).is_some())
    }
}
