//! Namespaced vector index.
//!
//! The index is partitioned into [`Namespace`]s, one per owning entity:
//! `doc_<id>` for a single document and `session_<id>` for a chat session
//! (the union of its member documents' chunks). A namespace comes into
//! existence on its first insert and is never merged with or split into
//! another.
//!
//! Storage backends implement [`VectorIndex`], which deals only in
//! already-embedded [`IndexEntry`] values. [`SemanticIndex`] pairs a
//! backend with an [`Embedder`] and exposes the two text-level operations
//! the pipelines need: `insert` and `query`.
//!
//! # Atomicity
//!
//! [`SemanticIndex::insert`] embeds every chunk before handing the batch to
//! [`VectorIndex::add_entries`], and backends must make the whole batch
//! (including namespace creation) visible at once. A query therefore never
//! observes half of an upload.

pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::embedding::Embedder;
use crate::models::{Chunk, OwningEntity, RetrievedChunk};

/// Address of one partition of the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    pub fn document(document_id: i64) -> Self {
        Namespace(format!("doc_{}", document_id))
    }

    pub fn session(session_id: i64) -> Self {
        Namespace(format!("session_{}", session_id))
    }

    pub fn for_entity(entity: OwningEntity) -> Self {
        match entity {
            OwningEntity::Document(id) => Self::document(id),
            OwningEntity::Session(id) => Self::session(id),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A chunk together with its embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

#[derive(Debug, Error)]
pub enum IndexError {
    /// The namespace was never populated (or has been dropped).
    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    /// The embedding model failed.
    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    /// The embedding model returned the wrong number of vectors.
    #[error("embedder returned {got} vectors for {expected} chunks")]
    VectorCountMismatch { expected: usize, got: usize },

    /// The storage backend failed.
    #[error("index storage error: {0:#}")]
    Storage(anyhow::Error),
}

/// Storage backend for embedded chunks, partitioned by namespace.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add_entries`](VectorIndex::add_entries) | Append a batch, creating the namespace if needed |
/// | [`search`](VectorIndex::search) | Top-k cosine similarity within one namespace |
/// | [`entries`](VectorIndex::entries) | All entries of a namespace, in insertion order |
/// | [`contains`](VectorIndex::contains) | Whether a namespace exists |
/// | [`drop_namespace`](VectorIndex::drop_namespace) | Remove a namespace and its entries |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Append `entries` to `namespace` as one atomic batch.
    ///
    /// Additive: existing entries are never replaced or deduplicated. An
    /// empty batch still creates the namespace. Returns the number of
    /// entries written.
    async fn add_entries(
        &self,
        namespace: &Namespace,
        entries: Vec<IndexEntry>,
    ) -> Result<usize, IndexError>;

    /// Return up to `k` entries of `namespace` nearest to `query`, best first.
    async fn search(
        &self,
        namespace: &Namespace,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, IndexError>;

    /// Return every entry stored under `namespace`, in insertion order.
    async fn entries(&self, namespace: &Namespace) -> Result<Vec<IndexEntry>, IndexError>;

    async fn contains(&self, namespace: &Namespace) -> Result<bool, IndexError>;

    /// Remove a namespace. Returns `false` if it did not exist.
    async fn drop_namespace(&self, namespace: &Namespace) -> Result<bool, IndexError>;
}

/// Text-level facade over a [`VectorIndex`] and an [`Embedder`].
#[derive(Clone)]
pub struct SemanticIndex {
    store: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
}

impl SemanticIndex {
    pub fn new(store: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// The underlying storage backend.
    pub fn store(&self) -> &Arc<dyn VectorIndex> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Embed `chunks` and append them to `namespace`.
    ///
    /// Nothing is written unless every chunk was embedded.
    pub async fn insert(&self, namespace: &Namespace, chunks: &[Chunk]) -> Result<usize, IndexError> {
        let vectors = if chunks.is_empty() {
            Vec::new()
        } else {
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            self.embedder
                .embed(&texts)
                .await
                .map_err(IndexError::Embedding)?
        };

        if vectors.len() != chunks.len() {
            return Err(IndexError::VectorCountMismatch {
                expected: chunks.len(),
                got: vectors.len(),
            });
        }

        let entries = chunks
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect();

        self.store.add_entries(namespace, entries).await
    }

    /// Embed `question` and return the `k` most similar chunks in `namespace`.
    ///
    /// Fails with [`IndexError::NamespaceNotFound`] before calling the
    /// embedder if the namespace does not exist.
    pub async fn query(
        &self,
        namespace: &Namespace,
        question: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, IndexError> {
        if !self.store.contains(namespace).await? {
            return Err(IndexError::NamespaceNotFound(namespace.to_string()));
        }

        let query_vec = self
            .embedder
            .embed_one(question)
            .await
            .map_err(IndexError::Embedding)?;

        self.store.search(namespace, &query_vec, k).await
    }
}

/// Rank `entries` against `query` by cosine similarity and keep the top `k`.
///
/// Ties keep insertion order. Shared by backends that score in process.
pub fn rank_entries<'a, I>(entries: I, query: &[f32], k: usize) -> Vec<RetrievedChunk>
where
    I: IntoIterator<Item = &'a IndexEntry>,
{
    let mut scored: Vec<RetrievedChunk> = entries
        .into_iter()
        .map(|entry| RetrievedChunk {
            text: entry.chunk.text.clone(),
            score: crate::embedding::cosine_similarity(query, &entry.vector),
            document_id: entry.chunk.document_id,
            chunk_index: entry.chunk.chunk_index,
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(doc: i64, idx: i64, text: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk: Chunk {
                document_id: doc,
                chunk_index: idx,
                text: text.to_string(),
            },
            vector,
        }
    }

    #[test]
    fn test_namespace_naming() {
        assert_eq!(Namespace::document(5).as_str(), "doc_5");
        assert_eq!(Namespace::session(7).as_str(), "session_7");
        assert_eq!(
            Namespace::for_entity(OwningEntity::Session(7)),
            Namespace::session(7)
        );
        assert_ne!(Namespace::document(1), Namespace::session(1));
    }

    #[test]
    fn test_rank_entries_orders_and_truncates() {
        let entries = vec![
            entry(1, 0, "far", vec![0.0, 1.0]),
            entry(1, 1, "near", vec![1.0, 0.1]),
            entry(2, 0, "mid", vec![1.0, 1.0]),
        ];
        let ranked = rank_entries(&entries, &[1.0, 0.0], 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].text, "near");
        assert_eq!(ranked[1].text, "mid");
        assert_eq!(ranked[1].document_id, 2);
        assert!(ranked[0].score >= ranked[1].score);
    }

    #[test]
    fn test_rank_entries_ties_keep_insertion_order() {
        let entries = vec![
            entry(1, 0, "first", vec![1.0, 0.0]),
            entry(1, 1, "second", vec![1.0, 0.0]),
        ];
        let ranked = rank_entries(&entries, &[1.0, 0.0], 3);
        assert_eq!(ranked[0].text, "first");
        assert_eq!(ranked[1].text, "second");
    }
}
