//! SQLite-backed [`VectorIndex`].
//!
//! Namespaces are rows in `namespaces`; entries live in `index_entries`
//! with the vector stored as a little-endian f32 BLOB. Search loads a
//! namespace's vectors and ranks them in Rust by cosine similarity, which
//! is adequate for per-document and per-session corpora of a few thousand
//! chunks.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use docqa_core::embedding::{blob_to_vec, vec_to_blob};
use docqa_core::index::{rank_entries, IndexEntry, IndexError, Namespace, VectorIndex};
use docqa_core::models::{Chunk, RetrievedChunk};

use crate::models::now_ts;

#[derive(Clone)]
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn storage(err: sqlx::Error) -> IndexError {
    IndexError::Storage(err.into())
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn add_entries(
        &self,
        namespace: &Namespace,
        entries: Vec<IndexEntry>,
    ) -> Result<usize, IndexError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        sqlx::query("INSERT INTO namespaces (name, created_at) VALUES (?, ?) ON CONFLICT(name) DO NOTHING")
            .bind(namespace.as_str())
            .bind(now_ts())
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        for entry in &entries {
            sqlx::query(
                "INSERT INTO index_entries (namespace, document_id, chunk_index, text, dims, embedding) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(namespace.as_str())
            .bind(entry.chunk.document_id)
            .bind(entry.chunk.chunk_index)
            .bind(&entry.chunk.text)
            .bind(entry.vector.len() as i64)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        tx.commit().await.map_err(storage)?;
        Ok(entries.len())
    }

    async fn search(
        &self,
        namespace: &Namespace,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, IndexError> {
        let entries = self.entries(namespace).await?;
        Ok(rank_entries(&entries, query, k))
    }

    async fn entries(&self, namespace: &Namespace) -> Result<Vec<IndexEntry>, IndexError> {
        if !self.contains(namespace).await? {
            return Err(IndexError::NamespaceNotFound(namespace.to_string()));
        }

        let rows = sqlx::query(
            "SELECT document_id, chunk_index, text, embedding FROM index_entries \
             WHERE namespace = ? ORDER BY id",
        )
        .bind(namespace.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                IndexEntry {
                    chunk: Chunk {
                        document_id: row.get("document_id"),
                        chunk_index: row.get("chunk_index"),
                        text: row.get("text"),
                    },
                    vector: blob_to_vec(&blob),
                }
            })
            .collect())
    }

    async fn contains(&self, namespace: &Namespace) -> Result<bool, IndexError> {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM namespaces WHERE name = ?")
            .bind(namespace.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(exists)
    }

    async fn drop_namespace(&self, namespace: &Namespace) -> Result<bool, IndexError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        sqlx::query("DELETE FROM index_entries WHERE namespace = ?")
            .bind(namespace.as_str())
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        let result = sqlx::query("DELETE FROM namespaces WHERE name = ?")
            .bind(namespace.as_str())
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn index() -> SqliteIndex {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        SqliteIndex::new(pool)
    }

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

    #[tokio::test]
    async fn test_entries_round_trip_in_insertion_order() {
        let index = index().await;
        let ns = Namespace::document(1);
        let batch = vec![
            entry(1, 0, "zero", vec![1.0, 0.0]),
            entry(1, 1, "one", vec![0.0, 1.0]),
        ];

        assert_eq!(index.add_entries(&ns, batch.clone()).await.unwrap(), 2);
        assert_eq!(index.entries(&ns).await.unwrap(), batch);
    }

    #[tokio::test]
    async fn test_search_is_namespaced() {
        let index = index().await;
        index
            .add_entries(&Namespace::document(1), vec![entry(1, 0, "a", vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .add_entries(&Namespace::document(2), vec![entry(2, 0, "b", vec![1.0, 0.0])])
            .await
            .unwrap();

        let hits = index
            .search(&Namespace::document(2), &[1.0, 0.0], 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "b");
    }

    #[tokio::test]
    async fn test_missing_namespace() {
        let index = index().await;
        assert!(matches!(
            index.search(&Namespace::session(4), &[1.0], 3).await,
            Err(IndexError::NamespaceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_batch_creates_namespace() {
        let index = index().await;
        let ns = Namespace::document(8);
        index.add_entries(&ns, Vec::new()).await.unwrap();
        assert!(index.contains(&ns).await.unwrap());
        assert!(index.search(&ns, &[1.0], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drop_namespace_removes_entries() {
        let index = index().await;
        let ns = Namespace::document(1);
        index
            .add_entries(&ns, vec![entry(1, 0, "a", vec![1.0])])
            .await
            .unwrap();

        assert!(index.drop_namespace(&ns).await.unwrap());
        assert!(!index.contains(&ns).await.unwrap());
        let left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_entries")
            .fetch_one(&index.pool)
            .await
            .unwrap();
        assert_eq!(left, 0);
        assert!(!index.drop_namespace(&ns).await.unwrap());
    }
}
