//! Entity registry: documents, topics, papers, chat sessions, conversations.
//!
//! A thin typed layer over the SQLite tables created by
//! [`migrate`](crate::migrate). Writes that touch a parent row and its
//! dependents (session + membership, topic + paper, session + conversations)
//! run in one transaction; an error anywhere drops the transaction, which
//! rolls it back.
//!
//! The registry knows nothing about the vector index. Callers that need to
//! keep the two in step (upload, session creation, deletes) live in
//! [`ingest`](crate::ingest).

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use thiserror::Error;

use docqa_core::models::OwningEntity;

use crate::models::{
    format_ts_iso, now_ts, ConversationTurn, DocumentRecord, IndexStatus, NewDocument,
    PaperRecord, SavedPaper, SessionDetail, SessionSummary, StoredPaper, TopicSummary,
};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("{0}")]
    Validation(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RegistryError {
    fn not_found(entity: &'static str, id: i64) -> Self {
        RegistryError::NotFound { entity, id }
    }
}

type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Clone)]
pub struct Registry {
    pool: SqlitePool,
}

const DOCUMENT_COLUMNS: &str =
    "id, filename, uploaded_at, file_size, chunk_count, topic_id, sha256, index_status";

fn document_from_row(row: &SqliteRow) -> DocumentRecord {
    let status: String = row.get("index_status");
    DocumentRecord {
        id: row.get("id"),
        filename: row.get("filename"),
        upload_date: format_ts_iso(row.get("uploaded_at")),
        file_size: row.get("file_size"),
        chunk_count: row.get("chunk_count"),
        topic_id: row.get("topic_id"),
        sha256: row.get("sha256"),
        index_status: IndexStatus::parse(&status).unwrap_or(IndexStatus::Unindexed),
    }
}

fn session_from_row(row: &SqliteRow) -> SessionSummary {
    let status: String = row.get("index_status");
    SessionSummary {
        id: row.get("id"),
        name: row.get("name"),
        created_date: format_ts_iso(row.get("created_at")),
        document_count: row.get("document_count"),
        index_status: IndexStatus::parse(&status).unwrap_or(IndexStatus::Unindexed),
    }
}

fn turn_from_row(row: &SqliteRow) -> ConversationTurn {
    let degraded: i64 = row.get("degraded");
    ConversationTurn {
        id: row.get("id"),
        owner_kind: row.get("owner_kind"),
        owner_id: row.get("owner_id"),
        question: row.get("question"),
        answer: row.get("answer"),
        degraded: degraded != 0,
        timestamp: format_ts_iso(row.get("created_at")),
    }
}

/// Insert the topic if missing and return its id.
async fn get_or_create_topic(conn: &mut SqliteConnection, name: &str) -> Result<i64> {
    sqlx::query("INSERT INTO topics (name, created_at) VALUES (?, ?) ON CONFLICT(name) DO NOTHING")
        .bind(name)
        .bind(now_ts())
        .execute(&mut *conn)
        .await?;

    let id: i64 = sqlx::query_scalar("SELECT id FROM topics WHERE name = ?")
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;
    Ok(id)
}

impl Registry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ============ Documents ============

    /// Register a document with status `pending` and zero chunks.
    pub async fn insert_document(&self, doc: &NewDocument) -> Result<DocumentRecord> {
        if let Some(topic_id) = doc.topic_id {
            if !self.topic_exists(topic_id).await? {
                return Err(RegistryError::not_found("topic", topic_id));
            }
        }

        let result = sqlx::query(
            "INSERT INTO documents (filename, uploaded_at, file_size, chunk_count, topic_id, sha256, index_status) \
             VALUES (?, ?, ?, 0, ?, ?, ?)",
        )
        .bind(&doc.filename)
        .bind(now_ts())
        .bind(doc.file_size)
        .bind(doc.topic_id)
        .bind(&doc.sha256)
        .bind(IndexStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        self.get_document(result.last_insert_rowid()).await
    }

    pub async fn get_document(&self, id: i64) -> Result<DocumentRecord> {
        let row = sqlx::query(&format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RegistryError::not_found("document", id))?;
        Ok(document_from_row(&row))
    }

    /// Oldest document whose upload had the given SHA-256.
    pub async fn find_document_by_sha256(&self, sha256: &str) -> Result<Option<i64>> {
        let id = sqlx::query_scalar("SELECT id FROM documents WHERE sha256 = ? ORDER BY id LIMIT 1")
            .bind(sha256)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    pub async fn list_documents(&self, topic_id: Option<i64>) -> Result<Vec<DocumentRecord>> {
        let rows = match topic_id {
            Some(topic_id) => {
                sqlx::query(&format!(
                    "SELECT {} FROM documents WHERE topic_id = ? ORDER BY uploaded_at DESC, id DESC",
                    DOCUMENT_COLUMNS
                ))
                .bind(topic_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM documents ORDER BY uploaded_at DESC, id DESC",
                    DOCUMENT_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.iter().map(document_from_row).collect())
    }

    pub async fn mark_document_indexed(&self, id: i64, chunk_count: usize) -> Result<()> {
        sqlx::query("UPDATE documents SET index_status = ?, chunk_count = ? WHERE id = ?")
            .bind(IndexStatus::Indexed.as_str())
            .bind(chunk_count as i64)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_document_unindexed(&self, id: i64, chunk_count: usize) -> Result<()> {
        sqlx::query("UPDATE documents SET index_status = ?, chunk_count = ? WHERE id = ?")
            .bind(IndexStatus::Unindexed.as_str())
            .bind(chunk_count as i64)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a document, its session memberships and its conversation turns.
    pub async fn delete_document(&self, id: i64) -> Result<DocumentRecord> {
        let doc = self.get_document(id).await?;
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM conversations WHERE owner_kind = 'document' AND owner_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM session_documents WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(doc)
    }

    // ============ Topics & papers ============

    pub async fn topic_exists(&self, id: i64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM topics WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    pub async fn list_topics(&self) -> Result<Vec<TopicSummary>> {
        let rows = sqlx::query(
            "SELECT t.id, t.name, t.created_at, COUNT(p.id) AS paper_count \
             FROM topics t LEFT JOIN research_papers p ON p.topic_id = t.id \
             GROUP BY t.id ORDER BY t.created_at DESC, t.id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| TopicSummary {
                id: row.get("id"),
                name: row.get("name"),
                created_date: format_ts_iso(row.get("created_at")),
                paper_count: row.get("paper_count"),
            })
            .collect())
    }

    /// Save `paper` under the topic named `topic_name`, creating the topic
    /// if needed.
    ///
    /// Idempotent on (title, topic): saving the same title again returns
    /// the existing paper id with `created == false`.
    pub async fn save_paper(&self, paper: &PaperRecord, topic_name: &str) -> Result<SavedPaper> {
        paper.validate().map_err(RegistryError::Validation)?;
        let topic_name = topic_name.trim();
        if topic_name.is_empty() {
            return Err(RegistryError::Validation(
                "topic_name must not be empty".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let topic_id = get_or_create_topic(&mut tx, topic_name).await?;

        let inserted = sqlx::query(
            "INSERT INTO research_papers \
             (topic_id, title, authors, abstract, year, citations, views, pdf_link, publisher_link, source, saved_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(topic_id, title) DO NOTHING",
        )
        .bind(topic_id)
        .bind(&paper.title)
        .bind(&paper.authors)
        .bind(&paper.abstract_text)
        .bind(paper.year)
        .bind(paper.citations)
        .bind(paper.views)
        .bind(&paper.pdf_link)
        .bind(&paper.publisher_link)
        .bind(&paper.source)
        .bind(now_ts())
        .execute(&mut *tx)
        .await?;

        let paper_id: i64 =
            sqlx::query_scalar("SELECT id FROM research_papers WHERE topic_id = ? AND title = ?")
                .bind(topic_id)
                .bind(&paper.title)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;

        Ok(SavedPaper {
            paper_id,
            topic_id,
            created: inserted.rows_affected() == 1,
        })
    }

    pub async fn list_topic_papers(&self, topic_id: i64) -> Result<Vec<StoredPaper>> {
        if !self.topic_exists(topic_id).await? {
            return Err(RegistryError::not_found("topic", topic_id));
        }

        let rows = sqlx::query(
            "SELECT id, topic_id, title, authors, abstract, year, citations, views, \
             pdf_link, publisher_link, source, saved_at \
             FROM research_papers WHERE topic_id = ? ORDER BY saved_at DESC, id DESC",
        )
        .bind(topic_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| StoredPaper {
                id: row.get("id"),
                topic_id: row.get("topic_id"),
                paper: PaperRecord {
                    title: row.get("title"),
                    authors: row.get("authors"),
                    abstract_text: row.get("abstract"),
                    year: row.get("year"),
                    citations: row.get("citations"),
                    views: row.get("views"),
                    pdf_link: row.get("pdf_link"),
                    publisher_link: row.get("publisher_link"),
                    source: row.get("source"),
                },
                saved_date: format_ts_iso(row.get("saved_at")),
            })
            .collect())
    }

    pub async fn delete_paper(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM research_papers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RegistryError::not_found("paper", id));
        }
        Ok(())
    }

    // ============ Chat sessions ============

    /// Create a session over `document_ids` (duplicates ignored, order kept).
    ///
    /// Fails with `NotFound` naming the first unknown document; nothing is
    /// written in that case.
    pub async fn create_session(&self, name: &str, document_ids: &[i64]) -> Result<SessionSummary> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistryError::Validation(
                "session name must not be empty".to_string(),
            ));
        }

        let mut ids: Vec<i64> = Vec::with_capacity(document_ids.len());
        for id in document_ids {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        if ids.is_empty() {
            return Err(RegistryError::Validation(
                "document_ids must not be empty".to_string(),
            ));
        }

        // Write first: a deferred transaction that opens with a read gets
        // SQLITE_BUSY, not busy_timeout, when it later upgrades under WAL.
        let mut tx = self.pool.begin().await?;

        let session_id = sqlx::query(
            "INSERT INTO chat_sessions (name, created_at, index_status) VALUES (?, ?, ?)",
        )
        .bind(name)
        .bind(now_ts())
        .bind(IndexStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for id in &ids {
            let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM documents WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
            if !exists {
                // Dropping `tx` rolls back the session row.
                return Err(RegistryError::not_found("document", *id));
            }
        }

        for (position, doc_id) in ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO session_documents (session_id, document_id, position) VALUES (?, ?, ?)",
            )
            .bind(session_id)
            .bind(doc_id)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.get_session_summary(session_id).await
    }

    async fn get_session_summary(&self, id: i64) -> Result<SessionSummary> {
        let row = sqlx::query(
            "SELECT s.id, s.name, s.created_at, s.index_status, \
             (SELECT COUNT(*) FROM session_documents sd WHERE sd.session_id = s.id) AS document_count \
             FROM chat_sessions s WHERE s.id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RegistryError::not_found("session", id))?;
        Ok(session_from_row(&row))
    }

    pub async fn get_session(&self, id: i64) -> Result<SessionDetail> {
        let summary = self.get_session_summary(id).await?;
        let rows = sqlx::query(
            "SELECT d.id, d.filename, d.uploaded_at, d.file_size, d.chunk_count, d.topic_id, \
             d.sha256, d.index_status \
             FROM session_documents sd JOIN documents d ON d.id = sd.document_id \
             WHERE sd.session_id = ? ORDER BY sd.position",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(SessionDetail {
            summary,
            documents: rows.iter().map(document_from_row).collect(),
        })
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let rows = sqlx::query(
            "SELECT s.id, s.name, s.created_at, s.index_status, \
             (SELECT COUNT(*) FROM session_documents sd WHERE sd.session_id = s.id) AS document_count \
             FROM chat_sessions s ORDER BY s.created_at DESC, s.id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(session_from_row).collect())
    }

    /// Member document ids in the order they were given at creation.
    pub async fn session_document_ids(&self, id: i64) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar(
            "SELECT document_id FROM session_documents WHERE session_id = ? ORDER BY position",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Sessions that include `document_id`.
    pub async fn sessions_with_document(&self, document_id: i64) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar(
            "SELECT session_id FROM session_documents WHERE document_id = ? ORDER BY session_id",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    pub async fn set_session_status(&self, id: i64, status: IndexStatus) -> Result<()> {
        sqlx::query("UPDATE chat_sessions SET index_status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a session with its membership rows and conversation turns.
    pub async fn delete_session(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM conversations WHERE owner_kind = 'session' AND owner_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM session_documents WHERE session_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM chat_sessions WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RegistryError::not_found("session", id));
        }
        tx.commit().await?;
        Ok(())
    }

    // ============ Owning entities & conversations ============

    /// Index status of a document or session; `None` if it does not exist.
    pub async fn entity_status(&self, entity: OwningEntity) -> Result<Option<IndexStatus>> {
        let sql = match entity {
            OwningEntity::Document(_) => "SELECT index_status FROM documents WHERE id = ?",
            OwningEntity::Session(_) => "SELECT index_status FROM chat_sessions WHERE id = ?",
        };
        let status: Option<String> = sqlx::query_scalar(sql)
            .bind(entity.id())
            .fetch_optional(&self.pool)
            .await?;
        Ok(status.map(|s| IndexStatus::parse(&s).unwrap_or(IndexStatus::Unindexed)))
    }

    /// Append a conversation turn. Turns are never updated.
    pub async fn record_turn(
        &self,
        owner: OwningEntity,
        question: &str,
        answer: &str,
        degraded: bool,
    ) -> Result<ConversationTurn> {
        let id = sqlx::query(
            "INSERT INTO conversations (owner_kind, owner_id, question, answer, degraded, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(owner.kind())
        .bind(owner.id())
        .bind(question)
        .bind(answer)
        .bind(degraded as i64)
        .bind(now_ts())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        let row = sqlx::query(
            "SELECT id, owner_kind, owner_id, question, answer, degraded, created_at \
             FROM conversations WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(turn_from_row(&row))
    }

    /// Turns for `owner`, oldest first.
    pub async fn list_conversations(&self, owner: OwningEntity) -> Result<Vec<ConversationTurn>> {
        if self.entity_status(owner).await?.is_none() {
            let entity = match owner {
                OwningEntity::Document(_) => "document",
                OwningEntity::Session(_) => "session",
            };
            return Err(RegistryError::not_found(entity, owner.id()));
        }

        let rows = sqlx::query(
            "SELECT id, owner_kind, owner_id, question, answer, degraded, created_at \
             FROM conversations WHERE owner_kind = ? AND owner_id = ? \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(owner.kind())
        .bind(owner.id())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(turn_from_row).collect())
    }
}
