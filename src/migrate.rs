//! Idempotent schema creation.
//!
//! Every statement is `CREATE ... IF NOT EXISTS`, so running the migrations
//! against an existing database is a no-op. Timestamps are stored as Unix
//! seconds.

use anyhow::Result;
use sqlx::SqlitePool;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS topics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        filename TEXT NOT NULL,
        uploaded_at INTEGER NOT NULL,
        file_size INTEGER NOT NULL,
        chunk_count INTEGER NOT NULL DEFAULT 0,
        topic_id INTEGER REFERENCES topics(id) ON DELETE SET NULL,
        sha256 TEXT NOT NULL,
        index_status TEXT NOT NULL DEFAULT 'pending'
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_documents_sha256 ON documents(sha256)",
    "CREATE INDEX IF NOT EXISTS idx_documents_topic ON documents(topic_id)",
    r#"
    CREATE TABLE IF NOT EXISTS research_papers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        topic_id INTEGER NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        authors TEXT NOT NULL,
        abstract TEXT NOT NULL,
        year INTEGER NOT NULL,
        citations INTEGER NOT NULL,
        views INTEGER NOT NULL,
        pdf_link TEXT,
        publisher_link TEXT,
        source TEXT,
        saved_at INTEGER NOT NULL,
        UNIQUE(topic_id, title)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chat_sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        index_status TEXT NOT NULL DEFAULT 'pending'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS session_documents (
        session_id INTEGER NOT NULL REFERENCES chat_sessions(id) ON DELETE CASCADE,
        document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        PRIMARY KEY (session_id, document_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS conversations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_kind TEXT NOT NULL,
        owner_id INTEGER NOT NULL,
        question TEXT NOT NULL,
        answer TEXT NOT NULL,
        degraded INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_conversations_owner ON conversations(owner_kind, owner_id)",
    r#"
    CREATE TABLE IF NOT EXISTS namespaces (
        name TEXT PRIMARY KEY,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS index_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        namespace TEXT NOT NULL REFERENCES namespaces(name) ON DELETE CASCADE,
        document_id INTEGER NOT NULL,
        chunk_index INTEGER NOT NULL,
        text TEXT NOT NULL,
        dims INTEGER NOT NULL,
        embedding BLOB NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_index_entries_namespace ON index_entries(namespace)",
];

/// Create every table and index used by the registry and the vector index.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
