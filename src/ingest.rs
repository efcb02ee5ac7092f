//! Upload and namespace lifecycle.
//!
//! # Upload
//!
//! ```text
//! PDF bytes → save under upload_dir → extract → chunk
//!           → register (pending) → index doc_<id> → mark indexed | unindexed
//! ```
//!
//! The registry row exists before indexing starts so that a failed
//! embedding call leaves an `unindexed` record behind rather than nothing.
//! Queries against it report retrieval as unavailable.
//!
//! # Sessions
//!
//! A session namespace is assembled from the stored entries of its member
//! documents' namespaces; vectors are copied, not recomputed, and each
//! entry keeps its source document id. If any member was never indexed
//! the session is marked `unindexed`.
//!
//! # Deletes
//!
//! Deleting a document or session drops its namespace. Sessions that
//! contained a deleted document are rebuilt from their remaining members.

use sha2::{Digest, Sha256};
use std::path::Path;

use docqa_core::chunk::chunk_text;
use docqa_core::index::{IndexEntry, IndexError, Namespace};
use docqa_core::models::Chunk;

use crate::context::AppContext;
use crate::error::Error;
use crate::extract::{extract_pdf_text, ExtractError};
use crate::models::{DocumentRecord, IndexStatus, NewDocument, SessionSummary};

/// Strip any directory components and require a `.pdf` extension.
fn pdf_file_name(filename: &str) -> Result<String, Error> {
    let name = Path::new(filename.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_string();

    if name.is_empty() {
        return Err(Error::Validation("file name must not be empty".to_string()));
    }
    if !name.to_lowercase().ends_with(".pdf") {
        return Err(Error::Validation("Only PDF files are allowed".to_string()));
    }
    Ok(name)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Store, extract, chunk and index one uploaded PDF.
pub async fn ingest_pdf(
    ctx: &AppContext,
    filename: &str,
    bytes: &[u8],
    topic_id: Option<i64>,
) -> Result<DocumentRecord, Error> {
    let filename = pdf_file_name(filename)?;

    let upload_dir = &ctx.config.storage.upload_dir;
    tokio::fs::create_dir_all(upload_dir).await?;
    let owned = bytes.to_vec();
    let text = extract_blocking(move || extract_pdf_text(&owned)).await?;

    // Only extractable files reach the upload directory.
    let stored_path = upload_dir.join(&filename);
    tokio::fs::write(&stored_path, bytes).await?;
    tracing::info!(file = %stored_path.display(), bytes = bytes.len(), "stored upload");

    let doc = NewDocument {
        filename,
        file_size: bytes.len() as i64,
        topic_id,
        sha256: sha256_hex(bytes),
    };
    ingest_text(ctx, doc, &text).await
}

/// Run an extractor on the blocking pool. A panic inside the PDF parser is
/// reported as an extraction failure.
async fn extract_blocking<F>(extract: F) -> Result<String, ExtractError>
where
    F: FnOnce() -> Result<String, ExtractError> + Send + 'static,
{
    tokio::task::spawn_blocking(extract)
        .await
        .map_err(|e| ExtractError::Pdf(format!("extraction task failed: {}", e)))?
}

/// Register a document and index already-extracted text into `doc_<id>`.
pub async fn ingest_text(
    ctx: &AppContext,
    doc: NewDocument,
    text: &str,
) -> Result<DocumentRecord, Error> {
    if let Some(earlier) = ctx.registry.find_document_by_sha256(&doc.sha256).await? {
        tracing::warn!(
            filename = %doc.filename,
            earlier_document_id = earlier,
            "identical content was uploaded before; indexing again"
        );
    }

    let params = ctx
        .config
        .chunking
        .params()
        .map_err(|e| Error::Validation(format!("{:#}", e)))?;
    let texts = chunk_text(text, params);
    if texts.is_empty() {
        tracing::warn!(filename = %doc.filename, "no extractable text; document has no chunks");
    }

    let record = ctx.registry.insert_document(&doc).await?;
    let chunks = Chunk::sequence(record.id, texts);

    match ctx
        .index
        .insert(&Namespace::document(record.id), &chunks)
        .await
    {
        Ok(written) => {
            ctx.registry.mark_document_indexed(record.id, written).await?;
            tracing::info!(document_id = record.id, chunks = written, "document indexed");
        }
        Err(e) => {
            tracing::error!(document_id = record.id, error = %e, "indexing failed");
            ctx.registry
                .mark_document_unindexed(record.id, chunks.len())
                .await?;
            return Err(e.into());
        }
    }

    Ok(ctx.registry.get_document(record.id).await?)
}

/// Create a chat session over existing documents and build its namespace.
pub async fn create_session(
    ctx: &AppContext,
    name: &str,
    document_ids: &[i64],
) -> Result<SessionSummary, Error> {
    let session = ctx.registry.create_session(name, document_ids).await?;
    build_session_namespace(ctx, session.id).await?;
    Ok(ctx.registry.get_session(session.id).await?.summary)
}

/// Copy every member document's entries into `session_<id>`.
///
/// Records and returns the resulting session status.
async fn build_session_namespace(ctx: &AppContext, session_id: i64) -> Result<IndexStatus, Error> {
    let store = ctx.index.store();
    let member_ids = ctx.registry.session_document_ids(session_id).await?;

    let mut entries: Vec<IndexEntry> = Vec::new();
    let mut status = if member_ids.is_empty() {
        IndexStatus::Unindexed
    } else {
        IndexStatus::Indexed
    };

    for doc_id in &member_ids {
        match store.entries(&Namespace::document(*doc_id)).await {
            Ok(found) => entries.extend(found),
            Err(IndexError::NamespaceNotFound(_)) => {
                tracing::warn!(session_id, document_id = doc_id, "member document has no index");
                status = IndexStatus::Unindexed;
                break;
            }
            Err(e) => {
                ctx.registry
                    .set_session_status(session_id, IndexStatus::Unindexed)
                    .await?;
                return Err(e.into());
            }
        }
    }

    if status == IndexStatus::Indexed {
        let written = match store
            .add_entries(&Namespace::session(session_id), entries)
            .await
        {
            Ok(n) => n,
            Err(e) => {
                ctx.registry
                    .set_session_status(session_id, IndexStatus::Unindexed)
                    .await?;
                return Err(e.into());
            }
        };
        tracing::info!(session_id, documents = member_ids.len(), chunks = written, "session indexed");
    }

    ctx.registry.set_session_status(session_id, status).await?;
    Ok(status)
}

/// Delete a document, drop its namespace, and rebuild sessions that held it.
pub async fn delete_document(ctx: &AppContext, document_id: i64) -> Result<(), Error> {
    let affected = ctx.registry.sessions_with_document(document_id).await?;
    let doc = ctx.registry.delete_document(document_id).await?;
    ctx.index
        .store()
        .drop_namespace(&Namespace::document(document_id))
        .await?;

    let stored = ctx.config.storage.upload_dir.join(&doc.filename);
    if let Err(e) = tokio::fs::remove_file(&stored).await {
        tracing::debug!(file = %stored.display(), error = %e, "stored upload not removed");
    }

    for session_id in affected {
        ctx.index
            .store()
            .drop_namespace(&Namespace::session(session_id))
            .await?;
        build_session_namespace(ctx, session_id).await?;
    }

    tracing::info!(document_id, "document deleted");
    Ok(())
}

/// Delete a session with its conversations, and drop its namespace.
pub async fn delete_session(ctx: &AppContext, session_id: i64) -> Result<(), Error> {
    ctx.registry.delete_session(session_id).await?;
    ctx.index
        .store()
        .drop_namespace(&Namespace::session(session_id))
        .await?;
    tracing::info!(session_id, "session deleted");
    Ok(())
}
