//! Core data models shared by the ingestion and answering pipelines.

use serde::Serialize;
use std::fmt;

/// A bounded slice of a document's extracted text.
///
/// Chunks are the unit of embedding and retrieval. The `document_id` is
/// always the id of the document the text came from, even when the chunk
/// is stored in a session namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub document_id: i64,
    pub chunk_index: i64,
    pub text: String,
}

impl Chunk {
    /// Tag an ordered sequence of chunk texts with their owning document.
    pub fn sequence(document_id: i64, texts: Vec<String>) -> Vec<Chunk> {
        texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Chunk {
                document_id,
                chunk_index: i as i64,
                text,
            })
            .collect()
    }
}

/// The entity a namespace (and a conversation turn) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwningEntity {
    Document(i64),
    Session(i64),
}

impl OwningEntity {
    /// Short kind label persisted alongside conversation turns.
    pub fn kind(&self) -> &'static str {
        match self {
            OwningEntity::Document(_) => "document",
            OwningEntity::Session(_) => "session",
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            OwningEntity::Document(id) | OwningEntity::Session(id) => *id,
        }
    }
}

impl fmt::Display for OwningEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

/// One hit from a namespaced similarity query.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub score: f32,
    /// Provenance: the document this chunk was extracted from.
    pub document_id: i64,
    pub chunk_index: i64,
}
