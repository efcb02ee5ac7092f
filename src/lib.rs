//! # docqa
//!
//! Retrieval-augmented question answering over uploaded PDF documents.
//!
//! Users upload PDFs, group them into chat sessions, and ask questions.
//! Each question is answered by a language model grounded in the chunks
//! most similar to it, retrieved from the session's own vector namespace.
//! A small catalogue of research papers (searched on Semantic Scholar and
//! arXiv, saved under topics) sits alongside.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Upload  │──▶│ Extract+Chunk│──▶│ SQLite index  │
//! │  (PDF)   │   │   +Embed     │   │ doc_/session_ │
//! └──────────┘   └──────────────┘   └──────┬───────┘
//!                                          │ top-k
//!                  ┌──────────┐      ┌─────▼──────┐
//!                  │ Registry │◀─────│  Q&A + LLM │
//!                  └──────────┘      └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`context`] | Shared application context |
//! | [`db`] | Database connection |
//! | [`embedding`] | Embedding providers |
//! | [`error`] | Service error taxonomy |
//! | [`extract`] | PDF text extraction |
//! | [`ingest`] | Upload pipeline, session indexing, deletes |
//! | [`llm`] | Language-model providers |
//! | [`migrate`] | Schema migrations |
//! | [`models`] | Registry records |
//! | [`papers`] | External paper search |
//! | [`qa`] | Question answering pipeline |
//! | [`registry`] | Documents, sessions, topics, conversations |
//! | [`server`] | JSON HTTP API |
//! | [`sqlite_index`] | SQLite-backed vector store |

pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod papers;
pub mod qa;
pub mod registry;
pub mod server;
pub mod sqlite_index;
