//! # DocQA Core
//!
//! Runtime-independent logic for DocQA: data models, the overlapping text
//! chunker, the embedding trait, the namespaced vector index abstraction,
//! and grounding-prompt construction.
//!
//! This crate contains no tokio, sqlx, HTTP clients, or filesystem I/O.
//! Concrete embedders, language models and the SQLite-backed index live in
//! the `docqa` application crate.

pub mod chunk;
pub mod embedding;
pub mod index;
pub mod models;
pub mod prompt;
