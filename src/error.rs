//! Service-level error taxonomy.
//!
//! Each module reports its own typed error; they all fold into [`Error`],
//! whose variant decides the HTTP status and the machine-readable `code`
//! in the JSON error envelope.
//!
//! | Variant | Status | Code |
//! |---------|--------|------|
//! | `Validation` | 400 | `bad_request` |
//! | `NotFound` | 404 | `not_found` |
//! | `Extraction` | 500 | `extraction_failed` |
//! | `ModelCall` | 502 | `model_call_failed` |
//! | `RetrievalUnavailable` | 503 | `retrieval_unavailable` |
//! | `Persistence` | 500 | `internal` |

use thiserror::Error;

use docqa_core::index::IndexError;

use crate::extract::ExtractError;
use crate::qa::QaError;
use crate::registry::RegistryError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Extraction(#[from] ExtractError),

    #[error("{0}")]
    RetrievalUnavailable(String),

    /// The embedding model failed outside the answering step.
    #[error("model call failed: {0}")]
    ModelCall(String),

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl Error {
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            Error::Extraction(_) => 500,
            Error::ModelCall(_) => 502,
            Error::RetrievalUnavailable(_) => 503,
            Error::Persistence(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "bad_request",
            Error::NotFound(_) => "not_found",
            Error::Extraction(_) => "extraction_failed",
            Error::ModelCall(_) => "model_call_failed",
            Error::RetrievalUnavailable(_) => "retrieval_unavailable",
            Error::Persistence(_) => "internal",
        }
    }
}

impl From<RegistryError> for Error {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound { .. } => Error::NotFound(err.to_string()),
            RegistryError::Validation(msg) => Error::Validation(msg),
            RegistryError::Database(e) => Error::Persistence(e.to_string()),
        }
    }
}

impl From<IndexError> for Error {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::NamespaceNotFound(ns) => {
                Error::RetrievalUnavailable(format!("namespace {} has not been indexed", ns))
            }
            IndexError::Embedding(_) | IndexError::VectorCountMismatch { .. } => {
                Error::ModelCall(err.to_string())
            }
            IndexError::Storage(_) => Error::Persistence(err.to_string()),
        }
    }
}

impl From<QaError> for Error {
    fn from(err: QaError) -> Self {
        match err {
            QaError::Validation(msg) => Error::Validation(msg),
            QaError::EntityNotFound(_) => Error::NotFound(err.to_string()),
            QaError::RetrievalUnavailable(_) => Error::RetrievalUnavailable(err.to_string()),
            QaError::Index(e) => e.into(),
            QaError::Registry(e) => e.into(),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Persistence(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Persistence(err.to_string())
    }
}
