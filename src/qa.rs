//! Retrieval-augmented answering.
//!
//! [`answer_question`] runs the whole pipeline for one question:
//!
//! 1. Resolve the owning entity in the registry. Unknown entity:
//!    [`QaError::EntityNotFound`], and the index is never touched.
//! 2. Retrieve the top-k chunks from the entity's namespace. An entity that
//!    exists but was never indexed: [`QaError::RetrievalUnavailable`].
//! 3. Build the grounding prompt and call the language model once, under a
//!    timeout. Any model failure becomes [`Answer::Degraded`].
//! 4. Append the (question, answer) pair to the entity's conversation.
//!
//! There is no answer cache and no conversational memory; earlier turns
//! are stored for display only.

use thiserror::Error;

use docqa_core::index::{IndexError, Namespace};
use docqa_core::models::{OwningEntity, RetrievedChunk};
use docqa_core::prompt::{build_grounding_prompt, degraded_answer};

use crate::context::AppContext;
use crate::models::{ConversationTurn, IndexStatus};
use crate::registry::RegistryError;

/// Result of a successful pipeline run.
#[derive(Debug, Clone)]
pub enum Answer {
    /// The model answered from the retrieved context.
    Grounded {
        text: String,
        sources: Vec<RetrievedChunk>,
    },
    /// The model call failed; `text` is the apology shown to the user.
    Degraded { text: String, error: String },
}

impl Answer {
    pub fn text(&self) -> &str {
        match self {
            Answer::Grounded { text, .. } | Answer::Degraded { text, .. } => text,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Answer::Degraded { .. })
    }
}

/// Structural failures. Model failures are not errors; see [`Answer::Degraded`].
#[derive(Debug, Error)]
pub enum QaError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    EntityNotFound(OwningEntity),
    #[error("{0} has not been indexed; retrieval is unavailable")]
    RetrievalUnavailable(OwningEntity),
    #[error(transparent)]
    Index(IndexError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone)]
pub struct QaOutcome {
    pub answer: Answer,
    pub turn: ConversationTurn,
}

pub async fn answer_question(
    ctx: &AppContext,
    entity: OwningEntity,
    question: &str,
) -> Result<QaOutcome, QaError> {
    if question.trim().is_empty() {
        return Err(QaError::Validation("question must not be empty".to_string()));
    }

    match ctx.registry.entity_status(entity).await? {
        None => return Err(QaError::EntityNotFound(entity)),
        Some(IndexStatus::Indexed) => {}
        Some(status) => {
            tracing::warn!(%entity, %status, "query against entity without an index");
            return Err(QaError::RetrievalUnavailable(entity));
        }
    }

    let namespace = Namespace::for_entity(entity);
    let context = ctx
        .index
        .query(&namespace, question, ctx.top_k())
        .await
        .map_err(|e| match e {
            IndexError::NamespaceNotFound(_) => QaError::RetrievalUnavailable(entity),
            other => QaError::Index(other),
        })?;

    tracing::debug!(%entity, hits = context.len(), "retrieved context");

    let prompt = build_grounding_prompt(question, &context);
    let timeout = ctx.llm_timeout();

    let answer = match tokio::time::timeout(timeout, ctx.llm.generate(&prompt)).await {
        Ok(Ok(text)) => Answer::Grounded {
            text,
            sources: context,
        },
        Ok(Err(e)) => degrade(entity, format!("{:#}", e)),
        Err(_) => degrade(
            entity,
            format!("language model timed out after {}s", timeout.as_secs()),
        ),
    };

    let turn = ctx
        .registry
        .record_turn(entity, question, answer.text(), answer.is_degraded())
        .await?;

    Ok(QaOutcome { answer, turn })
}

fn degrade(entity: OwningEntity, error: String) -> Answer {
    tracing::warn!(%entity, error = %error, "language model call failed; returning degraded answer");
    Answer::Degraded {
        text: degraded_answer(&error),
        error,
    }
}
