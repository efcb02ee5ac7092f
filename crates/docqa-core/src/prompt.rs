//! Grounding prompt construction and the degraded-answer format.

use crate::models::RetrievedChunk;

/// Instructions placed before the retrieved context.
pub const GROUNDING_INSTRUCTIONS: &str = "Use the following pieces of context to answer the question at the end.\n\
If the context does not contain the answer, say that you don't know. Do not try to make up an answer.";

/// Prefix of every degraded answer.
pub const DEGRADED_PREFIX: &str = "I'm sorry, I encountered an error:";

/// Build the prompt sent to the language model.
///
/// Layout: instructions, then the chunk texts in retrieval rank order
/// separated by a blank line, then the literal question.
///
/// ```rust
/// use docqa_core::prompt::build_grounding_prompt;
///
/// let prompt = build_grounding_prompt("Who?", &[]);
/// assert!(prompt.ends_with("Question: Who?\n\nAnswer:"));
/// ```
pub fn build_grounding_prompt(question: &str, context: &[RetrievedChunk]) -> String {
    let joined = context
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "{}\n\nContext:\n{}\n\nQuestion: {}\n\nAnswer:",
        GROUNDING_INSTRUCTIONS, joined, question
    )
}

/// Apology returned in place of an answer when the model call fails.
pub fn degraded_answer(error: &str) -> String {
    format!("{} {}", DEGRADED_PREFIX, error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(text: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            text: text.to_string(),
            score,
            document_id: 1,
            chunk_index: 0,
        }
    }

    #[test]
    fn test_prompt_keeps_rank_order_and_question() {
        let prompt = build_grounding_prompt("What is X?", &[hit("first", 0.9), hit("second", 0.5)]);
        assert!(prompt.starts_with(GROUNDING_INSTRUCTIONS));
        assert!(prompt.contains("Context:\nfirst\n\nsecond\n\nQuestion: What is X?"));
        assert!(prompt.contains("don't know"));
    }

    #[test]
    fn test_degraded_answer_embeds_error() {
        let answer = degraded_answer("timed out after 60s");
        assert!(answer.starts_with("I'm sorry"));
        assert!(answer.ends_with("timed out after 60s"));
    }
}
