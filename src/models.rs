//! Registry records returned by the HTTP API and the CLI.
//!
//! Timestamps are stored as Unix seconds and rendered as ISO 8601 strings
//! on the way out.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether an entity's namespace can be queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    /// Registered; indexing has not finished.
    Pending,
    Indexed,
    /// Indexing failed; the namespace is absent or incomplete.
    Unindexed,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Pending => "pending",
            IndexStatus::Indexed => "indexed",
            IndexStatus::Unindexed => "unindexed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(IndexStatus::Pending),
            "indexed" => Some(IndexStatus::Indexed),
            "unindexed" => Some(IndexStatus::Unindexed),
            _ => None,
        }
    }
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub filename: String,
    pub upload_date: String,
    pub file_size: i64,
    pub chunk_count: i64,
    pub topic_id: Option<i64>,
    pub sha256: String,
    pub index_status: IndexStatus,
}

/// Metadata for a document about to be registered.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub filename: String,
    pub file_size: i64,
    pub topic_id: Option<i64>,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicSummary {
    pub id: i64,
    pub name: String,
    pub created_date: String,
    pub paper_count: i64,
}

/// A normalized academic paper, as produced by search and accepted by save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub title: String,
    pub authors: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub year: i32,
    pub citations: i64,
    pub views: i64,
    #[serde(default)]
    pub pdf_link: Option<String>,
    #[serde(default)]
    pub publisher_link: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl PaperRecord {
    /// Reject records that cannot be stored meaningfully.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("paper title must not be empty".to_string());
        }
        if self.authors.trim().is_empty() {
            return Err("paper authors must not be empty".to_string());
        }
        if !(0..=9999).contains(&self.year) {
            return Err(format!("paper year out of range: {}", self.year));
        }
        if self.citations < 0 || self.views < 0 {
            return Err("paper citations and views must be non-negative".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredPaper {
    pub id: i64,
    pub topic_id: i64,
    #[serde(flatten)]
    pub paper: PaperRecord,
    pub saved_date: String,
}

/// Outcome of saving a paper under a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SavedPaper {
    pub paper_id: i64,
    pub topic_id: i64,
    /// `false` when the (title, topic) pair already existed.
    pub created: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: i64,
    pub name: String,
    pub created_date: String,
    pub document_count: i64,
    pub index_status: IndexStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub summary: SessionSummary,
    pub documents: Vec<DocumentRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationTurn {
    pub id: i64,
    pub owner_kind: String,
    pub owner_id: i64,
    pub question: String,
    pub answer: String,
    pub degraded: bool,
    pub timestamp: String,
}

pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper() -> PaperRecord {
        PaperRecord {
            title: "Attention Is All You Need".to_string(),
            authors: "Vaswani, Shazeer".to_string(),
            abstract_text: "Transformers.".to_string(),
            year: 2017,
            citations: 100,
            views: 0,
            pdf_link: None,
            publisher_link: None,
            source: Some("arXiv".to_string()),
        }
    }

    #[test]
    fn test_paper_validation() {
        assert!(paper().validate().is_ok());
        assert!(PaperRecord {
            title: "  ".to_string(),
            ..paper()
        }
        .validate()
        .is_err());
        assert!(PaperRecord {
            citations: -1,
            ..paper()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_paper_json_uses_abstract_key() {
        let json = serde_json::to_value(paper()).unwrap();
        assert_eq!(json["abstract"], "Transformers.");
        let back: PaperRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, paper());
    }

    #[test]
    fn test_paper_missing_required_field_rejected() {
        let json = serde_json::json!({"title": "x", "authors": "y", "year": 2020});
        assert!(serde_json::from_value::<PaperRecord>(json).is_err());
    }

    #[test]
    fn test_index_status_round_trip() {
        for status in [IndexStatus::Pending, IndexStatus::Indexed, IndexStatus::Unindexed] {
            assert_eq!(IndexStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(IndexStatus::parse("bogus"), None);
    }

    #[test]
    fn test_format_ts_iso() {
        assert_eq!(format_ts_iso(0), "1970-01-01T00:00:00Z");
    }
}
