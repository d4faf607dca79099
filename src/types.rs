use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cluster::{Assignment, AssignmentKind, TopicId};

/// A document as written by the ingest stage. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Store key. Filled from the URL or message when the body omits it.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Ingest writes the abstract under `summary`; both names are accepted.
    #[serde(default, alias = "summary")]
    pub body_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>, body_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body_text: body_text.into(),
            link: None,
        }
    }

    /// Text handed to the embedding provider: `title` and `body_text`
    /// separated by one space.
    pub fn embedding_text(&self) -> String {
        let title = self.title.trim();
        let body = self.body_text.trim();
        match (title.is_empty(), body.is_empty()) {
            (false, false) => format!("{title} {body}"),
            (false, true) => title.to_string(),
            _ => body.to_string(),
        }
    }
}

/// Outcome of analyzing one document. Rewritten in full on every
/// (re)delivery of the same `doc_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub doc_id: String,
    pub topic_id: TopicId,
    /// Raw cosine similarity in `[-1, 1]`.
    pub similarity_score: f64,
    /// `round(max(0, similarity) * 100)`, clamped to `[0, 100]`.
    pub score: u8,
    pub assignment: AssignmentKind,
    pub model: String,
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn from_assignment(doc_id: &str, assignment: &Assignment, model: &str) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            topic_id: assignment.topic_id,
            similarity_score: assignment.similarity,
            score: assignment.score_percent(),
            assignment: assignment.kind,
            model: model.to_string(),
            analyzed_at: Utc::now(),
        }
    }
}

/// Work item exchanged between stages: just the document id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMessage {
    pub doc_id: String,
}

impl StageMessage {
    pub fn new(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
        }
    }
}
