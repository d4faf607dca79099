use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dense, monotonically assigned topic identifier.
///
/// Rendered as `T<n>` (`T1`, `T2`, ...) and ordered numerically, so `T2 < T10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TopicId(u32);

impl TopicId {
    /// The first id handed out on an empty store.
    pub const FIRST: TopicId = TopicId(1);

    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }

    /// Id following `self` in allocation order.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

impl FromStr for TopicId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('T').unwrap_or(s);
        digits
            .parse::<u32>()
            .map(TopicId)
            .map_err(|_| format!("invalid topic id: {s:?}"))
    }
}

impl TryFrom<String> for TopicId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TopicId> for String {
    fn from(value: TopicId) -> Self {
        value.to_string()
    }
}

/// Representative vector of one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub topic_id: TopicId,
    pub vector: Vec<f32>,
    /// Number of EMA updates applied since creation (0 for a fresh topic).
    pub update_count: u64,
}

impl Centroid {
    pub fn new(topic_id: TopicId, vector: Vec<f32>) -> Self {
        Self {
            topic_id,
            vector,
            update_count: 0,
        }
    }

    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// How a document ended up in its topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentKind {
    /// The document opened a new topic and is its initial centroid.
    Created,
    /// The best topic met the similarity threshold.
    Matched,
    /// `max_topics` was reached; assigned to the best topic below threshold.
    Forced,
}

impl AssignmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentKind::Created => "created",
            AssignmentKind::Matched => "matched",
            AssignmentKind::Forced => "forced",
        }
    }
}

/// Result of clustering one embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub topic_id: TopicId,
    /// Cosine similarity in `[-1, 1]`; `1.0` for a freshly created topic.
    pub similarity: f64,
    pub kind: AssignmentKind,
    /// Centroid `update_count` after this assignment was persisted.
    pub update_count: u64,
    /// Store round-trips spent (1 when nothing conflicted).
    pub attempts: u32,
}

impl Assignment {
    /// Similarity as the externally reported percentage, `round(max(0, s) * 100)`.
    pub fn score_percent(&self) -> u8 {
        score_percent(self.similarity)
    }
}

pub(crate) fn score_percent(similarity: f64) -> u8 {
    if !similarity.is_finite() {
        return 0;
    }
    (similarity.max(0.0) * 100.0).round().min(100.0) as u8
}
