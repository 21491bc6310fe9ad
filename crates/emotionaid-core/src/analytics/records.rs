//! Rows of the analytics tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// End-of-session mood score given by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRating {
    pub user_id: String,
    pub date: DateTime<Utc>,
    /// 1 (bad) to 5 (great)
    pub score: u8,
}

/// Points awarded for using the app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsEntry {
    pub user_id: String,
    pub date: DateTime<Utc>,
    pub amount: i64,
    /// What earned the points, e.g. `message` or `diary`
    pub source: String,
}

/// Result of classifying the emotion of a text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionAnalysis {
    pub emotion: String,
    /// 0.0 to 1.0
    pub confidence: f64,
    pub is_sarcasm: bool,
    /// Which analyzer produced the result
    pub source: String,
}

/// A stored [`EmotionAnalysis`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionLog {
    pub user_id: String,
    pub date: DateTime<Utc>,
    #[serde(flatten)]
    pub analysis: EmotionAnalysis,
}
