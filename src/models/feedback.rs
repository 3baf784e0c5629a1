use chrono::{DateTime, Utc};
use serde::Serialize;

use super::enums::FeedbackCategory;

pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;
pub const MAX_COMMENT_CHARS: usize = 500;

/// Stored feedback. `conversation_id` and `message_id` are weak references:
/// kept for lookup, never validated for existence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: String,
    pub owner_id: String,
    pub conversation_id: Option<String>,
    pub message_id: Option<String>,
    pub rating: u8,
    pub category: FeedbackCategory,
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Feedback as submitted, before validation.
#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub rating: i64,
    pub category: FeedbackCategory,
    pub comment: Option<String>,
    pub conversation_id: Option<String>,
    pub message_id: Option<String>,
}

impl NewFeedback {
    pub fn new(rating: i64, category: FeedbackCategory) -> Self {
        Self {
            rating,
            category,
            comment: None,
            conversation_id: None,
            message_id: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}
