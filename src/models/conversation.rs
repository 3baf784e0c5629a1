use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{Language, MessageRole};
use crate::db::DatabaseError;

/// Messages retained per conversation; older ones are dropped on append.
pub const MAX_HISTORY: usize = 50;
/// Messages returned by the default conversation view.
pub const RECENT_WINDOW: usize = 10;
/// Message content length bounds, in characters.
pub const MAX_CONTENT_CHARS: usize = 1000;

/// Free-form key/value payload carried with a message. Not interpreted by the store.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Farming context attached to a conversation. Updates merge field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub farming_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_season: Option<String>,
}

impl ConversationContext {
    /// Shallow merge: fields present in `update` overwrite, absent ones are kept.
    pub fn merge(&mut self, update: ConversationContext) {
        fn take(slot: &mut Option<String>, value: Option<String>) {
            if value.is_some() {
                *slot = value;
            }
        }
        take(&mut self.crop, update.crop);
        take(&mut self.location, update.location);
        take(&mut self.farming_type, update.farming_type);
        take(&mut self.experience_level, update.experience_level);
        take(&mut self.current_season, update.current_season);
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    /// Serialized as `type`, the field name portal clients send and read.
    #[serde(rename = "type")]
    pub role: MessageRole,
    pub content: String,
    pub language: Language,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// A message about to be appended.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: MessageRole,
    pub content: String,
    pub language: Language,
    pub intent: Option<String>,
    pub confidence: Option<f64>,
    pub metadata: Option<Metadata>,
}

impl NewMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            language: Language::default(),
            intent: None,
            confidence: None,
            metadata: None,
        }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), DatabaseError> {
        let chars = self.content.chars().count();
        if chars == 0 || chars > MAX_CONTENT_CHARS {
            return Err(DatabaseError::constraint(
                "content",
                format!("Content must be between 1 and {MAX_CONTENT_CHARS} characters"),
            ));
        }
        if let Some(confidence) = self.confidence {
            if !confidence.is_finite() {
                return Err(DatabaseError::constraint("confidence", "Confidence must be numeric"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub owner_id: String,
    pub messages: Vec<Message>,
    pub context: ConversationContext,
    pub active: bool,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// The last `limit` messages, oldest first.
    pub fn recent(&self, limit: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(limit);
        &self.messages[start..]
    }
}
