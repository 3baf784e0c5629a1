//! Chatbot conversation endpoints, mounted under `/api/chatbot`.
//!
//! - `GET /conversation` — active conversation, last 10 messages
//! - `POST /conversation/message` — append a message
//! - `PUT /conversation/context` — merge farming context
//! - `DELETE /conversation` — retire all of the caller's conversations

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::Checks;
use crate::api::error::ApiError;
use crate::api::types::{success, ApiContext, Caller};
use crate::conversation;
use crate::models::{
    Conversation, ConversationContext, ExperienceLevel, Language, Message, MessageRole, Metadata,
    NewMessage, MAX_CONTENT_CHARS, RECENT_WINDOW,
};

/// Wire shape of a conversation: `{id, messages, context, lastActivity}`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView<'a> {
    pub id: &'a str,
    pub messages: &'a [Message],
    pub context: &'a ConversationContext,
    pub last_activity: DateTime<Utc>,
}

impl<'a> ConversationView<'a> {
    /// Every retained message.
    pub fn full(conversation: &'a Conversation) -> Self {
        Self::recent(conversation, conversation.messages.len())
    }

    pub fn recent(conversation: &'a Conversation, limit: usize) -> Self {
        Self {
            id: &conversation.id,
            messages: conversation.recent(limit),
            context: &conversation.context,
            last_activity: conversation.last_activity_at,
        }
    }
}

/// `GET /api/chatbot/conversation` — get or create the active conversation.
pub async fn get_conversation(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Value>, ApiError> {
    let conversation = ctx
        .db
        .with_conn(|conn| conversation::get_active_recent(conn, caller.id(), RECENT_WINDOW))?;

    Ok(Json(success(json!({
        "conversation": ConversationView::recent(&conversation, RECENT_WINDOW),
    }))))
}

#[derive(Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub language: Option<String>,
    pub intent: Option<String>,
    pub confidence: Option<f64>,
    pub metadata: Option<Metadata>,
}

/// `POST /api/chatbot/conversation/message`
pub async fn append_message(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<MessageBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload?;

    let mut checks = Checks::default();
    checks.length("content", &body.content, 1, MAX_CONTENT_CHARS, "Content required");
    let role: Option<MessageRole> =
        checks.required("type", body.kind.as_deref(), "Type must be user or bot");
    let language: Option<Language> =
        checks.optional("language", body.language.as_deref(), "Language must be either en or ml");
    checks.finish()?;

    let Some(role) = role else {
        return Err(ApiError::invalid("type", "Type must be user or bot"));
    };

    let message = NewMessage {
        intent: body.intent,
        confidence: body.confidence,
        metadata: body.metadata,
        ..NewMessage::new(role, body.content).with_language(language.unwrap_or_default())
    };

    let message_id = ctx
        .db
        .with_conn(|conn| conversation::append(conn, caller.id(), message))?;

    Ok(Json(success(json!({
        "message": "Message saved successfully",
        "messageId": message_id,
    }))))
}

/// `PUT /api/chatbot/conversation/context` — shallow merge.
pub async fn update_context(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<ConversationContext>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(update) = payload?;

    let mut checks = Checks::default();
    let _: Option<ExperienceLevel> = checks.optional(
        "experienceLevel",
        update.experience_level.as_deref(),
        "Experience level must be beginner, intermediate or expert",
    );
    checks.finish()?;

    let context = ctx
        .db
        .with_conn(|conn| conversation::merge_context(conn, caller.id(), update))?;

    Ok(Json(success(json!({
        "message": "Context updated successfully",
        "context": context,
    }))))
}

/// `DELETE /api/chatbot/conversation` — retire, never delete.
pub async fn clear(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Value>, ApiError> {
    ctx.db
        .with_conn(|conn| conversation::retire_all(conn, caller.id()))?;

    Ok(Json(success(json!({
        "message": "Conversation history cleared successfully",
    }))))
}
