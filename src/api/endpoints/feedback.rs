//! `POST /api/chatbot/feedback` — rate a bot answer.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use super::Checks;
use crate::api::error::ApiError;
use crate::api::types::{success, ApiContext, Caller};
use crate::feedback;
use crate::models::{FeedbackCategory, NewFeedback, MAX_RATING, MIN_RATING};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackBody {
    pub rating: Option<i64>,
    pub category: Option<String>,
    /// Free-text comment.
    pub feedback: Option<String>,
    pub conversation_id: Option<String>,
    pub message_id: Option<String>,
}

pub async fn submit(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<FeedbackBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload?;

    let mut checks = Checks::default();
    let rating = body.rating.filter(|r| (MIN_RATING..=MAX_RATING).contains(r));
    if rating.is_none() {
        checks.fail("rating", "Rating must be between 1 and 5");
    }
    let category: Option<FeedbackCategory> =
        checks.required("category", body.category.as_deref(), "Invalid category");
    checks.finish()?;

    let (Some(rating), Some(category)) = (rating, category) else {
        return Err(ApiError::invalid("rating", "Rating must be between 1 and 5"));
    };

    let entry = NewFeedback {
        comment: body.feedback,
        conversation_id: body.conversation_id,
        message_id: body.message_id,
        ..NewFeedback::new(rating, category)
    };

    let feedback_id = ctx
        .db
        .with_conn(|conn| feedback::submit(conn, caller.id(), entry))?;

    Ok(Json(success(json!({
        "message": "Feedback submitted successfully",
        "feedbackId": feedback_id,
    }))))
}
