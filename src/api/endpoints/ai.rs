//! AI proxy endpoints, mounted under `/api/ai`.
//!
//! - `POST /chat` — ask the assistant (chat throttle window)
//! - `POST /analyze-image` — diagnose a crop photo (image throttle window)
//! - `POST /translate` — translate agricultural text
//! - `GET /conversation[/:user_id]` — stored history, cross-user for admins
//! - `GET /health` — inference service liveness, no auth

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use super::conversation::ConversationView;
use super::Checks;
use crate::api::error::{ApiError, UPSTREAM_UNAVAILABLE};
use crate::api::types::{success, ApiContext, Caller};
use crate::conversation;
use crate::inference::{ChatRequest, ImageAnalysisRequest, TranslateRequest};
use crate::models::{Language, TranslationLanguage, MAX_CONTENT_CHARS};
use crate::upload::read_image_upload;

const MAX_TRANSLATE_CHARS: usize = 2000;
const DEFAULT_TRANSLATE_CONTEXT: &str = "agricultural";

#[derive(Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub message: String,
    pub language: Option<String>,
    pub context: Option<Value>,
}

/// `POST /api/ai/chat` — forward a question to the assistant.
pub async fn chat(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload?;
    let message = body.message.trim();

    let mut checks = Checks::default();
    checks.length(
        "message",
        message,
        1,
        MAX_CONTENT_CHARS,
        "Message must be between 1 and 1000 characters",
    );
    let language: Option<Language> = checks.optional(
        "language",
        body.language.as_deref(),
        "Language must be either en or ml",
    );
    checks.finish()?;

    let request = ChatRequest {
        message: message.to_string(),
        user_id: caller.id().to_string(),
        language: language.unwrap_or_default(),
        context: body.context.unwrap_or_else(|| json!({})),
    };

    let reply = ctx
        .inference
        .chat(&request, &caller.token)
        .await
        .map_err(|e| ApiError::upstream("Failed to process your question. Please try again.", e))?;

    let intent = reply
        .metadata
        .as_ref()
        .and_then(|m| m.get("intent"))
        .and_then(Value::as_str)
        .unwrap_or("-");
    tracing::info!(user = caller.id(), intent, "Chat interaction");

    Ok(Json(success(json!({
        "response": reply.response,
        "metadata": reply.metadata,
        "suggestions": reply.suggestions,
    }))))
}

/// `POST /api/ai/analyze-image` — multipart `image` plus optional
/// `description` and `language`.
pub async fn analyze_image(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::invalid("body", e.body_text()))?;
    let upload = read_image_upload(&ctx.upload_policy, &mut multipart).await?;

    tracing::info!(
        user = caller.id(),
        bytes = upload.bytes.len(),
        mime = %upload.mime_type,
        "Image analysis request"
    );

    let request = ImageAnalysisRequest {
        user_id: caller.id().to_string(),
        upload,
    };
    let reply = ctx
        .inference
        .analyze_image(&request, &caller.token)
        .await
        .map_err(|e| ApiError::upstream("Failed to analyze image. Please try again.", e))?;

    Ok(Json(success(Value::Object(reply))))
}

#[derive(Deserialize)]
pub struct TranslateBody {
    #[serde(default)]
    pub text: String,
    pub from_lang: Option<String>,
    pub to_lang: Option<String>,
    pub context: Option<String>,
}

/// `POST /api/ai/translate`
pub async fn translate(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<TranslateBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload?;

    let mut checks = Checks::default();
    checks.length(
        "text",
        &body.text,
        1,
        MAX_TRANSLATE_CHARS,
        "Text must be between 1 and 2000 characters",
    );
    let from_lang: Option<TranslationLanguage> =
        checks.required("from_lang", body.from_lang.as_deref(), "Invalid source language");
    let to_lang: Option<TranslationLanguage> =
        checks.required("to_lang", body.to_lang.as_deref(), "Invalid target language");
    checks.finish()?;

    let (Some(from_lang), Some(to_lang)) = (from_lang, to_lang) else {
        return Err(ApiError::invalid("from_lang", "Invalid source language"));
    };

    let request = TranslateRequest {
        text: body.text,
        from_lang,
        to_lang,
        context: body
            .context
            .unwrap_or_else(|| DEFAULT_TRANSLATE_CONTEXT.to_string()),
    };
    let reply = ctx
        .inference
        .translate(&request, &caller.token)
        .await
        .map_err(|e| ApiError::upstream("Translation failed", e))?;

    Ok(Json(success(Value::Object(reply))))
}

/// `GET /api/ai/conversation` — the caller's own history.
pub async fn own_history(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Value>, ApiError> {
    history(&ctx, &caller, caller.id())
}

/// `GET /api/ai/conversation/:user_id` — another user's history (admin only
/// unless `user_id` is the caller).
pub async fn user_history(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    history(&ctx, &caller, &user_id)
}

fn history(ctx: &ApiContext, caller: &Caller, owner_id: &str) -> Result<Json<Value>, ApiError> {
    if owner_id != caller.id() && !caller.is_admin() {
        tracing::warn!(user = caller.id(), requested = owner_id, "Cross-user history denied");
        return Err(ApiError::Forbidden("Access denied"));
    }

    let conversation = ctx
        .db
        .with_conn(|conn| conversation::get_active(conn, owner_id))?;

    Ok(Json(success(json!({
        "conversation": ConversationView::full(&conversation),
    }))))
}

/// `GET /api/ai/health` — 200 when the inference service answers, 503 otherwise.
pub async fn health(State(ctx): State<ApiContext>) -> Response {
    match ctx.inference.health().await {
        Ok(ai_service) => Json(json!({
            "status": "healthy",
            "ai_service": ai_service,
        }))
        .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Inference service health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "error": "AI service unavailable",
                    "message": UPSTREAM_UNAVAILABLE,
                })),
            )
                .into_response()
        }
    }
}
