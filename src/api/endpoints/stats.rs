//! `GET /api/chatbot/stats` — usage statistics, admin only.

use axum::extract::State;
use axum::{Extension, Json};
use serde_json::{json, Value};

use crate::api::error::ApiError;
use crate::api::types::{success, ApiContext, Caller};
use crate::stats::compute_stats;

pub async fn usage(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Value>, ApiError> {
    if !caller.is_admin() {
        return Err(ApiError::Forbidden("Admin access required"));
    }

    let stats = ctx.db.with_conn(|conn| compute_stats(conn))?;

    Ok(Json(success(json!({ "stats": stats }))))
}
