//! Bearer credential middleware.
//!
//! Extracts `Authorization: Bearer <token>`, verifies it, and injects
//! [`Caller`] into request extensions for downstream handlers.

use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, Caller};

/// Credential part of an `Authorization` header value (`<scheme> <token>`).
fn bearer_token(req: &Request<axum::body::Body>) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().split_once(' '))
        .map(|(_, token)| token.trim())
}

/// Require a valid bearer credential.
///
/// Absent credential → 401, invalid or expired → 403.
/// Accesses `ApiContext` from request extensions (injected by Extension layer).
pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = bearer_token(&req).map(str::to_string);
    let identity = ctx.verifier.verify(token.as_deref())?;
    tracing::debug!(user = %identity.id, role = identity.role.as_str(), "Caller authenticated");

    req.extensions_mut().insert(Caller {
        identity,
        token: token.unwrap_or_default(),
    });

    Ok(next.run(req).await)
}
