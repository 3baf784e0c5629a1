//! Per-client throttling middleware for the chat and image-analysis routes.
//!
//! Clients are keyed by peer IP address, taken from `ConnectInfo` when the
//! server was started with connect info. Without it every request shares
//! the `"unknown"` key.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::throttle::ThrottleClass;

fn client_key(req: &Request<axum::body::Body>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Chat window. Returns 429 if exceeded.
pub async fn limit_chat(req: Request<axum::body::Body>, next: Next) -> Response {
    match limit_inner(ThrottleClass::Chat, req, next).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

/// Image-analysis window. Returns 429 if exceeded.
pub async fn limit_image_analysis(req: Request<axum::body::Body>, next: Next) -> Response {
    match limit_inner(ThrottleClass::ImageAnalysis, req, next).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn limit_inner(
    class: ThrottleClass,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let key = client_key(&req);
    ctx.throttler.check(class, &key).map_err(|rejection| {
        tracing::info!(client = %key, class = class.as_str(), "Request throttled");
        ApiError::from(rejection)
    })?;

    Ok(next.run(req).await)
}
