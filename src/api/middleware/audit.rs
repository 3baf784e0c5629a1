//! Access logging middleware.
//!
//! Logs every API request with method, path, caller id and response
//! status. Runs innermost (after auth has injected `Caller`).

use std::time::Instant;

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::Caller;

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let caller = req
        .extensions()
        .get::<Caller>()
        .map(|c| c.id().to_string())
        .unwrap_or_else(|| "-".to_string());
    let started = Instant::now();

    let response = next.run(req).await;

    tracing::info!(
        %method,
        path = %path,
        caller = %caller,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "API request"
    );
    response
}
