//! Gateway router.
//!
//! Returns a composable `Router` with two groups of routes:
//! - `/api/ai/*` — inference proxy plus stored history
//! - `/api/chatbot/*` — conversation, feedback and stats for the chat widget
//!
//! Middleware stack (outermost → innermost):
//! CORS → Extension(ApiContext) → Throttle (chat/image only) → Auth → Access log

use axum::extract::DefaultBodyLimit;
use axum::http::header::{self, InvalidHeaderValue};
use axum::http::{HeaderValue, Method};
use axum::middleware::from_fn;
use axum::routing::{get, post, put};
use axum::{Extension, Router};
use tower_http::cors::CorsLayer;

use crate::api::endpoints::{ai, conversation, feedback, stats};
use crate::api::error::ApiError;
use crate::api::middleware::{audit, auth, throttle};
use crate::api::types::ApiContext;

/// JSON request bodies.
const JSON_BODY_LIMIT: usize = 10 * 1024 * 1024;
/// Room for the multipart envelope and text fields on top of the attachment
/// ceiling, so oversize files reach the upload guard's own check.
const MULTIPART_OVERHEAD: usize = 2 * 1024 * 1024;

/// Browser access from the portal frontend, credentials included.
pub fn cors_layer(origin: &str) -> Result<CorsLayer, InvalidHeaderValue> {
    Ok(CorsLayer::new()
        .allow_origin(HeaderValue::from_str(origin)?)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]))
}

/// Build the full gateway router with CORS.
pub fn gateway_router(ctx: ApiContext, cors: CorsLayer) -> Router {
    build_router(ctx).layer(cors)
}

/// Build the router without CORS.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer
/// of each group). Handlers use `State<ApiContext>` (provided via
/// `with_state`). Path params use `:param` syntax (axum 0.7).
pub fn build_router(ctx: ApiContext) -> Router {
    // Layers are applied from bottom (innermost) to top (outermost):
    //   Extension → Throttle → Auth → Access log → Handler
    let image_body_limit = ctx.upload_policy.max_bytes + MULTIPART_OVERHEAD;

    let chat = Router::new()
        .route("/chat", post(ai::chat))
        .with_state(ctx.clone())
        .layer(from_fn(audit::log_access))
        .layer(from_fn(auth::require_auth))
        .layer(from_fn(throttle::limit_chat))
        .layer(Extension(ctx.clone()));

    let image = Router::new()
        .route("/analyze-image", post(ai::analyze_image))
        .with_state(ctx.clone())
        .layer(DefaultBodyLimit::max(image_body_limit))
        .layer(from_fn(audit::log_access))
        .layer(from_fn(auth::require_auth))
        .layer(from_fn(throttle::limit_image_analysis))
        .layer(Extension(ctx.clone()));

    let ai_protected = Router::new()
        .route("/conversation", get(ai::own_history))
        .route("/conversation/:user_id", get(ai::user_history))
        .route("/translate", post(ai::translate))
        .with_state(ctx.clone())
        .layer(from_fn(audit::log_access))
        .layer(from_fn(auth::require_auth))
        .layer(Extension(ctx.clone()));

    // Liveness probe — no auth
    let ai_public = Router::new()
        .route("/health", get(ai::health))
        .with_state(ctx.clone())
        .layer(from_fn(audit::log_access))
        .layer(Extension(ctx.clone()));

    let chatbot = Router::new()
        .route(
            "/conversation",
            get(conversation::get_conversation).delete(conversation::clear),
        )
        .route("/conversation/message", post(conversation::append_message))
        .route("/conversation/context", put(conversation::update_context))
        .route("/feedback", post(feedback::submit))
        .route("/stats", get(stats::usage))
        .with_state(ctx.clone())
        .layer(from_fn(audit::log_access))
        .layer(from_fn(auth::require_auth))
        .layer(Extension(ctx));

    Router::new()
        .nest(
            "/api/ai",
            chat.merge(image).merge(ai_protected).merge(ai_public),
        )
        .nest("/api/chatbot", chatbot)
        .fallback(|| async { ApiError::RouteNotFound })
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, Response, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::db::Database;
    use crate::identity::{Identity, IdentityVerifier, Role};
    use crate::inference::mock::MockInference;
    use crate::inference::InferenceError;
    use crate::throttle::FixedWindowThrottler;

    const SECRET: &str = "router-test-secret";

    fn test_ctx_with(mock: Arc<MockInference>) -> ApiContext {
        ApiContext::new(
            Database::open_in_memory().unwrap(),
            IdentityVerifier::new(SECRET),
            Arc::new(FixedWindowThrottler::default()),
            mock,
        )
    }

    fn test_app() -> (Router, Arc<MockInference>) {
        let mock = Arc::new(MockInference::new());
        (build_router(test_ctx_with(mock.clone())), mock)
    }

    fn token(id: &str, role: Role) -> String {
        IdentityVerifier::new(SECRET)
            .issue(&Identity::new(id, role), chrono::Duration::hours(1))
            .unwrap()
    }

    fn make_request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            builder = builder.header("Authorization", format!("Bearer {t}"));
        }
        match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    fn image_request(token: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
        let boundary = "krishi-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(
            format!(
                "\r\n--{boundary}\r\nContent-Disposition: form-data; name=\"description\"\r\n\r\nyellow spots\r\n--{boundary}--\r\n"
            )
            .as_bytes(),
        );

        Request::builder()
            .method("POST")
            .uri("/api/ai/analyze-image")
            .header("Authorization", format!("Bearer {token}"))
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response<Body>) -> Value {
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    // ── Identity boundary ───────────────────────────────────

    #[tokio::test]
    async fn missing_credential_returns_401() {
        let (app, _) = test_app();
        let response = app
            .oneshot(make_request("GET", "/api/chatbot/conversation", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = json_body(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Access token required");
    }

    #[tokio::test]
    async fn invalid_credential_returns_403() {
        let (app, _) = test_app();
        let response = app
            .oneshot(make_request("GET", "/api/chatbot/conversation", Some("not-a-jwt"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["error"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn expired_credential_returns_403() {
        let (app, _) = test_app();
        let expired = IdentityVerifier::new(SECRET)
            .issue_until(
                &Identity::new("farmer-1", Role::Farmer),
                chrono::Utc::now() - chrono::Duration::hours(1),
            )
            .unwrap();
        let response = app
            .oneshot(make_request("GET", "/api/chatbot/conversation", Some(&expired), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn every_protected_route_requires_credential() {
        let (app, mock) = test_app();
        let routes = [
            ("POST", "/api/ai/chat"),
            ("POST", "/api/ai/translate"),
            ("GET", "/api/ai/conversation"),
            ("GET", "/api/ai/conversation/farmer-2"),
            ("GET", "/api/chatbot/conversation"),
            ("DELETE", "/api/chatbot/conversation"),
            ("POST", "/api/chatbot/conversation/message"),
            ("PUT", "/api/chatbot/conversation/context"),
            ("POST", "/api/chatbot/feedback"),
            ("GET", "/api/chatbot/stats"),
        ];
        for (method, uri) in routes {
            let response = app
                .clone()
                .oneshot(make_request(method, uri, None, Some(json!({}))))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
        }
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn health_needs_no_credential() {
        let (app, _) = test_app();
        let response = app
            .oneshot(make_request("GET", "/api/ai/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["ai_service"]["status"], "ok");
    }

    #[tokio::test]
    async fn health_unhealthy_returns_503() {
        let mock = Arc::new(MockInference::failing(|| {
            InferenceError::Connection("http://localhost:8000".into())
        }));
        let app = build_router(test_ctx_with(mock));
        let response = app
            .oneshot(make_request("GET", "/api/ai/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = json_body(response).await;
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["error"], "AI service unavailable");
    }

    // ── AI proxy ────────────────────────────────────────────

    #[tokio::test]
    async fn chat_proxies_trimmed_message_with_bearer() {
        let (app, mock) = test_app();
        let t = token("farmer-1", Role::Farmer);
        let response = app
            .oneshot(make_request(
                "POST",
                "/api/ai/chat",
                Some(&t),
                Some(json!({ "message": "  When to sow rice?  ", "language": "ml" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["response"], "echo: When to sow rice?");
        assert_eq!(json["metadata"]["intent"], "general");
        assert!(json["suggestions"].is_array());

        let sent = mock.last_chat.lock().unwrap().clone().unwrap();
        assert_eq!(sent.user_id, "farmer-1");
        assert_eq!(sent.language, crate::models::Language::Ml);
        assert_eq!(sent.context, json!({}));
        assert_eq!(mock.last_bearer.lock().unwrap().as_deref(), Some(t.as_str()));
    }

    #[tokio::test]
    async fn chat_rejects_bad_input_before_proxying() {
        let (app, mock) = test_app();
        let t = token("farmer-1", Role::Farmer);
        let long: String = std::iter::repeat('a').take(1001).collect();
        for body in [
            json!({ "message": "   " }),
            json!({ "message": long }),
            json!({ "message": "hi", "language": "fr" }),
        ] {
            let response = app
                .clone()
                .oneshot(make_request("POST", "/api/ai/chat", Some(&t), Some(body)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let json = json_body(response).await;
            assert_eq!(json["error"], "Invalid input");
            assert!(json["details"].is_array());
        }
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn malformed_json_uses_error_envelope() {
        let (app, _) = test_app();
        let t = token("farmer-1", Role::Farmer);
        let req = Request::builder()
            .method("POST")
            .uri("/api/ai/chat")
            .header("Authorization", format!("Bearer {t}"))
            .header("Content-Type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["details"][0]["field"], "body");
    }

    #[tokio::test]
    async fn upstream_failure_returns_500_with_generic_message() {
        let mock = Arc::new(MockInference::failing(|| InferenceError::Timeout {
            endpoint: "/chat",
            after: std::time::Duration::from_secs(30),
        }));
        let app = build_router(test_ctx_with(mock));
        let t = token("farmer-1", Role::Farmer);
        let response = app
            .oneshot(make_request(
                "POST",
                "/api/ai/chat",
                Some(&t),
                Some(json!({ "message": "hello" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Failed to process your question. Please try again.");
        assert_eq!(json["message"], crate::api::error::UPSTREAM_UNAVAILABLE);
    }

    #[tokio::test]
    async fn fifty_first_chat_request_is_throttled() {
        let (app, mock) = test_app();
        let t = token("farmer-1", Role::Farmer);
        for i in 0..50 {
            let response = app
                .clone()
                .oneshot(make_request(
                    "POST",
                    "/api/ai/chat",
                    Some(&t),
                    Some(json!({ "message": format!("question {i}") })),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "request {i}");
        }

        let response = app
            .oneshot(make_request(
                "POST",
                "/api/ai/chat",
                Some(&t),
                Some(json!({ "message": "one more" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("Retry-After"));
        assert_eq!(
            json_body(response).await["error"],
            "Too many chat requests, please try again later"
        );
        assert_eq!(mock.calls(), 50);
    }

    #[tokio::test]
    async fn translate_validates_languages() {
        let (app, mock) = test_app();
        let t = token("farmer-1", Role::Farmer);
        let response = app
            .clone()
            .oneshot(make_request(
                "POST",
                "/api/ai/translate",
                Some(&t),
                Some(json!({ "text": "rice", "from_lang": "en", "to_lang": "de" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["details"][0]["field"], "to_lang");
        assert_eq!(mock.calls(), 0);

        let response = app
            .oneshot(make_request(
                "POST",
                "/api/ai/translate",
                Some(&t),
                Some(json!({ "text": "rice", "from_lang": "en", "to_lang": "hi" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["translated_text"], "RICE");
    }

    // ── Upload guard ────────────────────────────────────────

    #[tokio::test]
    async fn valid_image_is_forwarded() {
        let (app, mock) = test_app();
        let t = token("farmer-1", Role::Farmer);
        let response = app
            .oneshot(image_request(&t, "leaf.jpg", "image/jpeg", &[0xFF, 0xD8, 0xFF]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["disease"], "leaf blight");
        assert_eq!(json["bytes"], 3);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn oversized_image_rejected_before_proxy() {
        let (app, mock) = test_app();
        let t = token("farmer-1", Role::Farmer);
        let bytes = vec![0u8; 11 * 1024 * 1024];
        let response = app
            .oneshot(image_request(&t, "big.png", "image/png", &bytes))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["success"], false);
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn non_image_rejected_before_proxy() {
        let (app, mock) = test_app();
        let t = token("farmer-1", Role::Farmer);
        let response = app
            .oneshot(image_request(&t, "notes.txt", "text/plain", b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn undeclared_image_type_rejected_before_proxy() {
        let (app, mock) = test_app();
        let t = token("farmer-1", Role::Farmer);
        let boundary = "krishi-test-boundary";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"leaf.png\"\r\n\r\n\u{89}PNG\r\n--{boundary}--\r\n"
        );
        let req = Request::builder()
            .method("POST")
            .uri("/api/ai/analyze-image")
            .header("Authorization", format!("Bearer {t}"))
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["success"], false);
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn eleventh_image_request_is_throttled() {
        let (app, _) = test_app();
        let t = token("farmer-1", Role::Farmer);
        for _ in 0..10 {
            let response = app
                .clone()
                .oneshot(image_request(&t, "leaf.jpg", "image/jpeg", &[1, 2, 3]))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = app
            .oneshot(image_request(&t, "leaf.jpg", "image/jpeg", &[1, 2, 3]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            json_body(response).await["error"],
            "Too many image uploads, please try again later"
        );
    }

    // ── Conversation history ────────────────────────────────

    #[tokio::test]
    async fn cross_user_history_requires_admin() {
        let (app, _) = test_app();
        let farmer = token("farmer-1", Role::Farmer);
        let response = app
            .clone()
            .oneshot(make_request("GET", "/api/ai/conversation/farmer-2", Some(&farmer), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["error"], "Access denied");

        let own = app
            .clone()
            .oneshot(make_request("GET", "/api/ai/conversation/farmer-1", Some(&farmer), None))
            .await
            .unwrap();
        assert_eq!(own.status(), StatusCode::OK);

        let admin = token("admin-1", Role::Admin);
        let response = app
            .oneshot(make_request("GET", "/api/ai/conversation/farmer-2", Some(&admin), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["success"], true);
    }

    #[tokio::test]
    async fn appended_message_appears_in_both_views() {
        let (app, _) = test_app();
        let t = token("farmer-1", Role::Farmer);
        let response = app
            .clone()
            .oneshot(make_request(
                "POST",
                "/api/chatbot/conversation/message",
                Some(&t),
                Some(json!({ "content": "Paddy leaves turning yellow", "type": "user", "language": "en" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        let message_id = json["messageId"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(make_request("GET", "/api/chatbot/conversation", Some(&t), None))
            .await
            .unwrap();
        let json = json_body(response).await;
        let messages = json["conversation"]["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["id"], message_id);
        assert_eq!(messages[0]["content"], "Paddy leaves turning yellow");
        assert_eq!(messages[0]["type"], "user");
        assert!(json["conversation"]["lastActivity"].is_string());

        let response = app
            .oneshot(make_request("GET", "/api/ai/conversation", Some(&t), None))
            .await
            .unwrap();
        let json = json_body(response).await;
        assert_eq!(json["conversation"]["messages"][0]["id"], message_id);
    }

    #[tokio::test]
    async fn chatbot_view_shows_last_ten_history_view_shows_all() {
        let (app, _) = test_app();
        let t = token("farmer-1", Role::Farmer);
        for i in 0..12 {
            let response = app
                .clone()
                .oneshot(make_request(
                    "POST",
                    "/api/chatbot/conversation/message",
                    Some(&t),
                    Some(json!({ "content": format!("m{i}"), "type": "user" })),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let recent = json_body(
            app.clone()
                .oneshot(make_request("GET", "/api/chatbot/conversation", Some(&t), None))
                .await
                .unwrap(),
        )
        .await;
        let messages = recent["conversation"]["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 10);
        assert_eq!(messages[0]["content"], "m2");

        let full = json_body(
            app.oneshot(make_request("GET", "/api/ai/conversation", Some(&t), None))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(full["conversation"]["messages"].as_array().unwrap().len(), 12);
    }

    #[tokio::test]
    async fn whitespace_content_is_stored_verbatim() {
        let (app, _) = test_app();
        let t = token("farmer-1", Role::Farmer);
        let response = app
            .clone()
            .oneshot(make_request(
                "POST",
                "/api/chatbot/conversation/message",
                Some(&t),
                Some(json!({ "content": "   ", "type": "user" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(json_body(response).await["messageId"].is_string());

        let json = json_body(
            app.oneshot(make_request("GET", "/api/chatbot/conversation", Some(&t), None))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(json["conversation"]["messages"][0]["content"], "   ");
    }

    #[tokio::test]
    async fn message_type_is_validated() {
        let (app, _) = test_app();
        let t = token("farmer-1", Role::Farmer);
        let response = app
            .oneshot(make_request(
                "POST",
                "/api/chatbot/conversation/message",
                Some(&t),
                Some(json!({ "content": "hello", "type": "farmer" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["details"][0]["message"], "Type must be user or bot");
    }

    #[tokio::test]
    async fn context_merges_across_requests() {
        let (app, _) = test_app();
        let t = token("farmer-1", Role::Farmer);
        app.clone()
            .oneshot(make_request(
                "PUT",
                "/api/chatbot/conversation/context",
                Some(&t),
                Some(json!({ "crop": "rice" })),
            ))
            .await
            .unwrap();
        let response = app
            .clone()
            .oneshot(make_request(
                "PUT",
                "/api/chatbot/conversation/context",
                Some(&t),
                Some(json!({ "location": "Kerala", "experienceLevel": "expert" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(
            json["context"],
            json!({ "crop": "rice", "location": "Kerala", "experienceLevel": "expert" })
        );

        let response = app
            .oneshot(make_request(
                "PUT",
                "/api/chatbot/conversation/context",
                Some(&t),
                Some(json!({ "experienceLevel": "guru" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn clear_starts_a_fresh_conversation() {
        let (app, _) = test_app();
        let t = token("farmer-1", Role::Farmer);
        app.clone()
            .oneshot(make_request(
                "POST",
                "/api/chatbot/conversation/message",
                Some(&t),
                Some(json!({ "content": "old", "type": "user" })),
            ))
            .await
            .unwrap();
        let before = json_body(
            app.clone()
                .oneshot(make_request("GET", "/api/chatbot/conversation", Some(&t), None))
                .await
                .unwrap(),
        )
        .await;

        let response = app
            .clone()
            .oneshot(make_request("DELETE", "/api/chatbot/conversation", Some(&t), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await["message"],
            "Conversation history cleared successfully"
        );

        let after = json_body(
            app.oneshot(make_request("GET", "/api/chatbot/conversation", Some(&t), None))
                .await
                .unwrap(),
        )
        .await;
        assert_ne!(after["conversation"]["id"], before["conversation"]["id"]);
        assert!(after["conversation"]["messages"].as_array().unwrap().is_empty());
    }

    // ── Feedback and stats ──────────────────────────────────

    #[tokio::test]
    async fn feedback_rating_range_enforced() {
        let (app, _) = test_app();
        let t = token("farmer-1", Role::Farmer);
        for rating in [0, 6] {
            let response = app
                .clone()
                .oneshot(make_request(
                    "POST",
                    "/api/chatbot/feedback",
                    Some(&t),
                    Some(json!({ "rating": rating, "category": "accuracy" })),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        let response = app
            .oneshot(make_request(
                "POST",
                "/api/chatbot/feedback",
                Some(&t),
                Some(json!({ "rating": 3, "category": "accuracy", "feedback": "ok" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert!(json["feedbackId"].is_string());
    }

    #[tokio::test]
    async fn stats_admin_only() {
        let (app, _) = test_app();
        let farmer = token("farmer-1", Role::Farmer);
        let response = app
            .clone()
            .oneshot(make_request("GET", "/api/chatbot/stats", Some(&farmer), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["error"], "Admin access required");

        app.clone()
            .oneshot(make_request(
                "POST",
                "/api/chatbot/conversation/message",
                Some(&farmer),
                Some(json!({ "content": "hello", "type": "user" })),
            ))
            .await
            .unwrap();

        let admin = token("admin-1", Role::Admin);
        let response = app
            .oneshot(make_request("GET", "/api/chatbot/stats", Some(&admin), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["stats"]["totalConversations"], 1);
        assert_eq!(json["stats"]["totalMessages"], 1);
        assert_eq!(json["stats"]["languageUsage"]["en"], 1);
    }

    // ── Routing ─────────────────────────────────────────────

    #[tokio::test]
    async fn unknown_route_returns_404_envelope() {
        let (app, _) = test_app();
        let response = app
            .oneshot(make_request("GET", "/api/unknown", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = json_body(response).await;
        assert_eq!(json, json!({ "success": false, "error": "Route not found" }));
    }

    #[tokio::test]
    async fn cors_allows_portal_origin() {
        let mock = Arc::new(MockInference::new());
        let app = gateway_router(
            test_ctx_with(mock),
            cors_layer("http://localhost:3000").unwrap(),
        );
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/api/ai/chat")
            .header("Origin", "http://localhost:3000")
            .header("Access-Control-Request-Method", "POST")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:3000"
        );
        assert_eq!(
            response.headers().get("access-control-allow-credentials").unwrap(),
            "true"
        );
    }

    #[test]
    fn cors_rejects_invalid_origin() {
        assert!(cors_layer("bad\norigin").is_err());
    }
}
