//! Shared types for the gateway API layer.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::db::Database;
use crate::identity::{Identity, IdentityVerifier};
use crate::inference::{
    HttpInferenceClient, InferenceError, InferenceService, RetryPolicy, RetryingInference,
};
use crate::throttle::{FixedWindowThrottler, RequestThrottler, WindowLimit};
use crate::upload::UploadPolicy;

// ═══════════════════════════════════════════════════════════
// API context — shared state for the gateway router
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes and middleware.
///
/// Every field is cheap to clone; the stores and services behind it are
/// shared across requests.
#[derive(Clone)]
pub struct ApiContext {
    pub db: Database,
    pub verifier: IdentityVerifier,
    pub throttler: Arc<dyn RequestThrottler>,
    pub inference: Arc<dyn InferenceService>,
    pub upload_policy: UploadPolicy,
}

impl ApiContext {
    pub fn new(
        db: Database,
        verifier: IdentityVerifier,
        throttler: Arc<dyn RequestThrottler>,
        inference: Arc<dyn InferenceService>,
    ) -> Self {
        Self {
            db,
            verifier,
            throttler,
            inference,
            upload_policy: UploadPolicy::default(),
        }
    }

    pub fn with_upload_policy(mut self, policy: UploadPolicy) -> Self {
        self.upload_policy = policy;
        self
    }

    /// Production wiring: HTTP inference client behind the retry decorator,
    /// fixed-window throttler, limits from configuration.
    pub fn from_config(config: &GatewayConfig, db: Database) -> Result<Self, InferenceError> {
        let client = HttpInferenceClient::new(&config.ai_service_url)?;
        let inference =
            RetryingInference::new(client, RetryPolicy::with_attempts(config.ai_retry_attempts));
        let throttler = FixedWindowThrottler::new(
            WindowLimit::new(config.chat_limit, config.rate_window),
            WindowLimit::new(config.image_limit, config.rate_window),
        );

        Ok(Self::new(
            db,
            IdentityVerifier::new(&config.jwt_secret),
            Arc::new(throttler),
            Arc::new(inference),
        )
        .with_upload_policy(UploadPolicy::new(config.upload_max_bytes)))
    }
}

// ═══════════════════════════════════════════════════════════
// Caller context — injected by auth middleware
// ═══════════════════════════════════════════════════════════

/// Authenticated caller, injected into request extensions by the auth
/// middleware. Keeps the raw credential for delegated authorization.
#[derive(Debug, Clone)]
pub struct Caller {
    pub identity: Identity,
    pub token: String,
}

impl Caller {
    pub fn id(&self) -> &str {
        &self.identity.id
    }

    pub fn is_admin(&self) -> bool {
        self.identity.is_admin()
    }
}

/// Success envelope wrapper: `{success:true, ...payload}`.
pub fn success(payload: serde_json::Value) -> serde_json::Value {
    let mut body = serde_json::Map::new();
    body.insert("success".into(), serde_json::Value::Bool(true));
    if let serde_json::Value::Object(fields) = payload {
        for (key, value) in fields {
            if key != "success" {
                body.insert(key, value);
            }
        }
    }
    serde_json::Value::Object(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_envelope_flattens_payload() {
        let body = success(json!({ "messageId": "m1", "message": "saved" }));
        assert_eq!(body, json!({ "success": true, "messageId": "m1", "message": "saved" }));
    }

    #[test]
    fn success_envelope_keeps_own_flag() {
        let body = success(json!({ "success": false, "translated_text": "നെല്ല്" }));
        assert_eq!(body["success"], true);
        assert_eq!(body["translated_text"], "നെല്ല്");
    }

    #[test]
    fn context_from_config_wires_limits() {
        let config = GatewayConfig::from_lookup(|key| match key {
            "JWT_SECRET" => Some("secret".into()),
            "UPLOAD_MAX_BYTES" => Some("1024".into()),
            _ => None,
        })
        .unwrap();
        let ctx = ApiContext::from_config(&config, Database::open_in_memory().unwrap()).unwrap();
        assert_eq!(ctx.upload_policy.max_bytes, 1024);
    }
}
