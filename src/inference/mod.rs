//! AI proxy — forwards chat, image-analysis and translation requests to the
//! external inference service.
//!
//! The gateway never interprets inference output beyond the envelope it
//! returns to callers. Every call has a bounded timeout; failures surface as
//! [`InferenceError`] and are normalised at the API boundary.

pub mod client;
pub mod retry;

pub use client::HttpInferenceClient;
pub use retry::{Backoff, RetryClass, RetryPolicy, RetryingInference};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Language, TranslationLanguage};
use crate::upload::ImageUpload;

/// Arbitrary JSON object returned by the inference service.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("{endpoint} timed out after {after:?}")]
    Timeout {
        endpoint: &'static str,
        after: Duration,
    },

    #[error("Cannot reach inference service at {0}")]
    Connection(String),

    #[error("Inference service returned {status}: {detail}")]
    Upstream { status: u16, detail: String },

    #[error("Malformed inference response: {0}")]
    BadResponse(String),

    #[error("HTTP client error: {0}")]
    Http(String),
}

impl InferenceError {
    /// Whether repeating the same call could succeed.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Timeout { .. } | Self::Connection(_) => RetryClass::Transient,
            Self::Upstream { status, .. } if *status >= 500 => RetryClass::Transient,
            Self::Upstream { .. } | Self::BadResponse(_) | Self::Http(_) => RetryClass::Permanent,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub user_id: String,
    pub language: Language,
    pub context: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub suggestions: Vec<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ImageAnalysisRequest {
    pub user_id: String,
    pub upload: ImageUpload,
}

#[derive(Debug, Clone)]
pub struct TranslateRequest {
    pub text: String,
    pub from_lang: TranslationLanguage,
    pub to_lang: TranslationLanguage,
    pub context: String,
}

/// Operations offered by the inference service.
///
/// `bearer` is the caller's own credential, forwarded so the service can
/// apply its own authorization.
#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn chat(&self, request: &ChatRequest, bearer: &str) -> Result<ChatReply, InferenceError>;

    async fn analyze_image(
        &self,
        request: &ImageAnalysisRequest,
        bearer: &str,
    ) -> Result<JsonObject, InferenceError>;

    async fn translate(
        &self,
        request: &TranslateRequest,
        bearer: &str,
    ) -> Result<JsonObject, InferenceError>;

    /// Unauthenticated liveness probe.
    async fn health(&self) -> Result<serde_json::Value, InferenceError>;
}
