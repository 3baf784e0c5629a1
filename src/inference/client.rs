use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

use super::{
    ChatReply, ChatRequest, ImageAnalysisRequest, InferenceError, InferenceService, JsonObject,
    TranslateRequest,
};

/// Per-operation deadlines. Image analysis is the slowest upstream path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub chat: Duration,
    pub analyze_image: Duration,
    pub translate: Duration,
    pub health: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            chat: Duration::from_secs(30),
            analyze_image: Duration::from_secs(60),
            translate: Duration::from_secs(15),
            health: Duration::from_secs(5),
        }
    }
}

/// HTTP client for the external inference service.
pub struct HttpInferenceClient {
    base_url: String,
    client: reqwest::Client,
    timeouts: Timeouts,
}

impl HttpInferenceClient {
    pub fn new(base_url: &str) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| InferenceError::Http(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeouts: Timeouts::default(),
        })
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        timeout: Duration,
        request: RequestBuilder,
    ) -> Result<T, InferenceError> {
        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(endpoint, timeout, e))?;

        let response = check_status(response).await?;

        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    endpoint,
                    after: timeout,
                }
            } else {
                InferenceError::BadResponse(e.to_string())
            }
        })
    }

    fn map_send_error(
        &self,
        endpoint: &'static str,
        timeout: Duration,
        e: reqwest::Error,
    ) -> InferenceError {
        if e.is_timeout() {
            InferenceError::Timeout {
                endpoint,
                after: timeout,
            }
        } else if e.is_connect() {
            InferenceError::Connection(self.base_url.clone())
        } else {
            InferenceError::Http(e.to_string())
        }
    }
}

/// Turn a non-2xx response into [`InferenceError::Upstream`], keeping the
/// service's `detail` message when it sends one.
async fn check_status(response: Response) -> Result<Response, InferenceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(InferenceError::Upstream {
        status: status.as_u16(),
        detail: extract_detail(&body)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string()),
    })
}

fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(detail) => Some(detail.clone()),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl InferenceService for HttpInferenceClient {
    async fn chat(&self, request: &ChatRequest, bearer: &str) -> Result<ChatReply, InferenceError> {
        let builder = self
            .client
            .post(self.url("/chat"))
            .bearer_auth(bearer)
            .json(request);
        self.send_json("/chat", self.timeouts.chat, builder).await
    }

    async fn analyze_image(
        &self,
        request: &ImageAnalysisRequest,
        bearer: &str,
    ) -> Result<JsonObject, InferenceError> {
        let upload = &request.upload;
        let file = Part::bytes(upload.bytes.clone())
            .file_name(upload.filename.clone())
            .mime_str(&upload.mime_type)
            .map_err(|e| InferenceError::Http(e.to_string()))?;
        let form = Form::new()
            .part("file", file)
            .text("user_id", request.user_id.clone())
            .text("description", upload.description.clone())
            .text("language", upload.language.clone());

        let builder = self
            .client
            .post(self.url("/analyze-image"))
            .bearer_auth(bearer)
            .multipart(form);
        self.send_json("/analyze-image", self.timeouts.analyze_image, builder)
            .await
    }

    async fn translate(
        &self,
        request: &TranslateRequest,
        bearer: &str,
    ) -> Result<JsonObject, InferenceError> {
        let form = Form::new()
            .text("text", request.text.clone())
            .text("from_lang", request.from_lang.as_str())
            .text("to_lang", request.to_lang.as_str())
            .text("context", request.context.clone());

        let builder = self
            .client
            .post(self.url("/translate"))
            .bearer_auth(bearer)
            .multipart(form);
        self.send_json("/translate", self.timeouts.translate, builder)
            .await
    }

    async fn health(&self) -> Result<serde_json::Value, InferenceError> {
        let builder = self.client.get(self.url("/health"));
        self.send_json("/health", self.timeouts.health, builder).await
    }
}
