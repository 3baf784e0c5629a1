//! Bounded retries for inference calls.
//!
//! [`RetryingInference`] wraps any [`InferenceService`] and repeats calls
//! whose failure is transient (timeout, connection refused, 5xx), with
//! exponential backoff and jitter between attempts. Client errors and
//! malformed replies are terminal. With `max_attempts = 1` the wrapper is a
//! pass-through and callers see the first failure.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use super::{
    ChatReply, ChatRequest, ImageAnalysisRequest, InferenceError, InferenceService, JsonObject,
    TranslateRequest,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryClass {
    Transient,
    Permanent,
}

pub trait Backoff: Send + Sync {
    fn next_delay_ms(&self, attempt: u32) -> u64;
    fn max_attempts(&self) -> u32;
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_ms: u64,
    pub factor: f64,
    pub jitter: f64,
    pub cap_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 1,
            base_ms: 250,
            factor: 2.0,
            jitter: 0.2,
            cap_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }
}

impl Backoff for RetryPolicy {
    fn next_delay_ms(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return 0;
        }
        let exp = (attempt - 1) as f64;
        let mut delay = (self.base_ms as f64) * self.factor.powf(exp);
        if delay > self.cap_ms as f64 {
            delay = self.cap_ms as f64;
        }
        if self.jitter > 0.0 {
            let mut rng = rand::thread_rng();
            let jitter = rng.gen_range(-(self.jitter)..self.jitter);
            delay *= 1.0 + jitter;
            if delay < 0.0 {
                delay = self.base_ms as f64;
            }
        }
        delay.round() as u64
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Result of one attempt, as seen by the retry loop.
#[derive(Debug)]
pub enum Attempt<T> {
    Success(T),
    Retryable(InferenceError),
    Terminal(InferenceError),
}

impl<T> Attempt<T> {
    pub fn classify(result: Result<T, InferenceError>) -> Self {
        match result {
            Ok(value) => Attempt::Success(value),
            Err(e) => match e.retry_class() {
                RetryClass::Transient => Attempt::Retryable(e),
                RetryClass::Permanent => Attempt::Terminal(e),
            },
        }
    }
}

pub struct RetryingInference<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: InferenceService> RetryingInference<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn run<T, F, Fut>(&self, endpoint: &'static str, mut call: F) -> Result<T, InferenceError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, InferenceError>> + Send,
        T: Send,
    {
        let max_attempts = self.policy.max_attempts().max(1);
        let mut attempt = 1;
        loop {
            match Attempt::classify(call().await) {
                Attempt::Success(value) => return Ok(value),
                Attempt::Terminal(e) => return Err(e),
                Attempt::Retryable(e) if attempt >= max_attempts => return Err(e),
                Attempt::Retryable(e) => {
                    let delay = self.policy.next_delay_ms(attempt);
                    tracing::warn!(
                        endpoint,
                        attempt,
                        max_attempts,
                        delay_ms = delay,
                        error = %e,
                        "Retrying inference call"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl<S: InferenceService> InferenceService for RetryingInference<S> {
    async fn chat(&self, request: &ChatRequest, bearer: &str) -> Result<ChatReply, InferenceError> {
        self.run("/chat", || self.inner.chat(request, bearer)).await
    }

    async fn analyze_image(
        &self,
        request: &ImageAnalysisRequest,
        bearer: &str,
    ) -> Result<JsonObject, InferenceError> {
        self.run("/analyze-image", || self.inner.analyze_image(request, bearer))
            .await
    }

    async fn translate(
        &self,
        request: &TranslateRequest,
        bearer: &str,
    ) -> Result<JsonObject, InferenceError> {
        self.run("/translate", || self.inner.translate(request, bearer))
            .await
    }

    async fn health(&self) -> Result<serde_json::Value, InferenceError> {
        self.run("/health", || self.inner.health()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::mock::MockInference;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails with a 503 until `failures` calls have been made, then succeeds.
    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
    }

    impl Flaky {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
            }
        }

        fn tick(&self) -> Result<(), InferenceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(InferenceError::Upstream {
                    status: 503,
                    detail: "warming up".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl InferenceService for Flaky {
        async fn chat(&self, _: &ChatRequest, _: &str) -> Result<ChatReply, InferenceError> {
            self.tick()?;
            Ok(ChatReply {
                response: "ok".into(),
                metadata: None,
                suggestions: vec![],
            })
        }

        async fn analyze_image(
            &self,
            _: &ImageAnalysisRequest,
            _: &str,
        ) -> Result<JsonObject, InferenceError> {
            self.tick()?;
            Ok(JsonObject::new())
        }

        async fn translate(&self, _: &TranslateRequest, _: &str) -> Result<JsonObject, InferenceError> {
            self.tick()?;
            Ok(JsonObject::new())
        }

        async fn health(&self) -> Result<serde_json::Value, InferenceError> {
            self.tick()?;
            Ok(serde_json::json!({ "status": "ok" }))
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_ms: 1,
            factor: 2.0,
            jitter: 0.0,
            cap_ms: 10,
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.next_delay_ms(0), 0);
        assert_eq!(policy.next_delay_ms(1), 250);
        assert_eq!(policy.next_delay_ms(2), 500);
        assert_eq!(policy.next_delay_ms(3), 1000);
        assert_eq!(policy.next_delay_ms(10), 5000);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let delay = policy.next_delay_ms(1);
            assert!((200..=300).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test]
    fn default_policy_is_fail_fast() {
        assert_eq!(RetryPolicy::default().max_attempts(), 1);
        assert_eq!(RetryPolicy::with_attempts(0).max_attempts(), 1);
    }

    #[tokio::test]
    async fn transient_failures_retried_until_success() {
        let service = RetryingInference::new(Flaky::new(2), fast_policy(3));
        assert!(service.health().await.is_ok());
        assert_eq!(service.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let service = RetryingInference::new(Flaky::new(5), fast_policy(3));
        let err = service.health().await.unwrap_err();
        assert!(matches!(err, InferenceError::Upstream { status: 503, .. }));
        assert_eq!(service.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn single_attempt_fails_fast() {
        let service = RetryingInference::new(Flaky::new(1), RetryPolicy::default());
        assert!(service.health().await.is_err());
        assert_eq!(service.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn terminal_failures_not_retried() {
        let mock = MockInference::failing(|| InferenceError::Upstream {
            status: 400,
            detail: "bad language".into(),
        });
        let service = RetryingInference::new(mock, fast_policy(5));
        assert!(service.health().await.is_err());
        assert_eq!(service.inner.calls(), 1);
    }

    #[test]
    fn classification_maps_retry_class() {
        assert!(matches!(Attempt::classify(Ok::<_, InferenceError>(1)), Attempt::Success(1)));
        assert!(matches!(
            Attempt::<()>::classify(Err(InferenceError::Connection("x".into()))),
            Attempt::Retryable(_)
        ));
        assert!(matches!(
            Attempt::<()>::classify(Err(InferenceError::BadResponse("x".into()))),
            Attempt::Terminal(_)
        ));
    }
}
