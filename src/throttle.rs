//! Per-client request throttling for the expensive endpoint classes.
//!
//! Fixed windows: every counter resets at the same interval boundaries,
//! measured from throttler creation. A request is counted before it is
//! judged, so a rejected request still consumes its slot.
//!
//! Counters are process-local. Instances behind a load balancer each keep
//! their own counts; a shared backing store would implement
//! [`RequestThrottler`] without callers noticing.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::{DEFAULT_CHAT_LIMIT, DEFAULT_IMAGE_LIMIT, DEFAULT_RATE_WINDOW};

/// Prune stale counters once the table grows past this size.
const CLEANUP_THRESHOLD: usize = 10_000;

/// Independently limited endpoint classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThrottleClass {
    Chat,
    ImageAnalysis,
}

impl ThrottleClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::ImageAnalysis => "image_analysis",
        }
    }

    /// User-facing text returned with a rejection.
    pub fn retry_message(&self) -> &'static str {
        match self {
            Self::Chat => "Too many chat requests, please try again later",
            Self::ImageAnalysis => "Too many image uploads, please try again later",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (retry after {retry_after_secs}s)")]
pub struct ThrottleRejection {
    pub class: ThrottleClass,
    pub retry_after_secs: u64,
    pub message: &'static str,
}

/// Admission check for a throttled endpoint class.
pub trait RequestThrottler: Send + Sync {
    /// Count one request from `client_key` against `class`.
    fn check(&self, class: ThrottleClass, client_key: &str) -> Result<(), ThrottleRejection>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimit {
    pub max_requests: u32,
    pub window: Duration,
}

impl WindowLimit {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

#[derive(Debug)]
struct Counter {
    window_index: u128,
    hits: u32,
}

/// In-memory fixed-window throttler.
pub struct FixedWindowThrottler {
    chat: WindowLimit,
    image_analysis: WindowLimit,
    origin: Instant,
    counters: Mutex<HashMap<(ThrottleClass, String), Counter>>,
}

impl FixedWindowThrottler {
    pub fn new(chat: WindowLimit, image_analysis: WindowLimit) -> Self {
        Self {
            chat,
            image_analysis,
            origin: Instant::now(),
            counters: Mutex::new(HashMap::new()),
        }
    }

    fn limit_for(&self, class: ThrottleClass) -> WindowLimit {
        match class {
            ThrottleClass::Chat => self.chat,
            ThrottleClass::ImageAnalysis => self.image_analysis,
        }
    }

    fn window_index(&self, class: ThrottleClass, elapsed_ms: u128) -> u128 {
        elapsed_ms / self.limit_for(class).window.as_millis().max(1)
    }

    /// Drop counters whose window has passed, each judged by its own class.
    fn prune(&self, counters: &mut HashMap<(ThrottleClass, String), Counter>, elapsed_ms: u128) {
        counters.retain(|(class, _), c| c.window_index == self.window_index(*class, elapsed_ms));
    }

    /// Check against an explicit clock reading.
    pub fn check_at(
        &self,
        class: ThrottleClass,
        client_key: &str,
        now: Instant,
    ) -> Result<(), ThrottleRejection> {
        let limit = self.limit_for(class);
        let window_ms = limit.window.as_millis().max(1);
        let elapsed_ms = now.saturating_duration_since(self.origin).as_millis();
        let window_index = self.window_index(class, elapsed_ms);

        // Counts only; a poisoned table is still usable.
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if counters.len() > CLEANUP_THRESHOLD {
            self.prune(&mut counters, elapsed_ms);
        }

        let counter = counters
            .entry((class, client_key.to_string()))
            .or_insert(Counter {
                window_index,
                hits: 0,
            });
        if counter.window_index != window_index {
            counter.window_index = window_index;
            counter.hits = 0;
        }
        counter.hits = counter.hits.saturating_add(1);

        if counter.hits > limit.max_requests {
            let remaining_ms = window_ms * (window_index + 1) - elapsed_ms;
            let retry_after_secs = u64::try_from(remaining_ms.div_ceil(1000)).unwrap_or(u64::MAX);
            tracing::info!(
                class = class.as_str(),
                client = client_key,
                hits = counter.hits,
                "Request throttled"
            );
            return Err(ThrottleRejection {
                class,
                retry_after_secs,
                message: class.retry_message(),
            });
        }

        Ok(())
    }
}

impl Default for FixedWindowThrottler {
    fn default() -> Self {
        Self::new(
            WindowLimit::new(DEFAULT_CHAT_LIMIT, DEFAULT_RATE_WINDOW),
            WindowLimit::new(DEFAULT_IMAGE_LIMIT, DEFAULT_RATE_WINDOW),
        )
    }
}

impl RequestThrottler for FixedWindowThrottler {
    fn check(&self, class: ThrottleClass, client_key: &str) -> Result<(), ThrottleRejection> {
        self.check_at(class, client_key, Instant::now())
    }
}
