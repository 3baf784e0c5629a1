//! Gateway endpoint handlers.
//!
//! `ai` proxies to the inference service; `conversation`, `feedback` and
//! `stats` serve the chatbot widget from the local stores.

pub mod ai;
pub mod conversation;
pub mod feedback;
pub mod stats;

use std::str::FromStr;

use crate::api::error::{ApiError, FieldError};

/// Collects input failures so a request reports every bad field at once.
#[derive(Debug, Default)]
pub(crate) struct Checks(Vec<FieldError>);

impl Checks {
    pub fn fail(&mut self, field: &str, message: &str) {
        self.0.push(FieldError::new(field, message));
    }

    /// Character-length bounds, inclusive.
    pub fn length(&mut self, field: &str, value: &str, min: usize, max: usize, message: &str) {
        let len = value.chars().count();
        if len < min || len > max {
            self.fail(field, message);
        }
    }

    /// Parse an optional enum-like value; `None` passes through.
    pub fn optional<T: FromStr>(&mut self, field: &str, value: Option<&str>, message: &str) -> Option<T> {
        let raw = value?;
        match raw.parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                self.fail(field, message);
                None
            }
        }
    }

    /// Parse a required enum-like value.
    pub fn required<T: FromStr>(&mut self, field: &str, value: Option<&str>, message: &str) -> Option<T> {
        if value.is_none() {
            self.fail(field, message);
            return None;
        }
        self.optional(field, value, message)
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ApiError::InvalidInput(self.0))
        }
    }
}
