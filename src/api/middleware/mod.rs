//! Gateway middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Throttle — per-client fixed windows, chat and image routes only
//! 2. Auth — bearer credential verification, injects `Caller`
//! 3. Access log — one line per request, after auth so it has the caller id

pub mod audit;
pub mod auth;
pub mod throttle;
