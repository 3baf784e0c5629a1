pub mod api;
pub mod config;
pub mod conversation;
pub mod db;
pub mod feedback;
pub mod identity;
pub mod inference;
pub mod models;
pub mod stats;
pub mod throttle;
pub mod upload;
