//! Usage statistics across all owners.
//!
//! Computed on demand with full-table aggregates and never cached, so cost
//! grows linearly with stored conversations, messages and feedback.

use std::collections::BTreeMap;

use rusqlite::Connection;
use serde::Serialize;

use crate::db::DatabaseError;
use crate::models::{MAX_RATING, MIN_RATING};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub total_conversations: i64,
    pub active_conversations: i64,
    /// Messages currently retained, summed over every conversation.
    pub total_messages: i64,
    /// Rating (1-5) to number of feedback entries. Every rating is present.
    pub feedback_ratings: BTreeMap<u8, i64>,
    /// Message language code to number of retained messages.
    pub language_usage: BTreeMap<String, i64>,
}

fn count(conn: &Connection, sql: &str) -> Result<i64, DatabaseError> {
    Ok(conn.query_row(sql, [], |row| row.get(0))?)
}

pub fn compute_stats(conn: &Connection) -> Result<UsageStats, DatabaseError> {
    let total_conversations = count(conn, "SELECT COUNT(*) FROM conversations")?;
    let active_conversations =
        count(conn, "SELECT COUNT(*) FROM conversations WHERE is_active = 1")?;
    let total_messages = count(conn, "SELECT COUNT(*) FROM messages")?;

    let mut feedback_ratings: BTreeMap<u8, i64> =
        (MIN_RATING..=MAX_RATING).map(|r| (r as u8, 0)).collect();
    let mut stmt = conn.prepare("SELECT rating, COUNT(*) FROM feedback GROUP BY rating")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
    for row in rows {
        let (rating, n) = row?;
        if let Ok(rating) = u8::try_from(rating) {
            feedback_ratings.insert(rating, n);
        }
    }

    let mut stmt = conn.prepare("SELECT language, COUNT(*) FROM messages GROUP BY language")?;
    let language_usage = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    tracing::debug!(
        total_conversations,
        active_conversations,
        total_messages,
        "Computed usage stats"
    );

    Ok(UsageStats {
        total_conversations,
        active_conversations,
        total_messages,
        feedback_ratings,
        language_usage,
    })
}
