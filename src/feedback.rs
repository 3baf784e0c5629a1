//! Feedback store — user ratings of bot answers.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{format_timestamp, parse_timestamp, DatabaseError};
use crate::models::{Feedback, NewFeedback, MAX_COMMENT_CHARS, MAX_RATING, MIN_RATING};

fn validate(feedback: &NewFeedback) -> Result<(), DatabaseError> {
    if !(MIN_RATING..=MAX_RATING).contains(&feedback.rating) {
        return Err(DatabaseError::constraint(
            "rating",
            format!("Rating must be between {MIN_RATING} and {MAX_RATING}"),
        ));
    }
    if let Some(comment) = &feedback.comment {
        if comment.chars().count() > MAX_COMMENT_CHARS {
            return Err(DatabaseError::constraint(
                "comment",
                format!("Comment must be at most {MAX_COMMENT_CHARS} characters"),
            ));
        }
    }
    for (field, value) in [
        ("conversationId", &feedback.conversation_id),
        ("messageId", &feedback.message_id),
    ] {
        if let Some(id) = value {
            if Uuid::parse_str(id).is_err() {
                return Err(DatabaseError::constraint(field, "Invalid identifier"));
            }
        }
    }
    Ok(())
}

/// Record feedback for `owner_id`. Returns the new feedback id.
///
/// Conversation and message references are format-checked only; they may
/// point at retired or pruned records.
pub fn submit(
    conn: &Connection,
    owner_id: &str,
    feedback: NewFeedback,
) -> Result<String, DatabaseError> {
    validate(&feedback)?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO feedback (id, owner_id, conversation_id, message_id, rating,
                               category, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            owner_id,
            feedback.conversation_id,
            feedback.message_id,
            feedback.rating,
            feedback.category.as_str(),
            feedback.comment,
            format_timestamp(&Utc::now()),
        ],
    )?;

    tracing::info!(
        owner = owner_id,
        rating = feedback.rating,
        category = feedback.category.as_str(),
        "Feedback recorded"
    );
    Ok(id)
}

pub fn get_feedback(conn: &Connection, id: &str) -> Result<Feedback, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, owner_id, conversation_id, message_id, rating, category, comment, created_at
             FROM feedback WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, String>(7)?,
                ))
            },
        )
        .optional()?;

    let Some((id, owner_id, conversation_id, message_id, rating, category, comment, created_at)) = row
    else {
        return Err(DatabaseError::NotFound {
            entity_type: "Feedback".into(),
            id: id.into(),
        });
    };

    Ok(Feedback {
        id,
        owner_id,
        conversation_id,
        message_id,
        rating: u8::try_from(rating)
            .map_err(|_| DatabaseError::constraint("rating", format!("Stored rating {rating} out of range")))?,
        category: category.parse()?,
        comment,
        timestamp: parse_timestamp(&created_at)?,
    })
}
