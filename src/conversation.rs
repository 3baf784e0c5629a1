//! Conversation store — per-user conversation history and context.
//!
//! Each owner has at most one active conversation. It is created lazily on
//! first access and retired (never deleted) when the owner clears history;
//! the next access starts a fresh one.
//!
//! Appending is a single transaction that inserts the message and prunes the
//! conversation to its newest [`MAX_HISTORY`] entries, so concurrent appends
//! for the same owner cannot overwrite each other's messages.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{format_timestamp, parse_timestamp, DatabaseError};
use crate::models::{
    Conversation, ConversationContext, Message, NewMessage, MAX_HISTORY,
};

// ═══════════════════════════════════════════
// Row mapping
// ═══════════════════════════════════════════

struct ConversationRow {
    id: String,
    owner_id: String,
    context: String,
    is_active: bool,
    last_activity: String,
    created_at: String,
}

struct MessageRow {
    id: String,
    role: String,
    content: String,
    language: String,
    intent: Option<String>,
    confidence: Option<f64>,
    metadata: Option<String>,
    created_at: String,
}

fn message_from_row(row: MessageRow) -> Result<Message, DatabaseError> {
    Ok(Message {
        id: row.id,
        role: row.role.parse()?,
        content: row.content,
        language: row.language.parse()?,
        intent: row.intent,
        confidence: row.confidence,
        timestamp: parse_timestamp(&row.created_at)?,
        metadata: row
            .metadata
            .map(|raw| serde_json::from_str(&raw))
            .transpose()?,
    })
}

fn conversation_from_row(
    row: ConversationRow,
    messages: Vec<Message>,
) -> Result<Conversation, DatabaseError> {
    Ok(Conversation {
        id: row.id,
        owner_id: row.owner_id,
        messages,
        context: serde_json::from_str(&row.context)?,
        active: row.is_active,
        last_activity_at: parse_timestamp(&row.last_activity)?,
        created_at: parse_timestamp(&row.created_at)?,
    })
}

// ═══════════════════════════════════════════
// Internal queries
// ═══════════════════════════════════════════

/// Most recently active conversation among the owner's active ones.
fn find_active_row(conn: &Connection, owner_id: &str) -> Result<Option<ConversationRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, owner_id, context, is_active, last_activity, created_at
             FROM conversations
             WHERE owner_id = ?1 AND is_active = 1
             ORDER BY last_activity DESC, rowid DESC
             LIMIT 1",
            params![owner_id],
            |row| {
                Ok(ConversationRow {
                    id: row.get(0)?,
                    owner_id: row.get(1)?,
                    context: row.get(2)?,
                    is_active: row.get::<_, i32>(3)? != 0,
                    last_activity: row.get(4)?,
                    created_at: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

fn create_conversation(
    conn: &Connection,
    owner_id: &str,
    context: &ConversationContext,
) -> Result<ConversationRow, DatabaseError> {
    let id = Uuid::new_v4().to_string();
    let now = format_timestamp(&Utc::now());
    let context = serde_json::to_string(context)?;

    conn.execute(
        "INSERT INTO conversations (id, owner_id, context, is_active, last_activity, created_at)
         VALUES (?1, ?2, ?3, 1, ?4, ?4)",
        params![id, owner_id, context, now],
    )?;
    tracing::debug!(owner = owner_id, conversation = %id, "Created conversation");

    Ok(ConversationRow {
        id,
        owner_id: owner_id.to_string(),
        context,
        is_active: true,
        last_activity: now.clone(),
        created_at: now,
    })
}

fn ensure_active(conn: &Connection, owner_id: &str) -> Result<ConversationRow, DatabaseError> {
    match find_active_row(conn, owner_id)? {
        Some(row) => Ok(row),
        None => create_conversation(conn, owner_id, &ConversationContext::default()),
    }
}

/// Last `limit` messages of a conversation, oldest first.
fn load_messages(
    conn: &Connection,
    conversation_id: &str,
    limit: usize,
) -> Result<Vec<Message>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, role, content, language, intent, confidence, metadata, created_at
         FROM messages
         WHERE conversation_id = ?1
         ORDER BY seq DESC
         LIMIT ?2",
    )?;

    let rows = stmt
        .query_map(params![conversation_id, limit as i64], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                role: row.get(1)?,
                content: row.get(2)?,
                language: row.get(3)?,
                intent: row.get(4)?,
                confidence: row.get(5)?,
                metadata: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut messages = rows
        .into_iter()
        .map(message_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    messages.reverse();
    Ok(messages)
}

// ═══════════════════════════════════════════
// Store operations
// ═══════════════════════════════════════════

/// The owner's active conversation with its full retained history,
/// created empty if none exists.
pub fn get_active(conn: &Connection, owner_id: &str) -> Result<Conversation, DatabaseError> {
    get_active_recent(conn, owner_id, MAX_HISTORY)
}

/// The owner's active conversation carrying only its last `limit` messages.
pub fn get_active_recent(
    conn: &Connection,
    owner_id: &str,
    limit: usize,
) -> Result<Conversation, DatabaseError> {
    let row = ensure_active(conn, owner_id)?;
    let messages = load_messages(conn, &row.id, limit)?;
    conversation_from_row(row, messages)
}

/// At most the last `limit` messages of the owner's active conversation.
pub fn fetch_recent(
    conn: &Connection,
    owner_id: &str,
    limit: usize,
) -> Result<Vec<Message>, DatabaseError> {
    Ok(get_active_recent(conn, owner_id, limit)?.messages)
}

/// Append a message to the owner's active conversation. Returns the new message id.
pub fn append(
    conn: &mut Connection,
    owner_id: &str,
    message: NewMessage,
) -> Result<String, DatabaseError> {
    message.validate()?;
    let metadata = message
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let tx = conn.transaction()?;
    let conversation = ensure_active(&tx, owner_id)?;
    let now = format_timestamp(&Utc::now());
    let message_id = Uuid::new_v4().to_string();

    let seq: i64 = tx.query_row(
        "SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE conversation_id = ?1",
        params![conversation.id],
        |row| row.get(0),
    )?;

    tx.execute(
        "INSERT INTO messages (id, conversation_id, seq, role, content, language,
                               intent, confidence, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            message_id,
            conversation.id,
            seq,
            message.role.as_str(),
            message.content,
            message.language.as_str(),
            message.intent,
            message.confidence,
            metadata,
            now,
        ],
    )?;

    // Keep only the newest MAX_HISTORY messages
    let pruned = tx.execute(
        "DELETE FROM messages WHERE conversation_id = ?1 AND seq <= ?2",
        params![conversation.id, seq - MAX_HISTORY as i64],
    )?;

    tx.execute(
        "UPDATE conversations SET last_activity = ?2 WHERE id = ?1",
        params![conversation.id, now],
    )?;
    tx.commit()?;

    tracing::debug!(
        owner = owner_id,
        conversation = %conversation.id,
        seq,
        pruned,
        "Appended message"
    );
    Ok(message_id)
}

/// Shallow-merge `update` into the active conversation's context.
/// Returns the resulting context.
pub fn merge_context(
    conn: &mut Connection,
    owner_id: &str,
    update: ConversationContext,
) -> Result<ConversationContext, DatabaseError> {
    let tx = conn.transaction()?;

    let context = match find_active_row(&tx, owner_id)? {
        Some(row) => {
            let mut context: ConversationContext = serde_json::from_str(&row.context)?;
            context.merge(update);
            tx.execute(
                "UPDATE conversations SET context = ?2, last_activity = ?3 WHERE id = ?1",
                params![
                    row.id,
                    serde_json::to_string(&context)?,
                    format_timestamp(&Utc::now()),
                ],
            )?;
            context
        }
        None => {
            create_conversation(&tx, owner_id, &update)?;
            update
        }
    };

    tx.commit()?;
    Ok(context)
}

/// Retire every conversation the owner has. Idempotent; returns how many
/// were active before the call.
pub fn retire_all(conn: &Connection, owner_id: &str) -> Result<usize, DatabaseError> {
    let retired = conn.execute(
        "UPDATE conversations SET is_active = 0 WHERE owner_id = ?1 AND is_active = 1",
        params![owner_id],
    )?;
    tracing::info!(owner = owner_id, retired, "Retired conversations");
    Ok(retired)
}
