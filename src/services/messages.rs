//! Message log — every processed LINE text message with the bot's answer.
//!
//! The admin message page and `GET /api/messages` read from here. Only the
//! `is_task` field of the stored classifier result is ever interpreted; the
//! rest of `ai_result` is kept for inspection.

use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

const DEFAULT_LIST_LIMIT: i64 = 200;

/// Processing outcome stored alongside a message.
pub const STATUS_PROCESSED: &str = "processed";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_RATE_LIMITED: &str = "rate_limited";

#[derive(Debug, Clone, Serialize)]
pub struct MessageRecord {
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub user_id: String,
    pub group_id: Option<String>,
    pub content: String,
    pub response: Option<String>,
    pub status: String,
    /// Untyped classifier output, `None` for commands and failures.
    pub ai_result: Option<Value>,
}

impl MessageRecord {
    /// `任務` / `一般訊息` / empty, per the stored `is_task` flag.
    #[must_use]
    pub fn ai_label(&self) -> &'static str {
        ai_label(self.ai_result.as_ref())
    }
}

/// Label for a classifier result: `任務` when `is_task` is true, `一般訊息`
/// when it is anything else, empty when there is no result at all.
#[must_use]
pub fn ai_label(ai_result: Option<&Value>) -> &'static str {
    match ai_result {
        None | Some(Value::Null) => "",
        Some(result) if result.get("is_task").and_then(Value::as_bool) == Some(true) => "任務",
        Some(_) => "一般訊息",
    }
}

/// Insert payload for [`log_message`].
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    /// Assigned by the caller so tasks can reference the message before it
    /// is written.
    pub id: Uuid,
    pub line_message_id: Option<String>,
    pub user_id: String,
    pub group_id: Option<String>,
    pub content: String,
    pub response: Option<String>,
    pub status: String,
    /// Previous conversation context for this user.
    pub context: Value,
    pub ai_result: Option<Value>,
}

/// Persist a message, returning its id.
///
/// # Errors
///
/// Returns a database error if the insert fails.
pub async fn log_message(pool: &PgPool, message: &NewMessage) -> Result<Uuid, sqlx::Error> {
    let id = message.id;
    let context = if message.context.is_null() { Value::Object(serde_json::Map::new()) } else { message.context.clone() };

    sqlx::query(
        "INSERT INTO messages (id, line_message_id, user_id, group_id, content, response, status, context, ai_result)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(id)
    .bind(&message.line_message_id)
    .bind(&message.user_id)
    .bind(&message.group_id)
    .bind(&message.content)
    .bind(&message.response)
    .bind(&message.status)
    .bind(&context)
    .bind(&message.ai_result)
    .execute(pool)
    .await?;

    tracing::debug!(message_id = %id, user_id = %message.user_id, status = %message.status, "message logged");
    Ok(id)
}

/// Newest messages first.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_messages(pool: &PgPool, limit: Option<i64>) -> Result<Vec<MessageRecord>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, created_at, user_id, group_id, content, response, status, ai_result
         FROM messages
         ORDER BY created_at DESC
         LIMIT $1",
    )
    .bind(limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 1000))
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(record_from_row).collect())
}

fn record_from_row(row: &PgRow) -> MessageRecord {
    MessageRecord {
        id: row.get("id"),
        timestamp: row.get("created_at"),
        user_id: row.get("user_id"),
        group_id: row.get("group_id"),
        content: row.get("content"),
        response: row.get("response"),
        status: row.get("status"),
        ai_result: row.get("ai_result"),
    }
}
