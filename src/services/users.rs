//! Registered LINE members.
//!
//! Members register themselves through the `/自我介紹` chat command. The
//! department they give is what `部門任務` and the auto-assign toggle key on.

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub line_id: String,
    pub name: String,
    pub department: Option<String>,
    pub title: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

/// Fields parsed from a `/自我介紹` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Introduction {
    pub name: String,
    pub department: String,
    pub title: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IntroductionError {
    /// Fewer than the command line plus three field lines.
    #[error("introduction needs four lines")]
    TooFewLines,
    #[error("line {0} is not a `label：value` pair")]
    Malformed(usize),
}

/// Parse
///
/// ```text
/// /自我介紹
/// 姓名：王小明
/// 部門：行銷
/// 職稱：專員
/// ```
///
/// Both the full-width `：` and ASCII `:` separators are accepted.
///
/// # Errors
///
/// Returns [`IntroductionError`] when lines are missing or a value is empty.
pub fn parse_introduction(text: &str) -> Result<Introduction, IntroductionError> {
    let lines: Vec<&str> = text.trim().lines().map(str::trim).collect();
    if lines.len() < 4 {
        return Err(IntroductionError::TooFewLines);
    }

    let value = |index: usize| -> Result<String, IntroductionError> {
        let line = lines[index];
        let (_, value) = line
            .split_once('：')
            .or_else(|| line.split_once(':'))
            .ok_or(IntroductionError::Malformed(index))?;
        let value = value.trim();
        if value.is_empty() {
            return Err(IntroductionError::Malformed(index));
        }
        Ok(value.to_owned())
    };

    Ok(Introduction { name: value(1)?, department: value(2)?, title: value(3)? })
}

/// Insert or refresh a member by LINE id.
///
/// # Errors
///
/// Returns a database error if the upsert fails.
pub async fn register_user(pool: &PgPool, line_id: &str, intro: &Introduction) -> Result<User, sqlx::Error> {
    let row = sqlx::query_as::<_, (String, String, Option<String>, Option<String>, OffsetDateTime)>(
        "INSERT INTO users (line_id, name, department, title)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (line_id) DO UPDATE
         SET name = EXCLUDED.name, department = EXCLUDED.department, title = EXCLUDED.title
         RETURNING line_id, name, department, title, joined_at",
    )
    .bind(line_id)
    .bind(&intro.name)
    .bind(&intro.department)
    .bind(&intro.title)
    .fetch_one(pool)
    .await?;

    tracing::info!(line_id, name = %intro.name, department = %intro.department, "user registered");
    Ok(user_from_tuple(row))
}

/// # Errors
///
/// Returns a database error if the query fails.
pub async fn get_user(pool: &PgPool, line_id: &str) -> Result<Option<User>, sqlx::Error> {
    let row = sqlx::query_as::<_, (String, String, Option<String>, Option<String>, OffsetDateTime)>(
        "SELECT line_id, name, department, title, joined_at FROM users WHERE line_id = $1",
    )
    .bind(line_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(user_from_tuple))
}

/// Exact name lookup used for auto-assignment. When several members share a
/// name the earliest registration wins.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn find_user_by_name(pool: &PgPool, name: &str) -> Result<Option<User>, sqlx::Error> {
    let name = name.trim();
    if name.is_empty() {
        return Ok(None);
    }
    let row = sqlx::query_as::<_, (String, String, Option<String>, Option<String>, OffsetDateTime)>(
        "SELECT line_id, name, department, title, joined_at
         FROM users
         WHERE name = $1
         ORDER BY joined_at ASC
         LIMIT 1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(user_from_tuple))
}

fn user_from_tuple(
    (line_id, name, department, title, joined_at): (String, String, Option<String>, Option<String>, OffsetDateTime),
) -> User {
    User { line_id, name, department, title, joined_at }
}
