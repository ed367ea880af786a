//! Task service — creation, queries, status changes, hand-off flows, and the
//! audit log.
//!
//! DESIGN
//! ======
//! Tasks are created from classified LINE messages and edited from the admin
//! panel. Every status change and admin supplement writes a `task_logs` row in
//! the same transaction as the update, so the log never disagrees with the
//! task.
//!
//! A task "needs info" while it has no assignee or no due date; the admin
//! task table renders those gaps as `（缺負責人）` and `待補充`.

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime};
use uuid::Uuid;

/// Longest title derived from a task description.
const TITLE_MAX_CHARS: usize = 50;
const DEFAULT_LIST_LIMIT: i64 = 200;

pub const MISSING_ASSIGNEE: &str = "（缺負責人）";
pub const MISSING_INFO: &str = "待補充";

const TASK_COLUMNS: &str = "id, title, description, assignee, assignee_id, department, due_date, priority, status, \
                            created_by, created_at, updated_at";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("task not found: {0}")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Label shown in the admin table and chat replies.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "待處理",
            Self::InProgress => "進行中",
            Self::Completed => "已完成",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Accepts the model's `高`/`中`/`低` as well as the stored English names.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "高" | "high" => Some(Self::High),
            "中" | "medium" => Some(Self::Medium),
            "低" | "low" => Some(Self::Low),
            _ => None,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::High => "高",
            Self::Medium => "中",
            Self::Low => "低",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    /// Name as written in the chat message.
    pub assignee: Option<String>,
    /// LINE id of the registered user the task was assigned to.
    pub assignee_id: Option<String>,
    pub department: Option<String>,
    #[serde(with = "super::iso_date::option")]
    pub due_date: Option<Date>,
    pub priority: Priority,
    pub status: TaskStatus,
    pub created_by: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Task {
    #[must_use]
    pub fn needs_info(&self) -> bool {
        self.assignee_display().is_none() || self.due_date.is_none()
    }

    fn assignee_display(&self) -> Option<&str> {
        self.assignee
            .as_deref()
            .or(self.assignee_id.as_deref())
            .filter(|a| !a.trim().is_empty())
    }

    #[must_use]
    pub fn assignee_label(&self) -> &str {
        self.assignee_display().unwrap_or(MISSING_ASSIGNEE)
    }

    #[must_use]
    pub fn due_label(&self) -> String {
        self.due_date
            .map_or_else(|| MISSING_INFO.to_string(), iso_date_string)
    }

    /// Description if present, otherwise the title.
    #[must_use]
    pub fn description_label(&self) -> &str {
        self.description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(&self.title)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskCounts {
    pub total: usize,
    pub completed: usize,
}

impl TaskCounts {
    #[must_use]
    pub fn of(tasks: &[Task]) -> Self {
        let completed = tasks.iter().filter(|t| t.status == TaskStatus::Completed).count();
        Self { total: tasks.len(), completed }
    }

    /// Everything not completed, pending included.
    #[must_use]
    pub fn open(&self) -> usize {
        self.total - self.completed
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn completion_rate(&self) -> f64 {
        if self.total == 0 { 0.0 } else { self.completed as f64 / self.total as f64 * 100.0 }
    }
}

/// Insert payload for [`create_task`].
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub assignee: Option<String>,
    pub assignee_id: Option<String>,
    pub department: Option<String>,
    pub due_date: Option<Date>,
    pub priority: Priority,
    pub created_by: Option<String>,
    pub source_message_id: Option<Uuid>,
}

impl NewTask {
    /// Build a task whose title is the first line of `description`.
    #[must_use]
    pub fn from_description(description: &str) -> Self {
        Self {
            title: title_from_description(description),
            description: Some(description.trim().to_owned()).filter(|d| !d.is_empty()),
            ..Self::default()
        }
    }
}

/// Filters for [`list_tasks`]. Every set field narrows the result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    /// Case-insensitive substring of title or description.
    pub keyword: Option<String>,
    /// Assignee name as written in chat.
    pub assignee: Option<String>,
    /// Assignee LINE id. When both this and `assignee` are set, either matches.
    pub assignee_id: Option<String>,
    pub department: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_after: Option<OffsetDateTime>,
    #[serde(default)]
    pub unassigned: bool,
    /// Leave out completed tasks.
    #[serde(default)]
    pub open_only: bool,
    pub limit: Option<i64>,
}

/// Admin edits from the task table. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskSupplement {
    pub assignee: Option<String>,
    #[serde(default, deserialize_with = "form_date::deserialize")]
    pub due_date: Option<Date>,
    pub description: Option<String>,
}

impl TaskSupplement {
    /// Trim text fields and treat blanks as "unchanged".
    #[must_use]
    pub fn normalized(&self) -> Self {
        let clean = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned);
        Self { assignee: clean(&self.assignee), due_date: self.due_date, description: clean(&self.description) }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignee.is_none() && self.due_date.is_none() && self.description.is_none()
    }

    /// Audit log text, e.g. `補充資訊：負責人=小明、截止日=2024-06-01`.
    fn log_action(&self) -> String {
        let mut parts = Vec::new();
        if let Some(a) = &self.assignee {
            parts.push(format!("負責人={a}"));
        }
        if let Some(d) = self.due_date {
            parts.push(format!("截止日={}", iso_date_string(d)));
        }
        if self.description.is_some() {
            parts.push("描述".to_string());
        }
        format!("補充資訊：{}", parts.join("、"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFlowStep {
    pub step_number: i32,
    pub department: Option<String>,
    pub handler_id: Option<String>,
    #[serde(default = "default_flow_status")]
    pub status: String,
}

fn default_flow_status() -> String {
    "pending".into()
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskLog {
    pub id: Uuid,
    pub task_id: Uuid,
    pub actor: String,
    pub action: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

// =============================================================================
// HELPERS
// =============================================================================

#[must_use]
pub fn title_from_description(description: &str) -> String {
    let first_line = description.trim().lines().next().unwrap_or_default().trim();
    if first_line.chars().count() <= TITLE_MAX_CHARS {
        return first_line.to_owned();
    }
    let mut title: String = first_line.chars().take(TITLE_MAX_CHARS - 1).collect();
    title.push('…');
    title
}

/// Parse `YYYY-MM-DD` or `YYYY/M/D`. A trailing time of day, as in
/// `2024-06-07 18:00` or `2024-06-07T18:00`, is ignored.
#[must_use]
pub fn parse_due_date(raw: &str) -> Option<Date> {
    let normalized = raw.trim().replace('/', "-");
    let day = normalized.split([' ', 'T']).next()?;
    Date::parse(day, format_description!("[year]-[month padding:none]-[day padding:none]")).ok()
}

#[must_use]
pub fn iso_date_string(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]")).unwrap_or_default()
}

/// Lenient `Option<Date>` input for forms and the API. Blank strings mean
/// "unchanged".
mod form_date {
    use serde::{Deserialize, Deserializer, de};
    use time::Date;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Date>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => super::parse_due_date(s)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid date: {s}"))),
        }
    }
}

/// `%keyword%` with the keyword's own `%`, `_` and `\` matched literally.
fn like_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn task_from_row(row: &PgRow) -> Task {
    let priority: String = row.get("priority");
    let status: String = row.get("status");
    Task {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        assignee: row.get("assignee"),
        assignee_id: row.get("assignee_id"),
        department: row.get("department"),
        due_date: row.get("due_date"),
        priority: Priority::parse(&priority).unwrap_or_default(),
        status: TaskStatus::parse(&status).unwrap_or(TaskStatus::Pending),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn list_query(filter: &TaskFilter) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {TASK_COLUMNS} FROM tasks WHERE TRUE"));

    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if filter.open_only {
        builder.push(" AND status <> 'completed'");
    }
    if let Some(keyword) = filter.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        let pattern = like_pattern(keyword);
        builder
            .push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR description ILIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    let assignee = filter.assignee.as_deref().map(str::trim).filter(|a| !a.is_empty());
    let assignee_id = filter.assignee_id.as_deref().map(str::trim).filter(|a| !a.is_empty());
    match (assignee_id, assignee) {
        (Some(id), Some(name)) => {
            builder
                .push(" AND (assignee_id = ")
                .push_bind(id.to_owned())
                .push(" OR assignee = ")
                .push_bind(name.to_owned())
                .push(")");
        }
        (Some(id), None) => {
            builder.push(" AND assignee_id = ").push_bind(id.to_owned());
        }
        (None, Some(name)) => {
            builder.push(" AND assignee = ").push_bind(name.to_owned());
        }
        (None, None) => {}
    }
    if let Some(department) = filter.department.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        builder.push(" AND department = ").push_bind(department.to_owned());
    }
    if let Some(after) = filter.created_after {
        builder.push(" AND created_at >= ").push_bind(after);
    }
    if filter.unassigned {
        builder.push(" AND (assignee IS NULL OR assignee = '') AND assignee_id IS NULL");
    }

    builder.push(" ORDER BY created_at DESC LIMIT ");
    builder.push_bind(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 1000));
    builder
}

// =============================================================================
// QUERIES
// =============================================================================

/// Insert a task and log its creation.
///
/// # Errors
///
/// Returns a database error if the insert fails.
pub async fn create_task(pool: &PgPool, new: &NewTask) -> Result<Task, TaskError> {
    let id = Uuid::new_v4();
    let mut tx = pool.begin().await?;
    let row = sqlx::query(&format!(
        "INSERT INTO tasks (id, title, description, assignee, assignee_id, department, due_date, priority, \
                            created_by, source_message_id)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         RETURNING {TASK_COLUMNS}"
    ))
    .bind(id)
    .bind(&new.title)
    .bind(&new.description)
    .bind(&new.assignee)
    .bind(&new.assignee_id)
    .bind(&new.department)
    .bind(new.due_date)
    .bind(new.priority.as_str())
    .bind(&new.created_by)
    .bind(new.source_message_id)
    .fetch_one(tx.as_mut())
    .await?;

    insert_log(&mut tx, id, new.created_by.as_deref().unwrap_or("system"), "建立任務").await?;
    tx.commit().await?;

    let task = task_from_row(&row);
    tracing::info!(task_id = %task.id, title = %task.title, needs_info = task.needs_info(), "task created");
    Ok(task)
}

/// List tasks newest first.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_tasks(pool: &PgPool, filter: &TaskFilter) -> Result<Vec<Task>, TaskError> {
    let rows = list_query(filter).build().fetch_all(pool).await?;
    Ok(rows.iter().map(task_from_row).collect())
}

/// Task totals across the whole table, for `/status`.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn count_tasks(pool: &PgPool) -> Result<TaskCounts, TaskError> {
    let (total, completed): (i64, i64) =
        sqlx::query_as("SELECT COUNT(*), COUNT(*) FILTER (WHERE status = 'completed') FROM tasks")
            .fetch_one(pool)
            .await?;
    Ok(TaskCounts {
        total: usize::try_from(total).unwrap_or_default(),
        completed: usize::try_from(completed).unwrap_or_default(),
    })
}

/// Tasks created in the seven days before `now`.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn weekly_tasks(pool: &PgPool, now: OffsetDateTime) -> Result<Vec<Task>, TaskError> {
    let filter = TaskFilter { created_after: Some(now - Duration::days(7)), ..TaskFilter::default() };
    list_tasks(pool, &filter).await
}

/// # Errors
///
/// Returns a database error if the query fails.
pub async fn get_task(pool: &PgPool, id: Uuid) -> Result<Option<Task>, TaskError> {
    let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(task_from_row))
}

/// Change a task's status and log `更新狀態為 {status}`.
///
/// # Errors
///
/// `NotFound` if the task does not exist, otherwise a database error.
pub async fn update_task_status(pool: &PgPool, id: Uuid, status: TaskStatus, actor: &str) -> Result<Task, TaskError> {
    let mut tx = pool.begin().await?;
    let row = sqlx::query(&format!(
        "UPDATE tasks SET status = $2, updated_at = now() WHERE id = $1 RETURNING {TASK_COLUMNS}"
    ))
    .bind(id)
    .bind(status.as_str())
    .fetch_optional(tx.as_mut())
    .await?
    .ok_or(TaskError::NotFound(id))?;

    insert_log(&mut tx, id, actor, &format!("更新狀態為 {}", status.as_str())).await?;
    tx.commit().await?;

    tracing::info!(task_id = %id, status = status.as_str(), actor, "task status updated");
    Ok(task_from_row(&row))
}

/// Fill in missing assignee, due date, or description from the admin panel.
///
/// # Errors
///
/// `NotFound` if the task does not exist, otherwise a database error.
pub async fn supplement_task(
    pool: &PgPool,
    id: Uuid,
    supplement: &TaskSupplement,
    actor: &str,
) -> Result<Task, TaskError> {
    let supplement = &supplement.normalized();
    if supplement.is_empty() {
        return get_task(pool, id).await?.ok_or(TaskError::NotFound(id));
    }

    let mut tx = pool.begin().await?;
    let row = sqlx::query(&format!(
        "UPDATE tasks
         SET assignee = COALESCE($2, assignee),
             due_date = COALESCE($3, due_date),
             description = COALESCE($4, description),
             updated_at = now()
         WHERE id = $1
         RETURNING {TASK_COLUMNS}"
    ))
    .bind(id)
    .bind(&supplement.assignee)
    .bind(supplement.due_date)
    .bind(&supplement.description)
    .fetch_optional(tx.as_mut())
    .await?
    .ok_or(TaskError::NotFound(id))?;

    insert_log(&mut tx, id, actor, &supplement.log_action()).await?;
    tx.commit().await?;

    tracing::info!(task_id = %id, actor, "task supplemented");
    Ok(task_from_row(&row))
}

async fn insert_log(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    task_id: Uuid,
    actor: &str,
    action: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO task_logs (id, task_id, actor, action) VALUES ($1, $2, $3, $4)")
        .bind(Uuid::new_v4())
        .bind(task_id)
        .bind(actor)
        .bind(action)
        .execute(tx.as_mut())
        .await?;
    Ok(())
}

/// Audit entries for a task, oldest first.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn task_logs(pool: &PgPool, task_id: Uuid) -> Result<Vec<TaskLog>, TaskError> {
    let rows = sqlx::query_as::<_, (Uuid, Uuid, String, String, OffsetDateTime)>(
        "SELECT id, task_id, actor, action, created_at FROM task_logs WHERE task_id = $1 ORDER BY created_at ASC",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, task_id, actor, action, created_at)| TaskLog { id, task_id, actor, action, created_at })
        .collect())
}

// =============================================================================
// FLOWS
// =============================================================================

/// Upsert the hand-off steps of a task, keyed by step number.
///
/// # Errors
///
/// `NotFound` if the task does not exist, otherwise a database error.
pub async fn save_task_flow(pool: &PgPool, task_id: Uuid, steps: &[TaskFlowStep]) -> Result<(), TaskError> {
    if get_task(pool, task_id).await?.is_none() {
        return Err(TaskError::NotFound(task_id));
    }

    let mut tx = pool.begin().await?;
    for step in steps {
        sqlx::query(
            "INSERT INTO task_flows (id, task_id, step_number, department, handler_id, status)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (task_id, step_number) DO UPDATE
             SET department = EXCLUDED.department,
                 handler_id = EXCLUDED.handler_id,
                 status = EXCLUDED.status",
        )
        .bind(Uuid::new_v4())
        .bind(task_id)
        .bind(step.step_number)
        .bind(&step.department)
        .bind(&step.handler_id)
        .bind(&step.status)
        .execute(tx.as_mut())
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Hand-off steps ordered by step number.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn get_task_flow(pool: &PgPool, task_id: Uuid) -> Result<Vec<TaskFlowStep>, TaskError> {
    let rows = sqlx::query_as::<_, (i32, Option<String>, Option<String>, String)>(
        "SELECT step_number, department, handler_id, status
         FROM task_flows
         WHERE task_id = $1
         ORDER BY step_number ASC",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(step_number, department, handler_id, status)| TaskFlowStep {
            step_number,
            department,
            handler_id,
            status,
        })
        .collect())
}

#[cfg(test)]
#[path = "tasks_test.rs"]
mod tests;
