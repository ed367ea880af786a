//! JSON API behind the admin session — messages, tasks, task flows, toggles.

use axum::extract::{FromRef, Path, Query, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::routes::admin::session_user;
use crate::services::messages::{self, MessageRecord};
use crate::services::settings::{self, FeatureToggles};
use crate::services::tasks::{self, Task, TaskError, TaskFilter, TaskFlowStep, TaskLog, TaskStatus, TaskSupplement};
use crate::state::AppState;

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Admin session for API calls. Missing or expired sessions get 401.
pub struct ApiAdmin {
    pub username: String,
}

impl<S> axum::extract::FromRequestParts<S> for ApiAdmin
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let username = session_user(parts, &app_state)
            .await
            .map_err(|e| {
                error!(error = %e, "session lookup failed");
                StatusCode::INTERNAL_SERVER_ERROR
            })?
            .ok_or(StatusCode::UNAUTHORIZED)?;
        Ok(Self { username })
    }
}

pub(crate) fn task_error_to_status(err: TaskError) -> StatusCode {
    match err {
        TaskError::NotFound(_) => StatusCode::NOT_FOUND,
        TaskError::Database(e) => {
            error!(error = %e, "task query failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn database_error(err: sqlx::Error) -> StatusCode {
    error!(error = %err, "database query failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

// =============================================================================
// MESSAGES
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub limit: Option<i64>,
}

/// `GET /api/messages` — newest first.
pub async fn list_messages(
    State(state): State<AppState>,
    _admin: ApiAdmin,
    Query(query): Query<MessageQuery>,
) -> Result<Json<Vec<MessageRecord>>, StatusCode> {
    let records = messages::list_messages(&state.pool, query.limit)
        .await
        .map_err(database_error)?;
    Ok(Json(records))
}

// =============================================================================
// TASKS
// =============================================================================

/// `GET /api/tasks` — filter by status, keyword, assignee, department.
pub async fn list_tasks(
    State(state): State<AppState>,
    _admin: ApiAdmin,
    Query(filter): Query<TaskFilter>,
) -> Result<Json<Vec<Task>>, StatusCode> {
    let tasks = tasks::list_tasks(&state.pool, &filter)
        .await
        .map_err(task_error_to_status)?;
    Ok(Json(tasks))
}

#[derive(Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    pub logs: Vec<TaskLog>,
    pub flow: Vec<TaskFlowStep>,
}

/// `GET /api/tasks/{id}` — the task with its audit log and hand-off steps.
pub async fn get_task(
    State(state): State<AppState>,
    _admin: ApiAdmin,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskDetail>, StatusCode> {
    let task = tasks::get_task(&state.pool, id)
        .await
        .map_err(task_error_to_status)?
        .ok_or(StatusCode::NOT_FOUND)?;
    let logs = tasks::task_logs(&state.pool, id).await.map_err(task_error_to_status)?;
    let flow = tasks::get_task_flow(&state.pool, id).await.map_err(task_error_to_status)?;
    Ok(Json(TaskDetail { task, logs, flow }))
}

/// `PATCH /api/tasks/{id}` — supplement assignee, due date, or description.
pub async fn supplement_task(
    State(state): State<AppState>,
    admin: ApiAdmin,
    Path(id): Path<Uuid>,
    Json(body): Json<TaskSupplement>,
) -> Result<Json<Task>, StatusCode> {
    let task = tasks::supplement_task(&state.pool, id, &body, &admin.username)
        .await
        .map_err(task_error_to_status)?;
    info!(task_id = %id, admin = %admin.username, "task supplemented via api");
    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: String,
}

/// `POST /api/tasks/{id}/status`
pub async fn update_status(
    State(state): State<AppState>,
    admin: ApiAdmin,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusBody>,
) -> Result<Json<Task>, StatusCode> {
    let Some(status) = TaskStatus::parse(&body.status) else {
        return Err(StatusCode::BAD_REQUEST);
    };
    let task = tasks::update_task_status(&state.pool, id, status, &admin.username)
        .await
        .map_err(task_error_to_status)?;
    info!(task_id = %id, status = status.as_str(), admin = %admin.username, "task status updated");
    Ok(Json(task))
}

/// `GET /api/tasks/{id}/logs` — oldest first.
pub async fn task_logs(
    State(state): State<AppState>,
    _admin: ApiAdmin,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TaskLog>>, StatusCode> {
    let logs = tasks::task_logs(&state.pool, id).await.map_err(task_error_to_status)?;
    Ok(Json(logs))
}

/// `GET /api/tasks/{id}/flow`
pub async fn get_flow(
    State(state): State<AppState>,
    _admin: ApiAdmin,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TaskFlowStep>>, StatusCode> {
    let flow = tasks::get_task_flow(&state.pool, id).await.map_err(task_error_to_status)?;
    Ok(Json(flow))
}

/// `PUT /api/tasks/{id}/flow` — upsert steps by step number.
pub async fn save_flow(
    State(state): State<AppState>,
    _admin: ApiAdmin,
    Path(id): Path<Uuid>,
    Json(steps): Json<Vec<TaskFlowStep>>,
) -> Result<StatusCode, StatusCode> {
    if steps.iter().any(|s| s.step_number < 1) {
        return Err(StatusCode::BAD_REQUEST);
    }
    tasks::save_task_flow(&state.pool, id, &steps)
        .await
        .map_err(task_error_to_status)?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// SETTINGS
// =============================================================================

/// `GET /api/settings`
pub async fn get_settings(State(state): State<AppState>, _admin: ApiAdmin) -> Result<Json<FeatureToggles>, StatusCode> {
    let toggles = settings::get_feature_toggles(&state.pool).await.map_err(database_error)?;
    Ok(Json(toggles))
}

/// `PUT /api/settings`
pub async fn save_settings(
    State(state): State<AppState>,
    admin: ApiAdmin,
    Json(toggles): Json<FeatureToggles>,
) -> Result<Json<FeatureToggles>, StatusCode> {
    settings::save_feature_toggles(&state.pool, toggles)
        .await
        .map_err(database_error)?;
    info!(admin = %admin.username, ?toggles, "feature toggles saved via api");
    Ok(Json(toggles))
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
