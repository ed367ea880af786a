//! Admin panel — login, dashboard, message log, task log, feature toggles.
//!
//! Pages are askama templates rendered on the server. The session token lives
//! in an `HttpOnly` cookie; [`AdminUser`] sends anyone without a valid
//! session back to the login screen.

use askama::Template;
use axum::extract::{FromRef, Path, Query, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, UtcOffset};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::services::admin_auth::{self, AdminConfig, AuthError};
use crate::services::messages::{self, MessageRecord};
use crate::services::settings::{self, FeatureToggles};
use crate::services::tasks::{self, Task, TaskError, TaskFilter, TaskStatus, TaskSupplement};
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "admin_session";
pub const LOGIN_ERROR: &str = "帳號或密碼錯誤";

// =============================================================================
// SESSION EXTRACTOR
// =============================================================================

/// Logged-in administrator. Pages redirect to the login screen without one.
pub struct AdminUser {
    pub username: String,
}

/// Look up the session named by the request's cookie.
pub(crate) async fn session_user(parts: &Parts, state: &AppState) -> Result<Option<String>, sqlx::Error> {
    let jar = CookieJar::from_headers(&parts.headers);
    let token = jar.get(SESSION_COOKIE).map(Cookie::value).unwrap_or_default();
    if token.is_empty() {
        return Ok(None);
    }
    admin_auth::validate_session(&state.pool, token).await
}

impl<S> axum::extract::FromRequestParts<S> for AdminUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        match session_user(parts, &app_state).await {
            Ok(Some(username)) => Ok(Self { username }),
            Ok(None) => Err(Redirect::to("/admin/login").into_response()),
            Err(e) => {
                error!(error = %e, "session lookup failed");
                Err(StatusCode::INTERNAL_SERVER_ERROR.into_response())
            }
        }
    }
}

fn session_cookie(token: String, config: &AdminConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.cookie_secure)
        .max_age(Duration::hours(i64::from(config.session_hours)))
        .build()
}

fn cleared_cookie(config: &AdminConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.cookie_secure)
        .max_age(Duration::ZERO)
        .build()
}

// =============================================================================
// TEMPLATES
// =============================================================================

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    error: Option<&'static str>,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    username: String,
    current: &'static str,
}

#[derive(Template)]
#[template(path = "messages.html")]
struct MessagesTemplate {
    username: String,
    current: &'static str,
    rows: Vec<MessageRow>,
}

struct MessageRow {
    time: String,
    user_id: String,
    content: String,
    ai_label: &'static str,
}

#[derive(Template)]
#[template(path = "tasks.html")]
struct TasksTemplate {
    username: String,
    current: &'static str,
    keyword: String,
    status: String,
    rows: Vec<TaskRow>,
}

struct TaskRow {
    id: Uuid,
    description: String,
    assignee: String,
    due: String,
    status: &'static str,
    needs_info: bool,
}

#[derive(Template)]
#[template(path = "settings.html")]
struct SettingsTemplate {
    username: String,
    current: &'static str,
    toggles: FeatureToggles,
    saved: bool,
}

fn render<T: Template>(template: &T) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(error = %e, "template render failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn display_time(at: OffsetDateTime, offset: UtcOffset) -> String {
    at.to_offset(offset)
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_default()
}

fn message_row(record: MessageRecord, offset: UtcOffset) -> MessageRow {
    MessageRow {
        time: display_time(record.timestamp, offset),
        ai_label: record.ai_label(),
        user_id: record.user_id,
        content: record.content,
    }
}

fn task_row(task: &Task) -> TaskRow {
    TaskRow {
        id: task.id,
        description: task.description_label().to_owned(),
        assignee: task.assignee_label().to_owned(),
        due: task.due_label(),
        status: task.status.label(),
        needs_info: task.needs_info(),
    }
}

// =============================================================================
// LOGIN
// =============================================================================

#[derive(Deserialize)]
pub struct LoginForm {
    username: String,
    password: String,
}

/// `GET /admin/login`
pub async fn login_page() -> Response {
    render(&LoginTemplate { error: None })
}

/// `POST /admin/login` — check credentials, open a session, go to `/admin`.
pub async fn login(State(state): State<AppState>, jar: CookieJar, Form(form): Form<LoginForm>) -> Response {
    match admin_auth::login(&state.pool, &state.admin, &form.username, &form.password).await {
        Ok(token) => {
            info!(username = %form.username.trim(), "admin logged in");
            let jar = jar.add(session_cookie(token, &state.admin));
            (jar, Redirect::to("/admin")).into_response()
        }
        Err(AuthError::NotConfigured) => {
            warn!("admin login attempted but no admin credentials are configured");
            (StatusCode::UNAUTHORIZED, render(&LoginTemplate { error: Some(LOGIN_ERROR) })).into_response()
        }
        Err(AuthError::InvalidCredentials) => {
            info!(username = %form.username.trim(), "admin login rejected");
            (StatusCode::UNAUTHORIZED, render(&LoginTemplate { error: Some(LOGIN_ERROR) })).into_response()
        }
        Err(AuthError::Database(e)) => {
            error!(error = %e, "admin session creation failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `POST /admin/logout` — drop the session and clear the cookie.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_owned()) {
        if let Err(e) = admin_auth::delete_session(&state.pool, &token).await {
            warn!(error = %e, "session delete failed");
        }
    }
    let jar = jar.add(cleared_cookie(&state.admin));
    (jar, Redirect::to("/admin/login")).into_response()
}

// =============================================================================
// PAGES
// =============================================================================

/// `GET /admin`
pub async fn dashboard(admin: AdminUser) -> Response {
    render(&DashboardTemplate { username: admin.username, current: "dashboard" })
}

/// `GET /admin/messages` — one read; a failure is logged and shows no rows.
pub async fn messages_page(State(state): State<AppState>, admin: AdminUser) -> Response {
    let records = match messages::list_messages(&state.pool, None).await {
        Ok(records) => records,
        Err(e) => {
            error!(error = %e, "message log read failed");
            Vec::new()
        }
    };
    let rows = records.into_iter().map(|r| message_row(r, state.local_offset)).collect();
    render(&MessagesTemplate { username: admin.username, current: "messages", rows })
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskSearch {
    #[serde(default)]
    keyword: String,
    #[serde(default)]
    status: String,
}

impl TaskSearch {
    fn filter(&self) -> TaskFilter {
        let keyword = self.keyword.trim();
        TaskFilter {
            keyword: (!keyword.is_empty()).then(|| keyword.to_owned()),
            status: TaskStatus::parse(&self.status),
            ..TaskFilter::default()
        }
    }
}

/// `GET /admin/tasks`
pub async fn tasks_page(State(state): State<AppState>, admin: AdminUser, Query(search): Query<TaskSearch>) -> Response {
    let tasks = match tasks::list_tasks(&state.pool, &search.filter()).await {
        Ok(tasks) => tasks,
        Err(e) => {
            error!(error = %e, "task log read failed");
            Vec::new()
        }
    };
    render(&TasksTemplate {
        username: admin.username,
        current: "tasks",
        keyword: search.keyword.trim().to_owned(),
        status: search.status,
        rows: tasks.iter().map(task_row).collect(),
    })
}

/// `POST /admin/tasks/{id}/supplement` — fill in assignee, due date, or
/// description from the task table.
pub async fn supplement(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Form(form): Form<TaskSupplement>,
) -> Response {
    match tasks::supplement_task(&state.pool, id, &form, &admin.username).await {
        Ok(task) => {
            info!(task_id = %task.id, admin = %admin.username, "task supplemented");
            Redirect::to("/admin/tasks").into_response()
        }
        Err(TaskError::NotFound(_)) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!(error = %e, %id, "task supplement failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `GET /admin/settings`
pub async fn settings_page(State(state): State<AppState>, admin: AdminUser) -> Response {
    match settings::get_feature_toggles(&state.pool).await {
        Ok(toggles) => render(&SettingsTemplate { username: admin.username, current: "settings", toggles, saved: false }),
        Err(e) => {
            error!(error = %e, "feature toggle read failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Checkbox form: a field is present only when ticked.
#[derive(Debug, Default, Deserialize)]
pub struct SettingsForm {
    auto_weekly_report: Option<String>,
    auto_follow_up: Option<String>,
    auto_assign: Option<String>,
}

impl From<SettingsForm> for FeatureToggles {
    fn from(form: SettingsForm) -> Self {
        Self {
            auto_weekly_report: form.auto_weekly_report.is_some(),
            auto_follow_up: form.auto_follow_up.is_some(),
            auto_assign: form.auto_assign.is_some(),
        }
    }
}

/// `POST /admin/settings`
pub async fn save_settings(State(state): State<AppState>, admin: AdminUser, Form(form): Form<SettingsForm>) -> Response {
    let toggles = FeatureToggles::from(form);
    match settings::save_feature_toggles(&state.pool, toggles).await {
        Ok(()) => {
            info!(admin = %admin.username, ?toggles, "feature toggles saved");
            render(&SettingsTemplate { username: admin.username, current: "settings", toggles, saved: true })
        }
        Err(e) => {
            error!(error = %e, "feature toggle save failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
#[path = "admin_test.rs"]
mod tests;
