//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One axum router serves the LINE webhook, the server-rendered admin panel
//! under `/admin`, and the JSON API under `/api`. Anything else redirects to
//! the admin login screen.

pub mod admin;
pub mod api;
pub mod webhook;

use axum::Router;
use axum::http::StatusCode;
use axum::response::Redirect;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/webhook", post(webhook::handle_webhook))
        .route("/admin", get(admin::dashboard))
        .route("/admin/login", get(admin::login_page).post(admin::login))
        .route("/admin/logout", post(admin::logout))
        .route("/admin/messages", get(admin::messages_page))
        .route("/admin/tasks", get(admin::tasks_page))
        .route("/admin/tasks/{id}/supplement", post(admin::supplement))
        .route("/admin/settings", get(admin::settings_page).post(admin::save_settings))
        .route("/api/messages", get(api::list_messages))
        .route("/api/tasks", get(api::list_tasks))
        .route("/api/tasks/{id}", get(api::get_task).patch(api::supplement_task))
        .route("/api/tasks/{id}/status", post(api::update_status))
        .route("/api/tasks/{id}/logs", get(api::task_logs))
        .route("/api/tasks/{id}/flow", get(api::get_flow).put(api::save_flow))
        .route("/api/settings", get(api::get_settings).put(api::save_settings))
        .route("/healthz", get(healthz))
        .fallback(fallback)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn fallback() -> Redirect {
    Redirect::to("/admin/login")
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
