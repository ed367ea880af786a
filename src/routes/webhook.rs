//! `POST /webhook` — LINE Messaging API callback.
//!
//! The raw body is verified against `X-Line-Signature` before it is parsed.
//! Each text message is answered on its own task so LINE gets its 200
//! immediately; replies go out through the reply token.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::line::events::{Event, WebhookBody};
use crate::line::signature;
use crate::services::assistant;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "x-line-signature";

pub async fn handle_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let (Some(line), Some(secret)) = (state.line.clone(), state.line_channel_secret.clone()) else {
        return (StatusCode::SERVICE_UNAVAILABLE, "LINE not configured").into_response();
    };

    let header = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if let Err(e) = signature::verify(&secret, &body, header) {
        warn!(error = %e, "webhook signature rejected");
        return (StatusCode::BAD_REQUEST, "invalid signature").into_response();
    }

    let payload: WebhookBody = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "webhook body did not parse");
            return (StatusCode::BAD_REQUEST, "invalid body").into_response();
        }
    };

    debug!(destination = %payload.destination, events = payload.events.len(), "webhook received");
    for event in &payload.events {
        match event {
            Event::Follow { reply_token, source } => {
                info!(user_id = ?source.user_id, "new follower");
                let line = line.clone();
                let reply_token = reply_token.clone();
                tokio::spawn(async move {
                    if let Err(e) = line.reply(&reply_token, assistant::WELCOME_REPLY).await {
                        warn!(error = %e, "welcome reply failed");
                    }
                });
            }
            Event::Unfollow { source } => info!(user_id = ?source.user_id, "follower left"),
            Event::Message { .. } | Event::Other => {}
        }
    }

    for incoming in payload.text_messages() {
        let state = state.clone();
        tokio::spawn(async move {
            assistant::respond(&state, &incoming).await;
        });
    }

    Json(json!({ "status": "success" })).into_response()
}

#[cfg(test)]
#[path = "webhook_test.rs"]
mod tests;
