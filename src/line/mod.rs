//! LINE Messaging API — webhook verification, payload types, and the
//! outbound reply/push/broadcast client.
//!
//! DESIGN
//! ======
//! Services talk to LINE through the [`LineMessenger`] trait so the
//! assistant and scheduler can be exercised against a recording mock.
//! `LineClient` is the reqwest-backed implementation.

pub mod events;
pub mod signature;

use std::time::Duration;

use serde_json::json;

pub const DEFAULT_LINE_API_BASE_URL: &str = "https://api.line.me";

/// LINE rejects text messages longer than this many characters.
pub const MAX_TEXT_CHARS: usize = 5000;

const REQUEST_TIMEOUT_SECS: u64 = 15;

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone)]
pub struct LineConfig {
    pub channel_access_token: String,
    pub channel_secret: String,
    pub api_base_url: String,
}

impl LineConfig {
    /// Load from `LINE_CHANNEL_ACCESS_TOKEN`, `LINE_CHANNEL_SECRET` and the
    /// optional `LINE_API_BASE_URL`. Returns `None` if either credential is
    /// missing (the webhook then answers 503).
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let channel_access_token = crate::env::non_empty("LINE_CHANNEL_ACCESS_TOKEN")?;
        let channel_secret = crate::env::non_empty("LINE_CHANNEL_SECRET")?;
        let api_base_url = crate::env::non_empty("LINE_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_LINE_API_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Some(Self { channel_access_token, channel_secret, api_base_url })
    }
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LineError {
    #[error("LINE request failed: {0}")]
    Request(String),
    #[error("LINE API error: status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

// =============================================================================
// MESSENGER TRAIT
// =============================================================================

/// Outbound text messaging. Implemented by [`LineClient`] and by test mocks.
#[async_trait::async_trait]
pub trait LineMessenger: Send + Sync {
    /// Answer a webhook event using its one-shot reply token.
    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), LineError>;

    /// Send a message to a user, group, or room id.
    async fn push(&self, to: &str, text: &str) -> Result<(), LineError>;

    /// Send a message to every friend of the bot.
    async fn broadcast(&self, text: &str) -> Result<(), LineError>;
}

/// Clip `text` to [`MAX_TEXT_CHARS`] characters, marking the cut with `…`.
#[must_use]
pub fn clip_text(text: &str) -> String {
    if text.chars().count() <= MAX_TEXT_CHARS {
        return text.to_owned();
    }
    let mut clipped: String = text.chars().take(MAX_TEXT_CHARS - 1).collect();
    clipped.push('…');
    clipped
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

pub struct LineClient {
    http: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl LineClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &LineConfig) -> Result<Self, LineError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| LineError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, access_token: config.channel_access_token.clone(), base_url: config.api_base_url.clone() })
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<(), LineError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| LineError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LineError::Api { status: status.as_u16(), body });
        }
        Ok(())
    }
}

fn text_messages(text: &str) -> serde_json::Value {
    json!([{ "type": "text", "text": clip_text(text) }])
}

#[async_trait::async_trait]
impl LineMessenger for LineClient {
    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), LineError> {
        self.post("/v2/bot/message/reply", json!({ "replyToken": reply_token, "messages": text_messages(text) }))
            .await
    }

    async fn push(&self, to: &str, text: &str) -> Result<(), LineError> {
        self.post("/v2/bot/message/push", json!({ "to": to, "messages": text_messages(text) }))
            .await
    }

    async fn broadcast(&self, text: &str) -> Result<(), LineError> {
        self.post("/v2/bot/message/broadcast", json!({ "messages": text_messages(text) }))
            .await
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use std::sync::Mutex;

    use super::{LineError, LineMessenger};

    /// One recorded outbound call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Sent {
        Reply { token: String, text: String },
        Push { to: String, text: String },
        Broadcast { text: String },
    }

    /// Records every call instead of talking to LINE.
    #[derive(Default)]
    pub struct RecordingMessenger {
        pub sent: Mutex<Vec<Sent>>,
    }

    impl RecordingMessenger {
        pub fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl LineMessenger for RecordingMessenger {
        async fn reply(&self, reply_token: &str, text: &str) -> Result<(), LineError> {
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Reply { token: reply_token.into(), text: text.into() });
            Ok(())
        }

        async fn push(&self, to: &str, text: &str) -> Result<(), LineError> {
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Push { to: to.into(), text: text.into() });
            Ok(())
        }

        async fn broadcast(&self, text: &str) -> Result<(), LineError> {
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Broadcast { text: text.into() });
            Ok(())
        }
    }
}
