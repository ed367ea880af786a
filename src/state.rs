//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor and
//! handed to background schedules. It holds the database pool, the optional
//! outbound integrations (LLM, LINE), admin login settings, and the
//! per-user conversation context the assistant keeps between messages.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;
use time::{OffsetDateTime, UtcOffset};
use tokio::sync::RwLock;

use crate::line::LineMessenger;
use crate::llm::LlmChat;
use crate::rate_limit::RateLimiter;
use crate::services::admin_auth::AdminConfig;

// =============================================================================
// USER CONTEXT
// =============================================================================

/// Last exchange with a LINE user. Kept in memory only; a restart forgets it.
#[derive(Debug, Clone, Serialize)]
pub struct UserContext {
    pub last_message: String,
    pub last_response: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

// =============================================================================
// APP STATE
// =============================================================================

/// Clone is required by Axum — all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    /// `None` if the LLM env vars are not configured; free-text replies then
    /// fall back to the generic error message.
    pub llm: Option<Arc<dyn LlmChat>>,
    /// `None` if the LINE channel is not configured.
    pub line: Option<Arc<dyn LineMessenger>>,
    /// Channel secret used to verify webhook signatures.
    pub line_channel_secret: Option<Arc<str>>,
    pub admin: Arc<AdminConfig>,
    pub contexts: Arc<RwLock<HashMap<String, UserContext>>>,
    pub rate_limiter: RateLimiter,
    /// Offset used for "today" and for the daily/weekly schedules.
    pub local_offset: UtcOffset,
}

impl AppState {
    #[must_use]
    pub fn new(pool: PgPool, admin: AdminConfig) -> Self {
        Self {
            pool,
            llm: None,
            line: None,
            line_channel_secret: None,
            admin: Arc::new(admin),
            contexts: Arc::new(RwLock::new(HashMap::new())),
            rate_limiter: RateLimiter::default(),
            local_offset: UtcOffset::UTC,
        }
    }

    #[must_use]
    pub fn with_llm(mut self, llm: Arc<dyn LlmChat>) -> Self {
        self.llm = Some(llm);
        self
    }

    #[must_use]
    pub fn with_line(mut self, messenger: Arc<dyn LineMessenger>, channel_secret: &str) -> Self {
        self.line = Some(messenger);
        self.line_channel_secret = Some(Arc::from(channel_secret));
        self
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    #[must_use]
    pub fn with_local_offset(mut self, offset: UtcOffset) -> Self {
        self.local_offset = offset;
        self
    }

    /// Current time in [`Self::local_offset`].
    #[must_use]
    pub fn local_now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.local_offset)
    }

    /// Previous exchange with `user_id`, if any.
    pub async fn context_for(&self, user_id: &str) -> Option<UserContext> {
        self.contexts.read().await.get(user_id).cloned()
    }

    /// Replace the stored context for `user_id`, returning the previous one.
    pub async fn swap_context(&self, user_id: &str, next: UserContext) -> Option<UserContext> {
        self.contexts.write().await.insert(user_id.to_owned(), next)
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
