//! Admin login and session management.
//!
//! ARCHITECTURE
//! ============
//! There is exactly one admin account, configured through the environment as
//! a username plus the hex SHA-256 of the password. A successful login stores
//! a random token in `admin_sessions`; the browser carries it in an
//! `HttpOnly` cookie and every admin page or API call validates it.
//!
//! TRADE-OFFS
//! ==========
//! Password hashes are unsalted SHA-256 because the operator writes them by
//! hand into `.env`. Comparison is constant-time to avoid leaking prefix
//! matches through response timing.

use std::fmt::Write;

use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};

const DEFAULT_SESSION_HOURS: i32 = 12;

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub username: Option<String>,
    /// Lowercase hex SHA-256 of the admin password.
    pub password_sha256: Option<String>,
    pub session_hours: i32,
    pub cookie_secure: bool,
}

impl AdminConfig {
    /// Load from `ADMIN_USERNAME`, `ADMIN_PASSWORD_SHA256`,
    /// `ADMIN_SESSION_HOURS` and `COOKIE_SECURE`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            username: crate::env::non_empty("ADMIN_USERNAME"),
            password_sha256: crate::env::non_empty("ADMIN_PASSWORD_SHA256").map(|h| h.to_ascii_lowercase()),
            session_hours: crate::env::parse("ADMIN_SESSION_HOURS", DEFAULT_SESSION_HOURS).max(1),
            cookie_secure: crate::env::flag("COOKIE_SECURE").unwrap_or(false),
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_password(username: &str, password: &str) -> Self {
        Self {
            username: Some(username.to_owned()),
            password_sha256: Some(sha256_hex(password)),
            session_hours: DEFAULT_SESSION_HOURS,
            cookie_secure: false,
        }
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.username.is_some() && self.password_sha256.is_some()
    }

    /// Check a login attempt against the configured credential.
    ///
    /// # Errors
    ///
    /// `NotConfigured` when no admin account is set up, `InvalidCredentials`
    /// on any mismatch.
    pub fn verify_credentials(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let (Some(expected_user), Some(expected_hash)) = (&self.username, &self.password_sha256) else {
            return Err(AuthError::NotConfigured);
        };

        // Evaluate both comparisons so a wrong username costs the same as a
        // wrong password.
        let user_ok = constant_time_eq(expected_user.as_bytes(), username.trim().as_bytes());
        let pass_ok = constant_time_eq(expected_hash.as_bytes(), sha256_hex(password).as_bytes());
        if user_ok & pass_ok { Ok(()) } else { Err(AuthError::InvalidCredentials) }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("admin login is not configured")]
    NotConfigured,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =============================================================================
// HASHING AND TOKENS
// =============================================================================

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Lowercase hex SHA-256 of `input`.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    bytes_to_hex(&Sha256::digest(input.as_bytes()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Generate a cryptographically random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

// =============================================================================
// SESSIONS
// =============================================================================

/// Verify credentials and open a session, returning the token.
///
/// # Errors
///
/// Returns an [`AuthError`] for bad credentials or a database failure.
pub async fn login(pool: &PgPool, config: &AdminConfig, username: &str, password: &str) -> Result<String, AuthError> {
    config.verify_credentials(username, password)?;
    let token = create_session(pool, username.trim(), config.session_hours).await?;
    Ok(token)
}

/// Create a session for `username` lasting `hours`, returning the token.
pub async fn create_session(pool: &PgPool, username: &str, hours: i32) -> Result<String, sqlx::Error> {
    let token = generate_token();
    sqlx::query(
        "INSERT INTO admin_sessions (token, username, expires_at) VALUES ($1, $2, now() + make_interval(hours => $3))",
    )
    .bind(&token)
    .bind(username)
    .bind(hours)
    .execute(pool)
    .await?;
    Ok(token)
}

/// Validate a session token and return the admin username.
pub async fn validate_session(pool: &PgPool, token: &str) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query("SELECT username FROM admin_sessions WHERE token = $1 AND expires_at > now()")
        .bind(token)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.get("username")))
}

pub async fn delete_session(pool: &PgPool, token: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM admin_sessions WHERE token = $1")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Remove expired sessions. Returns how many were deleted.
pub async fn purge_expired_sessions(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM admin_sessions WHERE expires_at <= now()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
#[path = "admin_auth_test.rs"]
mod tests;
