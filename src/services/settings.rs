//! Per-user notification settings and the global automation toggles.
//!
//! DESIGN
//! ======
//! Both tables are read with defaults: a missing row is not an error, it
//! means "never changed". Feature toggles live in a single-row table
//! (`id = 1`) edited from the admin settings page and read by the assistant
//! and the weekly schedule.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;

pub const DEFAULT_LANGUAGE: &str = "zh-TW";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub notification_enabled: bool,
    pub language: String,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self { notification_enabled: true, language: DEFAULT_LANGUAGE.to_string() }
    }
}

impl UserSettings {
    /// Chat reply for `/settings`.
    #[must_use]
    pub fn describe(&self) -> String {
        let notifications = if self.notification_enabled { "開啟" } else { "關閉" };
        format!("⚙️ 個人設定\n\n通知：{notifications}\n語言：{}", self.language)
    }
}

/// Automation switches shown on the admin settings page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureToggles {
    /// Broadcast the weekly report every Monday morning.
    pub auto_weekly_report: bool,
    /// Push a follow-up asking for the missing assignee or due date.
    pub auto_follow_up: bool,
    /// Assign new tasks to the registered member named in the message.
    pub auto_assign: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self { auto_weekly_report: true, auto_follow_up: false, auto_assign: false }
    }
}

/// # Errors
///
/// Returns a database error if the query fails.
pub async fn get_user_settings(pool: &PgPool, user_id: &str) -> Result<UserSettings, sqlx::Error> {
    let row = sqlx::query_as::<_, (bool, String)>(
        "SELECT notification_enabled, language FROM user_settings WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map_or_else(UserSettings::default, |(notification_enabled, language)| UserSettings {
        notification_enabled,
        language,
    }))
}

/// # Errors
///
/// Returns a database error if the upsert fails.
pub async fn update_user_settings(pool: &PgPool, user_id: &str, settings: &UserSettings) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO user_settings (user_id, notification_enabled, language)
         VALUES ($1, $2, $3)
         ON CONFLICT (user_id) DO UPDATE
         SET notification_enabled = EXCLUDED.notification_enabled,
             language = EXCLUDED.language,
             updated_at = now()",
    )
    .bind(user_id)
    .bind(settings.notification_enabled)
    .bind(&settings.language)
    .execute(pool)
    .await?;
    Ok(())
}

/// # Errors
///
/// Returns a database error if the query fails.
pub async fn get_feature_toggles(pool: &PgPool) -> Result<FeatureToggles, sqlx::Error> {
    let row = sqlx::query_as::<_, (bool, bool, bool)>(
        "SELECT auto_weekly_report, auto_follow_up, auto_assign FROM feature_toggles WHERE id = 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map_or_else(FeatureToggles::default, |(auto_weekly_report, auto_follow_up, auto_assign)| {
        FeatureToggles { auto_weekly_report, auto_follow_up, auto_assign }
    }))
}

/// # Errors
///
/// Returns a database error if the upsert fails.
pub async fn save_feature_toggles(pool: &PgPool, toggles: FeatureToggles) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO feature_toggles (id, auto_weekly_report, auto_follow_up, auto_assign)
         VALUES (1, $1, $2, $3)
         ON CONFLICT (id) DO UPDATE
         SET auto_weekly_report = EXCLUDED.auto_weekly_report,
             auto_follow_up = EXCLUDED.auto_follow_up,
             auto_assign = EXCLUDED.auto_assign,
             updated_at = now()",
    )
    .bind(toggles.auto_weekly_report)
    .bind(toggles.auto_follow_up)
    .bind(toggles.auto_assign)
    .execute(pool)
    .await?;

    tracing::info!(
        auto_weekly_report = toggles.auto_weekly_report,
        auto_follow_up = toggles.auto_follow_up,
        auto_assign = toggles.auto_assign,
        "feature toggles saved"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_settings_defaults() {
        let s = UserSettings::default();
        assert!(s.notification_enabled);
        assert_eq!(s.language, "zh-TW");
    }

    #[test]
    fn user_settings_describe() {
        let s = UserSettings { notification_enabled: false, language: "en".into() };
        assert_eq!(s.describe(), "⚙️ 個人設定\n\n通知：關閉\n語言：en");
    }

    #[test]
    fn feature_toggle_defaults() {
        let t = FeatureToggles::default();
        assert!(t.auto_weekly_report);
        assert!(!t.auto_follow_up);
        assert!(!t.auto_assign);
    }

    #[test]
    fn feature_toggles_json_shape() {
        let value = serde_json::to_value(FeatureToggles::default()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "auto_weekly_report": true, "auto_follow_up": false, "auto_assign": false })
        );
    }

    #[cfg(feature = "live-db-tests")]
    #[tokio::test]
    async fn user_settings_round_trip() {
        let pool = crate::db::test_helpers::integration_pool().await;
        let user_id = format!("U-{}", uuid::Uuid::new_v4());
        assert_eq!(get_user_settings(&pool, &user_id).await.unwrap(), UserSettings::default());

        let next = UserSettings { notification_enabled: false, language: "en".into() };
        update_user_settings(&pool, &user_id, &next).await.unwrap();
        assert_eq!(get_user_settings(&pool, &user_id).await.unwrap(), next);
    }
}
