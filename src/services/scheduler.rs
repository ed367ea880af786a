//! Background schedules — due-task reminders, the daily summary, and the
//! Monday weekly report.
//!
//! DESIGN
//! ======
//! Three independent tokio tasks:
//! - reminders every `REMINDER_INTERVAL_SECS` (default hourly)
//! - daily summary at 09:00 local time
//! - weekly report broadcast Monday 09:30 local time, only while the
//!   `auto_weekly_report` toggle is on
//!
//! "Local" is `SCHEDULER_UTC_OFFSET_HOURS` (default +8). [`next_run`] is pure
//! so the calendar maths is tested without sleeping. A failed run is logged
//! and the loop waits [`RETRY_DELAY`] before carrying on.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use time::macros::time;
use time::{OffsetDateTime, Time, UtcOffset, Weekday};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::tasks::{self, Task, TaskError, TaskFilter};
use super::{admin_auth, classifier, reports, settings};
use crate::line::{LineError, LineMessenger};
use crate::state::AppState;

const DEFAULT_UTC_OFFSET_HOURS: i8 = 8;
const DEFAULT_REMINDER_INTERVAL_SECS: u64 = 3600;
pub const RETRY_DELAY: Duration = Duration::from_secs(60);

/// Upper bound on tasks scanned per run.
const SCAN_LIMIT: i64 = 1000;

pub const DAILY_SUMMARY: Schedule = Schedule::Daily { at: time!(9:00) };
pub const WEEKLY_REPORT: Schedule = Schedule::Weekly { weekday: Weekday::Monday, at: time!(9:30) };

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub utc_offset: UtcOffset,
    pub reminder_interval: Duration,
}

impl SchedulerConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let hours = crate::env::parse("SCHEDULER_UTC_OFFSET_HOURS", DEFAULT_UTC_OFFSET_HOURS);
        Self {
            enabled: crate::env::flag("SCHEDULER_ENABLED").unwrap_or(true),
            utc_offset: offset_from_hours(hours),
            reminder_interval: Duration::from_secs(
                crate::env::parse("REMINDER_INTERVAL_SECS", DEFAULT_REMINDER_INTERVAL_SECS).max(60),
            ),
        }
    }
}

/// Whole-hour offset; out-of-range values fall back to UTC.
#[must_use]
pub fn offset_from_hours(hours: i8) -> UtcOffset {
    UtcOffset::from_hms(hours, 0, 0).unwrap_or_else(|_| {
        warn!(hours, "invalid UTC offset; using UTC");
        UtcOffset::UTC
    })
}

// =============================================================================
// CALENDAR
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Daily { at: Time },
    Weekly { weekday: Weekday, at: Time },
}

/// First instant strictly after `now` matching `schedule`, in `now`'s offset.
#[must_use]
pub fn next_run(now: OffsetDateTime, schedule: Schedule) -> OffsetDateTime {
    match schedule {
        Schedule::Daily { at } => {
            let candidate = now.replace_time(at);
            if candidate > now { candidate } else { candidate + time::Duration::days(1) }
        }
        Schedule::Weekly { weekday, at } => {
            let days_ahead = (i64::from(weekday.number_days_from_monday())
                - i64::from(now.weekday().number_days_from_monday()))
            .rem_euclid(7);
            let candidate = now.replace_time(at) + time::Duration::days(days_ahead);
            if candidate > now { candidate } else { candidate + time::Duration::weeks(1) }
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Line(#[from] LineError),
}

// =============================================================================
// JOBS
// =============================================================================

/// `(recipient, text)` reminders for open tasks due within a day. Only tasks
/// assigned to a registered member have a LINE id to push to.
#[must_use]
pub fn reminder_targets(tasks: &[Task], now: OffsetDateTime) -> Vec<(String, String)> {
    reports::due_soon(tasks, now)
        .into_iter()
        .filter_map(|task| {
            let recipient = task.assignee_id.clone()?;
            Some((recipient, reports::reminder_text(task)))
        })
        .collect()
}

/// Distinct assignee LINE ids, sorted.
#[must_use]
pub fn summary_recipients(tasks: &[Task]) -> Vec<String> {
    tasks
        .iter()
        .filter_map(|t| t.assignee_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Tidy in-memory and session state, then push due-soon reminders. Returns
/// how many reminders were sent.
///
/// # Errors
///
/// Returns a [`ScheduleError`] if loading tasks fails.
pub async fn run_reminders(state: &AppState) -> Result<usize, ScheduleError> {
    state.rate_limiter.prune_idle();
    match admin_auth::purge_expired_sessions(&state.pool).await {
        Ok(0) => {}
        Ok(purged) => info!(purged, "expired admin sessions removed"),
        Err(e) => warn!(error = %e, "expired session purge failed"),
    }

    let Some(line) = &state.line else {
        return Ok(0);
    };

    let filter = TaskFilter { open_only: true, limit: Some(SCAN_LIMIT), ..TaskFilter::default() };
    let open = tasks::list_tasks(&state.pool, &filter).await?;
    Ok(push_reminders(state, line.as_ref(), reminder_targets(&open, state.local_now())).await)
}

/// Push each reminder whose recipient has notifications on. A recipient
/// whose settings cannot be read is skipped.
async fn push_reminders(state: &AppState, line: &dyn LineMessenger, targets: Vec<(String, String)>) -> usize {
    let mut sent = 0;
    for (recipient, text) in targets {
        match settings::get_user_settings(&state.pool, &recipient).await {
            Ok(prefs) if !prefs.notification_enabled => continue,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, %recipient, "settings lookup failed; reminder skipped");
                continue;
            }
        }
        match line.push(&recipient, &text).await {
            Ok(()) => sent += 1,
            Err(e) => warn!(error = %e, %recipient, "reminder push failed"),
        }
    }
    sent
}

/// Push a summary of the last day's tasks to each distinct assignee.
///
/// # Errors
///
/// Returns a [`ScheduleError`] if loading tasks fails.
pub async fn send_daily_summary(state: &AppState) -> Result<usize, ScheduleError> {
    let Some(line) = &state.line else {
        return Ok(0);
    };

    let since = state.local_now() - time::Duration::days(1);
    let recent = tasks::list_tasks(&state.pool, &TaskFilter { created_after: Some(since), ..TaskFilter::default() }).await?;
    let recipients = summary_recipients(&recent);
    if recipients.is_empty() {
        return Ok(0);
    }

    let summary = classifier::summarize_tasks(state.llm.as_deref(), &recent).await;
    let text = format!("📊 每日任務摘要\n\n{summary}");
    let mut sent = 0;
    for recipient in recipients {
        match line.push(&recipient, &text).await {
            Ok(()) => sent += 1,
            Err(e) => warn!(error = %e, %recipient, "daily summary push failed"),
        }
    }
    Ok(sent)
}

/// Broadcast the weekly report if the toggle allows it. Returns 1 when sent.
///
/// # Errors
///
/// Returns a [`ScheduleError`] if loading data or the broadcast fails.
pub async fn send_weekly_report(state: &AppState) -> Result<usize, ScheduleError> {
    let Some(line) = &state.line else {
        return Ok(0);
    };
    if !settings::get_feature_toggles(&state.pool).await?.auto_weekly_report {
        info!("weekly report disabled by feature toggle");
        return Ok(0);
    }

    let week = tasks::weekly_tasks(&state.pool, state.local_now()).await?;
    line.broadcast(&reports::weekly_report(&week)).await?;
    Ok(1)
}

// =============================================================================
// LOOPS
// =============================================================================

/// Spawn every schedule. Returns no handles when disabled.
pub fn spawn_schedules(state: AppState, config: SchedulerConfig) -> Vec<JoinHandle<()>> {
    if !config.enabled {
        info!("scheduler disabled");
        return Vec::new();
    }
    info!(
        reminder_interval_secs = config.reminder_interval.as_secs(),
        utc_offset = ?config.utc_offset,
        "scheduler started"
    );

    let reminder_state = state.clone();
    let reminders = tokio::spawn(async move {
        loop {
            match run_reminders(&reminder_state).await {
                Ok(sent) => {
                    info!(sent, "reminder run complete");
                    tokio::time::sleep(config.reminder_interval).await;
                }
                Err(e) => {
                    error!(error = %e, "reminder run failed");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    });

    let daily = spawn_cron("daily_summary", DAILY_SUMMARY, config.utc_offset, state.clone(), |s| async move {
        send_daily_summary(&s).await
    });
    let weekly = spawn_cron("weekly_report", WEEKLY_REPORT, config.utc_offset, state, |s| async move {
        send_weekly_report(&s).await
    });

    vec![reminders, daily, weekly]
}

fn spawn_cron<F, Fut>(name: &'static str, schedule: Schedule, offset: UtcOffset, state: AppState, job: F) -> JoinHandle<()>
where
    F: Fn(AppState) -> Fut + Send + 'static,
    Fut: Future<Output = Result<usize, ScheduleError>> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let now = OffsetDateTime::now_utc().to_offset(offset);
            let next = next_run(now, schedule);
            info!(job = name, next = %next, "next scheduled run");
            tokio::time::sleep((next - now).unsigned_abs()).await;

            match job(state.clone()).await {
                Ok(sent) => info!(job = name, sent, "scheduled job complete"),
                Err(e) => {
                    error!(job = name, error = %e, "scheduled job failed");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod tests;
