//! Plain-text reports sent to LINE: project status, weekly report, task
//! listings, and the due-soon selection used by reminders.
//!
//! Everything here is pure so the chat commands and schedules share one
//! rendering and tests need no database.

use time::{Duration, OffsetDateTime};

use super::tasks::{Task, TaskCounts, TaskStatus};

/// Reply for `/status`.
#[must_use]
pub fn project_status(counts: TaskCounts) -> String {
    format!(
        "📊 專案狀態\n\n總任務數：{}\n已完成：{}\n進行中：{}\n完成率：{:.1}%",
        counts.total,
        counts.completed,
        counts.open(),
        counts.completion_rate()
    )
}

/// Reply for `/report` and the Monday broadcast. `tasks` are the tasks
/// created in the past week.
#[must_use]
pub fn weekly_report(tasks: &[Task]) -> String {
    let counts = TaskCounts::of(tasks);
    let mut report = format!(
        "📊 本週專案進度報告\n\n總任務數：{}\n已完成：{}\n進行中：{}",
        counts.total,
        counts.completed,
        counts.open()
    );
    if !tasks.is_empty() {
        report.push_str("\n\n");
        report.push_str(&task_listing(tasks));
    }
    report
}

/// One numbered line per task.
#[must_use]
pub fn task_listing(tasks: &[Task]) -> String {
    tasks
        .iter()
        .enumerate()
        .map(|(i, task)| {
            format!(
                "{}. {}｜負責人：{}｜截止：{}｜{}",
                i + 1,
                task.description_label(),
                task.assignee_label(),
                task.due_label(),
                task.status.label()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Open tasks due within 24 hours of `now`, overdue ones included. A due
/// date counts from midnight in `now`'s offset.
#[must_use]
pub fn due_soon(tasks: &[Task], now: OffsetDateTime) -> Vec<&Task> {
    tasks
        .iter()
        .filter(|task| task.status != TaskStatus::Completed)
        .filter(|task| {
            task.due_date
                .is_some_and(|due| due.midnight().assume_offset(now.offset()) - now < Duration::days(1))
        })
        .collect()
}

/// Reminder pushed to the assignee of a due-soon task.
#[must_use]
pub fn reminder_text(task: &Task) -> String {
    format!("提醒：任務「{}」即將在24小時內到期！", task.title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::tasks::Priority;
    use time::macros::{date, datetime};
    use uuid::Uuid;

    fn task(title: &str, status: TaskStatus, due: Option<time::Date>) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: title.into(),
            description: None,
            assignee: Some("小明".into()),
            assignee_id: None,
            department: None,
            due_date: due,
            priority: Priority::Medium,
            status,
            created_by: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn project_status_with_no_tasks() {
        assert_eq!(project_status(TaskCounts::default()), "📊 專案狀態\n\n總任務數：0\n已完成：0\n進行中：0\n完成率：0.0%");
    }

    #[test]
    fn project_status_rate_has_one_decimal() {
        let tasks = vec![
            task("a", TaskStatus::Completed, None),
            task("b", TaskStatus::Pending, None),
            task("c", TaskStatus::InProgress, None),
        ];
        let text = project_status(TaskCounts::of(&tasks));
        assert!(text.contains("總任務數：3"));
        assert!(text.contains("已完成：1"));
        assert!(text.contains("進行中：2"));
        assert!(text.ends_with("完成率：33.3%"));
    }

    #[test]
    fn project_status_counts_whole_table() {
        let text = project_status(TaskCounts { total: 2500, completed: 2000 });
        assert!(text.contains("總任務數：2500"));
        assert!(text.contains("進行中：500"));
        assert!(text.ends_with("完成率：80.0%"));
    }

    #[test]
    fn weekly_report_lists_tasks() {
        let tasks = vec![task("寫報表", TaskStatus::Pending, Some(date!(2024 - 06 - 07)))];
        let report = weekly_report(&tasks);
        assert!(report.starts_with("📊 本週專案進度報告\n\n總任務數：1\n已完成：0\n進行中：1"));
        assert!(report.ends_with("1. 寫報表｜負責人：小明｜截止：2024-06-07｜待處理"));
    }

    #[test]
    fn weekly_report_without_tasks_has_no_listing() {
        assert_eq!(weekly_report(&[]), "📊 本週專案進度報告\n\n總任務數：0\n已完成：0\n進行中：0");
    }

    #[test]
    fn task_listing_shows_placeholders() {
        let mut t = task("補資料", TaskStatus::InProgress, None);
        t.assignee = None;
        assert_eq!(task_listing(&[t]), "1. 補資料｜負責人：（缺負責人）｜截止：待補充｜進行中");
    }

    #[test]
    fn due_soon_window() {
        let now = datetime!(2024-06-06 10:00 +8);
        let tasks = vec![
            task("tomorrow", TaskStatus::Pending, Some(date!(2024 - 06 - 07))),
            task("overdue", TaskStatus::InProgress, Some(date!(2024 - 06 - 01))),
            task("later", TaskStatus::Pending, Some(date!(2024 - 06 - 08))),
            task("done", TaskStatus::Completed, Some(date!(2024 - 06 - 07))),
            task("undated", TaskStatus::Pending, None),
        ];
        let titles: Vec<&str> = due_soon(&tasks, now).iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["tomorrow", "overdue"]);
    }

    #[test]
    fn reminder_text_format() {
        let t = task("行銷簡報", TaskStatus::Pending, None);
        assert_eq!(reminder_text(&t), "提醒：任務「行銷簡報」即將在24小時內到期！");
    }
}
