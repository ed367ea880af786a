use super::*;
use time::macros::{date, datetime};

fn sample_task() -> Task {
    Task {
        id: Uuid::nil(),
        title: "準備行銷簡報".into(),
        description: Some("準備下週行銷簡報".into()),
        assignee: Some("小明".into()),
        assignee_id: None,
        department: Some("行銷".into()),
        due_date: Some(date!(2024 - 06 - 07)),
        priority: Priority::High,
        status: TaskStatus::Pending,
        created_by: Some("U1".into()),
        created_at: datetime!(2024-06-01 1:00 UTC),
        updated_at: datetime!(2024-06-01 1:00 UTC),
    }
}

// =============================================================================
// TaskStatus / Priority
// =============================================================================

#[test]
fn status_parse_and_as_str_agree() {
    for status in [TaskStatus::Pending, TaskStatus::InProgress, TaskStatus::Completed] {
        assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(TaskStatus::parse("未指派"), None);
}

#[test]
fn status_serializes_snake_case() {
    assert_eq!(serde_json::to_value(TaskStatus::InProgress).unwrap(), "in_progress");
    let parsed: TaskStatus = serde_json::from_value(serde_json::json!("completed")).unwrap();
    assert_eq!(parsed, TaskStatus::Completed);
}

#[test]
fn priority_accepts_chinese_labels() {
    assert_eq!(Priority::parse("高"), Some(Priority::High));
    assert_eq!(Priority::parse(" 中 "), Some(Priority::Medium));
    assert_eq!(Priority::parse("低"), Some(Priority::Low));
    assert_eq!(Priority::parse("low"), Some(Priority::Low));
    assert_eq!(Priority::parse("urgent"), None);
    assert_eq!(Priority::default(), Priority::Medium);
    assert_eq!(Priority::High.label(), "高");
}

// =============================================================================
// Task display helpers
// =============================================================================

#[test]
fn complete_task_does_not_need_info() {
    let task = sample_task();
    assert!(!task.needs_info());
    assert_eq!(task.assignee_label(), "小明");
    assert_eq!(task.due_label(), "2024-06-07");
}

#[test]
fn missing_assignee_and_due_date_render_placeholders() {
    let mut task = sample_task();
    task.assignee = None;
    task.due_date = None;
    assert!(task.needs_info());
    assert_eq!(task.assignee_label(), "（缺負責人）");
    assert_eq!(task.due_label(), "待補充");
}

#[test]
fn blank_assignee_counts_as_missing() {
    let mut task = sample_task();
    task.assignee = Some("  ".into());
    assert!(task.needs_info());
}

#[test]
fn assignee_id_is_enough_for_assignment() {
    let mut task = sample_task();
    task.assignee = None;
    task.assignee_id = Some("U42".into());
    assert!(!task.needs_info());
    assert_eq!(task.assignee_label(), "U42");
}

#[test]
fn description_label_falls_back_to_title() {
    let mut task = sample_task();
    assert_eq!(task.description_label(), "準備下週行銷簡報");
    task.description = None;
    assert_eq!(task.description_label(), "準備行銷簡報");
}

#[test]
fn task_serializes_dates_as_strings() {
    let value = serde_json::to_value(sample_task()).unwrap();
    assert_eq!(value["due_date"], "2024-06-07");
    assert_eq!(value["created_at"], "2024-06-01T01:00:00Z");
    assert_eq!(value["priority"], "high");
    assert_eq!(value["status"], "pending");

    let mut task = sample_task();
    task.due_date = None;
    assert!(serde_json::to_value(task).unwrap()["due_date"].is_null());
}

// =============================================================================
// title / due date parsing
// =============================================================================

#[test]
fn title_uses_first_line() {
    assert_eq!(title_from_description("  寫週報\n內容細節  "), "寫週報");
}

#[test]
fn title_is_clipped() {
    let long = "字".repeat(80);
    let title = title_from_description(&long);
    assert_eq!(title.chars().count(), 50);
    assert!(title.ends_with('…'));
}

#[test]
fn new_task_from_description() {
    let new = NewTask::from_description("整理報表");
    assert_eq!(new.title, "整理報表");
    assert_eq!(new.description.as_deref(), Some("整理報表"));
    assert_eq!(new.priority, Priority::Medium);
    assert!(NewTask::from_description("   ").description.is_none());
}

#[test]
fn parse_due_date_formats() {
    assert_eq!(parse_due_date("2024-06-07"), Some(date!(2024 - 06 - 07)));
    assert_eq!(parse_due_date("2024/6/7"), Some(date!(2024 - 06 - 07)));
    assert_eq!(parse_due_date(" 2024-12-31 "), Some(date!(2024 - 12 - 31)));
    assert_eq!(parse_due_date("2024-02-30"), None);
    assert_eq!(parse_due_date("下週五"), None);
    assert_eq!(parse_due_date(""), None);
}

#[test]
fn parse_due_date_ignores_time_of_day() {
    assert_eq!(parse_due_date("2024-06-07 18:00"), Some(date!(2024 - 06 - 07)));
    assert_eq!(parse_due_date("2024-06-07T18:00:00"), Some(date!(2024 - 06 - 07)));
}

#[test]
fn iso_date_string_pads() {
    assert_eq!(iso_date_string(date!(2024 - 01 - 05)), "2024-01-05");
}

// =============================================================================
// TaskSupplement
// =============================================================================

#[test]
fn supplement_log_action_lists_changed_fields() {
    let s = TaskSupplement {
        assignee: Some("小華".into()),
        due_date: Some(date!(2024 - 06 - 01)),
        description: None,
    };
    assert_eq!(s.log_action(), "補充資訊：負責人=小華、截止日=2024-06-01");
    assert!(!s.is_empty());
    assert!(TaskSupplement::default().is_empty());
}

#[test]
fn supplement_deserializes_json() {
    let s: TaskSupplement =
        serde_json::from_value(serde_json::json!({ "assignee": "小華", "due_date": "2024-06-01" })).unwrap();
    assert_eq!(s.due_date, Some(date!(2024 - 06 - 01)));
    assert!(s.description.is_none());

    let empty: TaskSupplement = serde_json::from_value(serde_json::json!({})).unwrap();
    assert!(empty.is_empty());
}

#[test]
fn supplement_blank_form_fields_are_unchanged() {
    let s: TaskSupplement =
        serde_json::from_value(serde_json::json!({ "assignee": "  ", "due_date": "", "description": " 新描述 " }))
            .unwrap();
    let s = s.normalized();
    assert!(s.assignee.is_none());
    assert!(s.due_date.is_none());
    assert_eq!(s.description.as_deref(), Some("新描述"));
}

#[test]
fn supplement_rejects_bad_date() {
    let result: Result<TaskSupplement, _> = serde_json::from_value(serde_json::json!({ "due_date": "明天" }));
    assert!(result.is_err());
}

// =============================================================================
// list_query
// =============================================================================

#[test]
fn list_query_without_filters() {
    let builder = list_query(&TaskFilter::default());
    let sql = builder.sql();
    assert!(sql.starts_with("SELECT id, title"));
    assert!(sql.contains("WHERE TRUE ORDER BY created_at DESC LIMIT $1"));
}

#[test]
fn list_query_binds_every_filter_in_order() {
    let filter = TaskFilter {
        status: Some(TaskStatus::Pending),
        keyword: Some("報表".into()),
        assignee: Some("小明".into()),
        assignee_id: Some("U1".into()),
        department: Some("業務".into()),
        created_after: Some(datetime!(2024-06-01 0:00 UTC)),
        unassigned: false,
        open_only: false,
        limit: Some(10),
    };
    let builder = list_query(&filter);
    let sql = builder.sql();
    assert!(sql.contains("status = $1"));
    assert!(sql.contains(r"(title ILIKE $2 ESCAPE '\' OR description ILIKE $3 ESCAPE '\')"));
    assert!(sql.contains("(assignee_id = $4 OR assignee = $5)"));
    assert!(sql.contains("department = $6"));
    assert!(sql.contains("created_at >= $7"));
    assert!(sql.contains("LIMIT $8"));
}

#[test]
fn list_query_single_assignee_column() {
    let by_name = TaskFilter { assignee: Some("小明".into()), ..TaskFilter::default() };
    assert!(list_query(&by_name).sql().contains(" AND assignee = $1"));

    let by_id = TaskFilter { assignee_id: Some("U1".into()), ..TaskFilter::default() };
    let builder = list_query(&by_id);
    assert!(builder.sql().contains(" AND assignee_id = $1"));
    assert!(!builder.sql().contains("OR assignee"));
}

#[test]
fn list_query_unassigned_and_blank_keyword() {
    let filter = TaskFilter { unassigned: true, keyword: Some("  ".into()), ..TaskFilter::default() };
    let builder = list_query(&filter);
    let sql = builder.sql();
    assert!(sql.contains("assignee_id IS NULL"));
    assert!(!sql.contains("ILIKE"));
}

#[test]
fn list_query_open_only_filters_in_sql() {
    let filter = TaskFilter { open_only: true, ..TaskFilter::default() };
    let builder = list_query(&filter);
    assert!(builder.sql().contains(" AND status <> 'completed'"));
    assert!(!list_query(&TaskFilter::default()).sql().contains("<>"));
}

#[test]
fn like_pattern_escapes_wildcards() {
    assert_eq!(like_pattern("報表"), "%報表%");
    assert_eq!(like_pattern("100%"), r"%100\%%");
    assert_eq!(like_pattern("a_b"), r"%a\_b%");
    assert_eq!(like_pattern(r"c:\tmp"), r"%c:\\tmp%");
}

// =============================================================================
// TaskCounts
// =============================================================================

#[test]
fn counts_past_a_thousand_tasks() {
    let counts = TaskCounts { total: 1500, completed: 1200 };
    assert_eq!(counts.open(), 300);
    assert!((counts.completion_rate() - 80.0).abs() < f64::EPSILON);
    assert!(TaskCounts::default().completion_rate().abs() < f64::EPSILON);
}

#[test]
fn counts_of_task_slice() {
    let mut done = sample_task();
    done.status = TaskStatus::Completed;
    let counts = TaskCounts::of(&[done, sample_task()]);
    assert_eq!(counts, TaskCounts { total: 2, completed: 1 });
}

#[test]
fn filter_deserializes_from_query_pairs() {
    let filter: TaskFilter = serde_json::from_value(serde_json::json!({
        "status": "in_progress",
        "created_after": "2024-06-01T00:00:00Z"
    }))
    .unwrap();
    assert_eq!(filter.status, Some(TaskStatus::InProgress));
    assert_eq!(filter.created_after, Some(datetime!(2024-06-01 0:00 UTC)));
    assert!(!filter.unassigned);
}

// =============================================================================
// live database
// =============================================================================

#[tokio::test]
async fn get_task_without_database_errors() {
    let state = crate::state::test_helpers::test_app_state();
    let result = get_task(&state.pool, Uuid::new_v4()).await;
    assert!(matches!(result, Err(TaskError::Database(_))));
}

#[cfg(feature = "live-db-tests")]
#[tokio::test]
async fn create_update_and_supplement_round_trip() {
    let pool = crate::db::test_helpers::integration_pool().await;
    let marker = Uuid::new_v4().to_string();

    let mut new = NewTask::from_description(&format!("整理報表 {marker}"));
    new.created_by = Some("U-live".into());
    let task = create_task(&pool, &new).await.expect("create should succeed");
    assert!(task.needs_info());

    let listed = list_tasks(&pool, &TaskFilter { keyword: Some(marker.clone()), ..TaskFilter::default() })
        .await
        .expect("list should succeed");
    assert_eq!(listed.len(), 1);

    let updated = update_task_status(&pool, task.id, TaskStatus::InProgress, "admin")
        .await
        .expect("status update should succeed");
    assert_eq!(updated.status, TaskStatus::InProgress);

    let supplement = TaskSupplement {
        assignee: Some("小明".into()),
        due_date: Some(time::macros::date!(2030 - 01 - 01)),
        description: None,
    };
    let supplemented = supplement_task(&pool, task.id, &supplement, "admin")
        .await
        .expect("supplement should succeed");
    assert!(!supplemented.needs_info());

    let logs = task_logs(&pool, task.id).await.expect("logs should load");
    let actions: Vec<&str> = logs.iter().map(|l| l.action.as_str()).collect();
    assert_eq!(actions, vec!["建立任務", "更新狀態為 in_progress", "補充資訊：負責人=小明、截止日=2030-01-01"]);

    let steps = vec![
        TaskFlowStep { step_number: 2, department: Some("業務".into()), handler_id: None, status: "pending".into() },
        TaskFlowStep { step_number: 1, department: Some("行銷".into()), handler_id: None, status: "done".into() },
    ];
    save_task_flow(&pool, task.id, &steps).await.expect("flow save should succeed");
    let flow = get_task_flow(&pool, task.id).await.expect("flow load should succeed");
    assert_eq!(flow.iter().map(|s| s.step_number).collect::<Vec<_>>(), vec![1, 2]);
}

#[cfg(feature = "live-db-tests")]
#[tokio::test]
async fn update_missing_task_is_not_found() {
    let pool = crate::db::test_helpers::integration_pool().await;
    let missing = Uuid::new_v4();
    let result = update_task_status(&pool, missing, TaskStatus::Completed, "admin").await;
    assert!(matches!(result, Err(TaskError::NotFound(id)) if id == missing));
}
