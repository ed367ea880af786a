use std::sync::Arc;

use serde_json::json;
use time::OffsetDateTime;
use time::macros::date;

use super::*;
use crate::llm::test_helpers::{ScriptedLlm, text, tool_call};
use crate::services::tasks::TaskStatus;

fn today() -> Date {
    date!(2024 - 06 - 06)
}

// =============================================================================
// is_relevant
// =============================================================================

#[tokio::test]
async fn relevance_yes_is_relevant() {
    let llm = ScriptedLlm::new(vec![Ok(text(" Yes \n"))]);
    assert!(is_relevant(&llm, "明天要交報表").await);
}

#[tokio::test]
async fn relevance_other_answers_are_irrelevant() {
    for answer in ["no", "maybe", "yes, it is", ""] {
        let llm = ScriptedLlm::new(vec![Ok(text(answer))]);
        assert!(!is_relevant(&llm, "今天天氣好").await, "answer {answer:?} should be irrelevant");
    }
}

#[tokio::test]
async fn relevance_error_defaults_to_relevant() {
    let llm = ScriptedLlm::new(vec![Err(LlmError::ApiRequest("timeout".into()))]);
    assert!(is_relevant(&llm, "hi").await);
}

#[tokio::test]
async fn relevance_uses_relevance_prompt() {
    let llm = ScriptedLlm::new(vec![Ok(text("yes"))]);
    is_relevant(&llm, "進度如何").await;
    let requests = llm.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].system.contains("'yes' 或 'no'"));
    assert_eq!(requests[0].user, "進度如何");
    assert!(requests[0].force_tool.is_none());
}

// =============================================================================
// extract_task
// =============================================================================

#[tokio::test]
async fn extract_task_parses_tool_arguments() {
    let llm = ScriptedLlm::new(vec![Ok(tool_call(
        "extract_task",
        json!({
            "is_task": true,
            "description": "準備行銷簡報",
            "assignee": "小明",
            "due_date": "2024/06/07",
            "priority": "高"
        }),
    ))]);
    let extraction = extract_task(&llm, "小明下週五前準備行銷簡報", today()).await.unwrap();
    assert_eq!(
        extraction,
        TaskExtraction {
            is_task: true,
            description: Some("準備行銷簡報".into()),
            assignee: Some("小明".into()),
            due_date: Some(date!(2024 - 06 - 07)),
            priority: Some(Priority::High),
        }
    );

    let request = &llm.requests()[0];
    assert_eq!(request.force_tool.as_deref(), Some("extract_task"));
    assert!(request.user.contains("今天日期：2024-06-06"));
    assert!(request.user.contains("小明下週五前準備行銷簡報"));
}

#[tokio::test]
async fn extract_task_drops_unparseable_fields() {
    let llm = ScriptedLlm::new(vec![Ok(tool_call(
        "extract_task",
        json!({ "is_task": true, "description": "  ", "assignee": "", "due_date": "下週", "priority": "urgent" }),
    ))]);
    let extraction = extract_task(&llm, "x", today()).await.unwrap();
    assert!(extraction.is_task);
    assert!(extraction.description.is_none());
    assert!(extraction.assignee.is_none());
    assert!(extraction.due_date.is_none());
    assert!(extraction.priority.is_none());
    assert_eq!(extraction.missing_fields(), vec!["負責人", "截止日期"]);
}

#[tokio::test]
async fn extract_task_without_tool_call_is_none() {
    let llm = ScriptedLlm::new(vec![Ok(text("這不是任務"))]);
    assert!(extract_task(&llm, "hi", today()).await.is_none());
}

#[tokio::test]
async fn extract_task_error_is_none() {
    let llm = ScriptedLlm::new(vec![Err(LlmError::ApiResponse { status: 500, body: "boom".into() })]);
    assert!(extract_task(&llm, "hi", today()).await.is_none());
}

#[test]
fn parse_extraction_rejects_wrong_shape() {
    assert!(parse_extraction(&json!("not an object")).is_none());
    assert!(parse_extraction(&json!({ "is_task": "yes" })).is_none());
    // A missing flag means "not a task".
    assert!(!parse_extraction(&json!({})).unwrap().is_task);
}

#[test]
fn extraction_serializes_as_ai_result() {
    let extraction = TaskExtraction {
        is_task: true,
        description: Some("寫週報".into()),
        assignee: None,
        due_date: Some(date!(2024 - 06 - 07)),
        priority: Some(Priority::Low),
    };
    assert_eq!(
        serde_json::to_value(&extraction).unwrap(),
        json!({
            "is_task": true,
            "description": "寫週報",
            "assignee": null,
            "due_date": "2024-06-07",
            "priority": "low"
        })
    );
}

#[test]
fn to_new_task_falls_back_to_message_text() {
    let extraction =
        TaskExtraction { is_task: true, description: None, assignee: Some("小華".into()), due_date: None, priority: None };
    let new = extraction.to_new_task("請小華整理客戶名單");
    assert_eq!(new.title, "請小華整理客戶名單");
    assert_eq!(new.assignee.as_deref(), Some("小華"));
    assert_eq!(new.priority, Priority::Medium);
}

// =============================================================================
// chat_reply
// =============================================================================

#[tokio::test]
async fn chat_reply_returns_trimmed_text() {
    let llm = ScriptedLlm::new(vec![Ok(text("  好的，我來幫你整理。 "))]);
    let reply = chat_reply(&llm, "幫我整理進度", None).await.unwrap();
    assert_eq!(reply, "好的，我來幫你整理。");
    assert_eq!(llm.requests()[0].system, SYSTEM_PROMPT);
}

#[tokio::test]
async fn chat_reply_empty_becomes_unclear_reply() {
    let llm = ScriptedLlm::new(vec![Ok(text("   "))]);
    assert_eq!(chat_reply(&llm, "?", None).await.unwrap(), UNCLEAR_REPLY);
}

#[tokio::test]
async fn chat_reply_propagates_errors() {
    let llm = ScriptedLlm::new(vec![Err(LlmError::ApiRequest("down".into()))]);
    assert!(chat_reply(&llm, "?", None).await.is_err());
}

#[tokio::test]
async fn chat_reply_includes_previous_exchange() {
    struct CountingLlm {
        seen: std::sync::Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl LlmChat for CountingLlm {
        async fn chat(&self, request: ChatRequest<'_>) -> Result<crate::llm::types::ChatResponse, LlmError> {
            let mut seen = self.seen.lock().unwrap();
            for m in request.messages {
                seen.push((m.role.clone(), m.content.clone()));
            }
            Ok(text("ok"))
        }
    }

    let llm = Arc::new(CountingLlm { seen: std::sync::Mutex::new(Vec::new()) });
    let ctx = UserContext {
        last_message: "報表進度？".into(),
        last_response: "還在處理".into(),
        timestamp: OffsetDateTime::UNIX_EPOCH,
    };
    chat_reply(llm.as_ref(), "那什麼時候好？", Some(&ctx)).await.unwrap();

    let seen = llm.seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            ("user".to_string(), "報表進度？".to_string()),
            ("assistant".to_string(), "還在處理".to_string()),
            ("user".to_string(), "那什麼時候好？".to_string()),
        ]
    );
}

// =============================================================================
// summarize_tasks
// =============================================================================

fn pending_task(title: &str) -> Task {
    Task {
        id: uuid::Uuid::nil(),
        title: title.into(),
        description: None,
        assignee: None,
        assignee_id: None,
        department: None,
        due_date: None,
        priority: Priority::Medium,
        status: TaskStatus::Pending,
        created_by: None,
        created_at: OffsetDateTime::UNIX_EPOCH,
        updated_at: OffsetDateTime::UNIX_EPOCH,
    }
}

#[tokio::test]
async fn summarize_uses_model_text() {
    let llm = ScriptedLlm::new(vec![Ok(text("本週重點：報表"))]);
    let summary = summarize_tasks(Some(&llm), &[pending_task("報表")]).await;
    assert_eq!(summary, "本週重點：報表");
    assert!(llm.requests()[0].user.contains("1. 報表"));
}

#[tokio::test]
async fn summarize_falls_back_to_listing() {
    let tasks = [pending_task("報表")];
    let expected = reports::task_listing(&tasks);

    let failing = ScriptedLlm::new(vec![Err(LlmError::ApiRequest("down".into()))]);
    assert_eq!(summarize_tasks(Some(&failing), &tasks).await, expected);
    assert_eq!(summarize_tasks(None, &tasks).await, expected);
}
