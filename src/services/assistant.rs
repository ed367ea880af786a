//! Assistant — turns one LINE text message into a reply.
//!
//! DESIGN
//! ======
//! [`parse_intent`] is a pure router over the message text. Slash commands
//! work for everyone; keyword queries and free text require a registered
//! member. Free text is the only path that reaches the LLM:
//!
//! 1. rate limit (per user and global)
//! 2. relevance gate; irrelevant chatter gets a fixed reply
//! 3. task extraction; a task is saved, optionally auto-assigned and
//!    followed up on
//! 4. otherwise a general chat reply using the previous exchange as context
//!
//! [`respond`] wraps the pipeline with the side effects every message gets:
//! context update, message log, and the LINE reply.

use serde_json::{Value, json};
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::classifier::{self, TaskExtraction};
use super::messages::{self, NewMessage, STATUS_FAILED, STATUS_PROCESSED, STATUS_RATE_LIMITED};
use super::settings::{self, UserSettings};
use super::tasks::{self, Task, TaskError, TaskFilter};
use super::users::{self, IntroductionError, User};
use super::reports;
use crate::line::events::IncomingText;
use crate::llm::types::LlmError;
use crate::state::{AppState, UserContext};

pub const WELCOME_REPLY: &str = "歡迎使用！請先輸入 /自我介紹 來完成註冊。";
pub const ERROR_REPLY: &str = "抱歉，發生錯誤，請稍後再試。";
pub const IRRELEVANT_REPLY: &str =
    "抱歉，我主要負責專案管理相關事務。如果您有任務管理、進度追蹤等需求，我很樂意為您服務。";
pub const RATE_LIMITED_REPLY: &str = "目前訊息量較多，請稍後再試。";
const INTRODUCTION_FORMAT_REPLY: &str = "請按照以下格式輸入：\n/自我介紹\n姓名：\n部門：\n職稱：";
const INTRODUCTION_FAILED_REPLY: &str = "註冊失敗，請檢查格式後重試。";
const FIND_USAGE_REPLY: &str = "請輸入關鍵字，例如：/find 報表";

pub const HELP_TEXT: &str = "🤖 我可以幫你：
1. 查詢未指派任務（這個誰做？）
2. 確認報表狀態（報表交了沒）
3. 查詢行銷簡報任務（昨天說的行銷簡報是誰接的？）
4. 生成週報（這週的事）
5. 查看我的任務（我的任務）
6. 查看部門任務（部門任務）
7. 搜尋任務（/find 關鍵字）

📋 可用指令：
/tasks - 查看任務列表
/report - 生成週報
/settings - 查看設定（/settings on 或 off 切換通知）
/status - 查看專案狀態
/自我介紹 - 註冊新用戶
/幫助 - 顯示此幫助訊息";

// =============================================================================
// INTENT ROUTING
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Help,
    Introduce,
    OpenTasks,
    WeeklyReport,
    /// `/settings`, optionally switching notifications on or off.
    Settings(Option<bool>),
    ProjectStatus,
    Unassigned,
    ReportStatus,
    MarketingDeck,
    Find(String),
    ThisWeek,
    MyTasks,
    DepartmentTasks,
    FreeText,
}

impl Intent {
    /// Slash commands answer without registration.
    #[must_use]
    pub fn needs_registration(&self) -> bool {
        !matches!(
            self,
            Self::Help
                | Self::Introduce
                | Self::OpenTasks
                | Self::WeeklyReport
                | Self::Settings(_)
                | Self::ProjectStatus
        )
    }
}

/// Classify a message by its text alone.
#[must_use]
pub fn parse_intent(text: &str) -> Intent {
    let trimmed = text.trim();
    let lower = trimmed.to_lowercase();

    if lower.starts_with("/自我介紹") {
        return Intent::Introduce;
    }
    if let Some(rest) = lower.strip_prefix("/find") {
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            // Keep the keyword's original casing.
            return Intent::Find(trimmed.get("/find".len()..).unwrap_or_default().trim().to_owned());
        }
    }
    if let Some(rest) = lower.strip_prefix("/settings") {
        match rest.trim() {
            "" => return Intent::Settings(None),
            "on" | "開" | "開啟" => return Intent::Settings(Some(true)),
            "off" | "關" | "關閉" => return Intent::Settings(Some(false)),
            _ => {}
        }
    }
    match lower.as_str() {
        "/help" | "/幫助" => return Intent::Help,
        "/tasks" => return Intent::OpenTasks,
        "/report" => return Intent::WeeklyReport,
        "/status" => return Intent::ProjectStatus,
        _ => {}
    }

    if lower.contains("這個誰做") {
        Intent::Unassigned
    } else if lower.contains("報表交了沒") {
        Intent::ReportStatus
    } else if lower.contains("昨天說的行銷簡報") || (lower.contains("行銷簡報") && lower.contains("誰接")) {
        Intent::MarketingDeck
    } else if lower.contains("這週的事") {
        Intent::ThisWeek
    } else if lower.contains("我的任務") {
        Intent::MyTasks
    } else if lower.contains("部門任務") {
        Intent::DepartmentTasks
    } else if lower.starts_with('/') {
        Intent::Help
    } else {
        Intent::FreeText
    }
}

// =============================================================================
// REPLY AND ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct AssistantReply {
    pub content: String,
    /// Stored as the message's `ai_result`; `None` unless the LLM classified
    /// the message.
    pub ai_result: Option<Value>,
    pub status: &'static str,
}

impl AssistantReply {
    fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), ai_result: None, status: STATUS_PROCESSED }
    }

    fn failure() -> Self {
        Self { content: ERROR_REPLY.to_string(), ai_result: None, status: STATUS_FAILED }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),
    #[error("llm is not configured")]
    LlmUnavailable,
}

// =============================================================================
// PIPELINE
// =============================================================================

/// Answer one message, update the user's context, log it, and reply on LINE.
/// Never fails: errors become the generic failure reply.
pub async fn respond(state: &AppState, incoming: &IncomingText) {
    let message_id = Uuid::new_v4();
    let now = state.local_now();
    let previous = state.context_for(&incoming.user_id).await;

    let reply = match handle_text(state, incoming, message_id, previous.as_ref(), now).await {
        Ok(reply) => reply,
        Err(e) => {
            error!(error = %e, user_id = %incoming.user_id, "message handling failed");
            AssistantReply::failure()
        }
    };

    state
        .swap_context(
            &incoming.user_id,
            UserContext {
                last_message: incoming.text.clone(),
                last_response: reply.content.clone(),
                timestamp: now,
            },
        )
        .await;

    let record = NewMessage {
        id: message_id,
        line_message_id: Some(incoming.message_id.clone()),
        user_id: incoming.user_id.clone(),
        group_id: incoming.group_id.clone(),
        content: incoming.text.clone(),
        response: Some(reply.content.clone()),
        status: reply.status.to_string(),
        context: previous
            .as_ref()
            .and_then(|c| serde_json::to_value(c).ok())
            .unwrap_or_else(|| json!({})),
        ai_result: reply.ai_result.clone(),
    };
    if let Err(e) = messages::log_message(&state.pool, &record).await {
        error!(error = %e, %message_id, "failed to log message");
    }

    if let Some(line) = &state.line {
        if let Err(e) = line.reply(&incoming.reply_token, &reply.content).await {
            error!(error = %e, user_id = %incoming.user_id, "LINE reply failed");
        }
    }
}

/// Route and answer one message without any LINE side effects.
///
/// # Errors
///
/// Returns an [`AssistantError`] when storage or the chat model fails.
pub async fn handle_text(
    state: &AppState,
    incoming: &IncomingText,
    message_id: Uuid,
    context: Option<&UserContext>,
    now: OffsetDateTime,
) -> Result<AssistantReply, AssistantError> {
    let intent = parse_intent(&incoming.text);
    let user_id = incoming.user_id.as_str();

    let user = if intent.needs_registration() { users::get_user(&state.pool, user_id).await? } else { None };
    if intent.needs_registration() && user.is_none() {
        return Ok(AssistantReply::text(WELCOME_REPLY));
    }

    info!(user_id, intent = ?intent, "handling message");

    let reply = match intent {
        Intent::Help => AssistantReply::text(HELP_TEXT),
        Intent::Introduce => introduce(state, user_id, &incoming.text).await?,
        Intent::OpenTasks => open_tasks(state).await?,
        Intent::WeeklyReport => {
            let tasks = tasks::weekly_tasks(&state.pool, now).await?;
            AssistantReply::text(reports::weekly_report(&tasks))
        }
        Intent::Settings(notify) => user_settings(state, user_id, notify).await?,
        Intent::ProjectStatus => {
            let counts = tasks::count_tasks(&state.pool).await?;
            AssistantReply::text(reports::project_status(counts))
        }
        Intent::Unassigned => {
            let filter = TaskFilter { unassigned: true, ..TaskFilter::default() };
            task_query(state, user_id, &filter, "📋 未指派任務：", "目前沒有未指派的任務。").await?
        }
        Intent::ReportStatus => {
            let filter = TaskFilter { keyword: Some("報表".into()), ..TaskFilter::default() };
            task_query(state, user_id, &filter, "📊 報表狀態：", "沒有找到相關的報表任務。").await?
        }
        Intent::MarketingDeck => {
            let filter = TaskFilter { keyword: Some("行銷簡報".into()), ..TaskFilter::default() };
            task_query(state, user_id, &filter, "📝 行銷簡報任務：", "沒有找到相關的行銷簡報任務。").await?
        }
        Intent::Find(keyword) if keyword.is_empty() => AssistantReply::text(FIND_USAGE_REPLY),
        Intent::Find(keyword) => {
            let header = format!("🔍 「{keyword}」相關任務：");
            let empty = format!("沒有找到與「{keyword}」相關的任務。");
            let filter = TaskFilter { keyword: Some(keyword), ..TaskFilter::default() };
            task_query(state, user_id, &filter, &header, &empty).await?
        }
        Intent::ThisWeek => {
            let filter = TaskFilter { created_after: Some(now - time::Duration::days(7)), ..TaskFilter::default() };
            task_query(state, user_id, &filter, "📈 本週任務摘要：", "本週目前沒有任務記錄。").await?
        }
        Intent::MyTasks => {
            let name = user.as_ref().map(|u| u.name.clone());
            let filter = TaskFilter { assignee_id: Some(user_id.to_owned()), assignee: name, ..TaskFilter::default() };
            task_query(state, user_id, &filter, "👤 我的任務：", "您目前沒有負責的任務。").await?
        }
        Intent::DepartmentTasks => department_tasks(state, user_id, user.as_ref()).await?,
        Intent::FreeText => free_text(state, incoming, message_id, user.as_ref(), context, now).await?,
    };
    Ok(reply)
}

async fn introduce(state: &AppState, user_id: &str, text: &str) -> Result<AssistantReply, AssistantError> {
    match users::parse_introduction(text) {
        Ok(intro) => {
            let user = users::register_user(&state.pool, user_id, &intro).await?;
            Ok(AssistantReply::text(format!("歡迎 {}！註冊成功！", user.name)))
        }
        Err(IntroductionError::TooFewLines) => Ok(AssistantReply::text(INTRODUCTION_FORMAT_REPLY)),
        Err(e) => {
            warn!(error = %e, user_id, "introduction rejected");
            Ok(AssistantReply::text(INTRODUCTION_FAILED_REPLY))
        }
    }
}

async fn open_tasks(state: &AppState) -> Result<AssistantReply, AssistantError> {
    let open = tasks::list_tasks(&state.pool, &TaskFilter { open_only: true, ..TaskFilter::default() }).await?;
    if open.is_empty() {
        return Ok(AssistantReply::text("目前沒有進行中的任務。"));
    }
    Ok(AssistantReply::text(format!("📋 任務列表：\n\n{}", reports::task_listing(&open))))
}

async fn user_settings(state: &AppState, user_id: &str, notify: Option<bool>) -> Result<AssistantReply, AssistantError> {
    let mut current = settings::get_user_settings(&state.pool, user_id).await?;
    if let Some(enabled) = notify {
        current = UserSettings { notification_enabled: enabled, ..current };
        settings::update_user_settings(&state.pool, user_id, &current).await?;
    }
    Ok(AssistantReply::text(current.describe()))
}

async fn department_tasks(state: &AppState, user_id: &str, user: Option<&User>) -> Result<AssistantReply, AssistantError> {
    let Some(department) = user.and_then(|u| u.department.clone()) else {
        return Ok(AssistantReply::text("您尚未設定部門，請重新輸入 /自我介紹。"));
    };
    let header = format!("🏢 {department}部門任務：");
    let empty = format!("{department}部門目前沒有進行中的任務。");
    let filter = TaskFilter { department: Some(department), ..TaskFilter::default() };
    task_query(state, user_id, &filter, &header, &empty).await
}

/// Summarize the matching tasks under `header`, or reply `empty_reply`.
async fn task_query(
    state: &AppState,
    user_id: &str,
    filter: &TaskFilter,
    header: &str,
    empty_reply: &str,
) -> Result<AssistantReply, AssistantError> {
    let found = tasks::list_tasks(&state.pool, filter).await?;
    if found.is_empty() {
        return Ok(AssistantReply::text(empty_reply));
    }
    let summary = summarize_for(state, user_id, &found).await;
    Ok(AssistantReply::text(format!("{header}\n\n{summary}")))
}

/// LLM summary of `found`, or the plain listing when there is no model or
/// the user is over the rate limit.
async fn summarize_for(state: &AppState, user_id: &str, found: &[Task]) -> String {
    let Some(llm) = state.llm.as_deref() else {
        return reports::task_listing(found);
    };
    if let Err(e) = state.rate_limiter.check_and_record(user_id) {
        warn!(error = %e, user_id, "rate limited; sending plain listing");
        return reports::task_listing(found);
    }
    classifier::summarize_tasks(Some(llm), found).await
}

async fn free_text(
    state: &AppState,
    incoming: &IncomingText,
    message_id: Uuid,
    user: Option<&User>,
    context: Option<&UserContext>,
    now: OffsetDateTime,
) -> Result<AssistantReply, AssistantError> {
    let user_id = incoming.user_id.as_str();
    if let Err(e) = state.rate_limiter.check_and_record(user_id) {
        warn!(error = %e, user_id, "rate limited");
        return Ok(AssistantReply { content: RATE_LIMITED_REPLY.into(), ai_result: None, status: STATUS_RATE_LIMITED });
    }

    let Some(llm) = state.llm.as_deref() else {
        return Err(AssistantError::LlmUnavailable);
    };

    if !classifier::is_relevant(llm, &incoming.text).await {
        return Ok(AssistantReply {
            content: IRRELEVANT_REPLY.into(),
            ai_result: Some(json!({ "is_task": false, "relevant": false })),
            status: STATUS_PROCESSED,
        });
    }

    let extraction = classifier::extract_task(llm, &incoming.text, now.date()).await;
    let ai_result = extraction.as_ref().and_then(|e| serde_json::to_value(e).ok());

    let content = match extraction {
        Some(extraction) if extraction.is_task => {
            save_extracted_task(state, incoming, message_id, user, &extraction).await?
        }
        _ => classifier::chat_reply(llm, &incoming.text, context).await?,
    };
    Ok(AssistantReply { content, ai_result, status: STATUS_PROCESSED })
}

/// Persist an extracted task, applying the auto-assign and follow-up
/// toggles. Returns the confirmation reply.
async fn save_extracted_task(
    state: &AppState,
    incoming: &IncomingText,
    message_id: Uuid,
    creator: Option<&User>,
    extraction: &TaskExtraction,
) -> Result<String, AssistantError> {
    let toggles = settings::get_feature_toggles(&state.pool).await?;

    let mut new = extraction.to_new_task(&incoming.text);
    new.created_by = Some(incoming.user_id.clone());
    new.source_message_id = Some(message_id);
    new.department = creator.and_then(|u| u.department.clone());

    if toggles.auto_assign {
        if let Some(name) = extraction.assignee.as_deref() {
            if let Some(assignee) = users::find_user_by_name(&state.pool, name).await? {
                info!(assignee_id = %assignee.line_id, name, "auto-assigning task");
                new.assignee_id = Some(assignee.line_id);
                if assignee.department.is_some() {
                    new.department = assignee.department;
                }
            }
        }
    }

    let task = tasks::create_task(&state.pool, &new).await?;

    if toggles.auto_follow_up {
        let missing = extraction.missing_fields();
        if !missing.is_empty() {
            if let Some(line) = &state.line {
                let prompt = follow_up_text(&task.title, &missing);
                if let Err(e) = line.push(&incoming.user_id, &prompt).await {
                    warn!(error = %e, task_id = %task.id, "follow-up push failed");
                }
            }
        }
    }

    Ok(created_reply(&task))
}

fn created_reply(task: &Task) -> String {
    format!(
        "已建立任務：{}\n負責人：{}\n截止日期：{}\n優先級：{}",
        task.title,
        task.assignee_label(),
        task.due_label(),
        task.priority.label()
    )
}

fn follow_up_text(title: &str, missing: &[&str]) -> String {
    format!("任務「{title}」還缺少{}，請回覆補充，方便後續追蹤。", missing.join("與"))
}

#[cfg(test)]
#[path = "assistant_test.rs"]
mod tests;
