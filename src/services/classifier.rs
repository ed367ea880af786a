//! Message classifier — relevance gate, task extraction, chat replies, and
//! task summaries, all backed by the LLM.
//!
//! DESIGN
//! ======
//! Each call is a single short completion. Failures degrade instead of
//! propagating where the pipeline can still answer:
//! - relevance check failure: treat the message as relevant
//! - extraction failure: no task
//! - summary failure: the rule-based listing from [`super::reports`]
//!
//! Chat replies do propagate their error so the webhook can send the generic
//! failure message.

use serde::{Deserialize, Serialize};
use time::Date;
use tracing::warn;

use super::reports;
use super::tasks::{NewTask, Priority, Task, parse_due_date};
use crate::llm::LlmChat;
use crate::llm::tools::{self, EXTRACT_TASK};
use crate::llm::types::{ChatRequest, LlmError, Message};
use crate::state::UserContext;

const RELEVANCE_MAX_TOKENS: u32 = 10;
const EXTRACTION_MAX_TOKENS: u32 = 512;
const REPLY_MAX_TOKENS: u32 = 1024;
const SUMMARY_MAX_TOKENS: u32 = 1024;

pub const UNCLEAR_REPLY: &str = "抱歉，我無法理解，請再試一次。";

pub const SYSTEM_PROMPT: &str = "你是一個專案管理助手，負責：
1. 理解用戶的任務需求
2. 管理專案進度
3. 提供週報摘要
4. 回答專案相關問題

請用繁體中文回覆，保持專業且友善的語氣。

支援的指令：
/help - 顯示幫助訊息
/tasks - 查看任務列表
/report - 生成週報
/settings - 查看設定
/status - 查看專案狀態";

const RELEVANCE_PROMPT: &str = "請判斷以下訊息是否與專案管理、任務追蹤、進度報告等相關。
請只回答 'yes' 或 'no'。

相關的內容包括：
- 任務新增、修改、查詢
- 專案進度追蹤
- 週報生成
- 任務提醒
- 專案相關問題諮詢
- 指令操作（/help, /tasks 等）

不相關的內容包括：
- 一般聊天
- 私人問題
- 與專案無關的詢問
- 其他非工作相關話題";

const EXTRACTION_PROMPT: &str = "你是一個任務分析專家，負責從對話中識別出任務相關資訊。";

const SUMMARY_PROMPT: &str = "你是一個專業的專案管理助手，負責生成任務摘要報告。請用繁體中文，條列重點。";

// =============================================================================
// TASK EXTRACTION TYPE
// =============================================================================

/// Structured result of [`extract_task`]. Also stored verbatim as the
/// message's `ai_result`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskExtraction {
    pub is_task: bool,
    pub description: Option<String>,
    pub assignee: Option<String>,
    #[serde(with = "super::iso_date::option")]
    pub due_date: Option<Date>,
    pub priority: Option<Priority>,
}

/// Tool arguments exactly as the model sent them.
#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    is_task: bool,
    description: Option<String>,
    assignee: Option<String>,
    due_date: Option<String>,
    priority: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

impl From<RawExtraction> for TaskExtraction {
    fn from(raw: RawExtraction) -> Self {
        Self {
            is_task: raw.is_task,
            description: non_blank(raw.description),
            assignee: non_blank(raw.assignee),
            due_date: raw.due_date.as_deref().and_then(parse_due_date),
            priority: raw.priority.as_deref().and_then(Priority::parse),
        }
    }
}

impl TaskExtraction {
    /// Insert payload for this extraction. Falls back to the original message
    /// text when the model gave no description.
    #[must_use]
    pub fn to_new_task(&self, original_text: &str) -> NewTask {
        let mut new = NewTask::from_description(self.description.as_deref().unwrap_or(original_text));
        new.assignee.clone_from(&self.assignee);
        new.due_date = self.due_date;
        new.priority = self.priority.unwrap_or_default();
        new
    }

    /// Names of the fields a follow-up should ask for.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.assignee.is_none() {
            missing.push("負責人");
        }
        if self.due_date.is_none() {
            missing.push("截止日期");
        }
        missing
    }
}

/// Parse the `extract_task` tool arguments.
pub(crate) fn parse_extraction(input: &serde_json::Value) -> Option<TaskExtraction> {
    serde_json::from_value::<RawExtraction>(input.clone())
        .ok()
        .map(TaskExtraction::from)
}

// =============================================================================
// CALLS
// =============================================================================

/// Ask the model whether `text` is about project work. Only a `yes` answer
/// counts; an LLM failure counts as relevant so nothing important is dropped.
pub async fn is_relevant(llm: &dyn LlmChat, text: &str) -> bool {
    let messages = [Message::user(text)];
    let request = ChatRequest::new(RELEVANCE_PROMPT, &messages, RELEVANCE_MAX_TOKENS).with_temperature(0.3);
    match llm.chat(request).await {
        Ok(response) => response.text().trim().eq_ignore_ascii_case("yes"),
        Err(e) => {
            warn!(error = %e, "relevance check failed; treating message as relevant");
            true
        }
    }
}

/// Extract task fields with a forced `extract_task` call. `today` lets the
/// model resolve relative dates such as 明天 or 下週五.
pub async fn extract_task(llm: &dyn LlmChat, text: &str, today: Date) -> Option<TaskExtraction> {
    let tools = tools::secretary_tools();
    let messages = [Message::user(format!(
        "請分析以下訊息是否包含任務，如果是，請提取：任務描述、負責人、截止日期（YYYY-MM-DD）、優先級。\n\
         今天日期：{}\n\n訊息：{text}",
        super::tasks::iso_date_string(today)
    ))];
    let request = ChatRequest::new(EXTRACTION_PROMPT, &messages, EXTRACTION_MAX_TOKENS)
        .with_temperature(0.0)
        .with_forced_tool(&tools, EXTRACT_TASK);

    let response = match llm.chat(request).await {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "task extraction failed");
            return None;
        }
    };

    let Some(input) = response.tool_input(EXTRACT_TASK) else {
        warn!(stop_reason = %response.stop_reason, "model returned no extract_task call");
        return None;
    };
    let extraction = parse_extraction(input);
    if extraction.is_none() {
        warn!(input = %input, "extract_task arguments did not parse");
    }
    extraction
}

/// General secretary answer, continuing from the user's previous exchange
/// when there is one.
///
/// # Errors
///
/// Returns the LLM error; the caller replies with the generic failure text.
pub async fn chat_reply(llm: &dyn LlmChat, text: &str, context: Option<&UserContext>) -> Result<String, LlmError> {
    let mut messages = Vec::with_capacity(3);
    if let Some(ctx) = context {
        messages.push(Message::user(ctx.last_message.clone()));
        messages.push(Message::assistant(ctx.last_response.clone()));
    }
    messages.push(Message::user(text));

    let request = ChatRequest::new(SYSTEM_PROMPT, &messages, REPLY_MAX_TOKENS).with_temperature(0.7);
    let reply = llm.chat(request).await?.text();
    let reply = reply.trim();
    Ok(if reply.is_empty() { UNCLEAR_REPLY.to_string() } else { reply.to_string() })
}

/// LLM-written summary of `tasks`; the plain listing when the model fails.
pub async fn summarize_tasks(llm: Option<&dyn LlmChat>, tasks: &[Task]) -> String {
    let listing = reports::task_listing(tasks);
    let Some(llm) = llm else {
        return listing;
    };

    let messages = [Message::user(format!("請根據以下任務列表生成一份摘要報告：\n\n{listing}"))];
    let request = ChatRequest::new(SUMMARY_PROMPT, &messages, SUMMARY_MAX_TOKENS);
    match llm.chat(request).await {
        Ok(response) => {
            let summary = response.text();
            if summary.trim().is_empty() { listing } else { summary.trim().to_string() }
        }
        Err(e) => {
            warn!(error = %e, task_count = tasks.len(), "task summary failed; using plain listing");
            listing
        }
    }
}

#[cfg(test)]
#[path = "classifier_test.rs"]
mod tests;
