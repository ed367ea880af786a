//! Function definitions offered to the model.

use super::types::Tool;

pub const EXTRACT_TASK: &str = "extract_task";

/// The task-extraction function. Priorities use the Chinese labels the
/// model is prompted with; [`crate::services::tasks::Priority`] maps them.
#[must_use]
pub fn extract_task_tool() -> Tool {
    Tool {
        name: EXTRACT_TASK.into(),
        description: "提取任務相關資訊".into(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "is_task": { "type": "boolean", "description": "訊息是否包含任務" },
                "description": { "type": "string", "description": "任務描述" },
                "assignee": { "type": "string", "description": "負責人姓名" },
                "due_date": { "type": "string", "description": "截止日期，格式 YYYY-MM-DD" },
                "priority": { "type": "string", "enum": ["高", "中", "低"], "description": "優先級" }
            },
            "required": ["is_task"]
        }),
    }
}

#[must_use]
pub fn secretary_tools() -> Vec<Tool> {
    vec![extract_task_tool()]
}
