//! Action tool execution.

use crate::domain::errors::ToolCallError;
use crate::domain::models::{HistoryEntry, ToolCall};
use crate::domain::ports::{ActionOutput, ActionOverride, ActionRegistry};

/// Execute an action tool and wrap its result as the tool-response entry.
///
/// With an override present the registry is bypassed entirely: a text result
/// is wrapped via the call, a structured entry is returned verbatim.
pub async fn execute_action_tool(
    call: &ToolCall,
    actions: &ActionRegistry,
    action_override: Option<&dyn ActionOverride>,
) -> anyhow::Result<HistoryEntry> {
    if let Some(action_override) = action_override {
        return match action_override.invoke(call.args.clone()).await? {
            ActionOutput::Text(content) => Ok(call.response_entry(content)),
            ActionOutput::Entry(entry) => Ok(entry),
        };
    }

    let action = actions
        .get(&call.name)
        .ok_or_else(|| ToolCallError::UnknownAction(call.name.clone()))?;
    let content = action.invoke(call.args.clone()).await?;
    Ok(call.response_entry(content))
}
