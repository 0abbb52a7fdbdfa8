//! Agent conversation histories.

use serde::{Deserialize, Serialize};

/// Role tag of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// Compact record of a tool call inside an assistant entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// A single role-tagged entry in an agent's history.
///
/// Histories are mutated only by the runtime, on the agent's behalf, inside
/// that agent's dispatch turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
    /// Tool name, set on `tool` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The call being answered, set on `tool` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Calls made by the assistant, set on `assistant` entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
}

impl HistoryEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCallRecord>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls,
        }
    }
}

/// Trim a history at the end of a turn.
///
/// Keeps everything from the last `user` entry forward, then strips any
/// leading `tool` entries so the next turn starts on a valid head. With no
/// `user` entry present the whole history is kept (modulo leading tools).
pub fn trim_history(history: &mut Vec<HistoryEntry>) {
    if let Some(last_user) = history.iter().rposition(|entry| entry.role == Role::User) {
        history.drain(..last_user);
    }
    while history.first().is_some_and(|entry| entry.role == Role::Tool) {
        history.remove(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(content: &str) -> HistoryEntry {
        HistoryEntry {
            role: Role::Tool,
            content: content.into(),
            name: Some("send_request".into()),
            tool_call_id: Some("call_1".into()),
            tool_calls: Vec::new(),
        }
    }

    #[test]
    fn test_trim_keeps_from_last_user() {
        let mut history = vec![
            HistoryEntry::user("first"),
            HistoryEntry::assistant("reply", Vec::new()),
            tool("ok"),
            HistoryEntry::user("second"),
            HistoryEntry::assistant("reply 2", Vec::new()),
        ];
        trim_history(&mut history);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "second");
    }

    #[test]
    fn test_trim_without_user_strips_leading_tools() {
        let mut history = vec![
            tool("orphan"),
            tool("orphan 2"),
            HistoryEntry::assistant("reply", Vec::new()),
        ];
        trim_history(&mut history);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::Assistant);
    }

    #[test]
    fn test_trim_first_entry_is_user_after_trim() {
        let mut history = vec![
            HistoryEntry::assistant("a", Vec::new()),
            HistoryEntry::user("u1"),
            HistoryEntry::assistant("b", Vec::new()),
            HistoryEntry::user("u2"),
            tool("t"),
        ];
        trim_history(&mut history);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "u2");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_trim_empty_history_is_noop() {
        let mut history: Vec<HistoryEntry> = Vec::new();
        trim_history(&mut history);
        assert!(history.is_empty());
    }
}
