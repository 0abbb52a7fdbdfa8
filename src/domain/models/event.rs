//! Streaming task telemetry events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a [`TaskEvent`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A message was handed to an agent.
    NewMessage,
    /// An action tool is being executed on behalf of an agent.
    ActionToolCall,
    /// An action tool finished.
    ActionToolComplete,
    /// The task's pending future resolved; carries the response body.
    TaskComplete,
    /// Heartbeat emitted on an idle stream.
    Ping,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NewMessage => write!(f, "new_message"),
            Self::ActionToolCall => write!(f, "action_tool_call"),
            Self::ActionToolComplete => write!(f, "action_tool_complete"),
            Self::TaskComplete => write!(f, "task_complete"),
            Self::Ping => write!(f, "ping"),
        }
    }
}

/// One telemetry event scoped to a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub event: EventKind,
    pub timestamp: DateTime<Utc>,
    pub task_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl TaskEvent {
    pub fn new(event: EventKind, task_id: Uuid, description: impl Into<String>) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
            task_id,
            description: Some(description.into()),
            extra: None,
        }
    }

    /// Heartbeat with no description.
    pub fn ping(task_id: Uuid) -> Self {
        Self {
            event: EventKind::Ping,
            timestamp: Utc::now(),
            task_id,
            description: None,
            extra: None,
        }
    }

    /// Terminal event carrying the response body, when one is available.
    pub fn task_complete(task_id: Uuid, response: Option<&str>) -> Self {
        Self {
            event: EventKind::TaskComplete,
            timestamp: Utc::now(),
            task_id,
            description: None,
            extra: response.map(|body| serde_json::json!({ "response": body })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_wire_names() {
        assert_eq!(
            serde_json::to_value(EventKind::TaskComplete).unwrap(),
            "task_complete"
        );
        assert_eq!(serde_json::to_value(EventKind::Ping).unwrap(), "ping");
    }

    #[test]
    fn test_task_complete_carries_response() {
        let ev = TaskEvent::task_complete(Uuid::new_v4(), Some("all done"));
        assert_eq!(ev.extra.unwrap()["response"], "all done");
    }
}
