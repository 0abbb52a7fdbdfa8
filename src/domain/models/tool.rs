//! Tool calls and the reserved MAIL tool set.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::address::{Address, ALL_AGENTS};
use super::history::{HistoryEntry, Role};
use super::message::MailMessage;
use crate::domain::errors::ToolCallError;

/// A tool call emitted by an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// The name of the tool called.
    pub name: String,
    /// The arguments passed to the tool.
    pub args: serde_json::Value,
    /// The provider-assigned id of the tool call.
    pub call_id: String,
    /// The raw provider completion payload, if the adapter keeps one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<serde_json::Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: serde_json::Value, call_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args,
            call_id: call_id.into(),
            completion: None,
        }
    }

    /// Build the `role: tool` history entry answering this call.
    pub fn response_entry(&self, content: impl Into<String>) -> HistoryEntry {
        HistoryEntry {
            role: Role::Tool,
            content: content.into(),
            name: Some(self.name.clone()),
            tool_call_id: Some(self.call_id.clone()),
            tool_calls: Vec::new(),
        }
    }

    fn arg_str(&self, key: &str) -> Result<&str, ToolCallError> {
        self.args
            .get(key)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ToolCallError::MissingArgument {
                tool: self.name.clone(),
                argument: key.to_string(),
            })
    }

    /// Optional string argument, `None` when absent or null.
    pub fn arg_opt_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(serde_json::Value::as_str)
    }
}

/// The closed set of tool names reserved by the MAIL runtime.
///
/// Any other name resolves to the host-supplied action registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailTool {
    SendRequest,
    SendResponse,
    SendInterrupt,
    SendBroadcast,
    TaskComplete,
    AcknowledgeBroadcast,
    IgnoreBroadcast,
}

/// Tool names whose calls produce a MAIL message and therefore receive the
/// stub tool-response during the turn.
pub const MESSAGING_TOOL_NAMES: [&str; 5] = [
    "send_request",
    "send_response",
    "send_interrupt",
    "send_broadcast",
    "task_complete",
];

impl MailTool {
    /// Resolve a reserved tool name; `None` means an action tool.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "send_request" => Some(Self::SendRequest),
            "send_response" => Some(Self::SendResponse),
            "send_interrupt" => Some(Self::SendInterrupt),
            "send_broadcast" => Some(Self::SendBroadcast),
            "task_complete" => Some(Self::TaskComplete),
            "acknowledge_broadcast" => Some(Self::AcknowledgeBroadcast),
            "ignore_broadcast" => Some(Self::IgnoreBroadcast),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::SendRequest => "send_request",
            Self::SendResponse => "send_response",
            Self::SendInterrupt => "send_interrupt",
            Self::SendBroadcast => "send_broadcast",
            Self::TaskComplete => "task_complete",
            Self::AcknowledgeBroadcast => "acknowledge_broadcast",
            Self::IgnoreBroadcast => "ignore_broadcast",
        }
    }

    /// Whether a call to this tool gets the stub tool-response appended to
    /// the caller's history.
    pub fn emits_stub_response(self) -> bool {
        MESSAGING_TOOL_NAMES.contains(&self.name())
    }
}

/// Convert a message-producing tool call into the envelope it describes.
///
/// The sender of the emitted envelope is always the agent that made the
/// call; the task id is inherited from the message being dispatched.
pub fn call_to_message(
    call: &ToolCall,
    sender: &str,
    task_id: Uuid,
) -> Result<MailMessage, ToolCallError> {
    let sender_address = Address::agent(sender);

    match MailTool::from_name(&call.name) {
        Some(MailTool::SendRequest) => Ok(MailMessage::request(
            task_id,
            sender_address,
            Address::agent(call.arg_str("target")?),
            call.arg_str("subject")?,
            call.arg_str("message")?,
        )),
        Some(MailTool::SendResponse) => Ok(MailMessage::response(
            task_id,
            sender_address,
            Address::agent(call.arg_str("target")?),
            call.arg_str("subject")?,
            call.arg_str("message")?,
        )),
        Some(MailTool::SendInterrupt) => Ok(MailMessage::interrupt(
            task_id,
            sender_address,
            vec![Address::agent(call.arg_str("target")?)],
            call.arg_str("subject")?,
            call.arg_str("message")?,
        )),
        Some(MailTool::SendBroadcast) => Ok(MailMessage::broadcast(
            task_id,
            sender_address,
            vec![Address::agent(ALL_AGENTS)],
            call.arg_str("subject")?,
            call.arg_str("message")?,
        )),
        Some(MailTool::TaskComplete) => {
            let finish_message = call
                .arg_opt_str("finish_message")
                .unwrap_or("Task completed successfully");
            let mut message = MailMessage::broadcast(
                task_id,
                sender_address,
                vec![Address::agent(ALL_AGENTS)],
                "Task complete",
                finish_message,
            );
            message.msg_type = super::message::MessageKind::BroadcastComplete;
            Ok(message)
        }
        _ => Err(ToolCallError::NotAMessagingTool(call.name.clone())),
    }
}

/// Broadcast telling an agent that one of its action tools finished.
///
/// Targeted back at the calling agent so its turn continues with the result
/// in context.
pub fn action_complete_broadcast(
    action_name: &str,
    result: &str,
    swarm_name: &str,
    recipient: &str,
    task_id: Uuid,
) -> MailMessage {
    MailMessage::broadcast(
        task_id,
        Address::system(swarm_name),
        vec![Address::agent(recipient)],
        format!("Action Complete: {action_name}"),
        format!(
            "The action {action_name} has been completed. The result is as follows:\n\n<output>\n{result}\n</output>"
        ),
    )
}
