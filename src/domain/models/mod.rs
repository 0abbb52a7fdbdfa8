//! Domain models
//!
//! Pure protocol entities: addresses, message envelopes, the dispatch queue,
//! agent histories, tool calls, telemetry events and endpoint records. No
//! infrastructure concerns live here.

pub mod address;
pub mod endpoint;
pub mod event;
pub mod history;
pub mod message;
pub mod queue;
pub mod tool;

pub use address::{join_address, split_address, Address, AddressKind, ALL_AGENTS};
pub use endpoint::{RegistrySnapshot, SwarmEndpoint, SwarmSummary};
pub use event::{EventKind, TaskEvent};
pub use history::{trim_history, HistoryEntry, Role, ToolCallRecord};
pub use message::{
    render_incoming, BroadcastBody, DirectBody, InterruptBody, MailMessage, MessageBody,
    MessageKind,
};
pub use queue::MessageQueue;
pub use tool::{
    action_complete_broadcast, call_to_message, MailTool, ToolCall, MESSAGING_TOOL_NAMES,
};
