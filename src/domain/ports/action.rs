//! Action tool port.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::models::HistoryEntry;

/// An opaque async callable backing a non-MAIL tool.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Run the action with the call's arguments and return its text output.
    async fn invoke(&self, args: serde_json::Value) -> anyhow::Result<String>;
}

/// Registered actions, keyed by tool name. MAIL tool names are reserved and
/// never resolve here.
pub type ActionRegistry = HashMap<String, Arc<dyn ActionHandler>>;

/// What an action override produced.
pub enum ActionOutput {
    /// Plain text, wrapped by the executor into a tool entry.
    Text(String),
    /// A fully-formed history entry returned verbatim.
    Entry(HistoryEntry),
}

/// An override intercepting every action invocation.
#[async_trait]
pub trait ActionOverride: Send + Sync {
    async fn invoke(&self, args: serde_json::Value) -> anyhow::Result<ActionOutput>;
}
