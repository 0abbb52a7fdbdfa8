//! Agent adapter port.
//!
//! The LLM call itself is outside this crate: anything honoring
//! [`AgentAdapter`] can participate in a swarm. The runtime hands the
//! adapter the agent's full history and a tool-choice directive and gets
//! back optional text plus the tool calls to interpret.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::errors::AgentError;
use crate::domain::models::{HistoryEntry, ToolCall};

/// How the agent should be driven with respect to tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoice {
    /// The agent may answer with plain text.
    Auto,
    /// The agent must call at least one tool.
    Required,
}

impl ToolChoice {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Required => "required",
        }
    }
}

/// One agent turn: optional completion text and the calls it made.
#[derive(Debug, Clone, Default)]
pub struct AgentTurn {
    pub text: Option<String>,
    pub calls: Vec<ToolCall>,
}

/// The callable contract every agent must honor.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// Produce the next turn for the given history.
    async fn complete(
        &self,
        history: &[HistoryEntry],
        tool_choice: ToolChoice,
    ) -> Result<AgentTurn, AgentError>;
}

/// An agent as registered with a runtime: the adapter plus the metadata the
/// tool catalog and the dispatcher need.
#[derive(Clone)]
pub struct AgentCore {
    pub adapter: Arc<dyn AgentAdapter>,
    /// Agents this one may address directly.
    pub comm_targets: Vec<String>,
    /// Whether user-submitted requests may be routed here.
    pub enable_entrypoint: bool,
    /// Whether this agent may send or receive federated messages.
    pub enable_interswarm: bool,
    /// Whether this agent may terminate tasks with `task_complete`.
    pub can_complete_tasks: bool,
}

impl std::fmt::Debug for AgentCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentCore")
            .field("comm_targets", &self.comm_targets)
            .field("enable_entrypoint", &self.enable_entrypoint)
            .field("enable_interswarm", &self.enable_interswarm)
            .field("can_complete_tasks", &self.can_complete_tasks)
            .finish_non_exhaustive()
    }
}

/// The set of agents driving one swarm, keyed by name.
pub type AgentRoster = HashMap<String, AgentCore>;
