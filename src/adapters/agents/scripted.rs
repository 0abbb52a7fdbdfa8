//! Scripted agent adapter for tests and demos.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::AgentError;
use crate::domain::models::{HistoryEntry, Role, ToolCall};
use crate::domain::ports::{AgentAdapter, AgentTurn, ToolChoice};

/// An agent that replays a queue of scripted turns.
///
/// Each invocation pops the next turn; once the script is exhausted the
/// agent answers with an empty turn (or a configured fallback). Inputs are
/// recorded so tests can assert on what the agent actually saw.
pub struct ScriptedAgent {
    name: String,
    turns: RwLock<VecDeque<AgentTurn>>,
    fallback: Option<AgentTurn>,
    fail_with: Option<String>,
    invocations: RwLock<Vec<Vec<HistoryEntry>>>,
}

impl ScriptedAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            turns: RwLock::new(VecDeque::new()),
            fallback: None,
            fail_with: None,
            invocations: RwLock::new(Vec::new()),
        }
    }

    /// Pre-load the agent with scripted turns.
    pub fn with_turns(mut self, turns: Vec<AgentTurn>) -> Self {
        self.turns = RwLock::new(turns.into());
        self
    }

    /// Turn to replay once the script runs dry.
    pub fn with_fallback(mut self, fallback: AgentTurn) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Make every invocation fail with the given reason.
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.fail_with = Some(reason.into());
        self
    }

    /// Append a turn to the script.
    pub async fn push_turn(&self, turn: AgentTurn) {
        self.turns.write().await.push_back(turn);
    }

    /// Number of times the agent has been invoked.
    pub async fn invocation_count(&self) -> usize {
        self.invocations.read().await.len()
    }

    /// The last user entry the agent saw on its most recent invocation.
    pub async fn last_input(&self) -> Option<String> {
        let invocations = self.invocations.read().await;
        invocations.last().and_then(|history| {
            history
                .iter()
                .rev()
                .find(|entry| entry.role == Role::User)
                .map(|entry| entry.content.clone())
        })
    }

    /// Shorthand for building a tool call with a fresh call id.
    pub fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall::new(name, args, Uuid::new_v4().to_string())
    }

    /// Shorthand for a single-call turn.
    pub fn turn(name: &str, args: serde_json::Value) -> AgentTurn {
        AgentTurn {
            text: None,
            calls: vec![Self::call(name, args)],
        }
    }
}

#[async_trait]
impl AgentAdapter for ScriptedAgent {
    async fn complete(
        &self,
        history: &[HistoryEntry],
        _tool_choice: ToolChoice,
    ) -> Result<AgentTurn, AgentError> {
        self.invocations.write().await.push(history.to_vec());

        if let Some(reason) = &self.fail_with {
            return Err(AgentError::CompletionFailed {
                agent: self.name.clone(),
                reason: reason.clone(),
            });
        }

        if let Some(turn) = self.turns.write().await.pop_front() {
            return Ok(turn);
        }
        Ok(self.fallback.clone().unwrap_or_default())
    }
}

/// Convenience constructor for a roster entry backed by a scripted agent.
pub fn scripted_core(
    agent: Arc<ScriptedAgent>,
    comm_targets: Vec<String>,
    can_complete_tasks: bool,
) -> crate::domain::ports::AgentCore {
    crate::domain::ports::AgentCore {
        adapter: agent,
        comm_targets,
        enable_entrypoint: can_complete_tasks,
        enable_interswarm: false,
        can_complete_tasks,
    }
}
