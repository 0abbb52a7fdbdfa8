//! Error types for the MAIL runtime and federation layer.
//!
//! One enum per component, built with thiserror. Inside the dispatch loop
//! errors are values that get logged; only task-lifecycle and validation
//! errors cross the caller boundary.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the runtime core to its callers.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The runtime loop is already driving a run for this tenant.
    #[error("runtime already running for '{0}'")]
    AlreadyRunning(String),

    /// `submit_and_wait` exceeded the caller-supplied timeout.
    #[error("task '{task_id}' timed out after {timeout_secs} seconds")]
    TaskTimeout { task_id: Uuid, timeout_secs: u64 },

    /// A pending future already exists for this task id.
    #[error("a waiter is already registered for task '{0}'")]
    DuplicateWait(Uuid),

    /// The pending future was dropped without a result.
    #[error("task '{0}' was abandoned before completion")]
    TaskAbandoned(Uuid),

    /// An envelope failed a structural check before entering the queue.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

/// Errors raised while interpreting an agent's tool calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolCallError {
    /// A required argument is missing or has the wrong type.
    #[error("tool '{tool}' is missing required argument '{argument}'")]
    MissingArgument { tool: String, argument: String },

    /// The call does not name a message-producing MAIL tool.
    #[error("'{0}' is not a messaging tool")]
    NotAMessagingTool(String),

    /// No action with this name is registered.
    #[error("unknown action tool: '{0}'")]
    UnknownAction(String),
}

/// Errors from an agent adapter invocation.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("agent '{agent}' failed: {reason}")]
    CompletionFailed { agent: String, reason: String },

    #[error("agent '{0}' is not known to this swarm")]
    UnknownAgent(String),
}

/// Errors from the swarm registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The local swarm cannot be registered as a remote.
    #[error("cannot register local swarm '{0}' as a remote endpoint")]
    SelfRegistration(String),

    #[error("unknown swarm: '{0}'")]
    UnknownSwarm(String),

    #[error("failed to read or write registry file: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("registry serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("discovery transport error: {0}")]
    Transport(String),
}

/// Errors from the interswarm router.
#[derive(Error, Debug)]
pub enum RouterError {
    /// `start()` has not been called, or `stop()` already was.
    #[error("interswarm router is not running")]
    NotStarted,

    #[error("unknown swarm endpoint: '{0}'")]
    UnknownSwarm(String),

    #[error("swarm '{0}' is not active")]
    InactiveSwarm(String),

    #[error("no local message handler registered")]
    MissingLocalHandler,

    /// The wrapper named a target swarm other than us.
    #[error("message intended for '{target}', but local swarm is '{local}'")]
    WrongTargetSwarm { target: String, local: String },

    #[error("remote swarm '{swarm}' answered with status {status}")]
    RemoteStatus { swarm: String, status: u16 },

    #[error("transport error talking to '{swarm}': {reason}")]
    Transport { swarm: String, reason: String },
}

/// Errors from bearer-token authentication.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("no API key provided")]
    MissingCredentials,

    #[error("invalid API key format")]
    InvalidFormat,

    #[error("authentication rejected: {0}")]
    Unauthorized(String),

    #[error("role '{0}' may not access this endpoint")]
    InvalidRole(String),

    #[error("identity service unreachable: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_displays() {
        let err = RuntimeError::TaskTimeout {
            task_id: Uuid::nil(),
            timeout_secs: 3600,
        };
        assert!(err.to_string().contains("3600 seconds"));

        let err = ToolCallError::MissingArgument {
            tool: "send_request".into(),
            argument: "subject".into(),
        };
        assert!(err.to_string().contains("send_request"));
        assert!(err.to_string().contains("subject"));

        let err = RouterError::RemoteStatus {
            swarm: "beta".into(),
            status: 503,
        };
        assert!(err.to_string().contains("503"));
    }
}
