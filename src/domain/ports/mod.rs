//! Ports (trait seams) to everything the runtime treats as external:
//! the LLM-backed agents, action tool bodies, the per-agent memory store,
//! the identity oracle and the interswarm transport.

pub mod action;
pub mod agent;
pub mod identity;
pub mod memory;
pub mod router;

pub use action::{ActionHandler, ActionOutput, ActionOverride, ActionRegistry};
pub use agent::{AgentAdapter, AgentCore, AgentRoster, AgentTurn, ToolChoice};
pub use identity::{CallerIdentity, CallerRole, IdentityOracle};
pub use memory::AgentMemory;
pub use router::{InterswarmTransport, LocalDelivery};
