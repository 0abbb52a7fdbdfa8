//! Agent-side adapters: scripted agents for tests/demos and the in-memory
//! memory store.

pub mod memory;
pub mod scripted;

pub use memory::{InMemoryAgentMemory, StoredAcknowledgement};
pub use scripted::{scripted_core, ScriptedAgent};
