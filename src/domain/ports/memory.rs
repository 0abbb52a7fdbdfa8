//! Agent memory port.
//!
//! Used by exactly one tool interpretation: `acknowledge_broadcast` persists
//! the incoming broadcast (plus an optional note) into the acknowledging
//! agent's memory. The store itself is external.

use async_trait::async_trait;

/// Per-agent persistent memory.
#[async_trait]
pub trait AgentMemory: Send + Sync {
    /// Record that `agent` acknowledged a broadcast rendered as `incoming`.
    async fn store_acknowledgement(
        &self,
        agent: &str,
        incoming: &str,
        note: Option<&str>,
    ) -> anyhow::Result<()>;
}
