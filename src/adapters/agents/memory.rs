//! In-memory agent memory adapter.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::ports::AgentMemory;

/// One stored broadcast acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAcknowledgement {
    pub agent: String,
    pub incoming: String,
    pub note: Option<String>,
}

/// [`AgentMemory`] backed by a plain in-process list.
///
/// Suitable for tests and single-process demos; a real deployment plugs a
/// persistent store in behind the same port.
#[derive(Debug, Default)]
pub struct InMemoryAgentMemory {
    entries: RwLock<Vec<StoredAcknowledgement>>,
}

impl InMemoryAgentMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// All acknowledgements stored for an agent.
    pub async fn acknowledgements_for(&self, agent: &str) -> Vec<StoredAcknowledgement> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|entry| entry.agent == agent)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AgentMemory for InMemoryAgentMemory {
    async fn store_acknowledgement(
        &self,
        agent: &str,
        incoming: &str,
        note: Option<&str>,
    ) -> anyhow::Result<()> {
        self.entries.write().await.push(StoredAcknowledgement {
            agent: agent.to_string(),
            incoming: incoming.to_string(),
            note: note.map(str::to_string),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acknowledgements_partitioned_by_agent() {
        let memory = InMemoryAgentMemory::new();
        memory
            .store_acknowledgement("analyst", "<incoming_message/>", Some("noted"))
            .await
            .unwrap();
        memory
            .store_acknowledgement("math", "<incoming_message/>", None)
            .await
            .unwrap();

        let analyst = memory.acknowledgements_for("analyst").await;
        assert_eq!(analyst.len(), 1);
        assert_eq!(analyst[0].note.as_deref(), Some("noted"));
        assert_eq!(memory.acknowledgements_for("math").await.len(), 1);
        assert!(memory.acknowledgements_for("ghost").await.is_empty());
    }
}
