//! MAIL addresses and the `name[@swarm]` grammar.

use serde::{Deserialize, Serialize};

/// The literal agent address meaning "every local agent except the sender".
pub const ALL_AGENTS: &str = "all";

/// Classifies the party behind an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    Agent,
    User,
    System,
}

impl std::fmt::Display for AddressKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Agent => write!(f, "agent"),
            Self::User => write!(f, "user"),
            Self::System => write!(f, "system"),
        }
    }
}

/// The sender or recipient of a MAIL message.
///
/// The address string is either a bare name (`analyst`) or a federated
/// `name@swarm` pair (`analyst@beta`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// The type of party this address identifies.
    #[serde(rename = "address_type")]
    pub kind: AddressKind,
    /// The address string, `name` or `name@swarm`.
    pub address: String,
}

impl Address {
    /// Create an agent address.
    pub fn agent(address: impl Into<String>) -> Self {
        Self {
            kind: AddressKind::Agent,
            address: address.into(),
        }
    }

    /// Create a user address.
    pub fn user(address: impl Into<String>) -> Self {
        Self {
            kind: AddressKind::User,
            address: address.into(),
        }
    }

    /// Create a system address.
    pub fn system(address: impl Into<String>) -> Self {
        Self {
            kind: AddressKind::System,
            address: address.into(),
        }
    }

    /// Create an agent address qualified with a swarm name.
    pub fn agent_in(name: &str, swarm: Option<&str>) -> Self {
        match swarm {
            Some(swarm) => Self::agent(format!("{name}@{swarm}")),
            None => Self::agent(name),
        }
    }

    /// Split this address into `(name, swarm)` parts.
    pub fn split(&self) -> (String, Option<String>) {
        split_address(&self.address)
    }

    /// The bare name without any swarm qualifier.
    pub fn name(&self) -> String {
        self.split().0
    }

    /// The swarm qualifier, if any.
    pub fn swarm(&self) -> Option<String> {
        self.split().1
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.address)
    }
}

/// Parse an address string in the format `name` or `name@swarm`.
///
/// Whitespace around either part is trimmed. Only the first `@` splits, so
/// swarm names containing `@` are not representable (matching the grammar).
pub fn split_address(address: &str) -> (String, Option<String>) {
    match address.split_once('@') {
        Some((name, swarm)) => (name.trim().to_string(), Some(swarm.trim().to_string())),
        None => (address.trim().to_string(), None),
    }
}

/// Format `(name, swarm)` parts back into an address string.
pub fn join_address(name: &str, swarm: Option<&str>) -> String {
    match swarm {
        Some(swarm) => format!("{name}@{swarm}"),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_local_address() {
        assert_eq!(split_address("analyst"), ("analyst".to_string(), None));
    }

    #[test]
    fn test_split_federated_address() {
        assert_eq!(
            split_address("analyst@beta"),
            ("analyst".to_string(), Some("beta".to_string()))
        );
    }

    #[test]
    fn test_split_trims_whitespace() {
        assert_eq!(
            split_address(" analyst @ beta "),
            ("analyst".to_string(), Some("beta".to_string()))
        );
    }

    #[test]
    fn test_join_round_trip() {
        for addr in ["supervisor", "analyst@beta", "math@alpha-2"] {
            let (name, swarm) = split_address(addr);
            assert_eq!(join_address(&name, swarm.as_deref()), addr);
        }
    }

    #[test]
    fn test_agent_in_formats_swarm() {
        let addr = Address::agent_in("analyst", Some("beta"));
        assert_eq!(addr.address, "analyst@beta");
        assert_eq!(addr.kind, AddressKind::Agent);

        let addr = Address::agent_in("analyst", None);
        assert_eq!(addr.address, "analyst");
    }

    #[test]
    fn test_address_serde_shape() {
        let addr = Address::user("user_42");
        let json = serde_json::to_value(&addr).unwrap();
        assert_eq!(json["address_type"], "user");
        assert_eq!(json["address"], "user_42");
    }
}
