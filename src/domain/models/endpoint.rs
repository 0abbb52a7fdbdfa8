//! Swarm endpoint records and the registry persistence schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A known swarm endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmEndpoint {
    pub swarm_name: String,
    pub base_url: String,
    pub health_check_url: String,
    /// For persistent entries this is an env-var reference of the form
    /// `${SWARM_AUTH_TOKEN_<NAME>}`; volatile entries may hold a raw token,
    /// in memory only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Volatile endpoints are evicted at shutdown and never persisted.
    #[serde(default = "default_volatile")]
    pub volatile: bool,
}

const fn default_volatile() -> bool {
    true
}

impl SwarmEndpoint {
    /// Whether the auth token is stored as an `${ENV}` reference.
    pub fn has_env_token_ref(&self) -> bool {
        self.auth_token_ref
            .as_deref()
            .is_some_and(|token| token.starts_with("${") && token.ends_with('}'))
    }
}

/// On-disk registry file: only non-volatile entries are persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub local_swarm_name: String,
    pub local_base_url: String,
    #[serde(default)]
    pub endpoints: HashMap<String, SwarmEndpoint>,
}

/// Endpoint summary returned by `GET /swarms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmSummary {
    pub name: String,
    pub base_url: String,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl From<&SwarmEndpoint> for SwarmSummary {
    fn from(endpoint: &SwarmEndpoint) -> Self {
        Self {
            name: endpoint.swarm_name.clone(),
            base_url: endpoint.base_url.clone(),
            is_active: endpoint.is_active,
            last_seen: endpoint.last_seen,
            metadata: endpoint.metadata.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_token_ref_detection() {
        let mut endpoint = SwarmEndpoint {
            swarm_name: "beta".into(),
            base_url: "http://beta:8000".into(),
            health_check_url: "http://beta:8000/health".into(),
            auth_token_ref: Some("${SWARM_AUTH_TOKEN_BETA}".into()),
            last_seen: None,
            is_active: true,
            metadata: None,
            volatile: false,
        };
        assert!(endpoint.has_env_token_ref());

        endpoint.auth_token_ref = Some("raw-secret".into());
        assert!(!endpoint.has_env_token_ref());

        endpoint.auth_token_ref = None;
        assert!(!endpoint.has_env_token_ref());
    }

    #[test]
    fn test_volatile_defaults_to_true() {
        let json = r#"{
            "swarm_name": "beta",
            "base_url": "http://beta:8000",
            "health_check_url": "http://beta:8000/health",
            "is_active": true
        }"#;
        let endpoint: SwarmEndpoint = serde_json::from_str(json).unwrap();
        assert!(endpoint.volatile);
    }
}
