//! Identity oracle port.
//!
//! Maps bearer API keys to `{role, id}` pairs. Token issuance and
//! verification live in an external service; the HTTP surface only consumes
//! the resolved identity.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::AuthError;

/// Role attached to an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallerRole {
    Admin,
    User,
    Agent,
}

impl std::fmt::Display for CallerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::User => write!(f, "user"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// A resolved caller identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub role: CallerRole,
    pub id: String,
    /// The JWT obtained during login, forwarded to per-tenant runtimes.
    pub token: String,
}

impl CallerIdentity {
    /// Namespaced id used to key per-tenant runtimes: `<role>_<id>` for
    /// users and admins, `swarm_<id>` for agents.
    pub fn namespaced_id(&self) -> String {
        match self.role {
            CallerRole::Agent => format!("swarm_{}", self.id),
            role => format!("{}_{}", role, self.id),
        }
    }
}

/// Resolves bearer API keys into caller identities.
#[async_trait]
pub trait IdentityOracle: Send + Sync {
    async fn authenticate(&self, api_key: &str) -> Result<CallerIdentity, AuthError>;
}
