//! Bearer-token authentication against the external identity service.
//!
//! Login exchanges the caller's API key for a JWT, then the token-info
//! endpoint yields `{role, id}`. Both endpoints are external; this module
//! only does the HTTP plumbing.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::domain::errors::AuthError;
use crate::domain::ports::{CallerIdentity, CallerRole, IdentityOracle};

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    role: String,
    id: serde_json::Value,
}

/// Identity oracle backed by the `AUTH_ENDPOINT` / `TOKEN_INFO_ENDPOINT`
/// pair.
pub struct RemoteIdentityOracle {
    http: Client,
    auth_endpoint: String,
    token_info_endpoint: String,
}

impl RemoteIdentityOracle {
    pub fn new(auth_endpoint: impl Into<String>, token_info_endpoint: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            auth_endpoint: auth_endpoint.into(),
            token_info_endpoint: token_info_endpoint.into(),
        }
    }

    async fn login(&self, api_key: &str) -> Result<String, AuthError> {
        let response = self
            .http
            .post(&self.auth_endpoint)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|err| AuthError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "login rejected by identity service");
            return Err(AuthError::Unauthorized(format!(
                "login failed with status {}",
                response.status().as_u16()
            )));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|err| AuthError::Transport(err.to_string()))?;

        info!(key_prefix = %&api_key[..api_key.len().min(8)], "caller authenticated with API key");
        Ok(login.token)
    }

    async fn token_info(&self, token: &str) -> Result<TokenInfo, AuthError> {
        let response = self
            .http
            .get(&self.token_info_endpoint)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| AuthError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::Unauthorized(format!(
                "token info failed with status {}",
                response.status().as_u16()
            )));
        }

        response
            .json()
            .await
            .map_err(|err| AuthError::Transport(err.to_string()))
    }
}

fn parse_role(role: &str) -> Result<CallerRole, AuthError> {
    match role {
        "admin" => Ok(CallerRole::Admin),
        "user" => Ok(CallerRole::User),
        "agent" => Ok(CallerRole::Agent),
        other => Err(AuthError::InvalidRole(other.to_string())),
    }
}

fn id_to_string(id: &serde_json::Value) -> String {
    match id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl IdentityOracle for RemoteIdentityOracle {
    async fn authenticate(&self, api_key: &str) -> Result<CallerIdentity, AuthError> {
        let token = self.login(api_key).await?;
        let info = self.token_info(&token).await?;
        Ok(CallerIdentity {
            role: parse_role(&info.role)?,
            id: id_to_string(&info.id),
            token,
        })
    }
}

/// Fixed-table oracle for tests and local development.
///
/// Maps API keys directly to identities, no network round trips.
#[derive(Default)]
pub struct StaticIdentityOracle {
    identities: HashMap<String, CallerIdentity>,
}

impl StaticIdentityOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(
        mut self,
        api_key: impl Into<String>,
        role: CallerRole,
        id: impl Into<String>,
    ) -> Self {
        let api_key = api_key.into();
        let identity = CallerIdentity {
            role,
            id: id.into(),
            token: api_key.clone(),
        };
        self.identities.insert(api_key, identity);
        self
    }
}

#[async_trait]
impl IdentityOracle for StaticIdentityOracle {
    async fn authenticate(&self, api_key: &str) -> Result<CallerIdentity, AuthError> {
        self.identities
            .get(api_key)
            .cloned()
            .ok_or_else(|| AuthError::Unauthorized("unknown API key".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_role() {
        assert_eq!(parse_role("admin").unwrap(), CallerRole::Admin);
        assert_eq!(parse_role("user").unwrap(), CallerRole::User);
        assert_eq!(parse_role("agent").unwrap(), CallerRole::Agent);
        assert!(matches!(
            parse_role("root"),
            Err(AuthError::InvalidRole(_))
        ));
    }

    #[test]
    fn test_id_to_string_handles_numbers() {
        assert_eq!(id_to_string(&serde_json::json!("abc")), "abc");
        assert_eq!(id_to_string(&serde_json::json!(42)), "42");
    }

    #[tokio::test]
    async fn test_static_oracle() {
        let oracle = StaticIdentityOracle::new()
            .with_identity("key-1", CallerRole::User, "7")
            .with_identity("key-2", CallerRole::Agent, "beta");

        let identity = oracle.authenticate("key-1").await.unwrap();
        assert_eq!(identity.namespaced_id(), "user_7");

        let identity = oracle.authenticate("key-2").await.unwrap();
        assert_eq!(identity.namespaced_id(), "swarm_beta");

        assert!(oracle.authenticate("nope").await.is_err());
    }
}
