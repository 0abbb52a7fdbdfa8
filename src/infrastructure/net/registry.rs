//! Swarm registry: service discovery and auth token resolution.
//!
//! Keeps the in-memory endpoint map, runs the periodic health check loop,
//! and persists non-volatile entries to a JSON file. Auth tokens of
//! persistent entries are stored as `${ENV_VAR}` references and resolved
//! from the environment on demand; raw tokens never touch disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::errors::RegistryError;
use crate::domain::models::{RegistrySnapshot, SwarmEndpoint};

/// How often remote endpoints are probed.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Per-probe timeout.
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for discovery requests.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// An entry returned by a `GET {url}/swarms` discovery endpoint.
#[derive(Debug, serde::Deserialize)]
struct DiscoveredSwarm {
    name: Option<String>,
    base_url: Option<String>,
    #[serde(default)]
    auth_token: Option<String>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, serde::Deserialize)]
struct DiscoveryResponse {
    #[serde(default)]
    swarms: Vec<DiscoveredSwarm>,
}

/// Registry for managing swarm endpoints and service discovery.
pub struct SwarmRegistry {
    local_swarm_name: String,
    local_base_url: String,
    persistence_file: PathBuf,
    endpoints: RwLock<HashMap<String, SwarmEndpoint>>,
    http: Client,
    health_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl SwarmRegistry {
    /// Create a registry, auto-registering the local swarm and loading any
    /// persisted endpoints.
    pub fn new(
        local_swarm_name: impl Into<String>,
        local_base_url: impl Into<String>,
        persistence_file: Option<PathBuf>,
    ) -> Self {
        let local_swarm_name = local_swarm_name.into();
        let local_base_url = local_base_url.into();
        let persistence_file = persistence_file
            .unwrap_or_else(|| PathBuf::from(format!("registries/{local_swarm_name}.json")));

        let mut endpoints = HashMap::new();
        endpoints.insert(
            local_swarm_name.clone(),
            SwarmEndpoint {
                swarm_name: local_swarm_name.clone(),
                base_url: local_base_url.clone(),
                health_check_url: format!("{local_base_url}/health"),
                auth_token_ref: None,
                last_seen: Some(Utc::now()),
                is_active: true,
                metadata: None,
                // The local swarm is never volatile.
                volatile: false,
            },
        );
        info!(swarm = %local_swarm_name, url = %local_base_url, "registered local swarm");

        Self::load_persistent_into(&persistence_file, &local_swarm_name, &mut endpoints);

        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            local_swarm_name,
            local_base_url,
            persistence_file,
            endpoints: RwLock::new(endpoints),
            http: Client::new(),
            health_handle: Mutex::new(None),
            shutdown_tx,
        }
    }

    pub fn local_swarm_name(&self) -> &str {
        &self.local_swarm_name
    }

    pub fn local_base_url(&self) -> &str {
        &self.local_base_url
    }

    /// Register a remote swarm.
    ///
    /// Self-registration is rejected. For non-volatile entries the auth
    /// token is converted to an env-var reference and the registry file is
    /// rewritten; volatile entries keep the raw token in memory only.
    pub async fn register_swarm(
        &self,
        swarm_name: &str,
        base_url: &str,
        auth_token: Option<String>,
        metadata: Option<serde_json::Value>,
        volatile: bool,
    ) -> Result<(), RegistryError> {
        if swarm_name == self.local_swarm_name {
            warn!(swarm = %swarm_name, "attempted to register local swarm as remote");
            return Err(RegistryError::SelfRegistration(swarm_name.to_string()));
        }

        let auth_token_ref = if volatile {
            auth_token
        } else {
            auth_token
                .as_deref()
                .map(|token| Self::env_token_ref(swarm_name, token))
        };

        let endpoint = SwarmEndpoint {
            swarm_name: swarm_name.to_string(),
            base_url: base_url.to_string(),
            health_check_url: format!("{base_url}/health"),
            auth_token_ref,
            last_seen: Some(Utc::now()),
            is_active: true,
            metadata,
            volatile,
        };

        self.endpoints
            .write()
            .await
            .insert(swarm_name.to_string(), endpoint);
        info!(swarm = %swarm_name, url = %base_url, volatile, "registered remote swarm");

        if !volatile {
            self.save_persistent_endpoints().await?;
        }
        Ok(())
    }

    /// Remove a swarm from the registry.
    pub async fn unregister_swarm(&self, swarm_name: &str) -> Result<(), RegistryError> {
        let removed = self.endpoints.write().await.remove(swarm_name);
        if let Some(endpoint) = removed {
            info!(swarm = %swarm_name, "unregistered swarm");
            if !endpoint.volatile {
                self.save_persistent_endpoints().await?;
            }
        }
        Ok(())
    }

    /// The endpoint for a specific swarm, if known.
    pub async fn endpoint(&self, swarm_name: &str) -> Option<SwarmEndpoint> {
        self.endpoints.read().await.get(swarm_name).cloned()
    }

    /// Resolve the auth token for a swarm, following `${ENV}` indirection.
    pub async fn resolved_auth_token(&self, swarm_name: &str) -> Option<String> {
        let endpoints = self.endpoints.read().await;
        let endpoint = endpoints.get(swarm_name)?;
        Self::resolve_token_ref(endpoint.auth_token_ref.as_deref())
    }

    /// All registered endpoints.
    pub async fn all_endpoints(&self) -> HashMap<String, SwarmEndpoint> {
        self.endpoints.read().await.clone()
    }

    /// All endpoints currently marked active.
    pub async fn active_endpoints(&self) -> HashMap<String, SwarmEndpoint> {
        self.endpoints
            .read()
            .await
            .iter()
            .filter(|(_, endpoint)| endpoint.is_active)
            .map(|(name, endpoint)| (name.clone(), endpoint.clone()))
            .collect()
    }

    /// All non-volatile endpoints.
    pub async fn persistent_endpoints(&self) -> HashMap<String, SwarmEndpoint> {
        self.endpoints
            .read()
            .await
            .iter()
            .filter(|(_, endpoint)| !endpoint.volatile)
            .map(|(name, endpoint)| (name.clone(), endpoint.clone()))
            .collect()
    }

    /// Write all non-volatile endpoints to the registry file.
    pub async fn save_persistent_endpoints(&self) -> Result<(), RegistryError> {
        let mut persistent = self.persistent_endpoints().await;
        // Tokens at rest are always env-var references.
        for endpoint in persistent.values_mut() {
            endpoint.auth_token_ref = endpoint
                .auth_token_ref
                .as_deref()
                .map(|token| Self::env_token_ref(&endpoint.swarm_name, token));
        }

        let snapshot = RegistrySnapshot {
            local_swarm_name: self.local_swarm_name.clone(),
            local_base_url: self.local_base_url.clone(),
            endpoints: persistent,
        };

        if let Some(parent) = self.persistence_file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(
            &self.persistence_file,
            serde_json::to_string_pretty(&snapshot)?,
        )?;

        info!(
            count = snapshot.endpoints.len(),
            file = %self.persistence_file.display(),
            "saved persistent endpoints"
        );
        Ok(())
    }

    /// Drop all volatile entries (at shutdown), then persist the rest.
    pub async fn cleanup_volatile_endpoints(&self) -> Result<(), RegistryError> {
        let removed = {
            let mut endpoints = self.endpoints.write().await;
            let volatile: Vec<String> = endpoints
                .iter()
                .filter(|(name, endpoint)| {
                    endpoint.volatile && **name != self.local_swarm_name
                })
                .map(|(name, _)| name.clone())
                .collect();
            for name in &volatile {
                endpoints.remove(name);
            }
            volatile.len()
        };
        info!(count = removed, "cleaned up volatile endpoints");
        self.save_persistent_endpoints().await
    }

    /// Rewrite in-memory raw tokens as env-var references, then persist.
    pub async fn migrate_auth_tokens_to_env_refs(&self) -> Result<(), RegistryError> {
        let mut migrated = 0;
        {
            let mut endpoints = self.endpoints.write().await;
            for (name, endpoint) in endpoints.iter_mut() {
                if *name == self.local_swarm_name {
                    continue;
                }
                if let Some(token) = endpoint.auth_token_ref.clone() {
                    if !token.starts_with("${") {
                        let reference = Self::env_token_ref(name, &token);
                        info!(swarm = %name, reference = %reference, "migrated auth token to env reference");
                        endpoint.auth_token_ref = Some(reference);
                        migrated += 1;
                    }
                }
            }
        }
        if migrated > 0 {
            self.save_persistent_endpoints().await?;
            info!(count = migrated, "migrated auth tokens to env references");
        } else {
            info!("no auth tokens to migrate");
        }
        Ok(())
    }

    /// Report which referenced env vars are currently set.
    pub async fn validate_environment_variables(&self) -> HashMap<String, bool> {
        let mut results = HashMap::new();
        for (name, endpoint) in self.endpoints.read().await.iter() {
            if *name == self.local_swarm_name {
                continue;
            }
            if let Some(token) = endpoint.auth_token_ref.as_deref() {
                if let Some(env_var) = token.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
                    let is_set = std::env::var(env_var).is_ok();
                    if !is_set {
                        warn!(env_var = %env_var, swarm = %name, "referenced environment variable is not set");
                    }
                    results.insert(env_var.to_string(), is_set);
                }
            }
        }
        results
    }

    /// Full diagnostic snapshot, all entries included.
    pub async fn to_snapshot(&self) -> RegistrySnapshot {
        let mut endpoints = self.all_endpoints().await;
        for endpoint in endpoints.values_mut() {
            endpoint.auth_token_ref = endpoint
                .auth_token_ref
                .as_deref()
                .map(|token| Self::env_token_ref(&endpoint.swarm_name, token));
        }
        RegistrySnapshot {
            local_swarm_name: self.local_swarm_name.clone(),
            local_base_url: self.local_base_url.clone(),
            endpoints,
        }
    }

    /// Replace the persistent endpoint template with the given snapshot.
    ///
    /// Existing non-volatile remotes are dropped; snapshot entries are
    /// registered as non-volatile. Volatile entries are untouched.
    pub async fn replace_persistent_endpoints(
        &self,
        snapshot: RegistrySnapshot,
    ) -> Result<(), RegistryError> {
        {
            let mut endpoints = self.endpoints.write().await;
            let persistent: Vec<String> = endpoints
                .iter()
                .filter(|(name, endpoint)| {
                    !endpoint.volatile && **name != self.local_swarm_name
                })
                .map(|(name, _)| name.clone())
                .collect();
            for name in persistent {
                endpoints.remove(&name);
            }

            for (name, mut endpoint) in snapshot.endpoints {
                if name == self.local_swarm_name {
                    continue;
                }
                endpoint.volatile = false;
                endpoint.auth_token_ref = endpoint
                    .auth_token_ref
                    .as_deref()
                    .map(|token| Self::env_token_ref(&name, token));
                endpoints.insert(name, endpoint);
            }
        }
        self.save_persistent_endpoints().await
    }

    /// Start the periodic health check loop. Idempotent.
    pub async fn start_health_checks(self: &Arc<Self>) {
        let mut slot = self.health_handle.lock().await;
        if slot.is_some() {
            return;
        }

        let registry = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        *slot = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEALTH_CHECK_INTERVAL);
            // Skip the immediate first tick.
            interval.tick().await;
            info!("started swarm health check loop");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        registry.perform_health_checks().await;
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            info!("stopped swarm health check loop");
        }));
    }

    /// Stop the health check loop and wait for it to exit.
    pub async fn stop_health_checks(&self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.health_handle.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// Probe every remote endpoint once and update liveness.
    pub async fn perform_health_checks(&self) {
        let targets: Vec<(String, String)> = self
            .endpoints
            .read()
            .await
            .iter()
            .filter(|(name, _)| **name != self.local_swarm_name)
            .map(|(name, endpoint)| (name.clone(), endpoint.health_check_url.clone()))
            .collect();

        for (swarm_name, health_url) in targets {
            let healthy = match self
                .http
                .get(&health_url)
                .timeout(HEALTH_CHECK_TIMEOUT)
                .send()
                .await
            {
                Ok(response) => response.status().is_success(),
                Err(error) => {
                    debug!(swarm = %swarm_name, %error, "health check request failed");
                    false
                }
            };

            let mut endpoints = self.endpoints.write().await;
            let Some(endpoint) = endpoints.get_mut(&swarm_name) else {
                continue;
            };
            if healthy {
                endpoint.last_seen = Some(Utc::now());
                if !endpoint.is_active {
                    endpoint.is_active = true;
                    info!(swarm = %swarm_name, "swarm is now active");
                }
            } else if endpoint.is_active {
                endpoint.is_active = false;
                warn!(swarm = %swarm_name, "swarm is now inactive");
            }
        }
    }

    /// Discover and register swarms from `{url}/swarms` listings.
    ///
    /// Discovered entries are registered volatile; self-entries are skipped.
    pub async fn discover_swarms(&self, discovery_urls: &[String]) {
        for url in discovery_urls {
            if let Err(error) = self.discover_from_endpoint(url).await {
                error!(url = %url, %error, "discovery failed");
            }
        }
    }

    async fn discover_from_endpoint(&self, url: &str) -> Result<(), RegistryError> {
        let response = self
            .http
            .get(format!("{url}/swarms"))
            .timeout(DISCOVERY_TIMEOUT)
            .send()
            .await
            .map_err(|error| RegistryError::Transport(error.to_string()))?;

        if !response.status().is_success() {
            warn!(url = %url, status = %response.status(), "discovery endpoint answered non-2xx");
            return Ok(());
        }

        let listing: DiscoveryResponse = response
            .json()
            .await
            .map_err(|error| RegistryError::Transport(error.to_string()))?;

        for swarm in listing.swarms {
            let (Some(name), Some(base_url)) = (swarm.name, swarm.base_url) else {
                continue;
            };
            if name == self.local_swarm_name {
                continue;
            }
            if let Err(error) = self
                .register_swarm(&name, &base_url, swarm.auth_token, swarm.metadata, true)
                .await
            {
                warn!(swarm = %name, %error, "failed to register discovered swarm");
            }
        }
        Ok(())
    }

    // ---- token reference helpers ----------------------------------------

    /// Convert a token to its env-var reference form.
    ///
    /// Already-referenced tokens pass through unchanged.
    fn env_token_ref(swarm_name: &str, auth_token: &str) -> String {
        if auth_token.starts_with("${") && auth_token.ends_with('}') {
            return auth_token.to_string();
        }
        let env_var = format!(
            "SWARM_AUTH_TOKEN_{}",
            swarm_name.to_uppercase().replace('-', "_")
        );
        info!(
            reference = %format!("${{{env_var}}}"),
            "converting auth token to environment variable reference; set '{env_var}' with the actual token value"
        );
        format!("${{{env_var}}}")
    }

    /// Follow `${ENV}` indirection; raw tokens are returned as-is.
    fn resolve_token_ref(auth_token_ref: Option<&str>) -> Option<String> {
        let token = auth_token_ref?;
        if let Some(env_var) = token.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
            match std::env::var(env_var) {
                Ok(resolved) => {
                    debug!(env_var = %env_var, "resolved auth token from environment");
                    Some(resolved)
                }
                Err(_) => {
                    warn!(env_var = %env_var, "environment variable not found for auth token reference");
                    None
                }
            }
        } else {
            Some(token.to_string())
        }
    }

    fn load_persistent_into(
        persistence_file: &Path,
        local_swarm_name: &str,
        endpoints: &mut HashMap<String, SwarmEndpoint>,
    ) {
        if !persistence_file.exists() {
            info!(file = %persistence_file.display(), "no registry persistence file found");
            return;
        }

        let snapshot: RegistrySnapshot = match std::fs::read_to_string(persistence_file)
            .map_err(RegistryError::Persistence)
            .and_then(|data| serde_json::from_str(&data).map_err(RegistryError::Serialization))
        {
            Ok(snapshot) => snapshot,
            Err(error) => {
                error!(%error, "failed to load persistent endpoints");
                return;
            }
        };

        let mut loaded = 0;
        for (name, endpoint) in snapshot.endpoints {
            if name != local_swarm_name && !endpoints.contains_key(&name) {
                endpoints.insert(name, endpoint);
                loaded += 1;
            }
        }
        info!(
            count = loaded,
            file = %persistence_file.display(),
            "loaded persistent endpoints"
        );
    }
}

impl std::fmt::Debug for SwarmRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwarmRegistry")
            .field("local_swarm_name", &self.local_swarm_name)
            .field("local_base_url", &self.local_base_url)
            .field("persistence_file", &self.persistence_file)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_tempfile() -> (SwarmRegistry, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("alpha.json");
        let registry = SwarmRegistry::new("alpha", "http://localhost:8000", Some(file));
        (registry, dir)
    }

    #[tokio::test]
    async fn test_local_swarm_auto_registered_non_volatile() {
        let (registry, _dir) = registry_with_tempfile();
        let endpoint = registry.endpoint("alpha").await.unwrap();
        assert!(!endpoint.volatile);
        assert!(endpoint.is_active);
        assert_eq!(endpoint.health_check_url, "http://localhost:8000/health");
    }

    #[tokio::test]
    async fn test_self_registration_rejected() {
        let (registry, _dir) = registry_with_tempfile();
        let err = registry
            .register_swarm("alpha", "http://elsewhere:8000", None, None, true)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::SelfRegistration(_)));
    }

    #[tokio::test]
    async fn test_persistent_token_stored_as_env_ref() {
        let (registry, _dir) = registry_with_tempfile();
        registry
            .register_swarm(
                "beta-swarm",
                "http://beta:8000",
                Some("raw-secret".into()),
                None,
                false,
            )
            .await
            .unwrap();

        let endpoint = registry.endpoint("beta-swarm").await.unwrap();
        assert_eq!(
            endpoint.auth_token_ref.as_deref(),
            Some("${SWARM_AUTH_TOKEN_BETA_SWARM}")
        );
        assert!(endpoint.has_env_token_ref());
    }

    #[tokio::test]
    async fn test_volatile_token_kept_raw_in_memory() {
        let (registry, _dir) = registry_with_tempfile();
        registry
            .register_swarm("beta", "http://beta:8000", Some("raw-secret".into()), None, true)
            .await
            .unwrap();

        let endpoint = registry.endpoint("beta").await.unwrap();
        assert_eq!(endpoint.auth_token_ref.as_deref(), Some("raw-secret"));
        assert_eq!(
            registry.resolved_auth_token("beta").await.as_deref(),
            Some("raw-secret")
        );
    }

    #[tokio::test]
    async fn test_resolved_auth_token_follows_env_ref() {
        let (registry, _dir) = registry_with_tempfile();
        registry
            .register_swarm("delta", "http://delta:8000", Some("ignored".into()), None, false)
            .await
            .unwrap();

        std::env::set_var("SWARM_AUTH_TOKEN_DELTA", "resolved-secret");
        assert_eq!(
            registry.resolved_auth_token("delta").await.as_deref(),
            Some("resolved-secret")
        );
        std::env::remove_var("SWARM_AUTH_TOKEN_DELTA");

        // Unset reference resolves to nothing.
        assert_eq!(registry.resolved_auth_token("delta").await, None);
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("alpha.json");

        {
            let registry =
                SwarmRegistry::new("alpha", "http://localhost:8000", Some(file.clone()));
            registry
                .register_swarm("beta", "http://beta:8000", Some("secret".into()), None, false)
                .await
                .unwrap();
            registry
                .register_swarm("gamma", "http://gamma:8000", None, None, true)
                .await
                .unwrap();
            registry.save_persistent_endpoints().await.unwrap();
        }

        let reloaded = SwarmRegistry::new("alpha", "http://localhost:8000", Some(file));
        let endpoints = reloaded.all_endpoints().await;
        // beta survived persistence; volatile gamma did not.
        assert!(endpoints.contains_key("beta"));
        assert!(!endpoints.contains_key("gamma"));
        assert_eq!(
            endpoints["beta"].auth_token_ref.as_deref(),
            Some("${SWARM_AUTH_TOKEN_BETA}")
        );
    }

    #[tokio::test]
    async fn test_cleanup_volatile_endpoints() {
        let (registry, _dir) = registry_with_tempfile();
        registry
            .register_swarm("beta", "http://beta:8000", None, None, true)
            .await
            .unwrap();
        registry
            .register_swarm("gamma", "http://gamma:8000", None, None, false)
            .await
            .unwrap();

        registry.cleanup_volatile_endpoints().await.unwrap();

        let endpoints = registry.all_endpoints().await;
        assert!(!endpoints.contains_key("beta"));
        assert!(endpoints.contains_key("gamma"));
        assert!(endpoints.contains_key("alpha"));
    }

    #[tokio::test]
    async fn test_validate_environment_variables() {
        let (registry, _dir) = registry_with_tempfile();
        registry
            .register_swarm(
                "epsilon",
                "http://epsilon:8000",
                Some("secret".into()),
                None,
                false,
            )
            .await
            .unwrap();

        std::env::remove_var("SWARM_AUTH_TOKEN_EPSILON");
        let report = registry.validate_environment_variables().await;
        assert_eq!(report.get("SWARM_AUTH_TOKEN_EPSILON"), Some(&false));

        std::env::set_var("SWARM_AUTH_TOKEN_EPSILON", "set");
        let report = registry.validate_environment_variables().await;
        assert_eq!(report.get("SWARM_AUTH_TOKEN_EPSILON"), Some(&true));
        std::env::remove_var("SWARM_AUTH_TOKEN_EPSILON");
    }

    #[tokio::test]
    async fn test_replace_persistent_endpoints() {
        let (registry, _dir) = registry_with_tempfile();
        registry
            .register_swarm("old", "http://old:8000", None, None, false)
            .await
            .unwrap();

        let mut endpoints = HashMap::new();
        endpoints.insert(
            "new".to_string(),
            SwarmEndpoint {
                swarm_name: "new".into(),
                base_url: "http://new:8000".into(),
                health_check_url: "http://new:8000/health".into(),
                auth_token_ref: None,
                last_seen: None,
                is_active: true,
                metadata: None,
                volatile: true,
            },
        );
        let snapshot = RegistrySnapshot {
            local_swarm_name: "alpha".into(),
            local_base_url: "http://localhost:8000".into(),
            endpoints,
        };

        registry.replace_persistent_endpoints(snapshot).await.unwrap();

        let endpoints = registry.all_endpoints().await;
        assert!(!endpoints.contains_key("old"));
        assert!(endpoints.contains_key("new"));
        assert!(!endpoints["new"].volatile);
    }
}
