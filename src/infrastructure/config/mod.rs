//! Server configuration loading.
//!
//! Hierarchical merge, lowest to highest precedence: programmatic defaults,
//! `mail.yaml` in the working directory, `MAIL_*` environment variables
//! (nested with `__`), then the well-known raw variables (`SWARM_NAME`,
//! `BASE_URL`, `SWARM_REGISTRY_FILE`, `AUTH_ENDPOINT`,
//! `TOKEN_INFO_ENDPOINT`).

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("swarm_name cannot be empty")]
    EmptySwarmName,

    #[error("base_url '{0}' must start with http:// or https://")]
    InvalidBaseUrl(String),

    #[error("swarm_registry_file cannot be empty")]
    EmptyRegistryFile,

    #[error("invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("task_timeout_secs cannot be 0")]
    ZeroTaskTimeout,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Whether to add a permissive CORS layer.
    pub enable_cors: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Full server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name of the local swarm.
    pub swarm_name: String,
    /// Externally reachable base URL of this server.
    pub base_url: String,
    /// Path of the registry persistence file.
    pub swarm_registry_file: String,
    /// Identity service login endpoint.
    #[serde(default)]
    pub auth_endpoint: Option<String>,
    /// Identity service token-info endpoint.
    #[serde(default)]
    pub token_info_endpoint: Option<String>,
    /// Default agent user requests are routed to.
    pub entrypoint: String,
    /// Whether federated messaging is enabled.
    pub enable_interswarm: bool,
    /// Default task wait in seconds.
    pub task_timeout_secs: u64,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            swarm_name: "example".to_string(),
            base_url: "http://localhost:8000".to_string(),
            swarm_registry_file: "registries/example.json".to_string(),
            auth_endpoint: None,
            token_info_endpoint: None,
            entrypoint: "supervisor".to_string(),
            enable_interswarm: true,
            task_timeout_secs: 3600,
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from defaults, `mail.yaml` and the environment.
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file("mail.yaml"))
            .merge(Env::prefixed("MAIL_").split("__"))
            .merge(Env::raw().only(&[
                "SWARM_NAME",
                "BASE_URL",
                "SWARM_REGISTRY_FILE",
                "AUTH_ENDPOINT",
                "TOKEN_INFO_ENDPOINT",
            ]))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, plus defaults.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.swarm_name.trim().is_empty() {
            return Err(ConfigError::EmptySwarmName);
        }

        if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidBaseUrl(config.base_url.clone()));
        }

        if config.swarm_registry_file.trim().is_empty() {
            return Err(ConfigError::EmptyRegistryFile);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.task_timeout_secs == 0 {
            return Err(ConfigError::ZeroTaskTimeout);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let config = Config {
            base_url: "localhost:8000".into(),
            ..Config::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let config = Config {
            logging: LoggingConfig {
                level: "verbose".into(),
                format: "pretty".into(),
            },
            ..Config::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_raw_env_overrides() {
        temp_env::with_vars(
            [
                ("SWARM_NAME", Some("alpha")),
                ("BASE_URL", Some("http://alpha:9000")),
                ("SWARM_REGISTRY_FILE", Some("registries/alpha.json")),
            ],
            || {
                let config = ConfigLoader::load().unwrap();
                assert_eq!(config.swarm_name, "alpha");
                assert_eq!(config.base_url, "http://alpha:9000");
                assert_eq!(config.swarm_registry_file, "registries/alpha.json");
            },
        );
    }
}
