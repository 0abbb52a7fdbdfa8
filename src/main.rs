//! MAIL server CLI entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use mail::adapters::agents::ScriptedAgent;
use mail::adapters::http::{HttpServerConfig, MailHttpServer};
use mail::domain::ports::{AgentCore, AgentRoster, CallerRole, IdentityOracle, InterswarmTransport};
use mail::infrastructure::config::{Config, ConfigLoader};
use mail::infrastructure::net::{InterswarmRouter, SwarmRegistry};
use mail::infrastructure::{RemoteIdentityOracle, StaticIdentityOracle};
use mail::services::{RouterFactory, SwarmSupervisor, SwarmTemplate};

#[derive(Parser)]
#[command(name = "mail", about = "MAIL multi-agent message bus server", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP federation server.
    Serve {
        /// Override the configured bind host.
        #[arg(long)]
        host: Option<String>,
        /// Override the configured port.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Report which referenced auth-token environment variables are unset.
    CheckEnv,
    /// Registry maintenance commands.
    #[command(subcommand)]
    Registry(RegistryCommands),
}

#[derive(Subcommand)]
enum RegistryCommands {
    /// Print the registry snapshot as JSON.
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::load().context("Failed to load configuration")?;
    let _log_guard = init_tracing(&config);

    match cli.command {
        Commands::Serve { host, port } => serve(config, host, port).await,
        Commands::CheckEnv => check_env(&config).await,
        Commands::Registry(RegistryCommands::Show) => show_registry(&config).await,
    }
}

fn build_registry(config: &Config) -> Arc<SwarmRegistry> {
    Arc::new(SwarmRegistry::new(
        &config.swarm_name,
        &config.base_url,
        Some(PathBuf::from(&config.swarm_registry_file)),
    ))
}

async fn serve(config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    let registry = build_registry(&config);
    registry.start_health_checks().await;

    let identity = build_identity_oracle(&config)?;
    let template = demo_template(&config);

    let router_factory: Option<RouterFactory> = config.enable_interswarm.then(|| {
        let registry = Arc::clone(&registry);
        let swarm_name = config.swarm_name.clone();
        let factory: RouterFactory = Arc::new(move || {
            Arc::new(InterswarmRouter::new(Arc::clone(&registry), &swarm_name))
                as Arc<dyn InterswarmTransport>
        });
        factory
    });

    let supervisor = Arc::new(SwarmSupervisor::new(template, router_factory));

    let http_config = HttpServerConfig {
        host: host.unwrap_or_else(|| config.http.host.clone()),
        port: port.unwrap_or(config.http.port),
        enable_cors: config.http.enable_cors,
        task_timeout: std::time::Duration::from_secs(config.task_timeout_secs),
    };

    info!(
        swarm = %config.swarm_name,
        base_url = %config.base_url,
        "starting MAIL server"
    );

    let server = MailHttpServer::new(http_config, supervisor, registry, identity);
    server
        .serve_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|error| anyhow::anyhow!("server error: {error}"))
}

async fn check_env(config: &Config) -> Result<()> {
    let registry = build_registry(config);
    let report = registry.validate_environment_variables().await;

    if report.is_empty() {
        println!("no auth-token environment references registered");
        return Ok(());
    }

    let mut missing = 0;
    for (env_var, is_set) in &report {
        println!("{env_var}: {}", if *is_set { "set" } else { "NOT SET" });
        if !is_set {
            missing += 1;
        }
    }
    if missing > 0 {
        bail!("{missing} referenced environment variable(s) are not set");
    }
    Ok(())
}

async fn show_registry(config: &Config) -> Result<()> {
    let registry = build_registry(config);
    let snapshot = registry.to_snapshot().await;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn build_identity_oracle(config: &Config) -> Result<Arc<dyn IdentityOracle>> {
    if let (Some(auth), Some(token_info)) = (&config.auth_endpoint, &config.token_info_endpoint) {
        return Ok(Arc::new(RemoteIdentityOracle::new(auth, token_info)));
    }

    if let Ok(dev_key) = std::env::var("MAIL_DEV_API_KEY") {
        warn!("AUTH_ENDPOINT not configured; accepting only MAIL_DEV_API_KEY as an admin key");
        return Ok(Arc::new(
            StaticIdentityOracle::new().with_identity(dev_key, CallerRole::Admin, "dev"),
        ));
    }

    bail!("AUTH_ENDPOINT and TOKEN_INFO_ENDPOINT must be configured (or set MAIL_DEV_API_KEY for local development)")
}

/// Demo swarm served by the standalone binary.
///
/// Real deployments embed the library and register their own LLM-backed
/// adapters; the demo supervisor simply completes every task so the full
/// submit/await/stream path can be exercised end to end.
fn demo_template(config: &Config) -> SwarmTemplate {
    let supervisor = Arc::new(
        ScriptedAgent::new(&config.entrypoint).with_fallback(ScriptedAgent::turn(
            "task_complete",
            serde_json::json!({
                "finish_message": "The demo supervisor received your message."
            }),
        )),
    );

    let mut agents = AgentRoster::new();
    agents.insert(
        config.entrypoint.clone(),
        AgentCore {
            adapter: supervisor,
            comm_targets: Vec::new(),
            enable_entrypoint: true,
            enable_interswarm: config.enable_interswarm,
            can_complete_tasks: true,
        },
    );

    SwarmTemplate::new(
        &config.swarm_name,
        agents,
        mail::domain::ports::ActionRegistry::new(),
        &config.entrypoint,
    )
}

/// Initialize tracing: env-filtered stderr output, JSON or pretty per the
/// config, plus a daily-rolling file when `MAIL_LOG_DIR` is set.
fn init_tracing(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));

    let (file_layer, guard) = match std::env::var("MAIL_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "mail.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    if config.logging.format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .init();
    }

    guard
}
