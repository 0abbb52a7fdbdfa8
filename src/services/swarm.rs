//! Swarm facade and per-tenant runtime supervision.
//!
//! A [`Swarm`] wraps one runtime with the user-facing submit/await/stream
//! API; a [`SwarmSupervisor`] owns the template a server instantiates per
//! tenant, keyed by namespaced caller id, and tears everything down when the
//! server stops. Runtimes never live in process globals.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::Stream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::errors::RuntimeError;
use crate::domain::models::{Address, MailMessage, MessageBody, MessageKind, TaskEvent};
use crate::domain::ports::{ActionRegistry, AgentMemory, AgentRoster, InterswarmTransport};
use crate::services::runtime::{MailRuntime, RuntimeConfig};

/// Builds a fresh [`InterswarmTransport`] for each tenant runtime.
pub type RouterFactory = Arc<dyn Fn() -> Arc<dyn InterswarmTransport> + Send + Sync>;

/// Everything needed to instantiate per-tenant runtimes for one swarm.
#[derive(Clone)]
pub struct SwarmTemplate {
    /// The swarm name, also used as the local swarm name of every runtime.
    pub name: String,
    pub agents: AgentRoster,
    pub actions: ActionRegistry,
    /// Default agent user requests are routed to.
    pub entrypoint: String,
    pub memory: Option<Arc<dyn AgentMemory>>,
}

impl SwarmTemplate {
    pub fn new(
        name: impl Into<String>,
        agents: AgentRoster,
        actions: ActionRegistry,
        entrypoint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            agents,
            actions,
            entrypoint: entrypoint.into(),
            memory: None,
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn AgentMemory>) -> Self {
        self.memory = Some(memory);
        self
    }
}

/// User-facing facade over one tenant runtime.
#[derive(Clone)]
pub struct Swarm {
    runtime: Arc<MailRuntime>,
}

impl Swarm {
    pub fn attach(runtime: Arc<MailRuntime>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Arc<MailRuntime> {
        &self.runtime
    }

    /// Build the request envelope for a user-submitted message.
    fn build_request(&self, message: &str, entrypoint: Option<&str>) -> MailMessage {
        MailMessage::request(
            Uuid::new_v4(),
            Address::user(self.runtime.user_id()),
            Address::agent(entrypoint.unwrap_or_else(|| self.runtime.entrypoint())),
            "New Message",
            message,
        )
    }

    /// Submit a user message and wait for the terminal response body.
    ///
    /// Returns the response body together with the task id, so callers can
    /// look up the task's events afterwards.
    pub async fn post_message(
        &self,
        message: &str,
        entrypoint: Option<&str>,
        timeout: Duration,
    ) -> Result<(Uuid, String), RuntimeError> {
        let envelope = self.build_request(message, entrypoint);
        let task_id = envelope.task_id();
        let response = self.runtime.submit_and_wait(envelope, timeout).await?;
        Ok((task_id, response.message.text().to_string()))
    }

    /// Submit a user message and stream the task's telemetry.
    pub async fn post_message_stream(
        &self,
        message: &str,
        entrypoint: Option<&str>,
        timeout: Duration,
    ) -> Result<impl Stream<Item = TaskEvent> + Send + 'static, RuntimeError> {
        let envelope = self.build_request(message, entrypoint);
        self.runtime.submit_and_stream(envelope, timeout).await
    }

    /// Submit a caller-built envelope and wait for the terminal response.
    ///
    /// Request and response envelopes must carry exactly one recipient; the
    /// fan-out shapes are rejected for those kinds.
    pub async fn post_envelope(
        &self,
        envelope: MailMessage,
        timeout: Duration,
    ) -> Result<MailMessage, RuntimeError> {
        if matches!(
            envelope.kind(),
            MessageKind::Request | MessageKind::Response
        ) && !matches!(envelope.message, MessageBody::Direct(_))
        {
            return Err(RuntimeError::InvalidMessage(format!(
                "{} messages must have exactly one recipient",
                envelope.kind()
            )));
        }
        self.runtime.submit_and_wait(envelope, timeout).await
    }

    /// Events recorded for a task so far.
    pub fn events_for_task(&self, task_id: Uuid) -> Vec<TaskEvent> {
        self.runtime.events_for_task(task_id)
    }
}

struct TenantHandle {
    runtime: Arc<MailRuntime>,
    loop_task: JoinHandle<()>,
}

/// Owns per-tenant runtimes, keyed by namespaced caller id.
///
/// Tenancy is the disambiguator for task ids: pending futures live inside a
/// tenant's runtime, so identical task ids in different tenants never share
/// a future.
pub struct SwarmSupervisor {
    template: SwarmTemplate,
    router_factory: Option<RouterFactory>,
    tenants: Mutex<HashMap<String, TenantHandle>>,
}

impl SwarmSupervisor {
    pub fn new(template: SwarmTemplate, router_factory: Option<RouterFactory>) -> Self {
        Self {
            template,
            router_factory,
            tenants: Mutex::new(HashMap::new()),
        }
    }

    pub fn swarm_name(&self) -> &str {
        &self.template.name
    }

    pub fn entrypoint(&self) -> &str {
        &self.template.entrypoint
    }

    /// Get or create the runtime serving a tenant.
    ///
    /// New runtimes start in continuous mode immediately, with interswarm
    /// messaging wired up when a router factory is configured.
    pub async fn get_or_create(&self, tenant_id: &str) -> Arc<MailRuntime> {
        let mut tenants = self.tenants.lock().await;
        if let Some(handle) = tenants.get(tenant_id) {
            return Arc::clone(&handle.runtime);
        }

        info!(tenant = %tenant_id, swarm = %self.template.name, "creating runtime for tenant");

        let router = self.router_factory.as_ref().map(|factory| factory());

        let mut runtime = MailRuntime::new(
            self.template.agents.clone(),
            self.template.actions.clone(),
            RuntimeConfig::new(tenant_id, &self.template.name, &self.template.entrypoint),
        );
        if let Some(router) = &router {
            runtime = runtime.with_router(Arc::clone(router));
        }
        if let Some(memory) = &self.template.memory {
            runtime = runtime.with_memory(Arc::clone(memory));
        }
        let runtime = Arc::new(runtime);

        if let Some(router) = router {
            let delivery_target = Arc::clone(&runtime);
            router
                .register_local_handler(Arc::new(move |message| {
                    let runtime = Arc::clone(&delivery_target);
                    Box::pin(async move {
                        runtime.submit(message).await;
                    })
                }))
                .await;
            if let Err(error) = runtime.start_interswarm().await {
                error!(%error, tenant = %tenant_id, "failed to start interswarm messaging");
            }
        }

        let loop_task = tokio::spawn(Arc::clone(&runtime).run_continuous());
        tenants.insert(
            tenant_id.to_string(),
            TenantHandle {
                runtime: Arc::clone(&runtime),
                loop_task,
            },
        );

        info!(tenant = %tenant_id, "runtime created and started");
        runtime
    }

    /// Look up an existing tenant runtime without creating one.
    pub async fn get(&self, tenant_id: &str) -> Option<Arc<MailRuntime>> {
        let tenants = self.tenants.lock().await;
        tenants
            .get(tenant_id)
            .map(|handle| Arc::clone(&handle.runtime))
    }

    /// Per-tenant readiness: `(runtime exists, dispatcher loop alive)`.
    pub async fn tenant_status(&self, tenant_id: &str) -> (bool, bool) {
        let tenants = self.tenants.lock().await;
        match tenants.get(tenant_id) {
            Some(handle) => (true, !handle.loop_task.is_finished()),
            None => (false, false),
        }
    }

    /// Number of live tenant runtimes.
    pub async fn tenant_count(&self) -> usize {
        self.tenants.lock().await.len()
    }

    /// Find the runtime holding a pending future for this task, if any.
    ///
    /// Used to re-inject asynchronous federated responses into the right
    /// tenant.
    pub async fn find_runtime_with_pending(&self, task_id: Uuid) -> Option<Arc<MailRuntime>> {
        let tenants = self.tenants.lock().await;
        for handle in tenants.values() {
            if handle.runtime.has_pending(task_id).await {
                return Some(Arc::clone(&handle.runtime));
            }
        }
        None
    }

    /// Shut down every tenant runtime and cancel its dispatcher loop.
    pub async fn shutdown_all(&self) {
        let mut tenants = self.tenants.lock().await;
        for (tenant_id, handle) in tenants.drain() {
            info!(tenant = %tenant_id, "shutting down tenant runtime");
            handle.runtime.shutdown().await;
            if !handle.loop_task.is_finished() {
                warn!(tenant = %tenant_id, "cancelling dispatcher loop");
                handle.loop_task.abort();
            }
        }
    }
}
