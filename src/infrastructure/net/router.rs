//! Interswarm message routing over HTTP.
//!
//! Messages whose recipients live in another swarm are wrapped in the
//! [`InterswarmMessage`] envelope and POSTed to the target swarm's
//! `/interswarm/message` endpoint; everything local is handed to the
//! registered local delivery callback. Transport failures never escape as
//! errors: they become a synthesized `Router Error` response addressed back
//! to the original sender, preserving the rule that every request elicits a
//! response.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::errors::RouterError;
use crate::domain::models::{
    Address, DirectBody, MailMessage, MessageBody, MessageKind,
};
use crate::domain::ports::{InterswarmTransport, LocalDelivery};
use crate::infrastructure::net::registry::SwarmRegistry;
use crate::infrastructure::net::types::InterswarmMessage;

/// Remote POSTs share the task-wait budget.
const REMOTE_TIMEOUT: Duration = Duration::from_secs(3600);

/// Router for handling interswarm message routing via HTTP.
pub struct InterswarmRouter {
    registry: Arc<SwarmRegistry>,
    local_swarm_name: String,
    http: RwLock<Option<Client>>,
    local_handler: RwLock<Option<LocalDelivery>>,
}

impl InterswarmRouter {
    pub fn new(registry: Arc<SwarmRegistry>, local_swarm_name: impl Into<String>) -> Self {
        Self {
            registry,
            local_swarm_name: local_swarm_name.into(),
            http: RwLock::new(None),
            local_handler: RwLock::new(None),
        }
    }

    /// Handle an incoming interswarm wrapper from a remote swarm.
    ///
    /// Verifies the target swarm, reconstructs the inner message and hands
    /// it to the local delivery callback.
    pub async fn handle_incoming_interswarm_message(
        &self,
        wrapper: InterswarmMessage,
    ) -> Result<MailMessage, RouterError> {
        if wrapper.target_swarm != self.local_swarm_name {
            error!(
                target = %wrapper.target_swarm,
                local = %self.local_swarm_name,
                "interswarm message arrived at the wrong swarm"
            );
            return Err(RouterError::WrongTargetSwarm {
                target: wrapper.target_swarm,
                local: self.local_swarm_name.clone(),
            });
        }

        let source_swarm = wrapper.source_swarm.clone();
        let message = wrapper.unwrap_message();
        self.deliver_locally(message.clone()).await?;
        info!(source = %source_swarm, "handled incoming interswarm message");
        Ok(message)
    }

    /// Hand an asynchronous federated response to the local runtime.
    pub async fn handle_incoming_response(
        &self,
        response: MailMessage,
    ) -> Result<(), RouterError> {
        self.deliver_locally(response).await?;
        info!("handled incoming response from remote swarm");
        Ok(())
    }

    /// Fan a message out to every active remote swarm.
    ///
    /// Returns per-swarm success: `false` means the route collapsed into a
    /// Router-Error response.
    pub async fn broadcast_to_all_swarms(&self, message: &MailMessage) -> HashMap<String, bool> {
        let mut results = HashMap::new();
        for (swarm_name, _) in self.registry.active_endpoints().await {
            if swarm_name == self.local_swarm_name {
                continue;
            }
            let routed = self.route_to_remote(message.clone(), &swarm_name).await;
            let delivered =
                matches!(&routed, Ok(reply) if reply.message.subject() != "Router Error");
            results.insert(swarm_name, delivered);
        }
        results
    }

    /// Routing diagnostics.
    pub async fn routing_stats(&self) -> serde_json::Value {
        let all = self.registry.all_endpoints().await;
        let active = self.registry.active_endpoints().await;
        serde_json::json!({
            "local_swarm_name": self.local_swarm_name,
            "total_endpoints": all.len(),
            "active_endpoints": active.len(),
            "handler_registered": self.local_handler.read().await.is_some(),
        })
    }

    // ---- internals -------------------------------------------------------

    async fn deliver_locally(&self, message: MailMessage) -> Result<(), RouterError> {
        let handler = self.local_handler.read().await;
        let Some(handler) = handler.as_ref() else {
            warn!("no local message handler registered");
            return Err(RouterError::MissingLocalHandler);
        };
        handler(message).await;
        Ok(())
    }

    async fn route_to_local(&self, message: MailMessage) -> Result<MailMessage, RouterError> {
        self.deliver_locally(message.clone()).await?;
        Ok(message)
    }

    async fn route_to_remote(
        &self,
        mut message: MailMessage,
        swarm_name: &str,
    ) -> Result<MailMessage, RouterError> {
        let Some(client) = self.http.read().await.clone() else {
            return Err(RouterError::NotStarted);
        };

        let Some(endpoint) = self.registry.endpoint(swarm_name).await else {
            error!(swarm = %swarm_name, "unknown swarm endpoint");
            return Ok(self.router_error(
                &message,
                format!("unknown swarm endpoint: '{swarm_name}'"),
            ));
        };

        if !endpoint.is_active {
            warn!(swarm = %swarm_name, "swarm is not active");
            return Ok(self.router_error(&message, format!("swarm '{swarm_name}' is not active")));
        }

        // Qualify the sender with the full interswarm address.
        let sender_name = message.message.sender().name();
        message
            .message
            .set_sender(Address::agent_in(&sender_name, Some(&self.local_swarm_name)));

        let auth_token = self.registry.resolved_auth_token(swarm_name).await;
        let wrapper = InterswarmMessage::wrap(
            &message,
            &self.local_swarm_name,
            swarm_name,
            auth_token.clone(),
        );

        let url = format!("{}/interswarm/message", endpoint.base_url);
        let mut request = client
            .post(&url)
            .json(&wrapper)
            .timeout(REMOTE_TIMEOUT)
            .header(
                reqwest::header::USER_AGENT,
                format!("MAIL-Interswarm-Router/{}", self.local_swarm_name),
            );
        if let Some(token) = auth_token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<MailMessage>().await {
                    Ok(routed) => {
                        info!(swarm = %swarm_name, "successfully routed message to swarm");
                        Ok(routed)
                    }
                    Err(err) => {
                        error!(swarm = %swarm_name, %err, "remote swarm returned an unparsable response");
                        Ok(self.router_error(
                            &message,
                            format!("invalid response from swarm '{swarm_name}': '{err}'"),
                        ))
                    }
                }
            }
            Ok(response) => {
                let status = response.status().as_u16();
                error!(swarm = %swarm_name, status, "failed to route message to swarm");
                Ok(self.router_error(
                    &message,
                    format!(
                        "failed to route message to swarm '{swarm_name}' with status: '{status}'"
                    ),
                ))
            }
            Err(err) => {
                error!(swarm = %swarm_name, %err, "transport error routing to remote swarm");
                Ok(self.router_error(
                    &message,
                    format!("error routing to remote swarm '{swarm_name}': '{err}'"),
                ))
            }
        }
    }

    /// Copy a fan-out message down to its local recipients.
    fn local_copy(message: &MailMessage, local_agents: &[String]) -> MailMessage {
        let mut copy = message.clone();
        copy.id = Uuid::new_v4();
        copy.timestamp = Utc::now();
        match &mut copy.message {
            MessageBody::Broadcast(body) => {
                body.recipients = local_agents.iter().map(Address::agent).collect();
            }
            MessageBody::Interrupt(body) => {
                body.recipients = local_agents.iter().map(Address::agent).collect();
            }
            MessageBody::Direct(_) => {}
        }
        copy
    }

    /// Copy a message for one remote swarm, with fully-qualified addresses.
    fn remote_copy(
        &self,
        message: &MailMessage,
        remote_agents: &[String],
        swarm_name: &str,
    ) -> MailMessage {
        let mut copy = message.clone();
        copy.id = Uuid::new_v4();
        copy.timestamp = Utc::now();
        match &mut copy.message {
            MessageBody::Broadcast(body) => {
                body.recipients = remote_agents
                    .iter()
                    .map(|agent| Address::agent_in(agent, Some(swarm_name)))
                    .collect();
                body.recipient_swarms = Some(vec![swarm_name.to_string()]);
                body.sender_swarm = Some(self.local_swarm_name.clone());
            }
            MessageBody::Interrupt(body) => {
                body.recipients = remote_agents
                    .iter()
                    .map(|agent| Address::agent_in(agent, Some(swarm_name)))
                    .collect();
                body.recipient_swarms = Some(vec![swarm_name.to_string()]);
                body.sender_swarm = Some(self.local_swarm_name.clone());
            }
            MessageBody::Direct(body) => {
                if let Some(agent) = remote_agents.first() {
                    body.recipient = Address::agent_in(agent, Some(swarm_name));
                }
                body.recipient_swarm = Some(swarm_name.to_string());
                body.sender_swarm = Some(self.local_swarm_name.clone());
            }
        }
        copy
    }

    /// Synthesize a `Router Error` response addressed to the sender.
    fn router_error(&self, message: &MailMessage, reason: impl Into<String>) -> MailMessage {
        let request_id = match &message.message {
            MessageBody::Direct(body) => body.request_id,
            _ => Uuid::new_v4(),
        };
        MailMessage {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            message: MessageBody::Direct(DirectBody {
                task_id: message.task_id(),
                request_id,
                sender: Address::system(&self.local_swarm_name),
                recipient: message.message.sender().clone(),
                subject: "Router Error".to_string(),
                body: reason.into(),
                sender_swarm: Some(self.local_swarm_name.clone()),
                recipient_swarm: Some(self.local_swarm_name.clone()),
                routing_info: Some(serde_json::json!({})),
            }),
            msg_type: MessageKind::Response,
        }
    }
}

#[async_trait]
impl InterswarmTransport for InterswarmRouter {
    async fn start(&self) -> Result<(), RouterError> {
        let mut http = self.http.write().await;
        if http.is_none() {
            // One keep-alive client for the router's lifetime.
            *http = Some(Client::new());
        }
        info!(swarm = %self.local_swarm_name, "started interswarm router");
        Ok(())
    }

    async fn stop(&self) {
        self.http.write().await.take();
        info!(swarm = %self.local_swarm_name, "stopped interswarm router");
    }

    async fn is_running(&self) -> bool {
        self.http.read().await.is_some()
    }

    async fn register_local_handler(&self, handler: LocalDelivery) {
        *self.local_handler.write().await = Some(handler);
        info!("registered local message handler");
    }

    async fn route_message(&self, message: MailMessage) -> Result<MailMessage, RouterError> {
        match &message.message {
            MessageBody::Direct(body) => {
                let (_, recipient_swarm) = body.recipient.split();
                match recipient_swarm {
                    Some(swarm) if swarm != self.local_swarm_name => {
                        self.route_to_remote(message.clone(), &swarm).await
                    }
                    _ => self.route_to_local(message).await,
                }
            }
            MessageBody::Broadcast(_) | MessageBody::Interrupt(_) => {
                // Partition recipients into locals and per-remote-swarm groups.
                let mut local_agents: Vec<String> = Vec::new();
                let mut remote_routes: HashMap<String, Vec<String>> = HashMap::new();
                for recipient in message.message.recipients() {
                    let (agent, swarm) = recipient.split();
                    match swarm {
                        Some(swarm) if swarm != self.local_swarm_name => {
                            remote_routes.entry(swarm).or_default().push(agent);
                        }
                        _ => local_agents.push(agent),
                    }
                }

                let mut response = message.clone();
                if !local_agents.is_empty() {
                    let local_message = Self::local_copy(&message, &local_agents);
                    response = self.route_to_local(local_message).await?;
                }
                for (swarm_name, agents) in remote_routes {
                    let remote_message = self.remote_copy(&message, &agents, &swarm_name);
                    response = self.route_to_remote(remote_message, &swarm_name).await?;
                }
                Ok(response)
            }
        }
    }
}

impl std::fmt::Debug for InterswarmRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterswarmRouter")
            .field("local_swarm_name", &self.local_swarm_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn router_with_registry() -> (Arc<InterswarmRouter>, Arc<SwarmRegistry>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(SwarmRegistry::new(
            "alpha",
            "http://localhost:8000",
            Some(dir.path().join("alpha.json")),
        ));
        let router = Arc::new(InterswarmRouter::new(Arc::clone(&registry), "alpha"));
        (router, registry, dir)
    }

    fn capture_handler() -> (LocalDelivery, Arc<StdMutex<Vec<MailMessage>>>) {
        let captured = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&captured);
        let handler: LocalDelivery = Arc::new(move |message| {
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                sink.lock().unwrap().push(message);
            })
        });
        (handler, captured)
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let (router, _registry, _dir) = router_with_registry();
        assert!(!router.is_running().await);
        router.start().await.unwrap();
        assert!(router.is_running().await);
        router.stop().await;
        assert!(!router.is_running().await);
    }

    #[tokio::test]
    async fn test_local_direct_message_goes_to_handler() {
        let (router, _registry, _dir) = router_with_registry();
        let (handler, captured) = capture_handler();
        router.register_local_handler(handler).await;
        router.start().await.unwrap();

        let message = MailMessage::request(
            Uuid::new_v4(),
            Address::agent("supervisor"),
            Address::agent("analyst"),
            "s",
            "b",
        );
        let routed = router.route_message(message.clone()).await.unwrap();
        assert_eq!(routed.id, message.id);
        assert_eq!(captured.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_swarm_produces_router_error() {
        let (router, _registry, _dir) = router_with_registry();
        let (handler, _) = capture_handler();
        router.register_local_handler(handler).await;
        router.start().await.unwrap();

        let message = MailMessage::request(
            Uuid::new_v4(),
            Address::agent("supervisor"),
            Address::agent("analyst@nowhere"),
            "s",
            "b",
        );
        let routed = router.route_message(message.clone()).await.unwrap();
        assert_eq!(routed.kind(), MessageKind::Response);
        assert_eq!(routed.message.subject(), "Router Error");
        assert_eq!(routed.task_id(), message.task_id());
        // Addressed back to the original sender.
        assert_eq!(routed.message.recipients()[0].address, "supervisor");
    }

    #[tokio::test]
    async fn test_missing_handler_is_fatal_for_local_route() {
        let (router, _registry, _dir) = router_with_registry();
        router.start().await.unwrap();

        let message = MailMessage::request(
            Uuid::new_v4(),
            Address::agent("supervisor"),
            Address::agent("analyst"),
            "s",
            "b",
        );
        let err = router.route_message(message).await.unwrap_err();
        assert!(matches!(err, RouterError::MissingLocalHandler));
    }

    #[tokio::test]
    async fn test_broadcast_partition_keeps_remote_out_of_local_copy() {
        let (router, _registry, _dir) = router_with_registry();
        let (handler, captured) = capture_handler();
        router.register_local_handler(handler).await;
        router.start().await.unwrap();

        // One local and one remote recipient; the remote swarm is unknown,
        // so that leg collapses into a Router Error, but the local copy must
        // only carry the local agent.
        let message = MailMessage::broadcast(
            Uuid::new_v4(),
            Address::agent("supervisor"),
            vec![Address::agent("analyst"), Address::agent("math@beta")],
            "s",
            "b",
        );
        let _ = router.route_message(message).await.unwrap();

        let delivered = captured.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        let recipients = delivered[0].message.recipients();
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].address, "analyst");
    }

    #[tokio::test]
    async fn test_wrong_target_swarm_rejected() {
        let (router, _registry, _dir) = router_with_registry();
        let (handler, _) = capture_handler();
        router.register_local_handler(handler).await;

        let inner = MailMessage::request(
            Uuid::new_v4(),
            Address::agent("supervisor@beta"),
            Address::agent("analyst@alpha"),
            "s",
            "b",
        );
        let wrapper = InterswarmMessage::wrap(&inner, "beta", "gamma", None);
        let err = router
            .handle_incoming_interswarm_message(wrapper)
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::WrongTargetSwarm { .. }));
    }

    #[tokio::test]
    async fn test_incoming_wrapper_delivered_to_handler() {
        let (router, _registry, _dir) = router_with_registry();
        let (handler, captured) = capture_handler();
        router.register_local_handler(handler).await;

        let inner = MailMessage::request(
            Uuid::new_v4(),
            Address::agent("supervisor@beta"),
            Address::agent("analyst@alpha"),
            "s",
            "hello from beta",
        );
        let wrapper = InterswarmMessage::wrap(&inner, "beta", "alpha", None);
        let recovered = router
            .handle_incoming_interswarm_message(wrapper)
            .await
            .unwrap();

        assert_eq!(recovered.kind(), MessageKind::Request);
        assert_eq!(captured.lock().unwrap().len(), 1);
        assert_eq!(
            captured.lock().unwrap()[0].message.text(),
            "hello from beta"
        );
    }
}
