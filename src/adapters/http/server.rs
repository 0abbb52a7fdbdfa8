//! HTTP federation surface.
//!
//! Exposes the swarm to users (`/message`), admins (`/swarms/*`) and peer
//! swarms (`/interswarm/*`). Authentication is a bearer API key resolved
//! through the identity oracle; per-tenant runtimes are created lazily by
//! the supervisor on first use.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::models::{
    Address, DirectBody, MailMessage, MessageBody, MessageKind, RegistrySnapshot, SwarmSummary,
    TaskEvent,
};
use crate::domain::ports::{CallerIdentity, CallerRole, IdentityOracle};
use crate::infrastructure::net::types::InterswarmMessage;
use crate::infrastructure::net::SwarmRegistry;
use crate::services::{Swarm, SwarmSupervisor};

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Whether to enable CORS.
    pub enable_cors: bool,
    /// Default wait budget for `/message` and `/interswarm/message`.
    pub task_timeout: Duration,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
            task_timeout: Duration::from_secs(3600),
        }
    }
}

/// Shared state behind every handler.
pub struct AppState {
    pub supervisor: Arc<SwarmSupervisor>,
    pub registry: Arc<SwarmRegistry>,
    pub identity: Arc<dyn IdentityOracle>,
    pub task_timeout: Duration,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Handler error carrying its HTTP status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    code: &'static str,
}

impl ApiError {
    fn unauthorized(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            error: error.into(),
            code: "UNAUTHORIZED",
        }
    }

    fn bad_request(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
            code: "BAD_REQUEST",
        }
    }

    fn internal(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: error.into(),
            code: "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.error,
                code: self.code.to_string(),
            }),
        )
            .into_response()
    }
}

/// Request body for `POST /message`.
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub message: String,
    #[serde(default)]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub show_events: bool,
    #[serde(default)]
    pub stream: bool,
}

/// Response body for `POST /message`.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<TaskEvent>>,
}

/// Request body for `POST /swarms/register`.
#[derive(Debug, Deserialize)]
pub struct RegisterSwarmRequest {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_true")]
    pub volatile: bool,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

const fn default_true() -> bool {
    true
}

/// Request body for `POST /swarms/load`.
#[derive(Debug, Deserialize)]
pub struct LoadSwarmRequest {
    pub json: String,
}

/// Request body for `POST /interswarm/send`.
#[derive(Debug, Deserialize)]
pub struct InterswarmSendRequest {
    pub target_agent: String,
    pub message: String,
    #[serde(default)]
    pub user_token: Option<String>,
}

/// The MAIL HTTP server.
pub struct MailHttpServer {
    config: HttpServerConfig,
    state: Arc<AppState>,
}

impl MailHttpServer {
    pub fn new(
        config: HttpServerConfig,
        supervisor: Arc<SwarmSupervisor>,
        registry: Arc<SwarmRegistry>,
        identity: Arc<dyn IdentityOracle>,
    ) -> Self {
        let task_timeout = config.task_timeout;
        Self {
            config,
            state: Arc::new(AppState {
                supervisor,
                registry,
                identity,
                task_timeout,
            }),
        }
    }

    /// Build the router.
    pub fn build_router(&self) -> Router {
        let app = Router::new()
            .route("/", get(root))
            .route("/health", get(health))
            .route("/status", get(status))
            .route("/message", post(post_message))
            .route("/swarms", get(list_swarms))
            .route("/swarms/register", post(register_swarm))
            .route("/swarms/dump", get(dump_swarms))
            .route("/swarms/load", post(load_swarms))
            .route("/interswarm/message", post(receive_interswarm_message))
            .route("/interswarm/response", post(receive_interswarm_response))
            .route("/interswarm/send", post(send_interswarm_message))
            .with_state(Arc::clone(&self.state));

        if self.config.enable_cors {
            app.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .layer(TraceLayer::new_for_http())
        } else {
            app.layer(TraceLayer::new_for_http())
        }
    }

    /// Start the server and run until the process ends.
    pub async fn serve(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let router = self.build_router();

        info!("MAIL HTTP server listening on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;
        Ok(())
    }

    /// Start the server with a shutdown signal; tears down every tenant
    /// runtime and the registry once the signal fires.
    pub async fn serve_with_shutdown<F>(
        self,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let router = self.build_router();
        let state = Arc::clone(&self.state);

        info!("MAIL HTTP server listening on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("MAIL server shutting down");
        state.registry.stop_health_checks().await;
        if let Err(error) = state.registry.cleanup_volatile_endpoints().await {
            warn!(%error, "failed to clean up volatile endpoints");
        }
        state.supervisor.shutdown_all().await;
        Ok(())
    }
}

// ---- auth helpers --------------------------------------------------------

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<CallerIdentity, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::unauthorized("no API key provided"))?;
    let value = header
        .to_str()
        .map_err(|_| ApiError::unauthorized("invalid API key format"))?;
    let api_key = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("invalid API key format"))?;

    state
        .identity
        .authenticate(api_key)
        .await
        .map_err(|error| ApiError::unauthorized(error.to_string()))
}

fn require_role(identity: &CallerIdentity, allowed: &[CallerRole]) -> Result<(), ApiError> {
    if allowed.contains(&identity.role) {
        Ok(())
    } else {
        warn!(role = %identity.role, "invalid role for endpoint");
        Err(ApiError::unauthorized("invalid role"))
    }
}

// ---- handlers ------------------------------------------------------------

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "mail",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "swarm_name": state.supervisor.swarm_name(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    let (runtime_exists, loop_running) = match authenticate(&state, &headers).await {
        Ok(identity) => {
            state
                .supervisor
                .tenant_status(&identity.namespaced_id())
                .await
        }
        Err(_) => (false, false),
    };

    Json(serde_json::json!({
        "swarm": {
            "name": state.supervisor.swarm_name(),
            "status": "ready",
        },
        "active_users": state.supervisor.tenant_count().await,
        "user_mail_ready": runtime_exists,
        "user_task_running": loop_running,
    }))
}

async fn post_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<MessageRequest>,
) -> Result<Response, ApiError> {
    let identity = authenticate(&state, &headers).await?;
    require_role(&identity, &[CallerRole::User, CallerRole::Admin])?;

    if request.message.is_empty() {
        return Err(ApiError::bad_request("no message provided"));
    }

    let tenant_id = identity.namespaced_id();
    info!(tenant = %tenant_id, "message endpoint accessed");
    let runtime = state.supervisor.get_or_create(&tenant_id).await;
    let swarm = Swarm::attach(runtime);

    if request.stream {
        let stream = swarm
            .post_message_stream(
                &request.message,
                request.entrypoint.as_deref(),
                state.task_timeout,
            )
            .await
            .map_err(|error| ApiError::internal(error.to_string()))?;

        let sse_stream = stream.map(|event| {
            let name = event.event.to_string();
            let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
            Ok::<Event, Infallible>(Event::default().event(name).data(data))
        });

        return Ok(Sse::new(sse_stream)
            .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
            .into_response());
    }

    let (task_id, response) = swarm
        .post_message(
            &request.message,
            request.entrypoint.as_deref(),
            state.task_timeout,
        )
        .await
        .map_err(|error| ApiError::internal(format!("error processing message: {error}")))?;

    let events = request.show_events.then(|| swarm.events_for_task(task_id));
    Ok(Json(MessageResponse { response, events }).into_response())
}

async fn list_swarms(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let endpoints = state.registry.all_endpoints().await;
    let swarms: Vec<SwarmSummary> = endpoints.values().map(SwarmSummary::from).collect();
    Json(serde_json::json!({ "swarms": swarms }))
}

async fn register_swarm(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RegisterSwarmRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = authenticate(&state, &headers).await?;
    require_role(&identity, &[CallerRole::Admin])?;

    if request.name.is_empty() || request.base_url.is_empty() {
        return Err(ApiError::bad_request("name and base_url are required"));
    }

    state
        .registry
        .register_swarm(
            &request.name,
            &request.base_url,
            request.auth_token,
            request.metadata,
            request.volatile,
        )
        .await
        .map_err(|error| ApiError::internal(format!("error registering swarm: '{error}'")))?;

    Ok(Json(serde_json::json!({
        "status": "registered",
        "swarm_name": request.name,
    })))
}

async fn dump_swarms(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<RegistrySnapshot>, ApiError> {
    let identity = authenticate(&state, &headers).await?;
    require_role(&identity, &[CallerRole::Admin])?;

    Ok(Json(state.registry.to_snapshot().await))
}

async fn load_swarms(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<LoadSwarmRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = authenticate(&state, &headers).await?;
    require_role(&identity, &[CallerRole::Admin])?;

    let snapshot: RegistrySnapshot = serde_json::from_str(&request.json)
        .map_err(|error| ApiError::bad_request(format!("invalid swarm template: {error}")))?;

    state
        .registry
        .replace_persistent_endpoints(snapshot)
        .await
        .map_err(|error| ApiError::internal(format!("error loading swarm template: {error}")))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "swarm_name": state.supervisor.swarm_name(),
    })))
}

async fn receive_interswarm_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(wrapper): Json<InterswarmMessage>,
) -> Result<Json<MailMessage>, ApiError> {
    let identity = authenticate(&state, &headers).await?;
    require_role(&identity, &[CallerRole::Agent])?;

    if wrapper.target_swarm != state.supervisor.swarm_name() {
        return Err(ApiError::bad_request(format!(
            "message intended for '{}', but this swarm is '{}'",
            wrapper.target_swarm,
            state.supervisor.swarm_name()
        )));
    }

    let source_swarm = wrapper.source_swarm.clone();
    let source_agent = wrapper.payload.sender().clone();
    let message = wrapper.unwrap_message();
    info!(source = %source_swarm, subject = %message.message.subject(), "interswarm message received");

    let tenant_id = identity.namespaced_id();
    let runtime = state.supervisor.get_or_create(&tenant_id).await;

    let task_response = runtime
        .submit_and_wait(message, state.task_timeout)
        .await
        .map_err(|error| ApiError::internal(format!("error processing message: {error}")))?;

    let request_id = match &task_response.message {
        MessageBody::Direct(body) => body.request_id,
        _ => Uuid::new_v4(),
    };
    let response_message = MailMessage {
        id: Uuid::new_v4(),
        timestamp: Utc::now(),
        message: MessageBody::Direct(DirectBody {
            task_id: task_response.task_id(),
            request_id,
            sender: task_response.message.sender().clone(),
            recipient: source_agent,
            subject: task_response.message.subject().to_string(),
            body: task_response.message.text().to_string(),
            sender_swarm: Some(state.supervisor.swarm_name().to_string()),
            recipient_swarm: Some(source_swarm),
            routing_info: None,
        }),
        msg_type: MessageKind::Response,
    };

    Ok(Json(response_message))
}

async fn receive_interswarm_response(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(response): Json<MailMessage>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = authenticate(&state, &headers).await?;
    require_role(&identity, &[CallerRole::Agent])?;

    let task_id = response.task_id();
    info!(%task_id, sender = %response.message.sender().address, "interswarm response received");

    let Some(runtime) = state.supervisor.find_runtime_with_pending(task_id).await else {
        warn!(%task_id, "no runtime holds a pending future for this task");
        return Ok(Json(serde_json::json!({
            "status": "no_mail_instance",
            "task_id": task_id,
        })));
    };

    // Route the remote answer back to the local agent that asked for it so
    // it can fold the result into the task.
    let recipient_name = match &response.message {
        MessageBody::Direct(body) => body.recipient.name(),
        _ => runtime.entrypoint().to_string(),
    };
    let request_id = match &response.message {
        MessageBody::Direct(body) => body.request_id,
        _ => Uuid::new_v4(),
    };
    let sender = response.message.sender().clone();
    let forwarded = MailMessage {
        id: Uuid::new_v4(),
        timestamp: Utc::now(),
        message: MessageBody::Direct(DirectBody {
            task_id,
            request_id,
            sender: sender.clone(),
            recipient: Address::agent(recipient_name),
            subject: format!(
                "Response from {}: {}",
                sender.address,
                response.message.subject()
            ),
            body: response.message.text().to_string(),
            sender_swarm: response.message.sender_swarm().map(str::to_string),
            recipient_swarm: Some(state.supervisor.swarm_name().to_string()),
            routing_info: None,
        }),
        msg_type: MessageKind::Response,
    };

    runtime.handle_interswarm_response(forwarded).await;
    Ok(Json(serde_json::json!({
        "status": "response_processed",
        "task_id": task_id,
    })))
}

async fn send_interswarm_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<InterswarmSendRequest>,
) -> Result<Json<MailMessage>, ApiError> {
    let identity = authenticate(&state, &headers).await?;
    require_role(&identity, &[CallerRole::User, CallerRole::Admin])?;

    if request.target_agent.is_empty() || request.message.is_empty() {
        return Err(ApiError::bad_request("target_agent and message are required"));
    }
    let Some((_, target_swarm)) = request.target_agent.split_once('@') else {
        return Err(ApiError::bad_request(
            "target_agent must use the 'agent-name@swarm-name' format",
        ));
    };

    let tenant_id = request
        .user_token
        .clone()
        .unwrap_or_else(|| identity.namespaced_id());
    let runtime = state.supervisor.get_or_create(&tenant_id).await;

    let local_swarm = state.supervisor.swarm_name().to_string();
    let envelope = MailMessage {
        id: Uuid::new_v4(),
        timestamp: Utc::now(),
        message: MessageBody::Direct(DirectBody {
            task_id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            sender: Address::user(format!("{}@{}", identity.namespaced_id(), local_swarm)),
            recipient: Address::agent(&request.target_agent),
            subject: "Interswarm Message".to_string(),
            body: request.message,
            sender_swarm: Some(local_swarm),
            recipient_swarm: Some(target_swarm.to_string()),
            routing_info: None,
        }),
        msg_type: MessageKind::Request,
    };

    let routed = runtime
        .route_interswarm(envelope)
        .await
        .map_err(|error| ApiError::internal(format!("error sending interswarm message: '{error}'")))?;

    Ok(Json(routed))
}
