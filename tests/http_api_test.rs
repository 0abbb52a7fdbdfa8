//! HTTP surface tests driven through the router with in-process requests.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use mail::adapters::agents::{scripted_core, ScriptedAgent};
use mail::adapters::http::{HttpServerConfig, MailHttpServer};
use mail::domain::ports::{ActionRegistry, AgentRoster, CallerRole, IdentityOracle};
use mail::infrastructure::auth::StaticIdentityOracle;
use mail::infrastructure::net::SwarmRegistry;
use mail::services::{SwarmSupervisor, SwarmTemplate};

struct TestServer {
    router: axum::Router,
    supervisor: Arc<SwarmSupervisor>,
    _dir: tempfile::TempDir,
}

fn test_server() -> TestServer {
    let supervisor_agent = Arc::new(ScriptedAgent::new("supervisor").with_fallback(
        ScriptedAgent::turn("task_complete", json!({"finish_message": "demo done"})),
    ));
    let mut agents = AgentRoster::new();
    agents.insert(
        "supervisor".into(),
        scripted_core(supervisor_agent, Vec::new(), true),
    );
    let template = SwarmTemplate::new("alpha", agents, ActionRegistry::new(), "supervisor");
    let supervisor = Arc::new(SwarmSupervisor::new(template, None));

    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(SwarmRegistry::new(
        "alpha",
        "http://localhost:8000",
        Some(dir.path().join("alpha.json")),
    ));

    let identity: Arc<dyn IdentityOracle> = Arc::new(
        StaticIdentityOracle::new()
            .with_identity("user-key", CallerRole::User, "1")
            .with_identity("admin-key", CallerRole::Admin, "1")
            .with_identity("agent-key", CallerRole::Agent, "beta"),
    );

    let server = MailHttpServer::new(
        HttpServerConfig {
            task_timeout: Duration::from_secs(10),
            ..HttpServerConfig::default()
        },
        Arc::clone(&supervisor),
        registry,
        identity,
    );

    TestServer {
        router: server.build_router(),
        supervisor,
        _dir: dir,
    }
}

async fn send(
    router: &axum::Router,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn test_root_reports_service_identity() {
    let server = test_server();
    let (status, body) = send(&server.router, "GET", "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "mail");
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_health_names_the_swarm() {
    let server = test_server();
    let (status, body) = send(&server.router, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["swarm_name"], "alpha");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_message_requires_bearer_auth() {
    let server = test_server();

    let (status, body) = send(
        &server.router,
        "POST",
        "/message",
        None,
        Some(json!({"message": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = send(
        &server.router,
        "POST",
        "/message",
        Some("bogus-key"),
        Some(json!({"message": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_message_round_trip_with_events() {
    let server = test_server();

    let (status, body) = send(
        &server.router,
        "POST",
        "/message",
        Some("user-key"),
        Some(json!({"message": "hello swarm", "show_events": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "demo done");
    assert!(body["events"].as_array().is_some_and(|events| !events.is_empty()));

    // The tenant runtime now exists and reports ready.
    let (_, status_body) = send(&server.router, "GET", "/status", Some("user-key"), None).await;
    assert_eq!(status_body["user_mail_ready"], true);
    assert_eq!(status_body["user_task_running"], true);
    assert_eq!(status_body["active_users"], 1);

    server.supervisor.shutdown_all().await;
}

#[tokio::test]
async fn test_agent_role_cannot_post_user_messages() {
    let server = test_server();
    let (status, _) = send(
        &server.router,
        "POST",
        "/message",
        Some("agent-key"),
        Some(json!({"message": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_swarm_registration_is_admin_only() {
    let server = test_server();
    let register = json!({"name": "beta", "base_url": "http://beta:8000"});

    let (status, _) = send(
        &server.router,
        "POST",
        "/swarms/register",
        Some("user-key"),
        Some(register.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &server.router,
        "POST",
        "/swarms/register",
        Some("admin-key"),
        Some(register),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "registered");
    assert_eq!(body["swarm_name"], "beta");

    // The new endpoint shows up in the public listing.
    let (_, listing) = send(&server.router, "GET", "/swarms", None, None).await;
    let names: Vec<&str> = listing["swarms"]
        .as_array()
        .unwrap()
        .iter()
        .map(|swarm| swarm["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"alpha"));
    assert!(names.contains(&"beta"));
}

#[tokio::test]
async fn test_swarms_dump_is_admin_only() {
    let server = test_server();

    let (status, _) = send(&server.router, "GET", "/swarms/dump", Some("user-key"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&server.router, "GET", "/swarms/dump", Some("admin-key"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["local_swarm_name"], "alpha");
}

#[tokio::test]
async fn test_interswarm_message_rejects_wrong_target() {
    let server = test_server();

    let inner = mail::domain::models::MailMessage::request(
        uuid::Uuid::new_v4(),
        mail::domain::models::Address::agent("supervisor@beta"),
        mail::domain::models::Address::agent("supervisor@gamma"),
        "s",
        "b",
    );
    let wrapper = mail::infrastructure::net::InterswarmMessage::wrap(&inner, "beta", "gamma", None);

    let (status, body) = send(
        &server.router,
        "POST",
        "/interswarm/message",
        Some("agent-key"),
        Some(serde_json::to_value(&wrapper).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("gamma"));
}

#[tokio::test]
async fn test_interswarm_message_produces_response_envelope() {
    let server = test_server();

    let inner = mail::domain::models::MailMessage::request(
        uuid::Uuid::new_v4(),
        mail::domain::models::Address::agent("supervisor@beta"),
        mail::domain::models::Address::agent("supervisor@alpha"),
        "Numbers",
        "what do you make of these?",
    );
    let wrapper = mail::infrastructure::net::InterswarmMessage::wrap(&inner, "beta", "alpha", None);

    let (status, body) = send(
        &server.router,
        "POST",
        "/interswarm/message",
        Some("agent-key"),
        Some(serde_json::to_value(&wrapper).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["msg_type"], "response");
    assert_eq!(body["message"]["body"], "demo done");
    assert_eq!(
        body["message"]["recipient"]["address"],
        "supervisor@beta"
    );
    assert_eq!(body["message"]["recipient_swarm"], "beta");

    server.supervisor.shutdown_all().await;
}
