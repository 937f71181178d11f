//! REST API Handlers
//!
//! Translates fleet HTTP requests into registry calls. Handlers hold no state
//! of their own; request validation and list filtering happen here, never in
//! the registry.

use super::server::ApiServerConfig;
use crate::registry::{Node, NodeRegistration, NodeRegistry};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Node registration payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub node_type: String,
    /// Display name, defaults to the node ID
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl RegisterRequest {
    fn into_registration(self) -> NodeRegistration {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.node_id.clone());

        let mut registration = NodeRegistration::new(self.node_id, self.node_type)
            .with_name(name)
            .with_capabilities(self.capabilities.unwrap_or_default());
        registration.location = self.location.filter(|l| !l.is_empty());
        registration.metadata = self.metadata.unwrap_or_default();
        registration
    }
}

/// Returned after a successful registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub node_id: String,
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Heartbeat ping. Only `node_id` affects the registry; the device telemetry
/// is logged and dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    #[serde(default)]
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_memory_kb: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensors_active: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<HashMap<String, String>>,
}

/// Heartbeat acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub node_id: String,
    pub received: DateTime<Utc>,
    /// When the coordinator expects the next heartbeat
    pub next_check_seconds: u64,
}

/// Node listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeListResponse {
    pub nodes: Vec<Node>,
    pub count: usize,
}

/// Optional list filters, both matched case-insensitively
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListNodesQuery {
    pub node_type: Option<String>,
    pub status: Option<String>,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
}

fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ApiErrorResponse {
            error: error.into(),
            message: message.into(),
        }),
    )
        .into_response()
}

/// Devices do not always send a JSON content type, so bodies are decoded by
/// hand rather than through the `Json` extractor.
fn decode_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, "Invalid JSON", e.to_string()))
}

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    registry: Arc<NodeRegistry>,
    config: ApiServerConfig,
}

impl RestRouter {
    /// Create a new REST router
    pub fn new(registry: Arc<NodeRegistry>, config: ApiServerConfig) -> Self {
        Self { registry, config }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            registry: self.registry,
            next_check_secs: self.config.heartbeat_interval_secs,
        };

        Router::new()
            .route("/api/v1/fleet/register", post(register_node))
            .route("/api/v1/fleet/heartbeat", post(heartbeat))
            .route("/api/v1/fleet/nodes", get(list_nodes))
            .route("/api/v1/fleet/nodes/", get(missing_node_id))
            .route("/api/v1/fleet/nodes/:node_id", get(get_node))
            .route("/health", get(health_check))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(self.config.request_timeout))
                    .layer(DefaultBodyLimit::max(self.config.max_body_size)),
            )
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    registry: Arc<NodeRegistry>,
    next_check_secs: u64,
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /api/v1/fleet/register
async fn register_node(
    State(state): State<AppState>,
    remote: Option<ConnectInfo<SocketAddr>>,
    body: Bytes,
) -> Response {
    let request: RegisterRequest = match decode_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    if request.node_id.is_empty() || request.node_type.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing required fields",
            "node_id and node_type are required",
        );
    }

    let remote_addr = remote.map(|ConnectInfo(addr)| addr);
    let node = state.registry.register(request.into_registration());
    info!(
        node_id = %node.id,
        node_type = %node.node_type,
        remote_addr = ?remote_addr,
        "node registered"
    );

    (
        StatusCode::OK,
        Json(RegisterResponse {
            node_id: node.id.to_string(),
            status: "registered".into(),
            message: "Node successfully registered".into(),
            timestamp: Utc::now(),
        }),
    )
        .into_response()
}

/// POST /api/v1/fleet/heartbeat
async fn heartbeat(State(state): State<AppState>, body: Bytes) -> Response {
    let request: HeartbeatRequest = match decode_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    if request.node_id.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Missing node_id", "node_id is required");
    }

    if !state.registry.refresh(&request.node_id) {
        warn!(node_id = %request.node_id, "heartbeat from unregistered node");
        return error_response(
            StatusCode::NOT_FOUND,
            "Node not found",
            "Node must register first",
        );
    }

    debug!(
        node_id = %request.node_id,
        uptime_seconds = ?request.uptime_seconds,
        free_memory_kb = ?request.free_memory_kb,
        sensors_active = ?request.sensors_active,
        reported_status = request.status.as_deref().unwrap_or(""),
        "heartbeat"
    );

    (
        StatusCode::OK,
        Json(HeartbeatResponse {
            node_id: request.node_id,
            received: Utc::now(),
            next_check_seconds: state.next_check_secs,
        }),
    )
        .into_response()
}

/// GET /api/v1/fleet/nodes
async fn list_nodes(
    State(state): State<AppState>,
    Query(query): Query<ListNodesQuery>,
) -> impl IntoResponse {
    let nodes = filter_nodes(state.registry.list(), &query);

    (
        StatusCode::OK,
        Json(NodeListResponse {
            count: nodes.len(),
            nodes,
        }),
    )
}

/// GET /api/v1/fleet/nodes/{node_id}
async fn get_node(State(state): State<AppState>, Path(node_id): Path<String>) -> Response {
    let node_id = node_id.trim();
    if node_id.is_empty() {
        return missing_node_id().await;
    }

    match state.registry.get(node_id) {
        Some(node) => (StatusCode::OK, Json(node)).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            "Node not found",
            format!("No node with ID {}", node_id),
        ),
    }
}

async fn missing_node_id() -> Response {
    error_response(
        StatusCode::BAD_REQUEST,
        "Missing node_id",
        "node_id must be provided in path",
    )
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Apply the optional type and status filters to a registry snapshot
fn filter_nodes(nodes: Vec<Node>, query: &ListNodesQuery) -> Vec<Node> {
    let node_type = query.node_type.as_deref().filter(|t| !t.is_empty());
    let status = query.status.as_deref().filter(|s| !s.is_empty());

    nodes
        .into_iter()
        .filter(|n| node_type.map_or(true, |t| n.node_type.eq_ignore_ascii_case(t)))
        .filter(|n| status.map_or(true, |s| n.status.as_str().eq_ignore_ascii_case(s)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::NodeStatus;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_router() -> (Router, Arc<NodeRegistry>) {
        let registry = NodeRegistry::new();
        let router = RestRouter::new(registry.clone(), ApiServerConfig::default()).build();
        (router, registry)
    }

    async fn send(router: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_register_handler() {
        let (router, registry) = test_router();

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/v1/fleet/register",
            r#"{"node_id":"test-node-1","node_type":"microclaw","capabilities":["dht22","mqtt"],"location":"greenhouse"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["node_id"], "test-node-1");
        assert_eq!(body["status"], "registered");

        let node = registry.get("test-node-1").unwrap();
        assert_eq!(node.name, "test-node-1");
        assert_eq!(node.node_type, "microclaw");
        assert_eq!(node.location.as_deref(), Some("greenhouse"));
        assert_eq!(node.capabilities.len(), 2);
    }

    #[tokio::test]
    async fn test_register_missing_fields() {
        let (router, registry) = test_router();

        let (status, body) = send(&router, Method::POST, "/api/v1/fleet/register", r#"{"node_id":"x"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required fields");

        let (status, _) = send(&router, Method::POST, "/api/v1/fleet/register", r#"{"node_type":"picclaw"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_register_invalid_json() {
        let (router, _) = test_router();

        let (status, body) = send(&router, Method::POST, "/api/v1/fleet/register", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid JSON");
    }

    #[tokio::test]
    async fn test_register_wrong_method() {
        let (router, _) = test_router();

        let (status, _) = send(&router, Method::GET, "/api/v1/fleet/register", "").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_heartbeat_handler() {
        let (router, registry) = test_router();
        registry.register(NodeRegistration::new("test-node-1", "microclaw"));

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/v1/fleet/heartbeat",
            r#"{"node_id":"test-node-1","uptime_seconds":3600,"free_memory_kb":512,"status":"online","metrics":{"temp":"21.5"}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["node_id"], "test-node-1");
        assert_eq!(body["next_check_seconds"], 60);
        assert_eq!(registry.stats().refreshes, 1);
    }

    #[tokio::test]
    async fn test_heartbeat_unknown_node() {
        let (router, registry) = test_router();

        let (status, body) = send(&router, Method::POST, "/api/v1/fleet/heartbeat", r#"{"node_id":"ghost"}"#).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Node must register first");
        assert!(registry.is_empty());

        let (status, _) = send(&router, Method::POST, "/api/v1/fleet/heartbeat", "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_nodes_with_filters() {
        let clock = Arc::new(crate::registry::ManualClock::default());
        let registry = NodeRegistry::with_clock(clock.clone());
        let router = RestRouter::new(registry.clone(), ApiServerConfig::default()).build();

        registry.register(NodeRegistration::new("a", "microclaw"));
        clock.advance(Duration::from_secs(300));
        registry.register(NodeRegistration::new("b", "microclaw"));
        registry.register(NodeRegistration::new("c", "picclaw"));
        registry.sweep_stale(Duration::from_secs(180));

        let (status, body) = send(&router, Method::GET, "/api/v1/fleet/nodes", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 3);

        let (_, body) = send(&router, Method::GET, "/api/v1/fleet/nodes?node_type=MicroClaw", "").await;
        assert_eq!(body["count"], 2);

        let (_, body) = send(&router, Method::GET, "/api/v1/fleet/nodes?node_type=microclaw&status=online", "").await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["nodes"][0]["id"], "b");

        let (_, body) = send(&router, Method::GET, "/api/v1/fleet/nodes?status=OFFLINE&node_type=", "").await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["nodes"][0]["id"], "a");
    }

    #[tokio::test]
    async fn test_get_node_handler() {
        let (router, registry) = test_router();
        registry.register(NodeRegistration::new("test-node-1", "microclaw").with_metadata("fw", "2.1"));

        let (status, body) = send(&router, Method::GET, "/api/v1/fleet/nodes/test-node-1", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "test-node-1");
        assert_eq!(body["status"], "online");
        assert_eq!(body["metadata"]["fw"], "2.1");

        let (status, body) = send(&router, Method::GET, "/api/v1/fleet/nodes/non-existent", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "No node with ID non-existent");

        let (status, _) = send(&router, Method::GET, "/api/v1/fleet/nodes/", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&router, Method::GET, "/api/v1/fleet/nodes/%20", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_check() {
        let (router, _) = test_router();
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[test]
    fn test_filter_nodes_reserved_status() {
        let registry = NodeRegistry::new();
        registry.register(NodeRegistration::new("a", "picclaw"));

        let query = ListNodesQuery {
            node_type: None,
            status: Some(NodeStatus::Degraded.to_string()),
        };
        assert!(filter_nodes(registry.list(), &query).is_empty());
    }
}
