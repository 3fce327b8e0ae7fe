//! HTTP API gateway for MiniLuma.
//!
//! Exposes the assistant API (create an assistant, send messages, manage
//! generated files and memories), health checks, and the embedded chat UI.
//!
//! Built on Axum. Each assistant is one session guarded by its own mutex,
//! so turns of different assistants run concurrently while turns of the
//! same assistant are serialized.

pub mod api;
pub mod frontend;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{Router, response::Json, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use miniluma_agent::Assistant;
use miniluma_config::AppConfig;
use miniluma_core::assistant::AssistantStatus;
use miniluma_core::error::MemoryError;
use miniluma_core::event::{DomainEvent, EventBus};
use miniluma_core::memory::MemoryBackend;
use miniluma_core::tool::ToolRegistry;
use miniluma_providers::ProviderRouter;

/// Request bodies above this size are rejected.
const BODY_LIMIT: usize = 1024 * 1024;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub providers: Arc<ProviderRouter>,
    pub tools: Arc<ToolRegistry>,
    pub memory: Arc<dyn MemoryBackend>,
    pub event_bus: Arc<EventBus>,
    pub assistants: RwLock<HashMap<String, Arc<Mutex<Assistant>>>>,
    pub statuses: RwLock<HashMap<String, AssistantStatus>>,
    pub start_time: DateTime<Utc>,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(
        config: AppConfig,
        providers: Arc<ProviderRouter>,
        tools: Arc<ToolRegistry>,
        memory: Arc<dyn MemoryBackend>,
    ) -> Self {
        Self {
            config,
            providers,
            tools,
            memory,
            event_bus: Arc::new(EventBus::default()),
            assistants: RwLock::new(HashMap::new()),
            statuses: RwLock::new(HashMap::new()),
            start_time: Utc::now(),
        }
    }

    /// Live assistant by ID.
    pub async fn assistant(&self, id: &str) -> Option<Arc<Mutex<Assistant>>> {
        self.assistants.read().await.get(id).cloned()
    }

    pub async fn set_status(&self, status: AssistantStatus) {
        self.event_bus.publish(DomainEvent::StatusChanged {
            assistant_id: status.assistant_id.clone(),
            status: status.status,
            timestamp: Utc::now(),
        });
        self.statuses
            .write()
            .await
            .insert(status.assistant_id.clone(), status);
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Memory backend unavailable: {0}")]
    Memory(#[from] MemoryError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(std::io::Error),
}

/// Build the full router: assistant API, health checks and chat UI.
///
/// Layers applied:
/// - CORS (any origin when `gateway.cors_allow_any`, else same host only)
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api", get(api_info_handler))
        .with_state(state.start_time)
        .merge(api::api_router(state))
        .merge(frontend::frontend_router())
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    if config.gateway.cors_allow_any {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);
    match format!("http://localhost:{}", config.gateway.port).parse::<HeaderValue>() {
        Ok(origin) => base.allow_origin(origin),
        Err(_) => base,
    }
}

/// Start the gateway HTTP server.
///
/// Provider router, tool registry, memory backend and event bus are built
/// once and shared by every assistant.
pub async fn start(config: AppConfig) -> Result<(), GatewayError> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let providers = Arc::new(miniluma_providers::build_from_config(&config));
    let tools = Arc::new(miniluma_tools::registry_with_providers(&config.tools, providers.clone()));
    let memory = miniluma_memory::create_backend(&config.memory).await?;
    info!(
        default_provider = %providers.default_name(),
        providers = ?providers.list(),
        tools = tools.len(),
        memory = %memory.name(),
        "Gateway subsystems ready"
    );

    let state = Arc::new(GatewayState::new(config, providers, tools, memory));
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| GatewayError::Bind {
            addr: addr.clone(),
            source,
        })?;
    axum::serve(listener, app).await.map_err(GatewayError::Serve)?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
struct ApiInfoResponse {
    status: &'static str,
    name: &'static str,
    version: &'static str,
    started_at: String,
    timestamp: String,
}

async fn api_info_handler(
    axum::extract::State(start_time): axum::extract::State<DateTime<Utc>>,
) -> Json<ApiInfoResponse> {
    Json(ApiInfoResponse {
        status: "online",
        name: "MiniLuma API",
        version: env!("CARGO_PKG_VERSION"),
        started_at: start_time.to_rfc3339(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use miniluma_memory::InMemoryBackend;
    use std::path::Path;

    /// Gateway state backed by the mock provider and an in-memory store,
    /// with every directory under `root`.
    pub fn test_state(root: &Path) -> SharedState {
        let mut config = AppConfig::default();
        config.default_provider = "mock".into();
        config.files.results_dir = root.join("results").display().to_string();
        config.logging.conversation_log_dir = root.join("logs").display().to_string();
        config.tools.workspace_dir = root.join("workspace").display().to_string();
        config.agent.auto_save_files = false;

        let providers = Arc::new(miniluma_providers::build_from_config(&config));
        let tools = Arc::new(miniluma_tools::registry_with_providers(&config.tools, providers.clone()));
        let memory: Arc<dyn MemoryBackend> = Arc::new(InMemoryBackend::new());
        Arc::new(GatewayState::new(config, providers, tools, memory))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::test_state;
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path()));

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn api_info_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path()));

        let req = Request::builder().uri("/api").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "online");
        assert_eq!(json["name"], "MiniLuma API");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn index_is_served_from_root() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path()));

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("<!DOCTYPE html>"));
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path()));

        let message = "x".repeat(BODY_LIMIT + 16);
        let body = serde_json::json!({ "name": message }).to_string();
        let req = Request::builder()
            .method("POST")
            .uri("/assistants")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn cors_allows_any_origin_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path()));

        let req = Request::builder()
            .uri("/health")
            .header("origin", "http://example.com")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
    }
}
