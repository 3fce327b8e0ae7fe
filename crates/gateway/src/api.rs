//! Assistant REST API.
//!
//! Endpoints:
//!
//! - `POST /assistants`: Create an assistant
//! - `GET  /assistants/{id}`: Assistant info
//! - `GET  /assistants/{id}/status`: Current status
//! - `POST /assistants/{id}/status`: Replace the status
//! - `POST /assistants/{id}/messages`: Run one turn
//! - `POST /assistants/{id}/messages/stream`: Run one turn, SSE events
//! - `POST /assistants/{id}/save-files`: Archive generated files
//! - `GET  /assistants/{id}/files`: Archived and pending files
//! - `GET  /assistants/{id}/download/{file_name}`: Download a file
//! - `GET  /assistants/{id}/conversation-history`: Message history
//! - `POST /assistants/{id}/restore-memory`: Restore from a memory
//! - `POST /assistants/{id}/end-session`: End and remove
//! - `GET  /tools`: List available tools
//! - `GET  /memories?q=&limit=`: Search stored memories

use axum::{
    Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::sse::{Event as SseEvent, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};

use miniluma_agent::{Assistant, ReactorEvent};
use miniluma_core::assistant::{AssistantInfo, AssistantMode, AssistantStatus};
use miniluma_core::memory::{MemoryEntry, MemoryQuery};
use miniluma_core::message::Message;

use crate::SharedState;

const PROCESSING: &str = "Processing your request";
const ANALYZING: &str = "Analyzing the request and preparing a response";
const DEFAULT_MEMORY_LIMIT: usize = 10;

// ── Router ────────────────────────────────────────────────────────────────

pub fn api_router(state: SharedState) -> Router {
    Router::new()
        .route("/assistants", post(create_assistant_handler))
        .route("/assistants/{id}", get(get_assistant_handler))
        .route(
            "/assistants/{id}/status",
            get(get_status_handler).post(update_status_handler),
        )
        .route("/assistants/{id}/messages", post(message_handler))
        .route("/assistants/{id}/messages/stream", post(message_stream_handler))
        .route("/assistants/{id}/save-files", post(save_files_handler))
        .route("/assistants/{id}/files", get(list_files_handler))
        .route("/assistants/{id}/download/{file_name}", get(download_handler))
        .route(
            "/assistants/{id}/conversation-history",
            get(conversation_history_handler),
        )
        .route("/assistants/{id}/restore-memory", post(restore_memory_handler))
        .route("/assistants/{id}/end-session", post(end_session_handler))
        .route("/tools", get(list_tools_handler))
        .route("/memories", get(memories_handler))
        .with_state(state)
}

// ── Errors ────────────────────────────────────────────────────────────────

/// Error returned by API handlers, rendered as `{"detail": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Assistant not found")]
    AssistantNotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::AssistantNotFound | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorResponse {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

async fn find_assistant(state: &SharedState, id: &str) -> Result<Arc<Mutex<Assistant>>, ApiError> {
    state.assistant(id).await.ok_or(ApiError::AssistantNotFound)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Deserialize)]
struct CreateAssistantRequest {
    #[serde(default = "default_assistant_name")]
    name: String,
    #[serde(default = "default_mode")]
    assistant_mode: String,
    #[serde(default)]
    provider_name: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    conversation_id: Option<String>,
}

fn default_assistant_name() -> String {
    "MiniLuma".into()
}

fn default_mode() -> String {
    "mcp".into()
}

#[derive(Deserialize)]
struct MessageRequest {
    message: String,
    #[serde(default = "default_true")]
    add_to_memory: bool,
    #[serde(default)]
    memory_metadata: Option<Map<String, Value>>,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, Deserialize)]
struct MessageResponse {
    assistant_id: String,
    conversation_id: String,
    message: String,
    saved_files: Vec<String>,
}

#[derive(Deserialize)]
struct SaveFilesRequest {
    #[serde(default)]
    file_path: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct ActionResponse {
    assistant_id: String,
    message: String,
    timestamp: String,
}

#[derive(Serialize, Deserialize)]
struct FilesResponse {
    assistant_id: String,
    files: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct HistoryResponse<'a> {
    assistant_id: String,
    conversation_id: String,
    history: &'a [Message],
}

#[derive(Deserialize)]
struct RestoreMemoryRequest {
    memory_id: String,
}

#[derive(Serialize, Deserialize)]
struct RestoreMemoryResponse {
    assistant_id: String,
    message: String,
    memory_id: String,
    timestamp: String,
}

#[derive(Serialize, Deserialize)]
struct EndSessionResponse {
    success: bool,
    message: String,
    details: String,
    timestamp: String,
}

#[derive(Serialize, Deserialize)]
struct ToolListResponse {
    tools: Vec<ToolDto>,
    count: usize,
}

#[derive(Serialize, Deserialize)]
struct ToolDto {
    name: String,
    description: String,
}

#[derive(Deserialize)]
struct MemoryParams {
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Serialize, Deserialize)]
struct MemoryListResponse {
    memories: Vec<MemoryEntry>,
    count: usize,
}

// ── Assistant lifecycle ───────────────────────────────────────────────────

async fn create_assistant_handler(
    State(state): State<SharedState>,
    Json(payload): Json<CreateAssistantRequest>,
) -> ApiResult<AssistantInfo> {
    let mode = AssistantMode::parse_lossy(&payload.assistant_mode);
    let (provider_name, provider) = state
        .providers
        .resolve(payload.provider_name.as_deref())
        .map_err(|e| ApiError::BadRequest(format!("Failed to create assistant: {e}")))?;

    let mut assistant = Assistant::new(
        &state.config,
        provider_name,
        provider,
        state.tools.clone(),
        state.memory.clone(),
    )
    .with_name(payload.name)
    .with_event_bus(state.event_bus.clone());
    if let Some(model) = payload.model.filter(|m| !m.is_empty()) {
        assistant = assistant.with_model(model);
    }
    if let Some(prompt) = payload.system_prompt.filter(|p| !p.is_empty()) {
        assistant = assistant.with_system_prompt(prompt);
    }

    if let Some(memory_id) = payload.conversation_id.filter(|c| !c.is_empty()) {
        match assistant.restore_from_memory(&memory_id).await {
            Ok(reply) => info!(memory_id = %memory_id, reply = %reply, "Restore on create"),
            Err(e) => warn!(memory_id = %memory_id, error = %e, "Failed to restore conversation"),
        }
    }

    let info = assistant.info();
    let id = info.assistant_id.clone();
    state
        .assistants
        .write()
        .await
        .insert(id.clone(), Arc::new(Mutex::new(assistant)));
    state
        .set_status(AssistantStatus::idle(&id).with_details(format!("mode: {}", mode.as_str())))
        .await;

    info!(
        assistant_id = %id,
        provider = %info.provider,
        model = %info.model,
        mode = mode.as_str(),
        "Assistant created"
    );
    Ok(Json(info))
}

async fn get_assistant_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<AssistantInfo> {
    let assistant = find_assistant(&state, &id).await?;
    let info = assistant.lock().await.info();
    Ok(Json(info))
}

async fn get_status_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<AssistantStatus> {
    find_assistant(&state, &id).await?;
    let status = state
        .statuses
        .read()
        .await
        .get(&id)
        .cloned()
        .unwrap_or_else(|| AssistantStatus::idle(&id));
    Ok(Json(status))
}

async fn update_status_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(mut status): Json<AssistantStatus>,
) -> ApiResult<AssistantStatus> {
    find_assistant(&state, &id).await?;
    status.assistant_id = id;
    status.touch();
    state.set_status(status.clone()).await;
    Ok(Json(status))
}

async fn end_session_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<EndSessionResponse> {
    let assistant = state
        .assistants
        .write()
        .await
        .remove(&id)
        .ok_or(ApiError::AssistantNotFound)?;
    state.statuses.write().await.remove(&id);

    let details = assistant.lock().await.end_session().await;
    info!(assistant_id = %id, "Assistant removed");

    Ok(Json(EndSessionResponse {
        success: true,
        message: "Session ended".into(),
        details,
        timestamp: Utc::now().to_rfc3339(),
    }))
}

// ── Messages ──────────────────────────────────────────────────────────────

async fn message_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<MessageRequest>,
) -> ApiResult<MessageResponse> {
    let assistant = find_assistant(&state, &id).await?;
    info!(assistant_id = %id, message_len = payload.message.len(), "Message received");

    state
        .set_status(AssistantStatus::thinking(&id, PROCESSING).with_details(ANALYZING))
        .await;

    let mut assistant = assistant.lock().await;
    let result = assistant
        .process(&payload.message, payload.add_to_memory, payload.memory_metadata)
        .await;

    match result {
        Ok(message) => {
            state.set_status(AssistantStatus::idle(&id)).await;
            let saved_files = assistant
                .files()
                .into_values()
                .filter(|saved| saved != "pending")
                .collect();
            Ok(Json(MessageResponse {
                assistant_id: id,
                conversation_id: assistant.conversation_id().to_string(),
                message,
                saved_files,
            }))
        }
        Err(e) => {
            error!(assistant_id = %id, error = %e, "Message processing failed");
            state.set_status(AssistantStatus::error(&id, e.to_string())).await;
            Err(ApiError::Internal(format!("Failed to process message: {e}")))
        }
    }
}

/// Run one turn and stream its [`ReactorEvent`]s as server-sent events.
///
/// The turn runs in its own task, so it completes even if the client
/// disconnects mid-stream.
async fn message_stream_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<MessageRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let assistant = find_assistant(&state, &id).await?;
    info!(assistant_id = %id, message_len = payload.message.len(), "Streaming message received");

    state
        .set_status(AssistantStatus::thinking(&id, PROCESSING).with_details(ANALYZING))
        .await;

    let (tx, rx) = mpsc::channel::<ReactorEvent>(64);
    tokio::spawn(async move {
        let mut assistant = assistant.lock().await;
        let result = assistant
            .process_streaming(
                &payload.message,
                payload.add_to_memory,
                payload.memory_metadata,
                &tx,
            )
            .await;
        match result {
            Ok(_) => state.set_status(AssistantStatus::idle(&id)).await,
            Err(e) => {
                error!(assistant_id = %id, error = %e, "Streaming turn failed");
                let _ = tx
                    .send(ReactorEvent::Error {
                        message: format!("Failed to process message: {e}"),
                    })
                    .await;
                state.set_status(AssistantStatus::error(&id, e.to_string())).await;
            }
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event.event_type()).data(data))
    });

    Ok(Sse::new(stream))
}

async fn conversation_history_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let assistant = find_assistant(&state, &id).await?;
    let assistant = assistant.lock().await;
    let body = HistoryResponse {
        assistant_id: id,
        conversation_id: assistant.conversation_id().to_string(),
        history: assistant.history(),
    };
    Ok(Json(body).into_response())
}

async fn restore_memory_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<RestoreMemoryRequest>,
) -> ApiResult<RestoreMemoryResponse> {
    let assistant = find_assistant(&state, &id).await?;
    let message = assistant
        .lock()
        .await
        .restore_from_memory(&payload.memory_id)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to restore memory: {e}")))?;

    Ok(Json(RestoreMemoryResponse {
        assistant_id: id,
        message,
        memory_id: payload.memory_id,
        timestamp: Utc::now().to_rfc3339(),
    }))
}

// ── Files ─────────────────────────────────────────────────────────────────

async fn save_files_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    payload: Option<Json<SaveFilesRequest>>,
) -> ApiResult<ActionResponse> {
    let assistant = find_assistant(&state, &id).await?;
    let file_path = payload.and_then(|Json(p)| p.file_path);

    let mut session = assistant.lock().await;
    if let Some(target) = file_path.as_deref() {
        session.resolve_save_target(target).map_err(|violation| {
            warn!(assistant_id = %id, target = %target, %violation, "Save request refused");
            ApiError::BadRequest(format!("Cannot save '{target}': {violation}"))
        })?;
    }
    let (message, saved) = session.archive_generated_files(file_path.as_deref()).await;
    drop(session);
    info!(assistant_id = %id, saved = saved.len(), "Save files request handled");

    Ok(Json(ActionResponse {
        assistant_id: id,
        message,
        timestamp: Utc::now().to_rfc3339(),
    }))
}

async fn list_files_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<FilesResponse> {
    let assistant = find_assistant(&state, &id).await?;
    let files = assistant.lock().await.files();
    Ok(Json(FilesResponse {
        assistant_id: id,
        files,
    }))
}

/// An archived file, or a pending one that still sits in the workspace.
fn locate_file(assistant: &Assistant, name: &str) -> Option<PathBuf> {
    assistant.find_saved_file(name).or_else(|| {
        let wanted = std::path::Path::new(name).file_name()?.to_owned();
        assistant
            .files()
            .into_keys()
            .map(PathBuf::from)
            .find(|path| path.file_name() == Some(wanted.as_os_str()) && path.is_file())
    })
}

async fn download_handler(
    State(state): State<SharedState>,
    Path((id, file_name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let assistant = find_assistant(&state, &id).await?;
    let path = locate_file(&*assistant.lock().await, &file_name)
        .ok_or_else(|| ApiError::NotFound(format!("File not found: {file_name}")))?;

    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        warn!(path = %path.display(), error = %e, "Download failed");
        ApiError::NotFound(format!("File not found: {file_name}"))
    })?;

    let download_name = path
        .file_name()
        .map(|n| n.to_string_lossy().replace('"', "_"))
        .unwrap_or(file_name);
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{download_name}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

// ── Tools & memories ──────────────────────────────────────────────────────

async fn list_tools_handler(State(state): State<SharedState>) -> Json<ToolListResponse> {
    let tools: Vec<ToolDto> = state
        .tools
        .definitions()
        .into_iter()
        .map(|d| ToolDto {
            name: d.name,
            description: d.description,
        })
        .collect();
    let count = tools.len();

    Json(ToolListResponse { tools, count })
}

async fn memories_handler(
    State(state): State<SharedState>,
    Query(params): Query<MemoryParams>,
) -> ApiResult<MemoryListResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_MEMORY_LIMIT);
    let query = params.q.unwrap_or_default();

    let result = if query.trim().is_empty() {
        state.memory.recent(limit).await
    } else {
        state
            .memory
            .search(MemoryQuery::new(query.trim()).with_limit(limit))
            .await
    };
    let memories = result.map_err(|e| ApiError::Internal(format!("Failed to read memories: {e}")))?;
    let count = memories.len();

    Ok(Json(MemoryListResponse { memories, count }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn send_json(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, bytes) = send(app, method, uri, body).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn create(app: &Router) -> String {
        let (status, json) = send_json(app, "POST", "/assistants", Some(serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        json["assistant_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn create_and_get_assistant() {
        let dir = tempfile::tempdir().unwrap();
        let app = api_router(test_state(dir.path()));

        let (status, json) = send_json(
            &app,
            "POST",
            "/assistants",
            Some(serde_json::json!({ "name": "Helper", "model": "custom-model" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["name"], "Helper");
        assert_eq!(json["provider"], "mock");
        assert_eq!(json["model"], "custom-model");
        let id = json["assistant_id"].as_str().unwrap();

        let (status, info) = send_json(&app, "GET", &format!("/assistants/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(info["conversation_id"], json["conversation_id"]);

        let (status, status_json) = send_json(&app, "GET", &format!("/assistants/{id}/status"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(status_json["status"], "idle");
        assert_eq!(status_json["operation_details"], "mode: mcp");
    }

    #[tokio::test]
    async fn unknown_provider_is_a_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = api_router(test_state(dir.path()));

        let (status, json) = send_json(
            &app,
            "POST",
            "/assistants",
            Some(serde_json::json!({ "provider_name": "nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["detail"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn unknown_assistant_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = api_router(test_state(dir.path()));

        for (method, uri) in [
            ("GET", "/assistants/missing"),
            ("GET", "/assistants/missing/status"),
            ("GET", "/assistants/missing/files"),
            ("POST", "/assistants/missing/end-session"),
        ] {
            let (status, json) = send_json(&app, method, uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
            assert_eq!(json["detail"], "Assistant not found");
        }
    }

    #[tokio::test]
    async fn status_can_be_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let app = api_router(test_state(dir.path()));
        let id = create(&app).await;

        let (status, json) = send_json(
            &app,
            "POST",
            &format!("/assistants/{id}/status"),
            Some(serde_json::json!({
                "assistant_id": "ignored",
                "status": "processing",
                "current_operation": "Writing files",
                "progress": 50.0,
                "timestamp": "2000-01-01T00:00:00Z"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["assistant_id"], id.as_str());
        assert_ne!(json["timestamp"], "2000-01-01T00:00:00Z");

        let (_, stored) = send_json(&app, "GET", &format!("/assistants/{id}/status"), None).await;
        assert_eq!(stored["status"], "processing");
        assert_eq!(stored["current_operation"], "Writing files");
    }

    #[tokio::test]
    async fn message_round_trip_updates_history_and_memory() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let app = api_router(state.clone());
        let id = create(&app).await;

        let (status, json) = send_json(
            &app,
            "POST",
            &format!("/assistants/{id}/messages"),
            Some(serde_json::json!({ "message": "hello gateway" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["assistant_id"], id.as_str());
        assert!(json["message"].as_str().unwrap().contains("hello gateway"));
        assert!(json["saved_files"].as_array().unwrap().is_empty());

        let (_, status_json) = send_json(&app, "GET", &format!("/assistants/{id}/status"), None).await;
        assert_eq!(status_json["status"], "idle");

        let (status, history) =
            send_json(&app, "GET", &format!("/assistants/{id}/conversation-history"), None).await;
        assert_eq!(status, StatusCode::OK);
        let messages = history["history"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["role"], "assistant");

        assert_eq!(state.memory.count().await.unwrap(), 1);
        let (status, memories) = send_json(&app, "GET", "/memories?q=gateway&limit=5", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(memories["count"], 1);
    }

    #[tokio::test]
    async fn message_without_memory() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let app = api_router(state.clone());
        let id = create(&app).await;

        let (status, _) = send_json(
            &app,
            "POST",
            &format!("/assistants/{id}/messages"),
            Some(serde_json::json!({ "message": "keep this private", "add_to_memory": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.memory.count().await.unwrap(), 0);

        let (_, memories) = send_json(&app, "GET", "/memories", None).await;
        assert_eq!(memories["count"], 0);
    }

    #[tokio::test]
    async fn stream_emits_response_then_done() {
        let dir = tempfile::tempdir().unwrap();
        let app = api_router(test_state(dir.path()));
        let id = create(&app).await;

        let req = Request::builder()
            .method("POST")
            .uri(format!("/assistants/{id}/messages/stream"))
            .header("content-type", "application/json")
            .body(Body::from(serde_json::json!({ "message": "stream please" }).to_string()))
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        assert!(content_type.contains("text/event-stream"), "got '{content_type}'");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8_lossy(&body);
        let response_at = text.find("event: response").expect("response event");
        let done_at = text.find("event: done").expect("done event");
        assert!(response_at < done_at);
        assert!(text.contains("stream please"));
    }

    #[tokio::test]
    async fn save_list_and_download_files() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let app = api_router(state.clone());
        let id = create(&app).await;

        let workspace = dir.path().join("workspace");
        std::fs::create_dir_all(&workspace).unwrap();
        std::fs::write(workspace.join("page.html"), "<h1>hi</h1>").unwrap();

        let (status, json) = send_json(
            &app,
            "POST",
            &format!("/assistants/{id}/save-files"),
            Some(serde_json::json!({ "file_path": "page.html" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["message"].as_str().unwrap().starts_with("Saved file to:"));

        let (_, files) = send_json(&app, "GET", &format!("/assistants/{id}/files"), None).await;
        let files = files["files"].as_object().unwrap();
        assert_eq!(files.len(), 1);
        assert!(files.values().all(|v| v.as_str().unwrap().ends_with("page.html")));

        let req = Request::builder()
            .uri(format!("/assistants/{id}/download/page.html"))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/octet-stream"
        );
        assert_eq!(
            response.headers().get("content-disposition").unwrap(),
            "attachment; filename=\"page.html\""
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"<h1>hi</h1>");

        let (status, json) =
            send_json(&app, "GET", &format!("/assistants/{id}/download/other.html"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["detail"].as_str().unwrap().contains("other.html"));
    }

    #[tokio::test]
    async fn save_files_outside_workspace_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let app = api_router(test_state(dir.path()));
        let id = create(&app).await;

        std::fs::create_dir_all(dir.path().join("workspace")).unwrap();
        let secret = dir.path().join("secret.txt");
        std::fs::write(&secret, "top secret").unwrap();

        for target in [secret.display().to_string(), "../secret.txt".to_string()] {
            let (status, json) = send_json(
                &app,
                "POST",
                &format!("/assistants/{id}/save-files"),
                Some(serde_json::json!({ "file_path": target })),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(json["detail"].as_str().unwrap().starts_with("Cannot save"));
        }

        let (status, _) =
            send_json(&app, "GET", &format!("/assistants/{id}/download/secret.txt"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, files) = send_json(&app, "GET", &format!("/assistants/{id}/files"), None).await;
        assert!(files["files"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_files_without_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let app = api_router(test_state(dir.path()));
        let id = create(&app).await;

        let (status, json) = send_json(&app, "POST", &format!("/assistants/{id}/save-files"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["message"].as_str().unwrap().starts_with("No generated files found"));
    }

    #[tokio::test]
    async fn restore_memory_into_assistant() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let app = api_router(state.clone());

        let mut metadata = Map::new();
        metadata.insert(
            "conversation_history".into(),
            serde_json::json!([
                { "role": "user", "content": "earlier question" },
                { "role": "assistant", "content": "earlier answer" }
            ]),
        );
        let memory_id = state
            .memory
            .store(MemoryEntry::new("earlier exchange").with_metadata(metadata))
            .await
            .unwrap();

        let id = create(&app).await;
        let (status, json) = send_json(
            &app,
            "POST",
            &format!("/assistants/{id}/restore-memory"),
            Some(serde_json::json!({ "memory_id": memory_id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["memory_id"], memory_id.as_str());
        assert!(json["message"].as_str().unwrap().contains("2 messages"));

        let (_, history) =
            send_json(&app, "GET", &format!("/assistants/{id}/conversation-history"), None).await;
        assert_eq!(history["history"][0]["content"], "earlier question");

        // Restoring on create takes the memory ID as the conversation ID.
        let (status, created) = send_json(
            &app,
            "POST",
            "/assistants",
            Some(serde_json::json!({ "conversation_id": memory_id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let other = created["assistant_id"].as_str().unwrap();
        let (_, history) =
            send_json(&app, "GET", &format!("/assistants/{other}/conversation-history"), None).await;
        assert_eq!(history["history"][1]["content"], "earlier answer");
    }

    #[tokio::test]
    async fn end_session_removes_assistant() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let app = api_router(state.clone());
        let id = create(&app).await;

        let (status, json) = send_json(&app, "POST", &format!("/assistants/{id}/end-session"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "Session ended");
        assert!(json["details"].as_str().unwrap().contains("ended"));

        assert!(state.assistant(&id).await.is_none());
        assert!(state.statuses.read().await.get(&id).is_none());
        let (status, _) = send_json(&app, "GET", &format!("/assistants/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_tools() {
        let dir = tempfile::tempdir().unwrap();
        let app = api_router(test_state(dir.path()));

        let (status, json) = send_json(&app, "GET", "/tools", None).await;
        assert_eq!(status, StatusCode::OK);
        let parsed: ToolListResponse = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.count, parsed.tools.len());
        assert!(parsed.tools.iter().any(|t| t.name == "read_file"));
        assert!(parsed.tools.iter().any(|t| t.name == "get_current_datetime"));
        assert!(parsed.tools.iter().all(|t| !t.description.is_empty()));
    }
}
