use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, routing::post, Json, Router};
use deutsch_tutor::Turn;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::llm_client::ModelBackend;
use crate::session::{Session, SessionError};

/// Sessions untouched for this long are dropped on the next sweep.
pub const DEFAULT_SESSION_IDLE_TTL: Duration = Duration::from_secs(60 * 60);

struct SessionEntry {
    session: Arc<Mutex<Session>>,
    last_used: std::sync::Mutex<Instant>,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            session: Arc::new(Mutex::new(Session::new())),
            last_used: std::sync::Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        if let Ok(mut t) = self.last_used.lock() {
            *t = Instant::now();
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_used
            .lock()
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO)
    }
}

#[derive(Clone)]
pub struct AppState {
    backend: Arc<ModelBackend>,
    sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
    idle_ttl: Duration,
}

impl AppState {
    pub fn new(backend: ModelBackend) -> Self {
        Self::with_idle_ttl(backend, DEFAULT_SESSION_IDLE_TTL)
    }

    pub fn with_idle_ttl(backend: ModelBackend, idle_ttl: Duration) -> Self {
        Self {
            backend: Arc::new(backend),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_ttl,
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn session(&self, id: &str) -> Result<Arc<Mutex<Session>>, ApiError> {
        let id = Uuid::parse_str(id).map_err(|_| ApiError::UnknownSession)?;
        let sessions = self.sessions.read().await;
        let entry = sessions.get(&id).ok_or(ApiError::UnknownSession)?;
        entry.touch();
        Ok(entry.session.clone())
    }

    /// Drops sessions idle for longer than the TTL. A session with a request
    /// in flight holds its lock and is kept.
    async fn sweep_idle(&self) {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, e| e.idle_for() < self.idle_ttl || e.session.try_lock().is_err());
        let dropped = before - sessions.len();
        if dropped > 0 {
            info!(dropped, remaining = sessions.len(), "idle sessions expired");
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/version", get(version))
        .route("/v1/sessions", post(create_session))
        .route("/v1/sessions/:id", get(get_session).delete(delete_session))
        .route("/v1/sessions/:id/messages", post(send_message))
        .route("/v1/sessions/:id/reset", post(reset_session))
        .route("/v1/sessions/:id/debug", post(debug_raw))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub turns: Vec<Turn>,
}

enum ApiError {
    UnknownSession,
    Session(SessionError),
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        ApiError::Session(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::UnknownSession => (StatusCode::NOT_FOUND, "unknown session".to_string()),
            ApiError::Session(e @ SessionError::EmptyMessage) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            ApiError::Session(e @ SessionError::NoHistory) => (StatusCode::CONFLICT, e.to_string()),
            ApiError::Session(e @ SessionError::Backend(_)) => {
                (StatusCode::BAD_GATEWAY, e.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "name": "deutsch_tutor",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.backend.name(),
    }))
}

async fn version() -> Json<serde_json::Value> {
    Json(json!({"name": "deutsch_tutor", "version": env!("CARGO_PKG_VERSION"), "build": "dev"}))
}

async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    state.sweep_idle().await;
    let id = Uuid::new_v4();
    state.sessions.write().await.insert(id, SessionEntry::new());
    info!(session_id = %id, "session created");
    (StatusCode::CREATED, Json(json!({ "session_id": id.to_string() })))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.session(&id).await?;
    let guard = session.lock().await;
    Ok(Json(SessionView {
        session_id: id,
        turns: guard.turns().to_vec(),
    }))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let key = Uuid::parse_str(&id).map_err(|_| ApiError::UnknownSession)?;
    match state.sessions.write().await.remove(&key) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(ApiError::UnknownSession),
    }
}

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SendRequest>,
) -> Result<Json<Turn>, ApiError> {
    let session = state.session(&id).await?;
    // Held across the backend call so one session never has two requests in flight.
    let mut guard = session.lock().await;
    let turn = guard.send(state.backend.as_ref(), &req.message).await?;
    Ok(Json(turn))
}

async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.session(&id).await?;
    session.lock().await.reset();
    Ok(Json(SessionView {
        session_id: id,
        turns: Vec::new(),
    }))
}

async fn debug_raw(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = state.session(&id).await?;
    let guard = session.lock().await;
    let raw = guard.debug_raw(state.backend.as_ref()).await?;
    Ok(Json(json!({ "raw": raw })))
}

pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, backend = state.backend.name(), idle_ttl = ?state.idle_ttl, "listening");
    axum::serve(listener, app(state)).await
}

pub async fn spawn_test_server(backend: ModelBackend) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    spawn_test_server_with_state(AppState::new(backend)).await
}

pub async fn spawn_test_server_with_state(
    state: AppState,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app(state)).await;
    });
    Ok((addr, handle))
}
