//! HTTP host for tutoring sessions.
//!
//! # Endpoints
//!
//! - `POST /api/sessions` - Create a session and get the opening prompt
//! - `POST /api/sessions/:id/responses` - Submit learner text
//! - `GET /api/sessions/:id` - Current session state
//! - `POST /api/sessions/:id/end` - End a session, returns its summary
//! - `GET /api/sessions/:id/summary` - Summary so far (final once ended)
//! - `GET /ws` - Live turn events
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tutor_engine::{create_router, AppState, ConceptGraph, Config};
//!
//! # async fn example() -> tutor_engine::Result<()> {
//! let config = Config::default();
//! let graph = Arc::new(ConceptGraph::load(&config.concept_bank)?);
//! let router = create_router(AppState::new(graph, &config));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::concept_graph::ConceptGraph;
use crate::config::Config;
use crate::error::{Result, TutorError};
use crate::events::{ws_handler, EventBroadcaster};
use crate::manager::SessionManager;
use crate::session::{Session, SessionState, SessionSummary};
use crate::turn::{TopicPrompt, TurnOutcome};

// ============================================================================
// Request/Response Types
// ============================================================================

fn default_learner_id() -> String {
    "anonymous".to_string()
}

/// Request body for creating a session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Learner the session belongs to.
    #[serde(default = "default_learner_id")]
    pub learner_id: String,
}

/// Response body for a created session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    /// New session id.
    pub session_id: String,
    /// Lifecycle state after opening.
    pub state: SessionState,
    /// Greeting with topic suggestions.
    pub prompt: TopicPrompt,
}

/// Request body carrying learner text.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    /// Raw learner input.
    pub text: String,
}

/// Response body for a processed turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    /// Session id.
    pub session_id: String,
    /// Lifecycle state after the turn.
    pub state: SessionState,
    /// What happened.
    pub outcome: TurnOutcome,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Session Store
// ============================================================================

/// Live sessions keyed by id. Each session has its own lock.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Arc<Mutex<Session>>>>>,
}

impl SessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session and returns its handle.
    pub async fn insert(&self, session: Session) -> Arc<Mutex<Session>> {
        let id = session.id.clone();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id, Arc::clone(&handle));
        handle
    }

    /// Looks up a session.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::SessionNotFound` if no session has this id.
    pub async fn get(&self, id: &str) -> Result<Arc<Mutex<Session>>> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| TutorError::session_not_found(id))
    }

    /// Removes a session.
    pub async fn remove(&self, id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.write().await.remove(id)
    }

    /// Number of sessions held.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns `true` if no sessions are held.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drops sessions idle past the manager's timeout and returns their ids.
    ///
    /// Sessions busy processing a turn are skipped.
    pub async fn reap_expired(&self, manager: &SessionManager, now: DateTime<Utc>) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, handle)| {
                handle
                    .try_lock()
                    .is_ok_and(|session| manager.is_expired(&session, now))
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            sessions.remove(id);
            info!(session_id = %id, "Reaped idle session");
        }
        expired
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Turn processor, publishing into `broadcaster`.
    pub manager: Arc<SessionManager>,
    /// Live sessions.
    pub sessions: SessionStore,
    /// Event fan-out for `/ws`.
    pub broadcaster: EventBroadcaster,
}

impl AppState {
    /// Creates state with a fresh session store, wiring the broadcaster in as the turn sink.
    #[must_use]
    pub fn new(graph: Arc<ConceptGraph>, config: &Config) -> Self {
        let broadcaster = EventBroadcaster::default();
        let manager = SessionManager::new(graph, config).with_sink(Arc::new(broadcaster.clone()));
        Self {
            manager: Arc::new(manager),
            sessions: SessionStore::new(),
            broadcaster,
        }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Error type for API handlers.
#[derive(Debug)]
enum ApiError {
    /// No such session.
    NotFound(String),
    /// The session cannot accept this request in its current state.
    Conflict(String),
    /// Anything else.
    Internal(String),
}

impl From<TutorError> for ApiError {
    fn from(err: TutorError) -> Self {
        match err {
            TutorError::SessionNotFound { .. } => Self::NotFound(err.to_string()),
            TutorError::SessionClosed { .. } | TutorError::InvalidStateTransition { .. } => {
                Self::Conflict(err.to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Internal(msg) => {
                warn!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all endpoints, CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/sessions", post(handle_create_session))
        .route("/sessions/:id", get(handle_get_session))
        .route("/sessions/:id/responses", post(handle_submit))
        .route("/sessions/:id/end", post(handle_end))
        .route("/sessions/:id/summary", get(handle_summary));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `POST /api/sessions`.
async fn handle_create_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateSessionRequest>,
) -> std::result::Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    let mut session = state.manager.create_session(request.learner_id);
    let prompt = state.manager.open(&mut session)?;
    let response = CreateSessionResponse {
        session_id: session.id.clone(),
        state: session.state,
        prompt,
    };
    state.sessions.insert(session).await;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Handler for `POST /api/sessions/:id/responses`.
async fn handle_submit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<SubmitRequest>,
) -> std::result::Result<Json<TurnResponse>, ApiError> {
    let handle = state.sessions.get(&id).await?;
    let mut session = handle.lock().await;
    let outcome = state.manager.submit_response(&mut session, &request.text)?;

    Ok(Json(TurnResponse {
        session_id: id,
        state: session.state,
        outcome: outcome.redacted(),
    }))
}

/// Handler for `GET /api/sessions/:id`.
async fn handle_get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> std::result::Result<Json<Session>, ApiError> {
    let handle = state.sessions.get(&id).await?;
    let session = handle.lock().await.clone();
    Ok(Json(session))
}

/// Handler for `POST /api/sessions/:id/end`.
async fn handle_end(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> std::result::Result<Json<SessionSummary>, ApiError> {
    let handle = state.sessions.get(&id).await?;
    let mut session = handle.lock().await;
    let summary = state.manager.end_session(&mut session)?;
    Ok(Json(summary))
}

/// Handler for `GET /api/sessions/:id/summary`.
async fn handle_summary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> std::result::Result<Json<SessionSummary>, ApiError> {
    let handle = state.sessions.get(&id).await?;
    let session = handle.lock().await;
    let summary = session
        .summary
        .clone()
        .unwrap_or_else(|| session.summarize(state.manager.graph(), Utc::now()));
    Ok(Json(summary))
}

// ============================================================================
// Tests
// ============================================================================
