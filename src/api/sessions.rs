//! Per-browser sessions
//!
//! Each session id owns an isolated [`Session`] behind an async mutex. A run
//! holds the lock for its whole duration, so a second submission for the
//! same id is rejected instead of interleaved.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use super::{ApiError, ApiState, voice};
use crate::app::App;
use crate::presentation::RecordingPresenter;
use crate::session::{Session, SessionStatus, SessionView};

/// Longest accepted session id
const MAX_SESSION_ID_LEN: usize = 64;

/// Sessions kept before new ids are refused
pub const MAX_SESSIONS: usize = 256;

/// Idle time after which a session is evicted
pub const SESSION_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

/// Build sessions router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", post(create_session))
        .route("/{id}", get(get_session))
        .route("/{id}/voice", post(voice::submit_voice))
        .with_state(state)
}

/// One registered session and the presenter it reports through
#[derive(Clone)]
pub struct SessionSlot {
    pub session: Arc<Mutex<Session>>,
    pub presenter: Arc<RecordingPresenter>,
    snapshot: Arc<std::sync::Mutex<SessionView>>,
    last_seen: Arc<std::sync::Mutex<Instant>>,
}

impl SessionSlot {
    /// Last published view, readable while a run holds the session
    #[must_use]
    pub fn snapshot(&self) -> SessionView {
        self.snapshot
            .lock()
            .map(|v| v.clone())
            .unwrap_or_else(|_| processing_view(None))
    }

    /// Publish a view for concurrent readers
    pub fn publish(&self, view: SessionView) {
        if let Ok(mut slot) = self.snapshot.lock() {
            *slot = view;
        }
        self.touch();
    }

    /// Mark the session as used now
    pub fn touch(&self) {
        if let Ok(mut seen) = self.last_seen.lock() {
            *seen = Instant::now();
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .map(|seen| seen.elapsed())
            .unwrap_or_default()
    }
}

/// View shown while a run is in flight
#[must_use]
pub fn processing_view(resolved_keyword: Option<String>) -> SessionView {
    SessionView {
        status: SessionStatus::Processing,
        loading: true,
        error: None,
        resolved_keyword,
    }
}

/// Session id to session map
///
/// Idle sessions are evicted when new ones are created, and creation is
/// refused once the registry is full of active sessions.
#[derive(Clone)]
pub struct SessionRegistry {
    app: App,
    slots: Arc<RwLock<HashMap<String, SessionSlot>>>,
    max_sessions: usize,
    idle_ttl: Duration,
}

impl SessionRegistry {
    /// Create an empty registry with the default limits
    #[must_use]
    pub fn new(app: App) -> Self {
        Self::with_limits(app, MAX_SESSIONS, SESSION_IDLE_TTL)
    }

    /// Create an empty registry with explicit limits
    #[must_use]
    pub fn with_limits(app: App, max_sessions: usize, idle_ttl: Duration) -> Self {
        Self {
            app,
            slots: Arc::new(RwLock::new(HashMap::new())),
            max_sessions,
            idle_ttl,
        }
    }

    /// Look up an existing session
    pub async fn get(&self, id: &str) -> Option<SessionSlot> {
        let slot = self.slots.read().await.get(id).cloned()?;
        slot.touch();
        Some(slot)
    }

    /// Look up a session, creating it with a fresh listing if absent
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unavailable`] if the registry is full after
    /// evicting idle sessions
    pub async fn get_or_create(&self, id: &str) -> Result<SessionSlot, ApiError> {
        if let Some(slot) = self.get(id).await {
            return Ok(slot);
        }

        self.evict_idle().await;
        if self.len().await >= self.max_sessions {
            tracing::warn!(session_id = id, max = self.max_sessions, "session registry full");
            return Err(ApiError::Unavailable("too many active sessions".to_string()));
        }

        let presenter = Arc::new(RecordingPresenter::new(true));
        let mut session = self.app.session(presenter.clone());
        session.refresh().await;

        let slot = SessionSlot {
            snapshot: Arc::new(std::sync::Mutex::new(session.view())),
            last_seen: Arc::new(std::sync::Mutex::new(Instant::now())),
            session: Arc::new(Mutex::new(session)),
            presenter,
        };

        let mut slots = self.slots.write().await;
        Ok(slots
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session_id = id, "session created");
                slot
            })
            .clone())
    }

    /// Drop sessions idle past the TTL, skipping any with a run in flight
    ///
    /// Returns the number of sessions evicted.
    pub async fn evict_idle(&self) -> usize {
        let mut slots = self.slots.write().await;
        let before = slots.len();

        slots.retain(|id, slot| {
            if slot.idle_for() < self.idle_ttl {
                return true;
            }
            let Ok(mut session) = slot.session.try_lock() else {
                return true;
            };
            session.teardown();
            tracing::debug!(session_id = %id, "idle session evicted");
            false
        });

        before - slots.len()
    }

    /// Number of registered sessions
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    /// Whether no session is registered
    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }
}

/// Validate a client-chosen session id
///
/// # Errors
///
/// Returns [`ApiError::BadRequest`] for empty, overlong or non-alphanumeric ids
pub fn validate_session_id(id: &str) -> Result<(), ApiError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("invalid session id: {id}")))
    }
}

/// Session state response
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub view: SessionView,
    pub placeholder: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
}

/// Created session response
#[derive(Debug, Serialize)]
pub struct CreatedSession {
    pub id: String,
    pub view: SessionView,
}

/// Register a session under a server-chosen id
async fn create_session(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<CreatedSession>, ApiError> {
    let id = uuid::Uuid::new_v4().to_string();
    let slot = state.sessions.get_or_create(&id).await?;
    Ok(Json(CreatedSession {
        view: slot.snapshot(),
        id,
    }))
}

/// Current view of a session
async fn get_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    validate_session_id(&id)?;

    let slot = state
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("session not found: {id}")))?;

    // A run in flight holds the lock; answer from the published snapshot
    let Ok(session) = slot.session.try_lock() else {
        let view = slot.snapshot();
        let placeholder = view
            .resolved_keyword
            .as_ref()
            .map_or_else(|| "Waiting for input".to_string(), |kw| format!("Loading your query: {kw}"));
        return Ok(Json(SessionResponse {
            id,
            view,
            placeholder,
            artifact_url: None,
        }));
    };

    Ok(Json(SessionResponse {
        view: session.view(),
        placeholder: session.placeholder_text(),
        artifact_url: session.matching_artifact_url(),
        id,
    }))
}
