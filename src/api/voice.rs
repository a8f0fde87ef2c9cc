//! Voice submission endpoint
//!
//! Accepts a recorded blob (WAV, `WebM`, Ogg, ...) as the raw request body and
//! runs it through the session's pipeline.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, header},
};
use serde::Serialize;

use super::sessions::{processing_view, validate_session_id};
use super::{ApiError, ApiState};
use crate::presentation::{PresentationEvent, notification_ttl_ms};
use crate::session::{ResolvedArtifact, SessionError, SessionView};
use crate::voice::AudioBlob;

/// Content type assumed when the client sends none
const DEFAULT_AUDIO_TYPE: &str = "audio/webm";

/// Successful submission response
#[derive(Debug, Serialize)]
pub struct VoiceResponse {
    pub view: SessionView,
    pub artifact: ResolvedArtifact,
    pub notifications: Vec<String>,
    /// How long the client should show each notification
    pub notification_ttl_ms: u64,
}

/// Run a recorded blob through the session
///
/// The run executes on its own task so a disconnecting client cannot leave
/// the session stuck mid-run.
pub async fn submit_voice(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<VoiceResponse>, ApiError> {
    validate_session_id(&id)?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| v.starts_with("audio/"))
        .unwrap_or(DEFAULT_AUDIO_TYPE)
        .to_string();

    let slot = state.sessions.get_or_create(&id).await?;
    let mut session = Arc::clone(&slot.session).try_lock_owned().map_err(|_| {
        tracing::warn!(session_id = %id, "submission rejected, run in flight");
        ApiError::from(SessionError::Busy)
    })?;

    tracing::info!(session_id = %id, bytes = body.len(), content_type = %content_type, "voice submitted");

    slot.publish(processing_view(session.resolved_keyword().map(str::to_string)));
    let blob = AudioBlob::new(body.to_vec(), content_type);

    let publisher = slot.clone();
    let run = tokio::spawn(async move {
        let result = session.process_blob(blob).await;
        let view = session.view();
        publisher.publish(view.clone());
        (result, view)
    });

    let (result, view) = run
        .await
        .map_err(|e| ApiError::Internal(format!("voice task failed: {e}")))?;

    let notifications = drain_notifications(&slot.presenter.drain());

    match result {
        Ok(artifact) => Ok(Json(VoiceResponse {
            view,
            artifact,
            notifications,
            notification_ttl_ms: notification_ttl_ms(),
        })),
        Err(source) => Err(ApiError::Session {
            source,
            view: Some(view),
            notifications,
        }),
    }
}

fn drain_notifications(events: &[PresentationEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            PresentationEvent::Notification { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}
