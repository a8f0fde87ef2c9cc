//! Stored artifact endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get},
};
use serde::Serialize;

use super::{ApiError, ApiState};
use crate::storage::{AUDIO_EXTENSION, ArtifactListing, StorageGateway};

/// Build artifacts router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(list_artifacts))
        .route("/{key}", delete(delete_artifact))
        .with_state(state)
}

/// One artifact with its playback link
#[derive(Debug, Serialize)]
pub struct ArtifactInfo {
    pub key: String,
    pub trigger: String,
    pub url: String,
}

/// Delete response
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: String,
    pub artifacts: Vec<ArtifactInfo>,
}

fn describe(gateway: &StorageGateway, listing: &ArtifactListing) -> Vec<ArtifactInfo> {
    listing
        .entries()
        .iter()
        .map(|entry| ArtifactInfo {
            url: gateway.playback_url(&entry.key),
            trigger: entry.trigger().to_string(),
            key: entry.key.clone(),
        })
        .collect()
}

/// List stored artifacts
async fn list_artifacts(State(state): State<Arc<ApiState>>) -> Json<Vec<ArtifactInfo>> {
    let gateway = state.app.gateway();
    let listing = gateway.list().await;
    Json(describe(gateway, &listing))
}

/// Delete one artifact and return the refreshed listing
///
/// Only keys the listing can show are deletable.
async fn delete_artifact(
    State(state): State<Arc<ApiState>>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    if !key.ends_with(AUDIO_EXTENSION) {
        return Err(ApiError::BadRequest(format!("not an artifact key: {key}")));
    }

    let gateway = state.app.gateway();
    gateway.delete(&key).await?;

    let listing = gateway.list().await;
    Ok(Json(DeleteResponse {
        deleted: key,
        artifacts: describe(gateway, &listing),
    }))
}
