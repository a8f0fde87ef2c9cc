//! Keyword dictionary endpoint

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};

use super::ApiState;
use crate::keywords::KeywordEntry;

/// Build keywords router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new().route("/", get(list_keywords)).with_state(state)
}

/// Dictionary entries in match priority order
async fn list_keywords(State(state): State<Arc<ApiState>>) -> Json<Vec<KeywordEntry>> {
    Json(state.app.dictionary().entries().to_vec())
}
