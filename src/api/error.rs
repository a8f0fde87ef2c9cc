//! API error responses

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::pipeline::PipelineError;
use crate::presentation::notification_ttl_ms;
use crate::session::{SessionError, SessionView};
use crate::storage::StorageError;
use crate::voice::CaptureError;

/// API errors
#[derive(Debug)]
pub enum ApiError {
    /// A session action failed; carries the view after the failure
    Session {
        source: SessionError,
        view: Option<SessionView>,
        notifications: Vec<String>,
    },
    BadRequest(String),
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

impl ApiError {
    /// Session failure without a view
    #[must_use]
    pub const fn session(source: SessionError) -> Self {
        Self::Session {
            source,
            view: None,
            notifications: Vec::new(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(source: SessionError) -> Self {
        Self::session(source)
    }
}

impl From<StorageError> for ApiError {
    fn from(source: StorageError) -> Self {
        Self::session(SessionError::Storage(source))
    }
}

/// Status and machine-readable code for a session failure
fn classify(error: &SessionError) -> (StatusCode, &'static str) {
    match error {
        SessionError::Busy => (StatusCode::CONFLICT, "busy"),
        SessionError::Capture(CaptureError::EmptyCapture) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "empty_capture")
        }
        SessionError::Capture(CaptureError::DeviceUnavailable(_)) => {
            (StatusCode::SERVICE_UNAVAILABLE, "device_unavailable")
        }
        SessionError::Capture(_) => (StatusCode::INTERNAL_SERVER_ERROR, "capture_failed"),
        SessionError::Pipeline(PipelineError::NoKeywordMatched { .. }) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "no_keyword_matched")
        }
        SessionError::Pipeline(PipelineError::TranscriptionFailed(_)) => {
            (StatusCode::BAD_GATEWAY, "transcription_failed")
        }
        SessionError::Pipeline(PipelineError::SynthesisFailed(_)) => {
            (StatusCode::BAD_GATEWAY, "synthesis_failed")
        }
        SessionError::Storage(StorageError::WriteFailed { .. }) => {
            (StatusCode::BAD_GATEWAY, "storage_write_failed")
        }
        SessionError::Storage(StorageError::DeleteFailed { .. }) => {
            (StatusCode::NOT_FOUND, "storage_delete_failed")
        }
        SessionError::Storage(StorageError::ListFailed(_)) => {
            (StatusCode::BAD_GATEWAY, "storage_list_failed")
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
            #[serde(skip_serializing_if = "Option::is_none")]
            view: Option<SessionView>,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            notifications: Vec<String>,
            #[serde(skip_serializing_if = "Option::is_none")]
            notification_ttl_ms: Option<u64>,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let (status, code, message, view, notifications) = match self {
            Self::Session {
                source,
                view,
                notifications,
            } => {
                let (status, code) = classify(&source);
                (status, code, source.user_message(), view, notifications)
            }
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None, Vec::new()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None, Vec::new()),
            Self::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                msg,
                None,
                Vec::new(),
            ),
            Self::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                msg,
                None,
                Vec::new(),
            ),
        };

        (
            status,
            Json(ErrorResponse {
                error: ErrorBody { code, message },
                view,
                notification_ttl_ms: (!notifications.is_empty()).then(notification_ttl_ms),
                notifications,
            }),
        )
            .into_response()
    }
}
