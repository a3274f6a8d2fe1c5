//! Error mapping: core error taxonomy to HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use monad::{EngineError, SessionError, StoreError, ToolError, WorkspaceError};

/// API-level error carrying the status to report.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({"error": self.message}));
        (self.status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match &e {
            StoreError::NotFound(_) => Self::not_found(e.to_string()),
            StoreError::Immutable(_) => Self::new(StatusCode::CONFLICT, e.to_string()),
            _ => Self::internal(e.to_string()),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match &e {
            SessionError::NotFound(_) => Self::not_found(e.to_string()),
            SessionError::Workspace(inner) => workspace_status(inner, e.to_string()),
            _ => Self::internal(e.to_string()),
        }
    }
}

fn workspace_status(e: &WorkspaceError, message: String) -> ApiError {
    match e {
        WorkspaceError::AccessDenied(_) => ApiError::new(StatusCode::FORBIDDEN, message),
        WorkspaceError::NotFound(_) => ApiError::not_found(message),
        WorkspaceError::InvalidWorkspaceType(_)
        | WorkspaceError::InvalidUri(_)
        | WorkspaceError::TooLarge => ApiError::bad_request(message),
        _ => ApiError::internal(message),
    }
}

impl From<WorkspaceError> for ApiError {
    fn from(e: WorkspaceError) -> Self {
        let message = e.to_string();
        workspace_status(&e, message)
    }
}

impl From<ToolError> for ApiError {
    fn from(e: ToolError) -> Self {
        match &e {
            ToolError::NotFound(_) => Self::not_found(e.to_string()),
            ToolError::AccessDenied(_) => Self::new(StatusCode::FORBIDDEN, e.to_string()),
            ToolError::InvalidInput(_) | ToolError::NotSupported(_) => {
                Self::bad_request(e.to_string())
            }
            _ => Self::internal(e.to_string()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match &e {
            EngineError::InvalidRequest(_) => Self::bad_request(e.to_string()),
            EngineError::Session(SessionError::NotFound(_)) => Self::not_found(e.to_string()),
            _ => Self::internal(e.to_string()),
        }
    }
}
