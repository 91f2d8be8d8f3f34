//! Mapping of agent and store failures onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::types::ErrorResponse;
use crate::agents::types::SettingsError;
use crate::agents::AgentError;
use crate::store::StoreError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let (status, code) = match &e {
            StoreError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            StoreError::MaxLoops { .. } => (StatusCode::TOO_MANY_REQUESTS, "max_loops"),
            StoreError::MultipleSummary(_) => (StatusCode::CONFLICT, "multiple_summary"),
            StoreError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
        };
        Self::new(status, code, e.to_string())
    }
}

impl From<SettingsError> for ApiError {
    fn from(e: SettingsError) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_settings", e.to_string())
    }
}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::Store(e) => e.into(),
            AgentError::Settings(e) => e.into(),
            AgentError::Parse(e) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "parse_error", e.to_string())
            }
            AgentError::Backend(e) => {
                Self::new(StatusCode::BAD_GATEWAY, "backend_error", e.to_string())
            }
            AgentError::Tool(e) => Self::new(StatusCode::BAD_GATEWAY, "tool_error", e.to_string()),
            AgentError::Tokenizer(e) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "tokenizer_error", e.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, "{}", self.message);
        } else {
            tracing::warn!(code = self.code, "{}", self.message);
        }
        let body = ErrorResponse {
            error: self.message,
            code: self.code.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}
