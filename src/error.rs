use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::models::response::ApiResponse;

/// Error taxonomy for the dispatch core. Configuration and not-found errors
/// propagate to callers; provider delivery failures never surface here, they
/// are normalized into the send outcome instead.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("provider error: provider={provider}, reason={reason}")]
    Provider { provider: String, reason: String },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DispatchError {
    pub fn config(message: impl Into<String>) -> Self {
        DispatchError::Configuration(message.into())
    }

    pub fn not_found(entity: impl Into<String>) -> Self {
        DispatchError::NotFound(entity.into())
    }

    pub fn provider(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        DispatchError::Provider {
            provider: provider.into(),
            reason: reason.into(),
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = match &self {
            DispatchError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DispatchError::Provider { .. } => StatusCode::BAD_GATEWAY,
            DispatchError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::Database(_) | DispatchError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ApiResponse::<()>::error(self.to_string(), "Request failed".to_string());

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let err = DispatchError::provider("twilio", "network timeout");
        assert_eq!(
            err.to_string(),
            "provider error: provider=twilio, reason=network timeout"
        );

        let err = DispatchError::not_found("template");
        assert_eq!(err.to_string(), "template not found");
    }
}
