use crate::provider::ProviderError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type for router operations
pub type Result<T> = std::result::Result<T, RouterError>;

/// Router error types
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The fallback provider failed; there is no further degradation path
    #[error("Fallback provider failed: {0}")]
    Fallback(#[source] ProviderError),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RouterError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RouterError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RouterError::Fallback(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RouterError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RouterError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RouterError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
