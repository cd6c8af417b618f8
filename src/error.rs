//! API error taxonomy and its mapping to HTTP responses.
//!
//! Every failure leaves the server as `{"success": false, "message": ...}` with a
//! status code. Internal details are logged, never returned.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};

use crate::scoring::ScoreOutOfRange;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    /// 400 with a per-field `errors` object.
    #[error("{message}")]
    InvalidFields {
        message: String,
        errors: Vec<(&'static str, String)>,
    },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::InvalidFields { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Internal(detail) => {
                tracing::error!(%detail, "request failed");
                json!({ "success": false, "message": "Internal server error" })
            }
            ApiError::InvalidFields { message, errors } => {
                let errors: Map<String, Value> = errors
                    .into_iter()
                    .map(|(field, msg)| (field.to_string(), Value::String(msg)))
                    .collect();
                json!({ "success": false, "message": message, "errors": errors })
            }
            other => json!({ "success": false, "message": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DuplicateEmail(email) => {
                ApiError::Conflict(format!("User with email {} already exists", email))
            }
            StorageError::DuplicateRiskId(id) => ApiError::Conflict(format!("Risk {} already exists", id)),
            StorageError::UserNotFound(_) => ApiError::NotFound("User not found".to_string()),
            StorageError::RiskNotFound(id) => ApiError::NotFound(format!("Risk {} not found", id)),
            other => ApiError::internal(other),
        }
    }
}

impl From<ScoreOutOfRange> for ApiError {
    fn from(err: ScoreOutOfRange) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<bcrypt::BcryptError> for ApiError {
    fn from(err: bcrypt::BcryptError) -> Self {
        ApiError::internal(err)
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        ApiError::internal(err)
    }
}
