use axum::extract::rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::request::ValidationError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("request {0} not found")]
    NotFound(i64),

    /// Body, path or query string that axum could not extract.
    #[error("{message}")]
    Malformed { status: StatusCode, message: String },
}

macro_rules! malformed_from {
    ($($rejection:ty),+) => {
        $(impl From<$rejection> for AppError {
            fn from(rejection: $rejection) -> Self {
                AppError::Malformed {
                    status: rejection.status(),
                    message: rejection.body_text(),
                }
            }
        })+
    };
}

malformed_from!(FormRejection, JsonRejection, PathRejection, QueryRejection);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::Validation(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_request_error",
                "validation_failed",
                e.to_string(),
            ),
            AppError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "invalid_request_error",
                "not_found",
                self.to_string(),
            ),
            AppError::Malformed { status, message } => (
                *status,
                "invalid_request_error",
                "malformed_request",
                message.clone(),
            ),
            AppError::Store(e @ (StoreError::Connect(_) | StoreError::Timeout(_))) => {
                tracing::error!("Store unavailable: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "unavailable_error",
                    "store_unavailable",
                    "request store is unavailable, try again shortly".to_string(),
                )
            }
            AppError::Store(e) => {
                tracing::error!("Store error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}
