use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::services::pesapal::GatewayError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Payment gateway unreachable")]
    GatewayUnreachable,

    #[error("Payment gateway timed out")]
    GatewayTimeout,

    #[error("Payment gateway rejected the request")]
    GatewayRejected,

    #[error("Invalid payment gateway credentials")]
    InvalidCredentials,

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unreachable(_) => AppError::GatewayUnreachable,
            GatewayError::Timeout(_) => AppError::GatewayTimeout,
            GatewayError::InvalidCredentials => AppError::InvalidCredentials,
            GatewayError::Rejected { .. } => AppError::GatewayRejected,
            GatewayError::InvalidResponse(_) => AppError::GatewayRejected,
        }
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
        }

        // Gateway variants carry a deliberately generic message: raw gateway
        // error bodies are persisted for audit, never returned to the client.
        let (status, error_message, details) = match self {
            AppError::ValidationError(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Validation error".to_string(),
                Some(err.to_string()),
            ),
            AppError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string(), None),
            AppError::GatewayUnreachable => (
                StatusCode::BAD_GATEWAY,
                "Payment gateway unreachable".to_string(),
                None,
            ),
            AppError::GatewayTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "Payment gateway timed out".to_string(),
                None,
            ),
            AppError::GatewayRejected => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Payment could not be processed".to_string(),
                None,
            ),
            AppError::InvalidCredentials => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Payment gateway configuration error".to_string(),
                None,
            ),
            AppError::DatabaseError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
                Some(err.to_string()),
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                None,
            ),
        };

        (
            status,
            Json(ErrorResponse {
                error: error_message,
                details,
            }),
        )
            .into_response()
    }
}
