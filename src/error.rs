// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Transport failure talking to the remote service. Always retryable;
    /// never corrupts cursor or room state.
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// Room already started, room full, or a conflicting state transition.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid payload: {0}")]
    Validation(String),

    /// Local storage corruption (e.g. a sync cursor moving backwards).
    /// Unrecoverable without a reset.
    #[error("Local store corrupted: {0}")]
    Fatal(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether a caller may safely retry the failed operation later.
    pub fn retryable(&self) -> bool {
        matches!(self, AppError::Disconnected(_))
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::Disconnected(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "disconnected",
                Some(msg.clone()),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg.clone())),
            AppError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_failure",
                Some(msg.clone()),
            ),
            AppError::Fatal(msg) => {
                tracing::error!(error = %msg, "Local store corruption");
                (StatusCode::INTERNAL_SERVER_ERROR, "fatal", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
