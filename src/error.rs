// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Error type shared by every handler and the store layer.
///
/// Each variant carries the message shown to the client, except
/// `InternalServerError`, whose detail is only logged.
#[derive(Debug)]
pub enum AppError {
    /// Store or transport failure.
    InternalServerError(String),
    /// Rejected by local validation before any store call.
    BadRequest(String),
    AuthError(String),
    Forbidden(String),
    NotFound(String),
    /// Terminal for the participant flow: the quiz is missing or closed,
    /// or the attempt could not be recovered. Served as 404.
    Unavailable(String),
    /// The request no longer matches current state, e.g. an answer for a
    /// question that has moved on.
    Conflict(String),
}

impl AppError {
    pub fn unavailable() -> Self {
        AppError::Unavailable("Quiz not available".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) | AppError::Unavailable(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
        }
    }

    /// Short machine-readable tag sent next to the message.
    fn kind(&self) -> &'static str {
        match self {
            AppError::InternalServerError(_) => "internal",
            AppError::BadRequest(_) => "bad_request",
            AppError::AuthError(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Unavailable(_) => "unavailable",
            AppError::Conflict(_) => "conflict",
        }
    }

    fn message(&self) -> &str {
        match self {
            AppError::InternalServerError(msg)
            | AppError::BadRequest(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Unavailable(msg)
            | AppError::Conflict(msg) => msg,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let public = if let AppError::InternalServerError(detail) = &self {
            tracing::error!("Internal Server Error: {}", detail);
            "Internal Server Error"
        } else {
            self.message()
        };

        let body = Json(json!({
            "error": public,
            "kind": self.kind(),
        }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
