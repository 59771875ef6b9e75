// src/handlers/runner.rs

use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    gate::QuizKey,
    models::answer::SubmitAnswerRequest,
    runs::RunRegistry,
    session::SessionContext,
    store::SharedStore,
};

/// Header carrying the device token from the session context on every
/// `/api/runs/*` call.
pub const DEVICE_TOKEN_HEADER: &str = "x-device-token";

fn device_token(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(DEVICE_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::AuthError("Device token required".to_string()))
}

/// Opens (or resumes) the run for the attempt carried in the session context.
pub async fn open_run(
    State(store): State<SharedStore>,
    State(runs): State<RunRegistry>,
    Path(key): Path<String>,
    Json(session): Json<SessionContext>,
) -> Result<impl IntoResponse, AppError> {
    let key = QuizKey::parse(&key)?;
    let view = runs.open(&store, &key, session).await?;
    Ok(Json(view))
}

pub async fn get_run(
    State(runs): State<RunRegistry>,
    Path(attempt_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let token = device_token(&headers)?;
    Ok(Json(runs.view(attempt_id, token).await?))
}

/// Submits the selection for the question currently presented.
pub async fn submit_answer(
    State(store): State<SharedStore>,
    State(runs): State<RunRegistry>,
    Path(attempt_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let token = device_token(&headers)?;
    let view = runs
        .answer(&store, attempt_id, token, payload.question_id, &payload.option_id)
        .await?;
    Ok(Json(view))
}

/// Retries finalizing an attempt whose last write failed.
pub async fn finish_run(
    State(store): State<SharedStore>,
    State(runs): State<RunRegistry>,
    Path(attempt_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let token = device_token(&headers)?;
    Ok(Json(runs.finish(&store, attempt_id, token).await?))
}
