// src/handlers/gate.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    error::AppError,
    gate::{self, QuizKey},
    models::{attempt::StartAttemptRequest, quiz::PublicQuiz},
    store::SharedStore,
};

/// Public view of an open quiz, looked up by id or share code.
pub async fn resolve_quiz(
    State(store): State<SharedStore>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let key = QuizKey::parse(&key)?;
    let quiz = gate::resolve(store.as_ref(), &key).await?;
    let question_count = store.count_questions(quiz.id).await?;
    Ok(Json(PublicQuiz::new(quiz, question_count)))
}

/// Starts an attempt and hands back the session context for the runner.
pub async fn start_attempt(
    State(store): State<SharedStore>,
    Path(key): Path<String>,
    Json(payload): Json<StartAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let key = QuizKey::parse(&key)?;
    let session = gate::start(store.as_ref(), &key, &payload.name).await?;
    Ok((StatusCode::CREATED, Json(session)))
}
