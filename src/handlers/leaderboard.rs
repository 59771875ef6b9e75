// src/handlers/leaderboard.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::Utc;

use crate::{
    error::AppError,
    gate::{self, QuizKey},
    leaderboard::{BoardStatus, Leaderboard, LeaderboardQuery},
    store::SharedStore,
};

/// Ranked submissions for a quiz, open or closed.
///
/// Query: `sort=score|time|accuracy`, `period=all|today|week|month`,
/// `you=<completed attempt id>`.
pub async fn get_leaderboard(
    State(store): State<SharedStore>,
    Path(key): Path<String>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<impl IntoResponse, AppError> {
    let key = QuizKey::parse(&key)?;
    let quiz = gate::find_quiz(store.as_ref(), &key).await?;

    let mut board = Leaderboard::new(quiz.id);
    if board.refresh(store.as_ref()).await == BoardStatus::Unavailable {
        return Err(AppError::unavailable());
    }
    Ok(Json(board.view(&query, Utc::now())))
}
