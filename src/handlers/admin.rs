// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    analytics::QuizAnalytics,
    error::AppError,
    models::{
        question::QuestionRequest,
        quiz::{CreateQuizRequest, DashboardQuery, NewQuiz, Quiz, ScoringStrategy, UpdateQuizRequest},
    },
    store::SharedStore,
    utils::{code::generate_quiz_code, html::clean_text},
};

/// Attempts at finding an unused share code before giving up.
const CODE_ATTEMPTS: usize = 5;

async fn require_quiz(store: &SharedStore, id: Uuid) -> Result<Quiz, AppError> {
    store
        .get_quiz(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))
}

fn clean_description(raw: Option<String>) -> Option<String> {
    raw.map(|d| clean_text(&d)).filter(|d| !d.is_empty())
}

/// Lists quizzes newest first, filtered by search text and status.
/// Admin only.
pub async fn dashboard(
    State(store): State<SharedStore>,
    Query(query): Query<DashboardQuery>,
) -> Result<impl IntoResponse, AppError> {
    let quizzes: Vec<Quiz> = store
        .list_quizzes()
        .await?
        .into_iter()
        .filter(|q| query.matches(q))
        .collect();
    Ok(Json(quizzes))
}

/// Creates a quiz in a single write. New quizzes start closed.
/// Admin only.
pub async fn create_quiz(
    State(store): State<SharedStore>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let title = clean_text(&payload.title);
    if title.is_empty() {
        return Err(AppError::BadRequest("Title is required".to_string()));
    }

    let mut new_quiz = NewQuiz {
        title,
        description: clean_description(payload.description),
        is_open: false,
        scoring_strategy: ScoringStrategy::MostCorrectThenFastest,
        shuffle_questions: payload.shuffle_questions,
        shuffle_options: payload.shuffle_options,
        time_per_question_sec: payload.time_per_question_sec,
        quiz_code: generate_quiz_code(),
    };

    for attempt in 1..=CODE_ATTEMPTS {
        match store.insert_quiz(&new_quiz).await {
            Ok(quiz) => {
                tracing::info!("Created quiz {} with code {}", quiz.id, quiz.quiz_code);
                return Ok((StatusCode::CREATED, Json(quiz)));
            }
            Err(AppError::Conflict(_)) if attempt < CODE_ATTEMPTS => {
                tracing::debug!("Quiz code {} taken, regenerating", new_quiz.quiz_code);
                new_quiz.quiz_code = generate_quiz_code();
            }
            Err(e) => return Err(e),
        }
    }

    Err(AppError::Conflict(
        "Could not allocate a unique quiz code".to_string(),
    ))
}

/// Returns a quiz with all of its questions, answers included.
/// Admin only.
pub async fn get_quiz(
    State(store): State<SharedStore>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = require_quiz(&store, id).await?;
    let questions = store.list_questions(id).await?;
    Ok(Json(json!({ "quiz": quiz, "questions": questions })))
}

/// Updates quiz settings.
/// Admin only.
pub async fn update_quiz(
    State(store): State<SharedStore>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let mut quiz = require_quiz(&store, id).await?;

    if let Some(title) = payload.title {
        let title = clean_text(&title);
        if title.is_empty() {
            return Err(AppError::BadRequest("Title is required".to_string()));
        }
        quiz.title = title;
    }
    if payload.description.is_some() {
        quiz.description = clean_description(payload.description);
    }
    if let Some(is_open) = payload.is_open {
        quiz.is_open = is_open;
    }
    if let Some(shuffle) = payload.shuffle_questions {
        quiz.shuffle_questions = shuffle;
    }
    if let Some(shuffle) = payload.shuffle_options {
        quiz.shuffle_options = shuffle;
    }
    if payload.clear_time_limit {
        quiz.time_per_question_sec = None;
    } else if let Some(secs) = payload.time_per_question_sec {
        quiz.time_per_question_sec = Some(secs);
    }

    let updated = store
        .update_quiz(&quiz)
        .await?
        .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))?;
    Ok(Json(updated))
}

/// Deletes a quiz with its questions, attempts and answers.
/// Admin only.
pub async fn delete_quiz(
    State(store): State<SharedStore>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if !store.delete_quiz(id).await? {
        return Err(AppError::NotFound("Quiz not found".to_string()));
    }
    tracing::info!("Deleted quiz {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Flips a quiz between open and closed.
/// Admin only.
pub async fn toggle_quiz(
    State(store): State<SharedStore>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let mut quiz = require_quiz(&store, id).await?;
    quiz.is_open = !quiz.is_open;

    let updated = store
        .update_quiz(&quiz)
        .await?
        .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))?;
    tracing::info!(
        "Quiz {} is now {}",
        updated.id,
        if updated.is_open { "open" } else { "closed" }
    );
    Ok(Json(updated))
}

/// Appends a question to a quiz.
/// Admin only.
pub async fn add_question(
    State(store): State<SharedStore>,
    Path(quiz_id): Path<Uuid>,
    Json(payload): Json<QuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let draft = payload.into_draft()?;
    require_quiz(&store, quiz_id).await?;

    let next_order = store
        .list_questions(quiz_id)
        .await?
        .iter()
        .map(|q| q.order_num)
        .max()
        .unwrap_or(0)
        + 1;

    let question = store.insert_question(quiz_id, &draft, next_order).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

/// Replaces a question's text, options and answer.
/// Admin only.
pub async fn update_question(
    State(store): State<SharedStore>,
    Path(id): Path<Uuid>,
    Json(payload): Json<QuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let order_num = payload.order_num;
    let draft = payload.into_draft()?;

    let mut question = store
        .get_question(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    question.text = draft.text;
    question.options = draft.options;
    question.answer_id = draft.answer_id;
    question.points = draft.points;
    if let Some(order_num) = order_num {
        question.order_num = order_num;
    }

    let updated = store
        .update_question(&question)
        .await?
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;
    Ok(Json(updated))
}

/// Admin only.
pub async fn delete_question(
    State(store): State<SharedStore>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if !store.delete_question(id).await? {
        return Err(AppError::NotFound("Question not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Participation and per-question difficulty for one quiz.
/// Admin only.
pub async fn quiz_analytics(
    State(store): State<SharedStore>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_quiz(&store, id).await?;
    let analytics = QuizAnalytics::load(store.as_ref(), id).await?;
    Ok(Json(analytics))
}
