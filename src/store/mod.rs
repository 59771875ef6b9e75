// src/store/mod.rs

//! Record storage for quizzes, questions, attempts, answers and admins.
//!
//! Read-one operations return `Ok(None)` for a missing record so callers can
//! tell "not found" apart from a store failure (`Err`).

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        admin::Admin,
        answer::{Answer, NewAnswer},
        attempt::{Attempt, AttemptTotals, NewAttempt},
        question::{Question, QuestionDraft},
        quiz::{NewQuiz, Quiz},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type SharedStore = Arc<dyn QuizStore>;

#[async_trait]
pub trait QuizStore: Send + Sync {
    async fn get_quiz(&self, id: Uuid) -> Result<Option<Quiz>, AppError>;

    /// Looks a quiz up by its share code. `code` is already uppercased.
    async fn find_quiz_by_code(&self, code: &str) -> Result<Option<Quiz>, AppError>;

    /// All quizzes, newest first.
    async fn list_quizzes(&self) -> Result<Vec<Quiz>, AppError>;

    /// Fails with `AppError::Conflict` when the share code is taken.
    async fn insert_quiz(&self, quiz: &NewQuiz) -> Result<Quiz, AppError>;

    /// Writes every mutable field of `quiz` and bumps `updated_at`.
    async fn update_quiz(&self, quiz: &Quiz) -> Result<Option<Quiz>, AppError>;

    /// Deletes the quiz with its questions, attempts and answers.
    async fn delete_quiz(&self, id: Uuid) -> Result<bool, AppError>;

    /// Questions of a quiz ordered by `order_num`.
    async fn list_questions(&self, quiz_id: Uuid) -> Result<Vec<Question>, AppError>;

    async fn count_questions(&self, quiz_id: Uuid) -> Result<i64, AppError>;

    async fn get_question(&self, id: Uuid) -> Result<Option<Question>, AppError>;

    async fn insert_question(
        &self,
        quiz_id: Uuid,
        draft: &QuestionDraft,
        order_num: i32,
    ) -> Result<Question, AppError>;

    async fn update_question(&self, question: &Question) -> Result<Option<Question>, AppError>;

    async fn delete_question(&self, id: Uuid) -> Result<bool, AppError>;

    async fn insert_attempt(&self, attempt: &NewAttempt) -> Result<Attempt, AppError>;

    async fn get_attempt(&self, id: Uuid) -> Result<Option<Attempt>, AppError>;

    /// Writes `submitted_at` and the aggregates in one update.
    /// Returns `false` when the attempt is missing or was already submitted.
    async fn finalize_attempt(
        &self,
        id: Uuid,
        submitted_at: DateTime<Utc>,
        totals: AttemptTotals,
    ) -> Result<bool, AppError>;

    /// Every attempt of a quiz, submitted or not.
    async fn list_attempts(&self, quiz_id: Uuid) -> Result<Vec<Attempt>, AppError>;

    /// Attempts with a non-null `submitted_at`.
    async fn list_submitted_attempts(&self, quiz_id: Uuid) -> Result<Vec<Attempt>, AppError>;

    async fn insert_answer(&self, answer: &NewAnswer) -> Result<Answer, AppError>;

    async fn list_answers(&self, attempt_ids: &[Uuid]) -> Result<Vec<Answer>, AppError>;

    async fn find_admin(&self, username: &str) -> Result<Option<Admin>, AppError>;

    async fn insert_admin(&self, username: &str, password_hash: &str) -> Result<Admin, AppError>;
}
