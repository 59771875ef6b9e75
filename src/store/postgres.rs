// src/store/postgres.rs

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, postgres::PgPoolOptions, types::Json};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        admin::Admin,
        answer::{Answer, NewAnswer},
        attempt::{Attempt, AttemptTotals, NewAttempt},
        question::{Question, QuestionDraft, decode_options},
        quiz::{NewQuiz, Quiz},
    },
};

use super::QuizStore;

const QUIZ_COLUMNS: &str = "id, title, description, is_open, scoring_strategy, shuffle_questions, \
     shuffle_options, time_per_question_sec, quiz_code, created_at, updated_at";

const QUESTION_COLUMNS: &str =
    "id, quiz_id, text, options, answer_id, points, order_num, created_at";

const ATTEMPT_COLUMNS: &str =
    "id, quiz_id, name, device_token, started_at, submitted_at, total_correct, total_time_ms";

const ANSWER_COLUMNS: &str =
    "id, attempt_id, question_id, selected_option_id, is_correct, time_taken_ms, answered_at";

/// Raw 'quizzes' row; the scoring tag is checked on the way out.
#[derive(FromRow)]
struct QuizRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    is_open: bool,
    scoring_strategy: String,
    shuffle_questions: bool,
    shuffle_options: bool,
    time_per_question_sec: Option<i32>,
    quiz_code: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<QuizRow> for Quiz {
    type Error = AppError;

    fn try_from(row: QuizRow) -> Result<Self, Self::Error> {
        Ok(Quiz {
            id: row.id,
            title: row.title,
            description: row.description,
            is_open: row.is_open,
            scoring_strategy: row.scoring_strategy.try_into()?,
            shuffle_questions: row.shuffle_questions,
            shuffle_options: row.shuffle_options,
            time_per_question_sec: row.time_per_question_sec,
            quiz_code: row.quiz_code,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Raw 'questions' row. `options` may hold an array or JSON text; it is
/// decoded exactly once, here.
#[derive(FromRow)]
struct QuestionRow {
    id: Uuid,
    quiz_id: Uuid,
    text: String,
    options: Json<serde_json::Value>,
    answer_id: String,
    points: i32,
    order_num: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<QuestionRow> for Question {
    type Error = AppError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        Ok(Question {
            id: row.id,
            quiz_id: row.quiz_id,
            text: row.text,
            options: decode_options(row.options.0)?,
            answer_id: row.answer_id,
            points: row.points,
            order_num: row.order_num,
            created_at: row.created_at,
        })
    }
}

fn log_db_error(context: &str, err: sqlx::Error) -> AppError {
    tracing::error!("{}: {:?}", context, err);
    AppError::from(err)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl QuizStore for PgStore {
    async fn get_quiz(&self, id: Uuid) -> Result<Option<Quiz>, AppError> {
        sqlx::query_as::<_, QuizRow>(&format!("SELECT {QUIZ_COLUMNS} FROM quizzes WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| log_db_error("Failed to fetch quiz", e))?
            .map(Quiz::try_from)
            .transpose()
    }

    async fn find_quiz_by_code(&self, code: &str) -> Result<Option<Quiz>, AppError> {
        sqlx::query_as::<_, QuizRow>(&format!(
            "SELECT {QUIZ_COLUMNS} FROM quizzes WHERE quiz_code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| log_db_error("Failed to fetch quiz by code", e))?
        .map(Quiz::try_from)
        .transpose()
    }

    async fn list_quizzes(&self) -> Result<Vec<Quiz>, AppError> {
        sqlx::query_as::<_, QuizRow>(&format!(
            "SELECT {QUIZ_COLUMNS} FROM quizzes ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| log_db_error("Failed to list quizzes", e))?
        .into_iter()
        .map(Quiz::try_from)
        .collect()
    }

    async fn insert_quiz(&self, quiz: &NewQuiz) -> Result<Quiz, AppError> {
        let row = sqlx::query_as::<_, QuizRow>(&format!(
            r#"
            INSERT INTO quizzes
                (id, title, description, is_open, scoring_strategy,
                 shuffle_questions, shuffle_options, time_per_question_sec, quiz_code)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {QUIZ_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&quiz.title)
        .bind(&quiz.description)
        .bind(quiz.is_open)
        .bind(quiz.scoring_strategy.as_str())
        .bind(quiz.shuffle_questions)
        .bind(quiz.shuffle_options)
        .bind(quiz.time_per_question_sec)
        .bind(&quiz.quiz_code)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Quiz code '{}' already exists", quiz.quiz_code))
            } else {
                log_db_error("Failed to create quiz", e)
            }
        })?;

        row.try_into()
    }

    async fn update_quiz(&self, quiz: &Quiz) -> Result<Option<Quiz>, AppError> {
        sqlx::query_as::<_, QuizRow>(&format!(
            r#"
            UPDATE quizzes SET
                title = $2,
                description = $3,
                is_open = $4,
                shuffle_questions = $5,
                shuffle_options = $6,
                time_per_question_sec = $7,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {QUIZ_COLUMNS}
            "#
        ))
        .bind(quiz.id)
        .bind(&quiz.title)
        .bind(&quiz.description)
        .bind(quiz.is_open)
        .bind(quiz.shuffle_questions)
        .bind(quiz.shuffle_options)
        .bind(quiz.time_per_question_sec)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| log_db_error("Failed to update quiz", e))?
        .map(Quiz::try_from)
        .transpose()
    }

    async fn delete_quiz(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM quizzes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| log_db_error("Failed to delete quiz", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_questions(&self, quiz_id: Uuid) -> Result<Vec<Question>, AppError> {
        sqlx::query_as::<_, QuestionRow>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE quiz_id = $1 \
             ORDER BY order_num ASC, created_at ASC"
        ))
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| log_db_error("Failed to list questions", e))?
        .into_iter()
        .map(Question::try_from)
        .collect()
    }

    async fn count_questions(&self, quiz_id: Uuid) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM questions WHERE quiz_id = $1")
            .bind(quiz_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| log_db_error("Failed to count questions", e))
    }

    async fn get_question(&self, id: Uuid) -> Result<Option<Question>, AppError> {
        sqlx::query_as::<_, QuestionRow>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| log_db_error("Failed to fetch question", e))?
        .map(Question::try_from)
        .transpose()
    }

    async fn insert_question(
        &self,
        quiz_id: Uuid,
        draft: &QuestionDraft,
        order_num: i32,
    ) -> Result<Question, AppError> {
        let row = sqlx::query_as::<_, QuestionRow>(&format!(
            r#"
            INSERT INTO questions (id, quiz_id, text, options, answer_id, points, order_num)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {QUESTION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(quiz_id)
        .bind(&draft.text)
        .bind(Json(&draft.options))
        .bind(&draft.answer_id)
        .bind(draft.points)
        .bind(order_num)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| log_db_error("Failed to create question", e))?;

        row.try_into()
    }

    async fn update_question(&self, question: &Question) -> Result<Option<Question>, AppError> {
        sqlx::query_as::<_, QuestionRow>(&format!(
            r#"
            UPDATE questions SET
                text = $2,
                options = $3,
                answer_id = $4,
                points = $5,
                order_num = $6
            WHERE id = $1
            RETURNING {QUESTION_COLUMNS}
            "#
        ))
        .bind(question.id)
        .bind(&question.text)
        .bind(Json(&question.options))
        .bind(&question.answer_id)
        .bind(question.points)
        .bind(question.order_num)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| log_db_error("Failed to update question", e))?
        .map(Question::try_from)
        .transpose()
    }

    /// Answers to the question go with it (`ON DELETE CASCADE`).
    async fn delete_question(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| log_db_error("Failed to delete question", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_attempt(&self, attempt: &NewAttempt) -> Result<Attempt, AppError> {
        sqlx::query_as::<_, Attempt>(&format!(
            r#"
            INSERT INTO attempts (id, quiz_id, name, device_token)
            VALUES ($1, $2, $3, $4)
            RETURNING {ATTEMPT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(attempt.quiz_id)
        .bind(&attempt.name)
        .bind(&attempt.device_token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| log_db_error("Failed to create attempt", e))
    }

    async fn get_attempt(&self, id: Uuid) -> Result<Option<Attempt>, AppError> {
        sqlx::query_as::<_, Attempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| log_db_error("Failed to fetch attempt", e))
    }

    async fn finalize_attempt(
        &self,
        id: Uuid,
        submitted_at: DateTime<Utc>,
        totals: AttemptTotals,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE attempts SET
                submitted_at = $2,
                total_correct = $3,
                total_time_ms = $4
            WHERE id = $1 AND submitted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(submitted_at)
        .bind(totals.total_correct)
        .bind(totals.total_time_ms)
        .execute(&self.pool)
        .await
        .map_err(|e| log_db_error("Failed to finalize attempt", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_attempts(&self, quiz_id: Uuid) -> Result<Vec<Attempt>, AppError> {
        sqlx::query_as::<_, Attempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE quiz_id = $1 ORDER BY started_at ASC, id ASC"
        ))
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| log_db_error("Failed to list attempts", e))
    }

    async fn list_submitted_attempts(&self, quiz_id: Uuid) -> Result<Vec<Attempt>, AppError> {
        sqlx::query_as::<_, Attempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts \
             WHERE quiz_id = $1 AND submitted_at IS NOT NULL \
             ORDER BY total_correct DESC, total_time_ms ASC"
        ))
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| log_db_error("Failed to list submitted attempts", e))
    }

    async fn insert_answer(&self, answer: &NewAnswer) -> Result<Answer, AppError> {
        sqlx::query_as::<_, Answer>(&format!(
            r#"
            INSERT INTO answers
                (id, attempt_id, question_id, selected_option_id, is_correct, time_taken_ms)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ANSWER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(answer.attempt_id)
        .bind(answer.question_id)
        .bind(&answer.selected_option_id)
        .bind(answer.is_correct)
        .bind(answer.time_taken_ms)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("Question was already answered".to_string())
            } else {
                log_db_error("Failed to record answer", e)
            }
        })
    }

    async fn list_answers(&self, attempt_ids: &[Uuid]) -> Result<Vec<Answer>, AppError> {
        if attempt_ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, Answer>(&format!(
            "SELECT {ANSWER_COLUMNS} FROM answers WHERE attempt_id = ANY($1) ORDER BY answered_at, id"
        ))
        .bind(attempt_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| log_db_error("Failed to list answers", e))
    }

    async fn find_admin(&self, username: &str) -> Result<Option<Admin>, AppError> {
        sqlx::query_as::<_, Admin>(
            "SELECT id, username, password, created_at FROM admins WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| log_db_error("Failed to fetch admin", e))
    }

    async fn insert_admin(&self, username: &str, password_hash: &str) -> Result<Admin, AppError> {
        sqlx::query_as::<_, Admin>(
            r#"
            INSERT INTO admins (id, username, password)
            VALUES ($1, $2, $3)
            RETURNING id, username, password, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Username '{username}' already exists"))
            } else {
                log_db_error("Failed to create admin", e)
            }
        })
    }
}
