// src/models/quiz.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;

/// How attempts of a quiz are ranked. Only one rule exists today:
/// most correct answers first, ties broken by lower total time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringStrategy {
    #[default]
    MostCorrectThenFastest,
}

impl ScoringStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoringStrategy::MostCorrectThenFastest => "most_correct_then_fastest",
        }
    }
}

impl TryFrom<String> for ScoringStrategy {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "most_correct_then_fastest" => Ok(ScoringStrategy::MostCorrectThenFastest),
            other => Err(AppError::InternalServerError(format!(
                "Unknown scoring strategy '{other}'"
            ))),
        }
    }
}

/// Represents the 'quizzes' table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,

    /// Closed quizzes reject new attempts and cannot be answered.
    pub is_open: bool,

    pub scoring_strategy: ScoringStrategy,
    pub shuffle_questions: bool,
    pub shuffle_options: bool,

    /// Per-question countdown in seconds. `None` means no time limit.
    pub time_per_question_sec: Option<i32>,

    /// Human-shareable 6-character code (`A-Z0-9`).
    pub quiz_code: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quiz {
    /// Countdown length for each question, if the quiz is timed.
    pub fn time_limit(&self) -> Option<u32> {
        self.time_per_question_sec
            .filter(|secs| *secs > 0)
            .map(|secs| secs as u32)
    }
}

/// What the gate shows a participant before they start.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicQuiz {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub quiz_code: String,
    pub time_per_question_sec: Option<i32>,
    pub question_count: i64,
}

impl PublicQuiz {
    pub fn new(quiz: Quiz, question_count: i64) -> Self {
        Self {
            id: quiz.id,
            title: quiz.title,
            description: quiz.description,
            quiz_code: quiz.quiz_code,
            time_per_question_sec: quiz.time_per_question_sec,
            question_count,
        }
    }
}

/// Fields written when a quiz is created. The store fills in id and timestamps.
#[derive(Debug, Clone)]
pub struct NewQuiz {
    pub title: String,
    pub description: Option<String>,
    pub is_open: bool,
    pub scoring_strategy: ScoringStrategy,
    pub shuffle_questions: bool,
    pub shuffle_options: bool,
    pub time_per_question_sec: Option<i32>,
    pub quiz_code: String,
}

/// DTO for creating a quiz.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(default)]
    pub shuffle_questions: bool,
    #[serde(default)]
    pub shuffle_options: bool,
    #[validate(range(min = 1, max = 3600))]
    pub time_per_question_sec: Option<i32>,
}

/// DTO for updating quiz settings. Absent fields are left untouched.
/// An empty description clears it; `clear_time_limit` removes the countdown.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub is_open: Option<bool>,
    pub shuffle_questions: Option<bool>,
    pub shuffle_options: Option<bool>,
    #[validate(range(min = 1, max = 3600))]
    pub time_per_question_sec: Option<i32>,
    #[serde(default)]
    pub clear_time_limit: bool,
}

/// Dashboard status filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Closed,
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub search: Option<String>,
    #[serde(default)]
    pub status: StatusFilter,
}

impl DashboardQuery {
    /// Case-insensitive match on title or description, then the status filter.
    pub fn matches(&self, quiz: &Quiz) -> bool {
        let status_ok = match self.status {
            StatusFilter::All => true,
            StatusFilter::Active => quiz.is_open,
            StatusFilter::Closed => !quiz.is_open,
        };
        if !status_ok {
            return false;
        }

        match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                quiz.title.to_lowercase().contains(&needle)
                    || quiz
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            }
        }
    }
}
