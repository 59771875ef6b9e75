// src/models/answer.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Represents the 'answers' table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Answer {
    pub id: Uuid,
    pub attempt_id: Uuid,
    pub question_id: Uuid,

    /// Empty when the countdown ran out without a selection.
    pub selected_option_id: String,

    /// Computed at submission time, never recomputed.
    pub is_correct: bool,

    pub time_taken_ms: i64,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAnswer {
    pub attempt_id: Uuid,
    pub question_id: Uuid,
    pub selected_option_id: String,
    pub is_correct: bool,
    pub time_taken_ms: i64,
}

/// DTO for a participant's selection.
#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub question_id: Uuid,
    pub option_id: String,
}
