// src/models/attempt.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Represents the 'attempts' table.
/// One participant's single run through a quiz.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attempt {
    pub id: Uuid,
    pub quiz_id: Uuid,

    /// Participant display name, shown on the leaderboard.
    pub name: String,

    /// Loose repeat-attempt signal generated by the client. Not a credential.
    pub device_token: String,

    pub started_at: DateTime<Utc>,

    /// Set exactly once, when the attempt is finalized.
    pub submitted_at: Option<DateTime<Utc>>,

    pub total_correct: i32,
    pub total_time_ms: i64,
}

impl Attempt {
    pub fn is_submitted(&self) -> bool {
        self.submitted_at.is_some()
    }
}

/// Initial fields written by the gate.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub quiz_id: Uuid,
    pub name: String,
    pub device_token: String,
}

/// Aggregates written when an attempt is finalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptTotals {
    pub total_correct: i32,
    pub total_time_ms: i64,
}

/// DTO for the gate's start form.
#[derive(Debug, Deserialize)]
pub struct StartAttemptRequest {
    #[serde(default)]
    pub name: String,
}
