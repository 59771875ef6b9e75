// src/session.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::attempt::Attempt;

/// Participant-side memory carried between the gate, the runner and the
/// leaderboard. The server hands it out, the client sends it back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Attempt currently being played. Cleared once it is submitted.
    #[serde(default)]
    pub attempt_id: Option<Uuid>,

    #[serde(default)]
    pub device_token: Option<String>,

    #[serde(default)]
    pub participant_name: Option<String>,

    /// Last attempt this participant submitted; the leaderboard flags it as "you".
    #[serde(default)]
    pub completed_attempt_id: Option<Uuid>,
}

impl SessionContext {
    /// Context for a freshly created attempt.
    pub fn begin(attempt: &Attempt) -> Self {
        Self {
            attempt_id: Some(attempt.id),
            device_token: Some(attempt.device_token.clone()),
            participant_name: Some(attempt.name.clone()),
            completed_attempt_id: None,
        }
    }

    pub fn in_progress(&self) -> Option<Uuid> {
        self.attempt_id
    }

    /// Moves the in-progress attempt into the completed slot.
    pub fn complete(&mut self) -> Option<Uuid> {
        let finished = self.attempt_id.take();
        if finished.is_some() {
            self.completed_attempt_id = finished;
        }
        finished
    }
}
