// src/runner/scoring.rs

use uuid::Uuid;

use crate::models::{attempt::AttemptTotals, question::Question};

/// One answer as the runner remembers it, in presentation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAnswer {
    pub question_id: Uuid,
    pub selected_option_id: String,
    pub is_correct: bool,
    pub time_taken_ms: i64,
}

/// An empty selection (timeout) is never correct.
pub fn is_correct(question: &Question, selected_option_id: &str) -> bool {
    !selected_option_id.is_empty() && selected_option_id == question.answer_id
}

/// Aggregates written on finalize: count of correct answers and summed time.
pub fn tally(answers: &[RecordedAnswer]) -> AttemptTotals {
    AttemptTotals {
        total_correct: answers.iter().filter(|a| a.is_correct).count() as i32,
        total_time_ms: answers.iter().map(|a| a.time_taken_ms).sum(),
    }
}
