// src/analytics.rs

use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{answer::Answer, attempt::Attempt, question::Question},
    store::QuizStore,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionDifficulty {
    pub question_id: Uuid,
    pub text: String,
    /// Rounded percentage of correct answers among completed attempts.
    pub correct_rate: u32,
    pub answers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizAnalytics {
    pub total_attempts: usize,
    pub completed_attempts: usize,
    pub completion_rate: u32,
    pub average_score: f64,
    pub average_time_ms: f64,
    /// Hardest question first.
    pub question_difficulty: Vec<QuestionDifficulty>,
}

fn percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    (part as f64 / whole as f64 * 100.0).round() as u32
}

impl QuizAnalytics {
    /// `answers` must belong to the completed attempts only.
    pub fn compute(attempts: &[Attempt], questions: &[Question], answers: &[Answer]) -> Self {
        let completed: Vec<&Attempt> = attempts.iter().filter(|a| a.is_submitted()).collect();
        let n = completed.len();

        let (average_score, average_time_ms) = if n == 0 {
            (0.0, 0.0)
        } else {
            (
                completed.iter().map(|a| f64::from(a.total_correct)).sum::<f64>() / n as f64,
                completed.iter().map(|a| a.total_time_ms as f64).sum::<f64>() / n as f64,
            )
        };

        let mut question_difficulty: Vec<QuestionDifficulty> = if answers.is_empty() {
            Vec::new()
        } else {
            questions
                .iter()
                .map(|q| {
                    let (total, correct) = answers
                        .iter()
                        .filter(|a| a.question_id == q.id)
                        .fold((0, 0), |(t, c), a| (t + 1, c + usize::from(a.is_correct)));
                    QuestionDifficulty {
                        question_id: q.id,
                        text: q.text.clone(),
                        correct_rate: percent(correct, total),
                        answers: total,
                    }
                })
                .collect()
        };
        // Stable, so equal rates keep question order.
        question_difficulty.sort_by_key(|d| d.correct_rate);

        Self {
            total_attempts: attempts.len(),
            completed_attempts: n,
            completion_rate: percent(n, attempts.len()),
            average_score,
            average_time_ms,
            question_difficulty,
        }
    }

    pub async fn load(store: &dyn QuizStore, quiz_id: Uuid) -> Result<Self, AppError> {
        let attempts = store.list_attempts(quiz_id).await?;
        let questions = store.list_questions(quiz_id).await?;
        let completed_ids: Vec<Uuid> = attempts
            .iter()
            .filter(|a| a.is_submitted())
            .map(|a| a.id)
            .collect();
        let answers = if completed_ids.is_empty() {
            Vec::new()
        } else {
            store.list_answers(&completed_ids).await?
        };
        Ok(Self::compute(&attempts, &questions, &answers))
    }
}
