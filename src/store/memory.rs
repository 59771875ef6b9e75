// src/store/memory.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
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

use super::QuizStore;

#[derive(Default)]
struct Tables {
    quizzes: HashMap<Uuid, Quiz>,
    questions: HashMap<Uuid, Question>,
    attempts: HashMap<Uuid, Attempt>,
    answers: Vec<Answer>,
    admins: HashMap<String, Admin>,
}

/// Process-local store. Used when no `DATABASE_URL` is configured and by tests.
/// Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuizStore for MemoryStore {
    async fn get_quiz(&self, id: Uuid) -> Result<Option<Quiz>, AppError> {
        Ok(self.tables.read().await.quizzes.get(&id).cloned())
    }

    async fn find_quiz_by_code(&self, code: &str) -> Result<Option<Quiz>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .quizzes
            .values()
            .find(|q| q.quiz_code == code)
            .cloned())
    }

    async fn list_quizzes(&self) -> Result<Vec<Quiz>, AppError> {
        let tables = self.tables.read().await;
        let mut quizzes: Vec<Quiz> = tables.quizzes.values().cloned().collect();
        quizzes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(quizzes)
    }

    async fn insert_quiz(&self, quiz: &NewQuiz) -> Result<Quiz, AppError> {
        let mut tables = self.tables.write().await;
        if tables.quizzes.values().any(|q| q.quiz_code == quiz.quiz_code) {
            return Err(AppError::Conflict(format!(
                "Quiz code '{}' already exists",
                quiz.quiz_code
            )));
        }

        let now = Utc::now();
        let record = Quiz {
            id: Uuid::new_v4(),
            title: quiz.title.clone(),
            description: quiz.description.clone(),
            is_open: quiz.is_open,
            scoring_strategy: quiz.scoring_strategy,
            shuffle_questions: quiz.shuffle_questions,
            shuffle_options: quiz.shuffle_options,
            time_per_question_sec: quiz.time_per_question_sec,
            quiz_code: quiz.quiz_code.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.quizzes.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_quiz(&self, quiz: &Quiz) -> Result<Option<Quiz>, AppError> {
        let mut tables = self.tables.write().await;
        let Some(existing) = tables.quizzes.get_mut(&quiz.id) else {
            return Ok(None);
        };
        *existing = Quiz {
            created_at: existing.created_at,
            updated_at: Utc::now(),
            ..quiz.clone()
        };
        Ok(Some(existing.clone()))
    }

    async fn delete_quiz(&self, id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        if tables.quizzes.remove(&id).is_none() {
            return Ok(false);
        }
        tables.questions.retain(|_, q| q.quiz_id != id);
        let attempt_ids: Vec<Uuid> = tables
            .attempts
            .values()
            .filter(|a| a.quiz_id == id)
            .map(|a| a.id)
            .collect();
        tables.attempts.retain(|_, a| a.quiz_id != id);
        tables.answers.retain(|a| !attempt_ids.contains(&a.attempt_id));
        Ok(true)
    }

    async fn list_questions(&self, quiz_id: Uuid) -> Result<Vec<Question>, AppError> {
        let tables = self.tables.read().await;
        let mut questions: Vec<Question> = tables
            .questions
            .values()
            .filter(|q| q.quiz_id == quiz_id)
            .cloned()
            .collect();
        questions.sort_by(|a, b| {
            a.order_num
                .cmp(&b.order_num)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(questions)
    }

    async fn count_questions(&self, quiz_id: Uuid) -> Result<i64, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .questions
            .values()
            .filter(|q| q.quiz_id == quiz_id)
            .count() as i64)
    }

    async fn get_question(&self, id: Uuid) -> Result<Option<Question>, AppError> {
        Ok(self.tables.read().await.questions.get(&id).cloned())
    }

    async fn insert_question(
        &self,
        quiz_id: Uuid,
        draft: &QuestionDraft,
        order_num: i32,
    ) -> Result<Question, AppError> {
        let mut tables = self.tables.write().await;
        if !tables.quizzes.contains_key(&quiz_id) {
            return Err(AppError::NotFound("Quiz not found".to_string()));
        }
        let question = Question {
            id: Uuid::new_v4(),
            quiz_id,
            text: draft.text.clone(),
            options: draft.options.clone(),
            answer_id: draft.answer_id.clone(),
            points: draft.points,
            order_num,
            created_at: Utc::now(),
        };
        tables.questions.insert(question.id, question.clone());
        Ok(question)
    }

    async fn update_question(&self, question: &Question) -> Result<Option<Question>, AppError> {
        let mut tables = self.tables.write().await;
        let Some(existing) = tables.questions.get_mut(&question.id) else {
            return Ok(None);
        };
        *existing = Question {
            quiz_id: existing.quiz_id,
            created_at: existing.created_at,
            ..question.clone()
        };
        Ok(Some(existing.clone()))
    }

    async fn delete_question(&self, id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        if tables.questions.remove(&id).is_none() {
            return Ok(false);
        }
        tables.answers.retain(|a| a.question_id != id);
        Ok(true)
    }

    async fn insert_attempt(&self, attempt: &NewAttempt) -> Result<Attempt, AppError> {
        let mut tables = self.tables.write().await;
        if !tables.quizzes.contains_key(&attempt.quiz_id) {
            return Err(AppError::NotFound("Quiz not found".to_string()));
        }
        let record = Attempt {
            id: Uuid::new_v4(),
            quiz_id: attempt.quiz_id,
            name: attempt.name.clone(),
            device_token: attempt.device_token.clone(),
            started_at: Utc::now(),
            submitted_at: None,
            total_correct: 0,
            total_time_ms: 0,
        };
        tables.attempts.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_attempt(&self, id: Uuid) -> Result<Option<Attempt>, AppError> {
        Ok(self.tables.read().await.attempts.get(&id).cloned())
    }

    async fn finalize_attempt(
        &self,
        id: Uuid,
        submitted_at: DateTime<Utc>,
        totals: AttemptTotals,
    ) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        match tables.attempts.get_mut(&id) {
            Some(attempt) if attempt.submitted_at.is_none() => {
                attempt.submitted_at = Some(submitted_at);
                attempt.total_correct = totals.total_correct;
                attempt.total_time_ms = totals.total_time_ms;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_attempts(&self, quiz_id: Uuid) -> Result<Vec<Attempt>, AppError> {
        let tables = self.tables.read().await;
        let mut attempts: Vec<Attempt> = tables
            .attempts
            .values()
            .filter(|a| a.quiz_id == quiz_id)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        Ok(attempts)
    }

    async fn list_submitted_attempts(&self, quiz_id: Uuid) -> Result<Vec<Attempt>, AppError> {
        let mut attempts = self.list_attempts(quiz_id).await?;
        attempts.retain(Attempt::is_submitted);
        Ok(attempts)
    }

    async fn insert_answer(&self, answer: &NewAnswer) -> Result<Answer, AppError> {
        let mut tables = self.tables.write().await;
        if !tables.attempts.contains_key(&answer.attempt_id) {
            return Err(AppError::NotFound("Attempt not found".to_string()));
        }
        if tables
            .answers
            .iter()
            .any(|a| a.attempt_id == answer.attempt_id && a.question_id == answer.question_id)
        {
            return Err(AppError::Conflict("Question was already answered".to_string()));
        }
        let record = Answer {
            id: Uuid::new_v4(),
            attempt_id: answer.attempt_id,
            question_id: answer.question_id,
            selected_option_id: answer.selected_option_id.clone(),
            is_correct: answer.is_correct,
            time_taken_ms: answer.time_taken_ms,
            answered_at: Utc::now(),
        };
        tables.answers.push(record.clone());
        Ok(record)
    }

    async fn list_answers(&self, attempt_ids: &[Uuid]) -> Result<Vec<Answer>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .answers
            .iter()
            .filter(|a| attempt_ids.contains(&a.attempt_id))
            .cloned()
            .collect())
    }

    async fn find_admin(&self, username: &str) -> Result<Option<Admin>, AppError> {
        Ok(self.tables.read().await.admins.get(username).cloned())
    }

    async fn insert_admin(&self, username: &str, password_hash: &str) -> Result<Admin, AppError> {
        let mut tables = self.tables.write().await;
        if tables.admins.contains_key(username) {
            return Err(AppError::Conflict(format!(
                "Username '{username}' already exists"
            )));
        }
        let admin = Admin {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password: password_hash.to_string(),
            created_at: Utc::now(),
        };
        tables.admins.insert(admin.username.clone(), admin.clone());
        Ok(admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{question::QuestionOption, quiz::ScoringStrategy};

    fn new_quiz(code: &str) -> NewQuiz {
        NewQuiz {
            title: "Capitals".to_string(),
            description: None,
            is_open: true,
            scoring_strategy: ScoringStrategy::default(),
            shuffle_questions: false,
            shuffle_options: false,
            time_per_question_sec: None,
            quiz_code: code.to_string(),
        }
    }

    fn draft(text: &str) -> QuestionDraft {
        QuestionDraft {
            text: text.to_string(),
            options: vec![
                QuestionOption { id: "a".into(), text: "Paris".into() },
                QuestionOption { id: "b".into(), text: "Rome".into() },
            ],
            answer_id: "a".to_string(),
            points: 1,
        }
    }

    #[tokio::test]
    async fn duplicate_code_is_a_conflict() {
        let store = MemoryStore::new();
        store.insert_quiz(&new_quiz("ABC123")).await.unwrap();
        let err = store.insert_quiz(&new_quiz("ABC123")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn questions_come_back_in_order_num_order() {
        let store = MemoryStore::new();
        let quiz = store.insert_quiz(&new_quiz("ABC123")).await.unwrap();
        store.insert_question(quiz.id, &draft("third"), 3).await.unwrap();
        store.insert_question(quiz.id, &draft("first"), 1).await.unwrap();
        store.insert_question(quiz.id, &draft("second"), 2).await.unwrap();

        let texts: Vec<String> = store
            .list_questions(quiz.id)
            .await
            .unwrap()
            .into_iter()
            .map(|q| q.text)
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(store.count_questions(quiz.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn finalize_only_once() {
        let store = MemoryStore::new();
        let quiz = store.insert_quiz(&new_quiz("ABC123")).await.unwrap();
        let attempt = store
            .insert_attempt(&NewAttempt {
                quiz_id: quiz.id,
                name: "Ada".into(),
                device_token: "t".into(),
            })
            .await
            .unwrap();

        let totals = AttemptTotals { total_correct: 2, total_time_ms: 900 };
        assert!(store.finalize_attempt(attempt.id, Utc::now(), totals).await.unwrap());
        assert!(!store.finalize_attempt(attempt.id, Utc::now(), totals).await.unwrap());
        assert!(!store.finalize_attempt(Uuid::new_v4(), Utc::now(), totals).await.unwrap());

        let submitted = store.list_submitted_attempts(quiz.id).await.unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].total_time_ms, 900);
    }

    #[tokio::test]
    async fn deleting_a_quiz_cascades() {
        let store = MemoryStore::new();
        let quiz = store.insert_quiz(&new_quiz("ABC123")).await.unwrap();
        let question = store.insert_question(quiz.id, &draft("q"), 1).await.unwrap();
        let attempt = store
            .insert_attempt(&NewAttempt {
                quiz_id: quiz.id,
                name: "Ada".into(),
                device_token: "t".into(),
            })
            .await
            .unwrap();
        store
            .insert_answer(&NewAnswer {
                attempt_id: attempt.id,
                question_id: question.id,
                selected_option_id: "a".into(),
                is_correct: true,
                time_taken_ms: 10,
            })
            .await
            .unwrap();

        assert!(store.delete_quiz(quiz.id).await.unwrap());
        assert!(store.get_question(question.id).await.unwrap().is_none());
        assert!(store.get_attempt(attempt.id).await.unwrap().is_none());
        assert!(store.list_answers(&[attempt.id]).await.unwrap().is_empty());
    }

    async fn answered_attempt(store: &MemoryStore) -> (Question, Question, Attempt) {
        let quiz = store.insert_quiz(&new_quiz("ABC123")).await.unwrap();
        let kept = store.insert_question(quiz.id, &draft("kept"), 1).await.unwrap();
        let dropped = store.insert_question(quiz.id, &draft("dropped"), 2).await.unwrap();
        let attempt = store
            .insert_attempt(&NewAttempt {
                quiz_id: quiz.id,
                name: "Ada".into(),
                device_token: "t".into(),
            })
            .await
            .unwrap();
        for question in [&kept, &dropped] {
            store
                .insert_answer(&NewAnswer {
                    attempt_id: attempt.id,
                    question_id: question.id,
                    selected_option_id: "a".into(),
                    is_correct: true,
                    time_taken_ms: 10,
                })
                .await
                .unwrap();
        }
        (kept, dropped, attempt)
    }

    #[tokio::test]
    async fn deleting_a_question_drops_its_answers() {
        let store = MemoryStore::new();
        let (kept, dropped, attempt) = answered_attempt(&store).await;

        assert!(store.delete_question(dropped.id).await.unwrap());
        assert!(!store.delete_question(dropped.id).await.unwrap());

        let answers = store.list_answers(&[attempt.id]).await.unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].question_id, kept.id);
    }

    #[tokio::test]
    async fn second_answer_to_a_question_is_a_conflict() {
        let store = MemoryStore::new();
        let (kept, _, attempt) = answered_attempt(&store).await;

        let err = store
            .insert_answer(&NewAnswer {
                attempt_id: attempt.id,
                question_id: kept.id,
                selected_option_id: "b".into(),
                is_correct: false,
                time_taken_ms: 20,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.list_answers(&[attempt.id]).await.unwrap().len(), 2);
    }
}
