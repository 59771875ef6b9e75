// src/runner/mod.rs

//! The attempt state machine.
//!
//! ```text
//! Initializing -> Loading -> Presenting(i) -> Submitting(i) -> Presenting(i+1)
//!                                                           \-> Finishing -> Finished
//! Initializing | Loading -> Unavailable
//! ```
//!
//! Every transition is awaited before the next one starts, so answers are
//! written strictly in presentation order.

pub mod countdown;
pub mod scoring;

use chrono::Utc;
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        answer::{Answer, NewAnswer},
        attempt::AttemptTotals,
        question::{PublicQuestion, Question},
        quiz::Quiz,
    },
    session::SessionContext,
    store::QuizStore,
};

use countdown::{Countdown, Tick};
use scoring::RecordedAnswer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "index", rename_all = "snake_case")]
pub enum RunnerState {
    Initializing,
    Loading,
    Presenting(usize),
    Submitting(usize),
    Finishing,
    Finished,
    Unavailable,
}

/// What the participant did with the current question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Option(String),
    /// Countdown reached zero without a pick.
    Timeout,
}

impl Selection {
    fn option_id(&self) -> &str {
        match self {
            Selection::Option(id) => id,
            Selection::Timeout => "",
        }
    }
}

/// Where a successful submission led.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Next(usize),
    Finish,
}

/// Snapshot returned to the participant after every call.
#[derive(Debug, Clone, Serialize)]
pub struct RunView {
    pub attempt_id: Option<Uuid>,
    pub quiz_id: Option<Uuid>,
    pub state: RunnerState,
    /// 1-based position of the presented question; 0 when none is shown.
    pub question_number: usize,
    pub question_count: usize,
    pub question: Option<PublicQuestion>,
    /// Seconds left on the countdown. Absent for untimed quizzes.
    pub time_left: Option<u32>,
    pub answered: usize,
    pub totals: Option<AttemptTotals>,
    pub session: SessionContext,
}

pub struct QuizRunner {
    state: RunnerState,
    session: SessionContext,
    attempt_id: Option<Uuid>,
    quiz: Option<Quiz>,
    questions: Vec<Question>,
    answers: Vec<RecordedAnswer>,
    presented_at: Instant,
    countdown: Option<Countdown>,
    /// Bumped on every presentation so a stale countdown task can tell it lost.
    epoch: u64,
    /// Set on reaching `Finished` or `Unavailable`.
    ended_at: Option<Instant>,
    last_active: Instant,
    totals: Option<AttemptTotals>,
}

impl QuizRunner {
    pub fn new(session: SessionContext) -> Self {
        Self {
            state: RunnerState::Initializing,
            session,
            attempt_id: None,
            quiz: None,
            questions: Vec::new(),
            answers: Vec::new(),
            presented_at: Instant::now(),
            countdown: None,
            epoch: 0,
            ended_at: None,
            last_active: Instant::now(),
            totals: None,
        }
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn quiz_id(&self) -> Option<Uuid> {
        self.quiz.as_ref().map(|q| q.id)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_presenting(&self) -> bool {
        matches!(self.state, RunnerState::Presenting(_))
    }

    pub fn answers(&self) -> &[RecordedAnswer] {
        &self.answers
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn ended_at(&self) -> Option<Instant> {
        self.ended_at
    }

    pub fn last_active(&self) -> Instant {
        self.last_active
    }

    /// Records participant activity; the registry evicts runs left idle.
    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    /// Whether `device_token` is the one the attempt was started with.
    pub fn is_owned_by(&self, device_token: &str) -> bool {
        self.session.device_token.as_deref() == Some(device_token)
    }

    pub fn current_question(&self) -> Option<&Question> {
        match self.state {
            RunnerState::Presenting(i) | RunnerState::Submitting(i) => self.questions.get(i),
            _ => None,
        }
    }

    pub fn time_left(&self) -> Option<u32> {
        self.countdown.map(|c| c.remaining())
    }

    /// Epoch of the current presentation when it runs under a countdown.
    pub fn countdown_epoch(&self) -> Option<u64> {
        match (self.state, self.countdown) {
            (RunnerState::Presenting(_), Some(c)) if !c.is_expired() => Some(self.epoch),
            _ => None,
        }
    }

    /// Recovers the in-progress attempt from the session context.
    pub fn initialize(&mut self) -> Result<Uuid, AppError> {
        if self.state != RunnerState::Initializing {
            return Err(AppError::Conflict("Run already initialized".to_string()));
        }
        match self.session.in_progress() {
            Some(attempt_id) => {
                self.attempt_id = Some(attempt_id);
                self.state = RunnerState::Loading;
                Ok(attempt_id)
            }
            None => {
                tracing::warn!("Runner started without an attempt in the session");
                self.mark_unavailable();
                Err(AppError::Unavailable(
                    "No attempt in progress. Please enter your name to start the quiz".to_string(),
                ))
            }
        }
    }

    /// Loads the quiz and its questions, shuffles as configured, and presents
    /// the first question still unanswered. Answers already stored for the
    /// attempt are kept, so a run rebuilt after a restart never asks the same
    /// question twice. Any failure lands in `Unavailable`.
    pub async fn load(&mut self, store: &dyn QuizStore, quiz_id: Uuid) -> Result<(), AppError> {
        let Some(attempt_id) = self.attempt_id.filter(|_| self.state == RunnerState::Loading)
        else {
            return Err(AppError::Conflict("Run is not loading".to_string()));
        };

        match self.fetch(store, quiz_id, attempt_id).await {
            Ok((quiz, questions, stored)) => {
                let mut rng = StdRng::from_entropy();
                self.arrange(quiz, questions, &mut rng);
                self.resume(stored);
                tracing::info!(
                    "Attempt {} loaded {} questions, {} already answered",
                    attempt_id,
                    self.questions.len(),
                    self.answers.len()
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Attempt {} could not be loaded: {}", attempt_id, e);
                self.mark_unavailable();
                Err(e)
            }
        }
    }

    async fn fetch(
        &self,
        store: &dyn QuizStore,
        quiz_id: Uuid,
        attempt_id: Uuid,
    ) -> Result<(Quiz, Vec<Question>, Vec<Answer>), AppError> {
        // Fail closed: an attempt the store does not know is never played.
        let attempt = store
            .get_attempt(attempt_id)
            .await?
            .ok_or_else(|| AppError::Unavailable("Attempt not found".to_string()))?;

        if attempt.quiz_id != quiz_id {
            return Err(AppError::Unavailable(
                "Attempt belongs to another quiz".to_string(),
            ));
        }
        if attempt.is_submitted() {
            return Err(AppError::Unavailable(
                "Attempt was already submitted".to_string(),
            ));
        }
        if self.session.device_token.as_deref() != Some(attempt.device_token.as_str()) {
            return Err(AppError::Unavailable(
                "Attempt was started on another device".to_string(),
            ));
        }

        let quiz = store
            .get_quiz(quiz_id)
            .await?
            .filter(|q| q.is_open)
            .ok_or_else(AppError::unavailable)?;

        let questions = store.list_questions(quiz_id).await?;
        if questions.is_empty() {
            return Err(AppError::Unavailable("Quiz has no questions".to_string()));
        }

        let stored = store.list_answers(&[attempt_id]).await?;
        Ok((quiz, questions, stored))
    }

    /// Applies the quiz's shuffle settings once, at load.
    fn arrange<R: Rng + ?Sized>(&mut self, quiz: Quiz, mut questions: Vec<Question>, rng: &mut R) {
        if quiz.shuffle_questions {
            questions.shuffle(rng);
        }
        if quiz.shuffle_options {
            for question in &mut questions {
                question.options.shuffle(rng);
            }
        }
        self.quiz = Some(quiz);
        self.questions = questions;
    }

    /// Moves already answered questions to the front, in the order they were
    /// answered, and picks up at the first one left. Finishing when none is.
    fn resume(&mut self, stored: Vec<Answer>) {
        for answer in stored {
            let Some(pos) = self.questions[self.answers.len()..]
                .iter()
                .position(|q| q.id == answer.question_id)
            else {
                continue;
            };
            let at = self.answers.len();
            self.questions[at..=at + pos].rotate_right(1);
            self.answers.push(RecordedAnswer {
                question_id: answer.question_id,
                selected_option_id: answer.selected_option_id,
                is_correct: answer.is_correct,
                time_taken_ms: answer.time_taken_ms,
            });
        }

        if self.answers.len() < self.questions.len() {
            self.present(self.answers.len());
        } else {
            self.state = RunnerState::Finishing;
            self.countdown = None;
        }
    }

    fn present(&mut self, index: usize) {
        self.state = RunnerState::Presenting(index);
        self.presented_at = Instant::now();
        self.last_active = self.presented_at;
        self.countdown = self
            .quiz
            .as_ref()
            .and_then(Quiz::time_limit)
            .map(Countdown::new);
        self.epoch += 1;
    }

    /// One countdown second. `None` when nothing is being timed.
    pub fn tick(&mut self) -> Option<Tick> {
        if !self.is_presenting() {
            return None;
        }
        self.countdown.as_mut().map(Countdown::tick)
    }

    /// Participant picked `option_id` for `question_id`.
    ///
    /// If the countdown already ran out (a failed timeout write being
    /// retried), the answer is recorded as a timeout whatever was picked.
    pub async fn answer(
        &mut self,
        store: &dyn QuizStore,
        question_id: Uuid,
        option_id: &str,
    ) -> Result<Advance, AppError> {
        let question = self
            .current_question()
            .filter(|_| self.is_presenting())
            .ok_or_else(|| AppError::Conflict("No question is awaiting an answer".to_string()))?;

        if question.id != question_id {
            return Err(AppError::Conflict(
                "That question is no longer being presented".to_string(),
            ));
        }
        if !question.has_option(option_id) {
            return Err(AppError::BadRequest("Unknown option".to_string()));
        }

        let selection = if self.countdown.is_some_and(|c| c.is_expired()) {
            Selection::Timeout
        } else {
            Selection::Option(option_id.to_string())
        };
        self.submit(store, selection).await
    }

    /// Countdown hit zero: records an empty selection for the current question.
    pub async fn expire(&mut self, store: &dyn QuizStore) -> Result<Advance, AppError> {
        if !self.countdown.is_some_and(|c| c.is_expired()) {
            return Err(AppError::Conflict("Countdown is still running".to_string()));
        }
        self.submit(store, Selection::Timeout).await
    }

    async fn submit(
        &mut self,
        store: &dyn QuizStore,
        selection: Selection,
    ) -> Result<Advance, AppError> {
        let (RunnerState::Presenting(index), Some(attempt_id)) = (self.state, self.attempt_id)
        else {
            return Err(AppError::Conflict("No question is awaiting an answer".to_string()));
        };
        let question = &self.questions[index];

        let recorded = RecordedAnswer {
            question_id: question.id,
            selected_option_id: selection.option_id().to_string(),
            is_correct: scoring::is_correct(question, selection.option_id()),
            time_taken_ms: i64::try_from(self.presented_at.elapsed().as_millis())
                .unwrap_or(i64::MAX),
        };

        self.state = RunnerState::Submitting(index);
        let write = store
            .insert_answer(&NewAnswer {
                attempt_id,
                question_id: recorded.question_id,
                selected_option_id: recorded.selected_option_id.clone(),
                is_correct: recorded.is_correct,
                time_taken_ms: recorded.time_taken_ms,
            })
            .await;

        if let Err(e) = write {
            // Halt on this question; the baseline is kept for the retry.
            tracing::error!("Attempt {} failed to record answer {}: {}", attempt_id, index, e);
            self.state = RunnerState::Presenting(index);
            return Err(e);
        }
        self.answers.push(recorded);

        if index + 1 < self.questions.len() {
            self.present(index + 1);
            Ok(Advance::Next(index + 1))
        } else {
            self.state = RunnerState::Finishing;
            self.countdown = None;
            Ok(Advance::Finish)
        }
    }

    /// Writes `submitted_at` and the aggregates, then moves the session's
    /// attempt into the completed slot. Safe to call again after a failure.
    pub async fn finish(&mut self, store: &dyn QuizStore) -> Result<AttemptTotals, AppError> {
        let (RunnerState::Finishing, Some(attempt_id)) = (self.state, self.attempt_id) else {
            return Err(AppError::Conflict("Run is not ready to finish".to_string()));
        };

        let totals = scoring::tally(&self.answers);
        let written = store
            .finalize_attempt(attempt_id, Utc::now(), totals)
            .await
            .inspect_err(|e| {
                tracing::error!("Attempt {} failed to finalize: {}", attempt_id, e);
            })?;
        if !written {
            return Err(AppError::Conflict(
                "Attempt was already submitted or no longer exists".to_string(),
            ));
        }

        self.session.complete();
        self.totals = Some(totals);
        self.ended_at = Some(Instant::now());
        self.state = RunnerState::Finished;
        tracing::info!(
            "Attempt {} finished: {} correct in {} ms",
            attempt_id,
            totals.total_correct,
            totals.total_time_ms
        );
        Ok(totals)
    }

    /// Terminal: the attempt cannot be played, e.g. the quiz was closed under a live run.
    pub fn mark_unavailable(&mut self) {
        self.state = RunnerState::Unavailable;
        self.countdown = None;
        self.ended_at = Some(Instant::now());
    }

    pub fn view(&self) -> RunView {
        let question = self.current_question();
        RunView {
            attempt_id: self.attempt_id,
            quiz_id: self.quiz_id(),
            state: self.state,
            question_number: match self.state {
                RunnerState::Presenting(i) | RunnerState::Submitting(i) => i + 1,
                _ => 0,
            },
            question_count: self.questions.len(),
            question: question.map(PublicQuestion::from),
            time_left: question.and(self.time_left()),
            answered: self.answers.len(),
            totals: self.totals,
            session: self.session.clone(),
        }
    }
}
