// src/runs.rs

//! Live runners, one per attempt, plus the per-question countdown tasks.
//!
//! A run is reachable by its attempt id and the device token the attempt
//! was started with. Anything else is answered as "not found".

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::Duration,
};

use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
    time::{self, Instant},
};
use uuid::Uuid;

use crate::{
    config::{DEFAULT_RUN_IDLE_TIMEOUT, FINISHED_RUN_RETENTION},
    error::AppError,
    gate::{self, QuizKey},
    runner::{Advance, QuizRunner, RunView, RunnerState, countdown::Tick},
    session::SessionContext,
    store::SharedStore,
};

type RunHandle = Arc<Mutex<QuizRunner>>;
type RunMap = RwLock<HashMap<Uuid, RunHandle>>;

#[derive(Clone)]
pub struct RunRegistry {
    runs: Arc<RunMap>,
    idle_timeout: Duration,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_RUN_IDLE_TIMEOUT)
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout,
        }
    }

    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }

    async fn handle(&self, attempt_id: Uuid) -> Result<RunHandle, AppError> {
        self.runs
            .read()
            .await
            .get(&attempt_id)
            .cloned()
            .ok_or_else(run_not_found)
    }

    /// Returns the live run for the session's attempt, or loads a new one.
    /// Reopening never reshuffles. A run rebuilt from the store picks up
    /// after the last stored answer.
    pub async fn open(
        &self,
        store: &SharedStore,
        key: &QuizKey,
        session: SessionContext,
    ) -> Result<RunView, AppError> {
        self.prune().await;

        let mut runner = QuizRunner::new(session);
        let attempt_id = runner.initialize()?;
        let quiz = gate::find_quiz(store.as_ref(), key).await?;

        let existing = self.runs.read().await.get(&attempt_id).cloned();
        if let Some(existing) = existing {
            let mut live = existing.lock().await;
            let token = runner.session().device_token.as_deref().unwrap_or_default();
            if live.quiz_id() != Some(quiz.id) || !live.is_owned_by(token) {
                tracing::warn!("Attempt {} reopened with a mismatched quiz or device", attempt_id);
                return Err(AppError::Unavailable(
                    "Attempt does not belong to this quiz or device".to_string(),
                ));
            }
            live.touch();
            return Ok(live.view());
        }

        runner.load(store.as_ref(), quiz.id).await?;

        let handle = {
            let mut runs = self.runs.write().await;
            runs.entry(attempt_id)
                .or_insert_with(|| Arc::new(Mutex::new(runner)))
                .clone()
        };

        let mut live = handle.lock().await;
        match live.state() {
            RunnerState::Finishing => {
                tracing::info!("Attempt {} resumed with every question answered", attempt_id);
                live.finish(store.as_ref()).await?;
            }
            _ => {
                if let Some(epoch) = live.countdown_epoch() {
                    spawn_countdown(store.clone(), handle.clone(), epoch);
                }
            }
        }
        Ok(live.view())
    }

    pub async fn view(&self, attempt_id: Uuid, device_token: &str) -> Result<RunView, AppError> {
        let handle = self.handle(attempt_id).await?;
        let mut runner = handle.lock().await;
        claim(&mut runner, device_token)?;
        Ok(runner.view())
    }

    /// Records the participant's pick and moves on. Answering the last
    /// question finalizes the attempt in the same call.
    pub async fn answer(
        &self,
        store: &SharedStore,
        attempt_id: Uuid,
        device_token: &str,
        question_id: Uuid,
        option_id: &str,
    ) -> Result<RunView, AppError> {
        let handle = self.handle(attempt_id).await?;
        let mut runner = handle.lock().await;
        claim(&mut runner, device_token)?;

        if let (true, Some(quiz_id)) = (runner.is_presenting(), runner.quiz_id()) {
            let still_open = store.get_quiz(quiz_id).await?.is_some_and(|q| q.is_open);
            if !still_open {
                tracing::warn!("Quiz {} closed under attempt {}", quiz_id, attempt_id);
                runner.mark_unavailable();
                return Err(AppError::unavailable());
            }
        }

        match runner.answer(store.as_ref(), question_id, option_id).await? {
            Advance::Next(_) => {
                if let Some(epoch) = runner.countdown_epoch() {
                    spawn_countdown(store.clone(), handle.clone(), epoch);
                }
            }
            Advance::Finish => {
                runner.finish(store.as_ref()).await?;
            }
        }
        Ok(runner.view())
    }

    /// Finalizes a run left in `Finishing`. A finished run is returned as is.
    pub async fn finish(
        &self,
        store: &SharedStore,
        attempt_id: Uuid,
        device_token: &str,
    ) -> Result<RunView, AppError> {
        let handle = self.handle(attempt_id).await?;
        let mut runner = handle.lock().await;
        claim(&mut runner, device_token)?;
        if runner.state() != RunnerState::Finished {
            runner.finish(store.as_ref()).await?;
        }
        Ok(runner.view())
    }

    /// Drops runs that ended more than `FINISHED_RUN_RETENTION` ago and runs
    /// nobody touched within the idle timeout. Returns how many went.
    pub async fn prune(&self) -> usize {
        let mut runs = self.runs.write().await;
        let before = runs.len();
        runs.retain(|_, handle| match handle.try_lock() {
            Ok(runner) => match runner.ended_at() {
                Some(at) => at.elapsed() < FINISHED_RUN_RETENTION,
                None => runner.last_active().elapsed() < self.idle_timeout,
            },
            Err(_) => true,
        });
        let dropped = before - runs.len();
        if dropped > 0 {
            tracing::debug!("Pruned {} runs, {} left", dropped, runs.len());
        }
        dropped
    }

    /// Prunes every `period` until the last clone of the registry is dropped.
    pub fn spawn_pruner(&self, period: Duration) -> JoinHandle<()> {
        let runs: Weak<RunMap> = Arc::downgrade(&self.runs);
        let idle_timeout = self.idle_timeout;
        tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                let Some(runs) = runs.upgrade() else {
                    return;
                };
                RunRegistry { runs, idle_timeout }.prune().await;
            }
        })
    }
}

fn run_not_found() -> AppError {
    AppError::NotFound("Run not found".to_string())
}

/// Owner check plus activity stamp for calls addressed by attempt id.
fn claim(runner: &mut QuizRunner, device_token: &str) -> Result<(), AppError> {
    if !runner.is_owned_by(device_token) {
        return Err(run_not_found());
    }
    runner.touch();
    Ok(())
}

/// Ticks the presentation identified by `epoch` once per second. The task
/// exits as soon as the runner has moved past that presentation.
fn spawn_countdown(store: SharedStore, handle: RunHandle, epoch: u64) {
    tokio::spawn(async move {
        let period = Duration::from_secs(1);
        let mut interval = time::interval_at(Instant::now() + period, period);

        loop {
            interval.tick().await;
            let mut runner = handle.lock().await;
            if runner.countdown_epoch() != Some(epoch) {
                return;
            }
            match runner.tick() {
                Some(Tick::Running(_)) => continue,
                Some(Tick::Expired) => {}
                None => return,
            }

            match runner.expire(store.as_ref()).await {
                Ok(Advance::Next(_)) => {
                    if let Some(next) = runner.countdown_epoch() {
                        spawn_countdown(store.clone(), handle.clone(), next);
                    }
                }
                Ok(Advance::Finish) => {
                    if let Err(e) = runner.finish(store.as_ref()).await {
                        tracing::error!("Timed-out run could not be finalized: {}", e);
                    }
                }
                // The runner stays on the question; the next pick is recorded as a timeout.
                Err(e) => tracing::error!("Timeout could not be recorded: {}", e),
            }
            return;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            question::{QuestionDraft, QuestionOption},
            quiz::{NewQuiz, Quiz, ScoringStrategy},
        },
        store::MemoryStore,
    };

    async fn setup(time_limit: Option<i32>, shuffle: bool) -> (SharedStore, Quiz, Vec<Uuid>) {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let quiz = store
            .insert_quiz(&NewQuiz {
                title: "Rivers".to_string(),
                description: None,
                is_open: true,
                scoring_strategy: ScoringStrategy::default(),
                shuffle_questions: shuffle,
                shuffle_options: shuffle,
                time_per_question_sec: time_limit,
                quiz_code: "RIVERS".to_string(),
            })
            .await
            .unwrap();

        let mut ids = Vec::new();
        for i in 0..2 {
            let draft = QuestionDraft {
                text: format!("River {i}"),
                options: vec![
                    QuestionOption { id: "a".into(), text: "Nile".into() },
                    QuestionOption { id: "b".into(), text: "Rhine".into() },
                ],
                answer_id: "a".to_string(),
                points: 1,
            };
            ids.push(store.insert_question(quiz.id, &draft, i + 1).await.unwrap().id);
        }
        (store, quiz, ids)
    }

    async fn start(store: &SharedStore, quiz: &Quiz) -> SessionContext {
        gate::start(store.as_ref(), &QuizKey::Id(quiz.id), "Grace").await.unwrap()
    }

    fn token(session: &SessionContext) -> String {
        session.device_token.clone().unwrap()
    }

    async fn close(store: &SharedStore, quiz: &Quiz) {
        let mut closed = quiz.clone();
        closed.is_open = false;
        store.update_quiz(&closed).await.unwrap();
    }

    fn current_question(view: &RunView) -> Uuid {
        view.question.as_ref().unwrap().id
    }

    #[tokio::test]
    async fn reopening_returns_the_same_run() {
        let (store, quiz, _) = setup(None, true).await;
        let session = start(&store, &quiz).await;
        let registry = RunRegistry::new();

        let first = registry.open(&store, &QuizKey::Id(quiz.id), session.clone()).await.unwrap();
        let second = registry
            .open(&store, &QuizKey::Code(quiz.quiz_code.clone()), session)
            .await
            .unwrap();

        assert_eq!(registry.len().await, 1);
        assert_eq!(current_question(&first), current_question(&second));
    }

    #[tokio::test]
    async fn answering_every_question_finalizes() {
        let (store, quiz, _) = setup(None, false).await;
        let session = start(&store, &quiz).await;
        let attempt_id = session.attempt_id.unwrap();
        let token = token(&session);
        let registry = RunRegistry::new();

        let mut view = registry.open(&store, &QuizKey::Id(quiz.id), session).await.unwrap();
        for pick in ["a", "b"] {
            view = registry
                .answer(&store, attempt_id, &token, current_question(&view), pick)
                .await
                .unwrap();
        }

        assert_eq!(view.state, RunnerState::Finished);
        assert_eq!(view.totals.unwrap().total_correct, 1);
        assert_eq!(view.session.completed_attempt_id, Some(attempt_id));
        assert!(store.get_attempt(attempt_id).await.unwrap().unwrap().is_submitted());

        // Finish is idempotent once the attempt is written.
        let again = registry.finish(&store, attempt_id, &token).await.unwrap();
        assert_eq!(again.state, RunnerState::Finished);
    }

    #[tokio::test]
    async fn closing_the_quiz_stops_a_live_run() {
        let (store, quiz, ids) = setup(None, false).await;
        let session = start(&store, &quiz).await;
        let attempt_id = session.attempt_id.unwrap();
        let token = token(&session);
        let registry = RunRegistry::new();
        registry.open(&store, &QuizKey::Id(quiz.id), session).await.unwrap();

        close(&store, &quiz).await;

        let err = registry.answer(&store, attempt_id, &token, ids[0], "a").await.unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));
        assert_eq!(
            registry.view(attempt_id, &token).await.unwrap().state,
            RunnerState::Unavailable
        );
        assert!(store.list_answers(&[attempt_id]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_run_is_not_found() {
        let (store, _, ids) = setup(None, false).await;
        let registry = RunRegistry::new();
        let err = registry
            .answer(&store, Uuid::new_v4(), "any", ids[0], "a")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn open_without_an_attempt_registers_nothing() {
        let (store, quiz, _) = setup(None, false).await;
        let registry = RunRegistry::new();
        let err = registry
            .open(&store, &QuizKey::Id(quiz.id), SessionContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));
        assert!(registry.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_questions_time_out_and_finalize() {
        let (store, quiz, ids) = setup(Some(2), false).await;
        let session = start(&store, &quiz).await;
        let attempt_id = session.attempt_id.unwrap();
        let token = token(&session);
        let registry = RunRegistry::new();
        registry.open(&store, &QuizKey::Id(quiz.id), session).await.unwrap();

        time::sleep(Duration::from_millis(2500)).await;
        let view = registry.view(attempt_id, &token).await.unwrap();
        assert_eq!(view.state, RunnerState::Presenting(1));
        assert_eq!(view.time_left, Some(2));

        let answers = store.list_answers(&[attempt_id]).await.unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].question_id, ids[0]);
        assert_eq!(answers[0].selected_option_id, "");
        assert!(!answers[0].is_correct);

        time::sleep(Duration::from_secs(3)).await;
        let view = registry.view(attempt_id, &token).await.unwrap();
        assert_eq!(view.state, RunnerState::Finished);
        let attempt = store.get_attempt(attempt_id).await.unwrap().unwrap();
        assert!(attempt.is_submitted());
        assert_eq!(attempt.total_correct, 0);
        assert_eq!(attempt.total_time_ms, 4000);
    }

    #[tokio::test(start_paused = true)]
    async fn answering_restarts_the_countdown() {
        let (store, quiz, _) = setup(Some(5), false).await;
        let session = start(&store, &quiz).await;
        let attempt_id = session.attempt_id.unwrap();
        let token = token(&session);
        let registry = RunRegistry::new();
        let view = registry.open(&store, &QuizKey::Id(quiz.id), session).await.unwrap();

        time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(registry.view(attempt_id, &token).await.unwrap().time_left, Some(2));

        let view = registry
            .answer(&store, attempt_id, &token, current_question(&view), "a")
            .await
            .unwrap();
        assert_eq!(view.time_left, Some(5));

        // The first question's task wakes at 4s and must leave the new countdown alone.
        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(registry.view(attempt_id, &token).await.unwrap().time_left, Some(4));
    }

    #[tokio::test]
    async fn rebuilt_run_resumes_after_stored_answers() {
        let (store, quiz, _) = setup(None, true).await;
        let session = start(&store, &quiz).await;
        let attempt_id = session.attempt_id.unwrap();
        let token = token(&session);

        let first = RunRegistry::new();
        let view = first.open(&store, &QuizKey::Id(quiz.id), session.clone()).await.unwrap();
        let answered = current_question(&view);
        first.answer(&store, attempt_id, &token, answered, "a").await.unwrap();

        // Same attempt on a registry that never saw it, as after a restart.
        let second = RunRegistry::new();
        let view = second.open(&store, &QuizKey::Id(quiz.id), session).await.unwrap();
        assert_eq!(view.state, RunnerState::Presenting(1));
        assert_eq!(view.answered, 1);
        assert_ne!(current_question(&view), answered);

        let view = second
            .answer(&store, attempt_id, &token, current_question(&view), "b")
            .await
            .unwrap();
        assert_eq!(view.state, RunnerState::Finished);

        let answers = store.list_answers(&[attempt_id]).await.unwrap();
        let attempt = store.get_attempt(attempt_id).await.unwrap().unwrap();
        assert_eq!(answers.len(), 2);
        assert_eq!(
            attempt.total_correct as usize,
            answers.iter().filter(|a| a.is_correct).count()
        );
        assert_eq!(attempt.total_correct, 1);
    }

    #[tokio::test]
    async fn fully_answered_attempt_is_finalized_on_reopen() {
        let (store, quiz, _) = setup(None, false).await;
        let session = start(&store, &quiz).await;
        let attempt_id = session.attempt_id.unwrap();
        let token = token(&session);

        let first = RunRegistry::new();
        let mut view = first.open(&store, &QuizKey::Id(quiz.id), session.clone()).await.unwrap();
        view = first
            .answer(&store, attempt_id, &token, current_question(&view), "a")
            .await
            .unwrap();
        // Store the last answer without finalizing, as if the process died in between.
        store
            .insert_answer(&crate::models::answer::NewAnswer {
                attempt_id,
                question_id: current_question(&view),
                selected_option_id: "a".to_string(),
                is_correct: true,
                time_taken_ms: 5,
            })
            .await
            .unwrap();

        let view = RunRegistry::new()
            .open(&store, &QuizKey::Id(quiz.id), session)
            .await
            .unwrap();
        assert_eq!(view.state, RunnerState::Finished);
        assert_eq!(view.totals.unwrap().total_correct, 2);
        assert!(store.get_attempt(attempt_id).await.unwrap().unwrap().is_submitted());
    }

    #[tokio::test]
    async fn another_device_token_cannot_reach_the_run() {
        let (store, quiz, ids) = setup(None, false).await;
        let session = start(&store, &quiz).await;
        let attempt_id = session.attempt_id.unwrap();
        let registry = RunRegistry::new();
        registry.open(&store, &QuizKey::Id(quiz.id), session).await.unwrap();

        let stranger = "1700000000000-stranger";
        assert!(matches!(
            registry.view(attempt_id, stranger).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            registry.answer(&store, attempt_id, stranger, ids[0], "a").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            registry.finish(&store, attempt_id, stranger).await,
            Err(AppError::NotFound(_))
        ));
        assert!(store.list_answers(&[attempt_id]).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_and_unavailable_runs_are_pruned() {
        let (store, quiz, ids) = setup(None, false).await;
        let registry = RunRegistry::with_idle_timeout(Duration::from_secs(30 * 60));

        let mut closed_run = None;
        for _ in 0..6 {
            let session = start(&store, &quiz).await;
            closed_run = Some((session.attempt_id.unwrap(), token(&session)));
            registry.open(&store, &QuizKey::Id(quiz.id), session).await.unwrap();
        }
        assert_eq!(registry.len().await, 6);

        close(&store, &quiz).await;
        let (attempt_id, token) = closed_run.unwrap();
        registry.answer(&store, attempt_id, &token, ids[0], "a").await.unwrap_err();

        time::advance(Duration::from_secs(5 * 60)).await;
        assert_eq!(registry.prune().await, 0);

        time::advance(Duration::from_secs(24 * 60 * 60)).await;
        assert_eq!(registry.prune().await, 6);
        assert!(registry.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweep_evicts_idle_runs() {
        let (store, quiz, _) = setup(None, false).await;
        let registry = RunRegistry::with_idle_timeout(Duration::from_secs(60));
        let session = start(&store, &quiz).await;
        registry.open(&store, &QuizKey::Id(quiz.id), session).await.unwrap();

        let sweeper = registry.spawn_pruner(Duration::from_secs(30));
        time::sleep(Duration::from_secs(45)).await;
        assert_eq!(registry.len().await, 1);

        time::sleep(Duration::from_secs(60)).await;
        assert!(registry.is_empty().await);
        sweeper.abort();
    }
}
