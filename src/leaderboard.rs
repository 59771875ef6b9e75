// src/leaderboard.rs

//! Ranking of submitted attempts for one quiz.

use chrono::{DateTime, Months, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, models::attempt::Attempt, store::QuizStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Rank order: most correct, then fastest.
    #[default]
    Score,
    Time,
    Accuracy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimePeriod {
    #[default]
    All,
    Today,
    Week,
    Month,
}

impl TimePeriod {
    /// Earliest `submitted_at` kept by this window. All windows are UTC.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TimePeriod::All => None,
            TimePeriod::Today => Some(now.date_naive().and_time(NaiveTime::MIN).and_utc()),
            TimePeriod::Week => Some(now - TimeDelta::days(7)),
            TimePeriod::Month => now.checked_sub_months(Months::new(1)),
        }
    }

    pub fn contains(&self, submitted_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.cutoff(now).is_none_or(|from| submitted_at >= from)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardStatus {
    Loading,
    Ready,
    Empty,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub attempt_id: Uuid,
    pub name: String,
    pub total_correct: i32,
    pub total_time_ms: i64,
    pub submitted_at: DateTime<Utc>,
    /// Rounded percentage of questions answered correctly.
    pub accuracy: u32,
    /// Position in score order, 1-based. Never changes with re-sorting.
    pub rank: usize,
    pub is_you: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insights {
    pub participants: usize,
    pub average_score: f64,
    pub average_accuracy: f64,
    pub average_time_ms: f64,
}

impl Insights {
    fn from_entries(entries: &[LeaderboardEntry]) -> Option<Self> {
        if entries.is_empty() {
            return None;
        }
        let n = entries.len() as f64;
        Some(Self {
            participants: entries.len(),
            average_score: entries.iter().map(|e| f64::from(e.total_correct)).sum::<f64>() / n,
            average_accuracy: entries.iter().map(|e| f64::from(e.accuracy)).sum::<f64>() / n,
            average_time_ms: entries.iter().map(|e| e.total_time_ms as f64).sum::<f64>() / n,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default)]
    pub sort: SortKey,
    #[serde(default)]
    pub period: TimePeriod,
    /// Completed attempt id of the viewer.
    pub you: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardView {
    pub quiz_id: Uuid,
    pub status: BoardStatus,
    pub question_count: i64,
    pub entries: Vec<LeaderboardEntry>,
    /// The viewer's row, present when their attempt is ranked.
    pub you: Option<LeaderboardEntry>,
    pub insights: Option<Insights>,
}

fn accuracy(total_correct: i32, question_count: i64) -> u32 {
    if question_count <= 0 {
        return 0;
    }
    (f64::from(total_correct) / question_count as f64 * 100.0).round() as u32
}

/// Orders submitted attempts and assigns ranks 1..N. Attempts without a
/// `submitted_at` are skipped.
pub fn rank(attempts: Vec<Attempt>, question_count: i64) -> Vec<LeaderboardEntry> {
    let mut submitted: Vec<(Attempt, DateTime<Utc>)> = attempts
        .into_iter()
        .filter_map(|a| a.submitted_at.map(|at| (a, at)))
        .collect();

    submitted.sort_by(|(a, a_at), (b, b_at)| {
        b.total_correct
            .cmp(&a.total_correct)
            .then(a.total_time_ms.cmp(&b.total_time_ms))
            .then(a_at.cmp(b_at))
            .then(a.id.cmp(&b.id))
    });

    submitted
        .into_iter()
        .enumerate()
        .map(|(i, (a, submitted_at))| LeaderboardEntry {
            attempt_id: a.id,
            accuracy: accuracy(a.total_correct, question_count),
            name: a.name,
            total_correct: a.total_correct,
            total_time_ms: a.total_time_ms,
            submitted_at,
            rank: i + 1,
            is_you: false,
        })
        .collect()
}

/// Reorders already ranked entries. Ties fall back to rank.
pub fn resort(entries: &mut [LeaderboardEntry], key: SortKey) {
    match key {
        SortKey::Score => entries.sort_by_key(|e| e.rank),
        SortKey::Time => entries.sort_by_key(|e| (e.total_time_ms, e.rank)),
        SortKey::Accuracy => {
            entries.sort_by(|a, b| b.accuracy.cmp(&a.accuracy).then(a.rank.cmp(&b.rank)))
        }
    }
}

/// Ranked board for one quiz. `refresh` reloads from the store, `view`
/// applies the viewer's sort and window.
pub struct Leaderboard {
    quiz_id: Uuid,
    status: BoardStatus,
    question_count: i64,
    ranked: Vec<LeaderboardEntry>,
}

impl Leaderboard {
    pub fn new(quiz_id: Uuid) -> Self {
        Self {
            quiz_id,
            status: BoardStatus::Loading,
            question_count: 0,
            ranked: Vec::new(),
        }
    }

    pub fn status(&self) -> BoardStatus {
        self.status
    }

    pub async fn refresh(&mut self, store: &dyn QuizStore) -> BoardStatus {
        self.status = BoardStatus::Loading;
        match self.fetch(store).await {
            Ok(Some((attempts, question_count))) => {
                self.question_count = question_count;
                self.ranked = rank(attempts, question_count);
                self.status = if self.ranked.is_empty() {
                    BoardStatus::Empty
                } else {
                    BoardStatus::Ready
                };
            }
            Ok(None) => {
                tracing::warn!("Leaderboard requested for unknown quiz {}", self.quiz_id);
                self.ranked.clear();
                self.status = BoardStatus::Unavailable;
            }
            Err(e) => {
                tracing::error!("Leaderboard for quiz {} failed to load: {}", self.quiz_id, e);
                self.ranked.clear();
                self.status = BoardStatus::Unavailable;
            }
        }
        self.status
    }

    async fn fetch(
        &self,
        store: &dyn QuizStore,
    ) -> Result<Option<(Vec<Attempt>, i64)>, AppError> {
        if store.get_quiz(self.quiz_id).await?.is_none() {
            return Ok(None);
        }
        let attempts = store.list_submitted_attempts(self.quiz_id).await?;
        let question_count = store.count_questions(self.quiz_id).await?;
        Ok(Some((attempts, question_count)))
    }

    pub fn view(&self, query: &LeaderboardQuery, now: DateTime<Utc>) -> LeaderboardView {
        let mut entries: Vec<LeaderboardEntry> = self
            .ranked
            .iter()
            .filter(|e| query.period.contains(e.submitted_at, now))
            .cloned()
            .map(|mut e| {
                e.is_you = query.you == Some(e.attempt_id);
                e
            })
            .collect();
        resort(&mut entries, query.sort);

        let status = match self.status {
            BoardStatus::Ready if entries.is_empty() => BoardStatus::Empty,
            other => other,
        };

        LeaderboardView {
            quiz_id: self.quiz_id,
            status,
            question_count: self.question_count,
            you: entries.iter().find(|e| e.is_you).cloned(),
            insights: Insights::from_entries(&self.ranked),
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn attempt(name: &str, correct: i32, time_ms: i64, submitted_at: Option<DateTime<Utc>>) -> Attempt {
        Attempt {
            id: Uuid::new_v4(),
            quiz_id: Uuid::nil(),
            name: name.to_string(),
            device_token: "t".to_string(),
            started_at: Utc::now(),
            submitted_at,
            total_correct: correct,
            total_time_ms: time_ms,
        }
    }

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, 0, 0).unwrap()
    }

    #[test]
    fn most_correct_then_fastest() {
        let ranked = rank(
            vec![
                attempt("A", 3, 40_000, Some(at(1))),
                attempt("B", 4, 50_000, Some(at(2))),
                attempt("C", 4, 30_000, Some(at(3))),
            ],
            5,
        );
        let order: Vec<(&str, usize)> = ranked.iter().map(|e| (e.name.as_str(), e.rank)).collect();
        assert_eq!(order, vec![("C", 1), ("B", 2), ("A", 3)]);
        assert_eq!(ranked[0].accuracy, 80);
        assert_eq!(ranked[2].accuracy, 60);
    }

    #[test]
    fn nine_correct_beats_faster_eights() {
        let ranked = rank(
            vec![
                attempt("A", 8, 120_000, Some(at(1))),
                attempt("B", 8, 90_000, Some(at(1))),
                attempt("C", 9, 500_000, Some(at(1))),
            ],
            10,
        );
        let names: Vec<&str> = ranked.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["C", "B", "A"]);
    }

    #[test]
    fn unsubmitted_attempts_are_not_ranked() {
        let ranked = rank(vec![attempt("A", 5, 1, None), attempt("B", 1, 9, Some(at(1)))], 5);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].name, "B");
    }

    #[test]
    fn full_tie_falls_back_to_submission_time() {
        let ranked = rank(
            vec![attempt("late", 2, 100, Some(at(5))), attempt("early", 2, 100, Some(at(4)))],
            2,
        );
        assert_eq!(ranked[0].name, "early");
    }

    #[test]
    fn accuracy_rounds_and_handles_no_questions() {
        assert_eq!(accuracy(2, 3), 67);
        assert_eq!(accuracy(1, 3), 33);
        assert_eq!(accuracy(3, 0), 0);
    }

    #[test]
    fn resorting_keeps_ranks() {
        let mut ranked = rank(
            vec![
                attempt("A", 3, 10_000, Some(at(1))),
                attempt("B", 5, 90_000, Some(at(2))),
                attempt("C", 4, 20_000, Some(at(3))),
            ],
            5,
        );
        resort(&mut ranked, SortKey::Time);
        let by_time: Vec<(&str, usize)> = ranked.iter().map(|e| (e.name.as_str(), e.rank)).collect();
        assert_eq!(by_time, vec![("A", 3), ("C", 2), ("B", 1)]);

        resort(&mut ranked, SortKey::Accuracy);
        assert_eq!(ranked[0].name, "B");
        resort(&mut ranked, SortKey::Score);
        assert_eq!(ranked.iter().map(|e| e.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn windows_are_utc() {
        let now = Utc.with_ymd_and_hms(2025, 3, 31, 15, 30, 0).unwrap();
        assert_eq!(TimePeriod::All.cutoff(now), None);
        assert_eq!(
            TimePeriod::Today.cutoff(now),
            Some(Utc.with_ymd_and_hms(2025, 3, 31, 0, 0, 0).unwrap())
        );
        assert_eq!(
            TimePeriod::Week.cutoff(now),
            Some(Utc.with_ymd_and_hms(2025, 3, 24, 15, 30, 0).unwrap())
        );
        // Clamped to the end of February.
        assert_eq!(
            TimePeriod::Month.cutoff(now),
            Some(Utc.with_ymd_and_hms(2025, 2, 28, 15, 30, 0).unwrap())
        );
    }

    #[test]
    fn view_filters_after_ranking_and_marks_you() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let old = attempt("old", 5, 1_000, Some(now - TimeDelta::days(3)));
        let me = attempt("me", 2, 1_000, Some(now - TimeDelta::hours(1)));
        let my_id = me.id;

        let board = Leaderboard {
            quiz_id: Uuid::nil(),
            status: BoardStatus::Ready,
            question_count: 5,
            ranked: rank(vec![old, me], 5),
        };

        let view = board.view(
            &LeaderboardQuery { sort: SortKey::Score, period: TimePeriod::Today, you: Some(my_id) },
            now,
        );
        assert_eq!(view.status, BoardStatus::Ready);
        assert_eq!(view.entries.len(), 1);
        let you = view.you.unwrap();
        assert!(you.is_you);
        assert_eq!(you.rank, 2);
        assert_eq!(view.insights.unwrap().participants, 2);

        let none = board.view(
            &LeaderboardQuery { period: TimePeriod::Today, ..Default::default() },
            now + TimeDelta::days(2),
        );
        assert_eq!(none.status, BoardStatus::Empty);
        assert!(none.you.is_none());
    }

    #[tokio::test]
    async fn refresh_is_stable_and_reports_unknown_quizzes() {
        use crate::{
            models::quiz::{NewQuiz, ScoringStrategy},
            store::MemoryStore,
        };

        let store = MemoryStore::new();
        let mut board = Leaderboard::new(Uuid::new_v4());
        assert_eq!(board.status(), BoardStatus::Loading);
        assert_eq!(board.refresh(&store).await, BoardStatus::Unavailable);

        let quiz = store
            .insert_quiz(&NewQuiz {
                title: "Empty".to_string(),
                description: None,
                is_open: true,
                scoring_strategy: ScoringStrategy::default(),
                shuffle_questions: false,
                shuffle_options: false,
                time_per_question_sec: None,
                quiz_code: "EMPTY1".to_string(),
            })
            .await
            .unwrap();
        let mut board = Leaderboard::new(quiz.id);
        assert_eq!(board.refresh(&store).await, BoardStatus::Empty);

        let first = board.view(&LeaderboardQuery::default(), Utc::now()).entries;
        board.refresh(&store).await;
        let second = board.view(&LeaderboardQuery::default(), Utc::now()).entries;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn refresh_twice_gives_the_same_ranking_with_ties() {
        use crate::{
            models::{
                attempt::{AttemptTotals, NewAttempt},
                quiz::{NewQuiz, ScoringStrategy},
            },
            store::MemoryStore,
        };

        let store = MemoryStore::new();
        let quiz = store
            .insert_quiz(&NewQuiz {
                title: "Ties".to_string(),
                description: None,
                is_open: true,
                scoring_strategy: ScoringStrategy::default(),
                shuffle_questions: false,
                shuffle_options: false,
                time_per_question_sec: None,
                quiz_code: "TIES01".to_string(),
            })
            .await
            .unwrap();

        // Two pairs tie on score and time; the second pair also on submission time.
        let seeded = [
            ("Ada", 3, 9_000, at(9)),
            ("Bob", 3, 9_000, at(10)),
            ("Cy", 2, 4_000, at(11)),
            ("Dee", 2, 4_000, at(11)),
            ("Eve", 4, 20_000, at(12)),
        ];
        for (name, correct, time_ms, submitted_at) in seeded {
            let attempt = store
                .insert_attempt(&NewAttempt {
                    quiz_id: quiz.id,
                    name: name.to_string(),
                    device_token: format!("token-{name}"),
                })
                .await
                .unwrap();
            let totals = AttemptTotals { total_correct: correct, total_time_ms: time_ms };
            assert!(store.finalize_attempt(attempt.id, submitted_at, totals).await.unwrap());
        }

        let query = LeaderboardQuery::default();
        let mut board = Leaderboard::new(quiz.id);
        assert_eq!(board.refresh(&store).await, BoardStatus::Ready);
        let first = board.view(&query, at(23)).entries;
        assert_eq!(board.refresh(&store).await, BoardStatus::Ready);
        let second = board.view(&query, at(23)).entries;

        assert_eq!(first.len(), 5);
        assert_eq!(first, second);
        let ranks: Vec<usize> = first.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
        let names: Vec<&str> = first.iter().take(3).map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Eve", "Ada", "Bob"]);

        // A fresh board over the same records agrees too.
        let mut other = Leaderboard::new(quiz.id);
        other.refresh(&store).await;
        assert_eq!(other.view(&query, at(23)).entries, first);
    }
}
