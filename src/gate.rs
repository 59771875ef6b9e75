// src/gate.rs

//! Participant entry point: resolve a quiz by id or share code, check it is
//! open, and create an attempt for a named participant.

use uuid::Uuid;

use crate::{
    config::MAX_NAME_LEN,
    error::AppError,
    models::{attempt::NewAttempt, quiz::Quiz},
    session::SessionContext,
    store::QuizStore,
    utils::code::{generate_device_token, is_quiz_code},
};

/// How a participant names a quiz in the share link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizKey {
    Id(Uuid),
    /// Uppercased share code.
    Code(String),
}

impl QuizKey {
    /// Six alphanumerics are a share code; anything else must be a UUID.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let raw = raw.trim();
        if is_quiz_code(raw) {
            return Ok(QuizKey::Code(raw.to_uppercase()));
        }
        raw.parse::<Uuid>()
            .map(QuizKey::Id)
            .map_err(|_| AppError::BadRequest(format!("'{raw}' is not a quiz id or code")))
    }
}

/// Fetches the quiz named by `key`, open or not. Missing → `Unavailable`.
pub async fn find_quiz(store: &dyn QuizStore, key: &QuizKey) -> Result<Quiz, AppError> {
    let quiz = match key {
        QuizKey::Id(id) => store.get_quiz(*id).await?,
        QuizKey::Code(code) => store.find_quiz_by_code(code).await?,
    };
    quiz.ok_or_else(AppError::unavailable)
}

/// Fetches the quiz and requires it to be open.
pub async fn resolve(store: &dyn QuizStore, key: &QuizKey) -> Result<Quiz, AppError> {
    let quiz = find_quiz(store, key).await?;
    if !quiz.is_open {
        tracing::info!("Gate refused closed quiz {}", quiz.id);
        return Err(AppError::unavailable());
    }
    Ok(quiz)
}

/// Trims and checks a display name. Runs before any store call.
pub fn validate_name(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest(
            "Please enter your name to continue".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::BadRequest(format!(
            "Name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

/// Creates an attempt for `name` and returns the session context the client
/// must carry into the runner. Exactly one record is written on success and
/// none when the name is blank or the quiz is unavailable.
pub async fn start(
    store: &dyn QuizStore,
    key: &QuizKey,
    name: &str,
) -> Result<SessionContext, AppError> {
    let name = validate_name(name)?;
    let quiz = resolve(store, key).await?;

    let attempt = store
        .insert_attempt(&NewAttempt {
            quiz_id: quiz.id,
            name,
            device_token: generate_device_token(),
        })
        .await?;

    tracing::info!("Attempt {} started on quiz {}", attempt.id, quiz.id);
    Ok(SessionContext::begin(&attempt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::quiz::{NewQuiz, ScoringStrategy},
        store::MemoryStore,
    };

    async fn seed(store: &MemoryStore, is_open: bool) -> Quiz {
        store
            .insert_quiz(&NewQuiz {
                title: "Capitals".to_string(),
                description: None,
                is_open,
                scoring_strategy: ScoringStrategy::default(),
                shuffle_questions: false,
                shuffle_options: false,
                time_per_question_sec: None,
                quiz_code: "CAP123".to_string(),
            })
            .await
            .unwrap()
    }

    #[test]
    fn key_parsing() {
        assert_eq!(QuizKey::parse("cap123").unwrap(), QuizKey::Code("CAP123".into()));
        let id = Uuid::new_v4();
        assert_eq!(QuizKey::parse(&id.to_string()).unwrap(), QuizKey::Id(id));
        assert!(matches!(QuizKey::parse("nope!"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn name_rules() {
        assert_eq!(validate_name("  Ada ").unwrap(), "Ada");
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[tokio::test]
    async fn blank_name_creates_nothing() {
        let store = MemoryStore::new();
        let quiz = seed(&store, true).await;

        for _ in 0..3 {
            let err = start(&store, &QuizKey::Id(quiz.id), "  ").await.unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)));
        }
        assert!(store.list_attempts(quiz.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_quiz_is_unavailable_by_id_and_code() {
        let store = MemoryStore::new();
        let quiz = seed(&store, false).await;

        for key in [QuizKey::Id(quiz.id), QuizKey::Code(quiz.quiz_code.clone())] {
            assert!(matches!(resolve(&store, &key).await, Err(AppError::Unavailable(_))));
            assert!(matches!(start(&store, &key, "Ada").await, Err(AppError::Unavailable(_))));
        }
        assert!(store.list_attempts(quiz.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_writes_one_attempt_and_fills_the_session() {
        let store = MemoryStore::new();
        let quiz = seed(&store, true).await;

        let session = start(&store, &QuizKey::Code("CAP123".into()), " Ada ").await.unwrap();

        let attempts = store.list_attempts(quiz.id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(session.attempt_id, Some(attempts[0].id));
        assert_eq!(session.participant_name.as_deref(), Some("Ada"));
        assert_eq!(session.device_token.as_deref(), Some(attempts[0].device_token.as_str()));
        assert!(attempts[0].submitted_at.is_none());
    }

    #[tokio::test]
    async fn unknown_quiz_is_unavailable() {
        let store = MemoryStore::new();
        let err = resolve(&store, &QuizKey::Id(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));
    }
}
