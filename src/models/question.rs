// src/models/question.rs

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{error::AppError, utils::html::clean_text};

/// One selectable answer. The id is opaque to the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: String,
    pub text: String,
}

/// Decodes a stored option payload into a typed list.
///
/// Rows written by older clients hold the options as JSON *text* encoding the
/// array instead of the array itself, so both shapes are accepted here and
/// nowhere else.
pub fn decode_options(raw: serde_json::Value) -> Result<Vec<QuestionOption>, AppError> {
    let decoded = match raw {
        serde_json::Value::String(encoded) => serde_json::from_str(&encoded),
        other => serde_json::from_value(other),
    };
    decoded.map_err(|e| AppError::InternalServerError(format!("Malformed option list: {e}")))
}

/// Represents the 'questions' table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub text: String,
    pub options: Vec<QuestionOption>,

    /// Id of the correct option. Always one of `options`.
    pub answer_id: String,

    pub points: i32,
    pub order_num: i32,
    pub created_at: DateTime<Utc>,
}

impl Question {
    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|o| o.id == option_id)
    }
}

/// DTO for sending a question to a participant (excludes the answer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: Uuid,
    pub text: String,
    pub options: Vec<QuestionOption>,
    pub points: i32,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            text: q.text.clone(),
            options: q.options.clone(),
            points: q.points,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionInput {
    pub id: Option<String>,
    pub text: String,
}

/// DTO for adding or replacing a question.
///
/// The answer is named either by option id or by its position in `options`.
#[derive(Debug, Deserialize, Validate)]
pub struct QuestionRequest {
    #[validate(length(min = 1, max = 1000))]
    pub text: String,
    #[validate(length(min = 2, max = 10))]
    pub options: Vec<OptionInput>,
    pub answer_id: Option<String>,
    pub answer_index: Option<usize>,
    #[validate(range(min = 1, max = 100))]
    pub points: Option<i32>,
    /// Only honoured on update; new questions are appended.
    pub order_num: Option<i32>,
}

/// A validated question body, ready to be written.
#[derive(Debug, Clone)]
pub struct QuestionDraft {
    pub text: String,
    pub options: Vec<QuestionOption>,
    pub answer_id: String,
    pub points: i32,
}

impl QuestionRequest {
    pub fn into_draft(self) -> Result<QuestionDraft, AppError> {
        self.validate()?;

        let QuestionRequest {
            text,
            options: inputs,
            answer_id,
            answer_index,
            points,
            ..
        } = self;

        let text = clean_text(&text);
        if text.is_empty() {
            return Err(AppError::BadRequest("Question text is required".to_string()));
        }

        let mut answer_id = answer_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        let mut options = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.into_iter().enumerate() {
            let label = clean_text(&input.text);
            if label.is_empty() {
                continue;
            }
            let id = input
                .id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            if answer_id.is_none() && answer_index == Some(index) {
                answer_id = Some(id.clone());
            }
            options.push(QuestionOption { id, text: label });
        }

        if options.len() < 2 {
            return Err(AppError::BadRequest(
                "Please add at least 2 answer options".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        if !options.iter().all(|o| seen.insert(o.id.as_str())) {
            return Err(AppError::BadRequest("Option ids must be unique".to_string()));
        }

        let answer_id = answer_id
            .ok_or_else(|| AppError::BadRequest("Please select a valid answer option".to_string()))?;
        if !options.iter().any(|o| o.id == answer_id) {
            return Err(AppError::BadRequest(
                "Please select a valid answer option".to_string(),
            ));
        }

        Ok(QuestionDraft {
            text,
            options,
            answer_id,
            points: points.unwrap_or(1),
        })
    }
}
