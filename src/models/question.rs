// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

/// One selectable option of a choice question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub id: i64,
    pub text: String,
    pub is_correct: bool,
}

/// Variant-specific question configuration.
///
/// Stored as a tagged JSON object in the 'kind' column so each grading
/// strategy receives only the data it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    /// Exactly one option is expected to carry `is_correct = true`.
    SingleChoice { options: Vec<ChoiceOption> },
    /// A subset of options is marked correct. Graded all-or-nothing.
    /// `max_selectable` caps how many options a student may pick.
    MultipleChoice {
        options: Vec<ChoiceOption>,
        #[serde(default)]
        max_selectable: Option<usize>,
    },
    /// Free-text answer compared against a list of acceptable strings.
    ShortAnswer {
        expected_answers: Vec<String>,
        #[serde(default)]
        case_sensitive: bool,
    },
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    /// The text content of the question.
    pub prompt: String,

    /// Variant configuration (options, expected answers, ...).
    pub kind: Json<QuestionKind>,

    /// Base score awarded for a correct answer. A per-exam override may
    /// replace this value, see `ExamQuestionRef::question_points`.
    pub points: f64,

    /// Whether a wrong answer subtracts points.
    pub negative_marking: bool,

    /// Amount subtracted on a wrong answer when negative marking is enabled.
    pub negative_points: f64,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Option DTO for students: the `is_correct` flag is stripped.
#[derive(Debug, Serialize)]
pub struct PublicOption {
    pub id: i64,
    pub text: String,
}

/// Variant DTO for students: answer keys are never exposed.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PublicQuestionKind {
    SingleChoice {
        options: Vec<PublicOption>,
    },
    MultipleChoice {
        options: Vec<PublicOption>,
        max_selectable: Option<usize>,
    },
    ShortAnswer,
}

/// DTO for sending a question to the client (excludes the answer key).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub prompt: String,
    #[serde(flatten)]
    pub kind: PublicQuestionKind,
}

impl PublicQuestion {
    pub fn from_question(question: &Question) -> Self {
        let strip = |options: &[ChoiceOption]| {
            options
                .iter()
                .map(|o| PublicOption {
                    id: o.id,
                    text: o.text.clone(),
                })
                .collect()
        };

        let kind = match &question.kind.0 {
            QuestionKind::SingleChoice { options } => PublicQuestionKind::SingleChoice {
                options: strip(options),
            },
            QuestionKind::MultipleChoice {
                options,
                max_selectable,
            } => PublicQuestionKind::MultipleChoice {
                options: strip(options),
                max_selectable: *max_selectable,
            },
            QuestionKind::ShortAnswer { .. } => PublicQuestionKind::ShortAnswer,
        };

        PublicQuestion {
            id: question.id,
            prompt: question.prompt.clone(),
            kind,
        }
    }
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize)]
pub struct CreateQuestionRequest {
    pub prompt: String,
    pub kind: QuestionKind,
    pub points: f64,
    #[serde(default)]
    pub negative_marking: bool,
    #[serde(default)]
    pub negative_points: f64,
}
