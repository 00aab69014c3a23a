// src/models/attempt.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

/// Lifecycle of one exam sitting. `submitted`, `expired` and `abandoned`
/// are terminal; no further mutation is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "attempt_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Submitted,
    Expired,
    Abandoned,
}

/// A student's answer to one question, in the shape of the question variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerValue {
    /// Single-choice selection.
    Choice { option_id: i64 },
    /// Multiple-choice selection.
    Choices { option_ids: Vec<i64> },
    /// Short-answer text.
    Text { text: String },
}

/// One submitted answer, as received from the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    pub question_id: i64,
    pub value: AnswerValue,
}

/// One graded answer, as stored on the attempt. Omitted questions are
/// recorded with `value = None` and a score of zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: i64,
    pub value: Option<AnswerValue>,
    pub is_correct: bool,
    pub score: f64,
    pub max_score: f64,
}

/// Represents the 'exam_attempts' table in the database.
///
/// Multiple attempts for the same (student, exam) pair coexist and are
/// never merged, only aggregated on read.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamAttempt {
    pub id: i64,
    pub exam_id: i64,
    pub student_id: i64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub submitted_at: Option<chrono::DateTime<chrono::Utc>>,
    pub status: AttemptStatus,
    pub answers: Json<Vec<AnswerRecord>>,
    pub score: f64,
    pub max_score: f64,
    pub passed: bool,
}

/// A student's standing on one exam across all attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    NotStarted,
    InProgress,
    Passed,
    Failed,
}

/// Derived per (student, exam), never persisted. Recomputed from the
/// attempt list on every read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveOutcome {
    pub status: OutcomeStatus,

    /// Policy-selected score per the exam's `scoring_method`.
    pub effective_score: f64,

    pub best_score: f64,
    pub latest_score: f64,

    /// Every attempt counts here, whatever its status.
    pub attempts_count: i64,

    /// `max_attempts - attempts_count`, floored at zero. Absent when the
    /// exam allows unlimited attempts.
    pub remaining_attempts: Option<i32>,

    pub passed: bool,
}
