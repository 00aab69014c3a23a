// src/models/content.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

fn default_weight() -> f64 {
    1.0
}

/// Represents the 'lessons' table in the database.
///
/// Lessons and exams of one section interleave on a single `position` axis.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lesson {
    pub id: i64,
    pub section_id: i64,
    pub title: String,

    /// Sanitized HTML body authored by an instructor.
    pub content: String,

    /// Order within the owning section, shared with exams.
    pub position: i64,

    /// Free lessons bypass prerequisite checks.
    pub is_free: bool,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// How multiple attempts on the same exam combine into one effective score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "scoring_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScoringMethod {
    Highest,
    Latest,
    Average,
}

/// Reference from an exam to a question, with per-exam overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamQuestionRef {
    pub question_id: i64,

    /// Multiplier applied to the question's effective points. Defaults to 1.
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// When present, replaces the question's base `points` for this exam only.
    #[serde(default)]
    pub question_points: Option<f64>,
}

/// Represents the 'exams' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Exam {
    pub id: i64,
    pub section_id: i64,
    pub title: String,
    pub description: Option<String>,

    /// Order within the owning section, shared with lessons.
    pub position: i64,

    /// Submission window. Absent bounds mean unbounded.
    pub open_at: Option<chrono::DateTime<chrono::Utc>>,
    pub close_at: Option<chrono::DateTime<chrono::Utc>>,

    pub allow_late_submission: bool,

    /// Percentage reduction applied to late submissions, 0..=100.
    pub late_penalty_percent: f64,

    /// Absent means unlimited attempts.
    pub max_attempts: Option<i32>,

    pub scoring_method: ScoringMethod,

    /// An attempt passes when its score reaches this threshold.
    pub passing_score: f64,

    /// Instructor-edited display value. The grader computes its own
    /// max score from the question set and never trusts this field.
    pub total_points: f64,

    /// Ordered question references with per-exam weight/point overrides.
    pub questions: Json<Vec<ExamQuestionRef>>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}
