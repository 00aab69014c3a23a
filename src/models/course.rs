// src/models/course.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'courses' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub cover_img: Option<String>,
    pub published: bool,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'sections' table in the database.
/// Sections order the curriculum of a course.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Section {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub position: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'enrollments' table in the database.
/// One row per (course, student) pair.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: i64,
    pub course_id: i64,
    pub student_id: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Review row joined with the author's username for display.
#[derive(Debug, Serialize, FromRow)]
pub struct ReviewWithAuthor {
    pub username: String,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}
