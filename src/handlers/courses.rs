// src/handlers/courses.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::course::{Course, Section},
};

/// Query parameters for listing courses.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub category: Option<String>,
}

/// Lists published courses, optionally filtered by category.
pub async fn list_courses(
    State(pool): State<PgPool>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let courses = sqlx::query_as::<_, Course>(
        r#"
        SELECT id, title, description, category, cover_img, published, created_at
        FROM courses
        WHERE published = TRUE
          AND ($1::TEXT IS NULL OR category = $1)
        ORDER BY id
        "#,
    )
    .bind(params.category)
    .fetch_all(&pool)
    .await?;

    Ok(Json(courses))
}

/// Helper struct for lesson rows of one course.
#[derive(sqlx::FromRow)]
struct LessonRow {
    id: i64,
    section_id: i64,
    title: String,
    position: i64,
    is_free: bool,
}

/// Helper struct for exam rows of one course.
#[derive(sqlx::FromRow)]
struct ExamRow {
    id: i64,
    section_id: i64,
    title: String,
    position: i64,
    open_at: Option<chrono::DateTime<chrono::Utc>>,
    close_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// One entry on a section's shared lesson/exam ordering axis.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum CurriculumItem {
    Lesson {
        id: i64,
        title: String,
        position: i64,
        is_free: bool,
    },
    Exam {
        id: i64,
        title: String,
        position: i64,
        open_at: Option<chrono::DateTime<chrono::Utc>>,
        close_at: Option<chrono::DateTime<chrono::Utc>>,
    },
}

impl CurriculumItem {
    fn sort_key(&self) -> (i64, i64) {
        match self {
            CurriculumItem::Lesson { id, position, .. }
            | CurriculumItem::Exam { id, position, .. } => (*position, *id),
        }
    }
}

#[derive(Debug, Serialize)]
struct SectionView {
    #[serde(flatten)]
    section: Section,
    items: Vec<CurriculumItem>,
}

/// Retrieves a published course with its ordered curriculum.
///
/// Lessons and exams of a section are interleaved by position; answer
/// keys and question bodies are not exposed here.
pub async fn get_course(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let course = sqlx::query_as::<_, Course>(
        r#"
        SELECT id, title, description, category, cover_img, published, created_at
        FROM courses
        WHERE id = $1 AND published = TRUE
        "#,
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Course not found".to_string()))?;

    let sections = sqlx::query_as::<_, Section>(
        r#"
        SELECT id, course_id, title, position, created_at
        FROM sections
        WHERE course_id = $1
        ORDER BY position, id
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let lessons = sqlx::query_as::<_, LessonRow>(
        r#"
        SELECT l.id, l.section_id, l.title, l.position, l.is_free
        FROM lessons l
        JOIN sections s ON l.section_id = s.id
        WHERE s.course_id = $1
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let exams = sqlx::query_as::<_, ExamRow>(
        r#"
        SELECT e.id, e.section_id, e.title, e.position, e.open_at, e.close_at
        FROM exams e
        JOIN sections s ON e.section_id = s.id
        WHERE s.course_id = $1
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let mut views: Vec<SectionView> = sections
        .into_iter()
        .map(|section| SectionView {
            section,
            items: Vec::new(),
        })
        .collect();

    for lesson in lessons {
        if let Some(view) = views.iter_mut().find(|v| v.section.id == lesson.section_id) {
            view.items.push(CurriculumItem::Lesson {
                id: lesson.id,
                title: lesson.title,
                position: lesson.position,
                is_free: lesson.is_free,
            });
        }
    }

    for exam in exams {
        if let Some(view) = views.iter_mut().find(|v| v.section.id == exam.section_id) {
            view.items.push(CurriculumItem::Exam {
                id: exam.id,
                title: exam.title,
                position: exam.position,
                open_at: exam.open_at,
                close_at: exam.close_at,
            });
        }
    }

    for view in &mut views {
        view.items.sort_by_key(|item| item.sort_key());
    }

    Ok(Json(serde_json::json!({
        "course": course,
        "sections": views,
    })))
}
