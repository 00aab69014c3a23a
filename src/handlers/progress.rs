// src/handlers/progress.rs

use std::collections::{HashMap, HashSet};

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    engine::{self, ContentKind, SequenceItem, StudentFacts},
    error::AppError,
    models::{attempt::ExamAttempt, content::Exam},
    utils::jwt::Claims,
};

/// Enrolls the current student into a course.
///
/// One enrollment per (course, student); a second call returns 409.
pub async fn enroll(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let _exists: i64 = sqlx::query_scalar("SELECT id FROM courses WHERE id = $1 AND published = TRUE")
        .bind(course_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Course not found".to_string()))?;

    let result = sqlx::query(
        r#"
        INSERT INTO enrollments (course_id, student_id)
        VALUES ($1, $2)
        ON CONFLICT (course_id, student_id) DO NOTHING
        "#,
    )
    .bind(course_id)
    .bind(claims.user_id())
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to enroll: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict("Already enrolled".to_string()));
    }

    Ok(StatusCode::CREATED)
}

/// Marks a lesson completed for the current student.
///
/// The lesson must be unlocked; the sequencer is consulted on the spot so
/// a stale client cannot skip ahead. Idempotent.
pub async fn complete_lesson(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(lesson_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id();

    let course_id: i64 = sqlx::query_scalar(
        r#"
        SELECT s.course_id
        FROM lessons l
        JOIN sections s ON l.section_id = s.id
        WHERE l.id = $1
        "#,
    )
    .bind(lesson_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Lesson not found".to_string()))?;

    ensure_enrolled(&pool, course_id, student_id).await?;

    let catalog = load_catalog(&pool, course_id).await?;
    let facts = load_student_facts(&pool, course_id, student_id).await?;
    let decision = engine::is_unlocked(
        &catalog,
        ContentKind::Lesson,
        lesson_id,
        &facts,
        chrono::Utc::now(),
    );

    if !decision.unlocked {
        return Err(AppError::Forbidden(
            "Complete previous lessons and exams first".to_string(),
        ));
    }

    sqlx::query(
        r#"
        INSERT INTO lesson_completions (lesson_id, student_id)
        VALUES ($1, $2)
        ON CONFLICT (lesson_id, student_id) DO NOTHING
        "#,
    )
    .bind(lesson_id)
    .bind(student_id)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to record completion: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(StatusCode::OK)
}

/// Computes the unlock decision for one curriculum item.
///
/// The `reason` in the response is a user-facing key the frontend turns
/// into "complete previous lessons first" style prompts.
pub async fn check_access(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path((course_id, kind, item_id)): Path<(i64, String, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let kind = match kind.as_str() {
        "lesson" | "lessons" => ContentKind::Lesson,
        "exam" | "exams" => ContentKind::Exam,
        _ => {
            return Err(AppError::BadRequest(
                "Content kind must be 'lesson' or 'exam'".to_string(),
            ));
        }
    };

    let catalog = load_catalog(&pool, course_id).await?;
    let facts = load_student_facts(&pool, course_id, claims.user_id()).await?;
    let decision = engine::is_unlocked(&catalog, kind, item_id, &facts, chrono::Utc::now());

    Ok(Json(decision))
}

/// Returns 403 unless the student is enrolled in the course.
pub(crate) async fn ensure_enrolled(
    pool: &PgPool,
    course_id: i64,
    student_id: i64,
) -> Result<(), AppError> {
    let enrolled: Option<i64> =
        sqlx::query_scalar("SELECT id FROM enrollments WHERE course_id = $1 AND student_id = $2")
            .bind(course_id)
            .bind(student_id)
            .fetch_optional(pool)
            .await?;

    if enrolled.is_none() {
        return Err(AppError::Forbidden("Not enrolled in this course".to_string()));
    }
    Ok(())
}

/// Helper struct for catalog lesson rows.
#[derive(sqlx::FromRow)]
struct CatalogLessonRow {
    id: i64,
    section_position: i64,
    position: i64,
    is_free: bool,
}

/// Helper struct for catalog exam rows.
#[derive(sqlx::FromRow)]
struct CatalogExamRow {
    id: i64,
    section_position: i64,
    position: i64,
    open_at: Option<chrono::DateTime<chrono::Utc>>,
    close_at: Option<chrono::DateTime<chrono::Utc>>,
    allow_late_submission: bool,
}

/// Loads the flattened-catalog input for one course: every lesson and
/// exam with its section order and position. Ordering itself is the
/// sequencer's job.
pub(crate) async fn load_catalog(
    pool: &PgPool,
    course_id: i64,
) -> Result<Vec<SequenceItem>, AppError> {
    let lessons = sqlx::query_as::<_, CatalogLessonRow>(
        r#"
        SELECT l.id, s.position AS section_position, l.position, l.is_free
        FROM lessons l
        JOIN sections s ON l.section_id = s.id
        WHERE s.course_id = $1
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    let exams = sqlx::query_as::<_, CatalogExamRow>(
        r#"
        SELECT e.id, s.position AS section_position, e.position,
               e.open_at, e.close_at, e.allow_late_submission
        FROM exams e
        JOIN sections s ON e.section_id = s.id
        WHERE s.course_id = $1
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    let mut catalog = Vec::with_capacity(lessons.len() + exams.len());
    for row in lessons {
        catalog.push(SequenceItem::lesson(
            row.id,
            row.section_position,
            row.position,
            row.is_free,
        ));
    }
    for row in exams {
        catalog.push(SequenceItem::exam(
            row.id,
            row.section_position,
            row.position,
            row.open_at,
            row.close_at,
            row.allow_late_submission,
        ));
    }

    Ok(catalog)
}

/// Loads the per-student facts the sequencer consumes: lesson completion
/// flags plus one aggregated outcome per exam of the course.
pub(crate) async fn load_student_facts(
    pool: &PgPool,
    course_id: i64,
    student_id: i64,
) -> Result<StudentFacts, AppError> {
    let completed: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT lc.lesson_id
        FROM lesson_completions lc
        JOIN lessons l ON lc.lesson_id = l.id
        JOIN sections s ON l.section_id = s.id
        WHERE s.course_id = $1 AND lc.student_id = $2
        "#,
    )
    .bind(course_id)
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    let exams = sqlx::query_as::<_, Exam>(
        r#"
        SELECT e.id, e.section_id, e.title, e.description, e.position,
               e.open_at, e.close_at, e.allow_late_submission, e.late_penalty_percent,
               e.max_attempts, e.scoring_method, e.passing_score, e.total_points,
               e.questions, e.created_at
        FROM exams e
        JOIN sections s ON e.section_id = s.id
        WHERE s.course_id = $1
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    let exam_ids: Vec<i64> = exams.iter().map(|e| e.id).collect();
    let attempts = sqlx::query_as::<_, ExamAttempt>(
        r#"
        SELECT id, exam_id, student_id, started_at, submitted_at, status,
               answers, score, max_score, passed
        FROM exam_attempts
        WHERE exam_id = ANY($1) AND student_id = $2
        "#,
    )
    .bind(&exam_ids)
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    let mut by_exam: HashMap<i64, Vec<ExamAttempt>> = HashMap::new();
    for attempt in attempts {
        by_exam.entry(attempt.exam_id).or_default().push(attempt);
    }

    let mut exam_outcomes = HashMap::new();
    for exam in &exams {
        let attempts = by_exam.remove(&exam.id).unwrap_or_default();
        exam_outcomes.insert(exam.id, engine::aggregate(exam, &attempts));
    }

    Ok(StudentFacts {
        completed_lessons: completed.into_iter().collect::<HashSet<i64>>(),
        exam_outcomes,
    })
}
