// src/handlers/exams.rs

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::PgPool;

use crate::{
    engine::{self, ContentKind, GradingError, LockReason},
    error::AppError,
    models::{
        attempt::{AttemptStatus, ExamAttempt, SubmittedAnswer},
        content::Exam,
        question::{PublicQuestion, Question},
    },
    utils::jwt::Claims,
};

use super::progress::{ensure_enrolled, load_catalog, load_student_facts};

const ATTEMPT_COLUMNS: &str =
    "id, exam_id, student_id, started_at, submitted_at, status, answers, score, max_score, passed";

/// Retrieves an exam with its questions in student-safe form: correct
/// flags and expected answers are stripped before serialization.
pub async fn get_exam(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = fetch_exam(&pool, id).await?;
    let questions = fetch_questions(&pool, &exam).await?;

    // Preserve the exam's question order, skipping dangling references.
    let public: Vec<PublicQuestion> = exam
        .questions
        .iter()
        .filter_map(|qref| questions.get(&qref.question_id))
        .map(PublicQuestion::from_question)
        .collect();

    Ok(Json(serde_json::json!({
        "id": exam.id,
        "section_id": exam.section_id,
        "title": exam.title,
        "description": exam.description,
        "open_at": exam.open_at,
        "close_at": exam.close_at,
        "allow_late_submission": exam.allow_late_submission,
        "late_penalty_percent": exam.late_penalty_percent,
        "max_attempts": exam.max_attempts,
        "scoring_method": exam.scoring_method,
        "passing_score": exam.passing_score,
        "total_points": exam.total_points,
        "questions": public,
    })))
}

/// Starts a new attempt on an exam.
///
/// Requires enrollment, an unlocked exam, and attempt headroom. The
/// count-and-insert runs in one transaction holding the student's attempt
/// rows locked, so two racing requests cannot both squeeze past the limit.
pub async fn start_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id();
    let exam = fetch_exam(&pool, exam_id).await?;
    let course_id = course_of_exam(&pool, exam_id).await?;

    ensure_enrolled(&pool, course_id, student_id).await?;
    expire_overdue(&pool, &exam, student_id).await?;

    let now = chrono::Utc::now();
    let catalog = load_catalog(&pool, course_id).await?;
    let facts = load_student_facts(&pool, course_id, student_id).await?;
    let decision = engine::is_unlocked(&catalog, ContentKind::Exam, exam_id, &facts, now);
    if !decision.unlocked {
        return Err(lock_error(decision.reason));
    }

    // Unlock alone is not enough: a passed exam stays unlocked for
    // review, but a fresh sitting still needs an open window.
    engine::check_window_open(&exam, now)?;

    let mut tx = pool.begin().await?;

    // Lock this student's attempt rows for the duration of the check.
    let existing = sqlx::query_as::<_, ExamAttempt>(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM exam_attempts
         WHERE exam_id = $1 AND student_id = $2
         ORDER BY started_at
         FOR UPDATE"
    ))
    .bind(exam_id)
    .bind(student_id)
    .fetch_all(&mut *tx)
    .await?;

    // An open attempt is resumed, not duplicated.
    if let Some(open) = existing
        .iter()
        .find(|a| a.status == AttemptStatus::InProgress)
    {
        let open = open.clone();
        tx.commit().await?;
        return Ok((StatusCode::OK, Json(open)));
    }

    engine::check_attempt_allowed(&exam, existing.len() as i64)?;

    let attempt = sqlx::query_as::<_, ExamAttempt>(&format!(
        "INSERT INTO exam_attempts (exam_id, student_id, status)
         VALUES ($1, $2, $3)
         RETURNING {ATTEMPT_COLUMNS}"
    ))
    .bind(exam_id)
    .bind(student_id)
    .bind(AttemptStatus::InProgress)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create attempt: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(attempt)))
}

/// DTO for submitting an attempt.
#[derive(Debug, Deserialize)]
pub struct SubmitAttemptRequest {
    pub answers: Vec<SubmittedAnswer>,
}

/// Grades and finalizes an in-progress attempt.
///
/// Grading is pure; this handler owns the persistence and the
/// `in_progress -> submitted` transition. Fatal grading errors leave no
/// partial state behind.
pub async fn submit_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id();
    let attempt = fetch_attempt(&pool, attempt_id).await?;

    if attempt.student_id != student_id {
        return Err(AppError::Forbidden("Not your attempt".to_string()));
    }
    if attempt.status != AttemptStatus::InProgress {
        return Err(AppError::Conflict("Attempt is already finalized".to_string()));
    }

    let exam = fetch_exam(&pool, attempt.exam_id).await?;

    // Re-check the limit against every other attempt before grading.
    let prior: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM exam_attempts WHERE exam_id = $1 AND student_id = $2 AND id <> $3",
    )
    .bind(exam.id)
    .bind(student_id)
    .bind(attempt_id)
    .fetch_one(&pool)
    .await?;
    engine::check_attempt_allowed(&exam, prior)?;

    let questions = fetch_questions(&pool, &exam).await?;
    let submitted_at = chrono::Utc::now();

    let graded = match engine::grade(&exam, &questions, &payload.answers, submitted_at) {
        Ok(graded) => graded,
        Err(GradingError::SubmissionWindowClosed) => {
            // The sitting can never be graded; close it out.
            sqlx::query("UPDATE exam_attempts SET status = $1 WHERE id = $2")
                .bind(AttemptStatus::Expired)
                .bind(attempt_id)
                .execute(&pool)
                .await?;
            return Err(GradingError::SubmissionWindowClosed.into());
        }
        Err(e) => return Err(e.into()),
    };

    // The grader trusts its own max score. Drift in the stored display
    // value is logged for the instructor, never corrected mid-grading.
    if (graded.max_score - exam.total_points).abs() > 1e-9 {
        tracing::warn!(
            exam_id = exam.id,
            stored_total_points = exam.total_points,
            computed_max_score = graded.max_score,
            "Exam total_points does not match the computed max score"
        );
    }

    let attempt = sqlx::query_as::<_, ExamAttempt>(&format!(
        "UPDATE exam_attempts
         SET status = $1, submitted_at = $2, answers = $3, score = $4, max_score = $5, passed = $6
         WHERE id = $7
         RETURNING {ATTEMPT_COLUMNS}"
    ))
    .bind(AttemptStatus::Submitted)
    .bind(submitted_at)
    .bind(sqlx::types::Json(&graded.answers))
    .bind(graded.score)
    .bind(graded.max_score)
    .bind(graded.passed)
    .bind(attempt_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to persist graded attempt: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let attempts = fetch_attempts(&pool, exam.id, student_id).await?;
    let outcome = engine::aggregate(&exam, &attempts);

    Ok(Json(serde_json::json!({
        "attempt": attempt,
        "late_penalty_applied": graded.late_penalty_applied,
        "outcome": outcome,
    })))
}

/// Marks an in-progress attempt abandoned. Terminal; the attempt still
/// counts toward the attempt limit.
pub async fn abandon_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = fetch_attempt(&pool, attempt_id).await?;

    if attempt.student_id != claims.user_id() {
        return Err(AppError::Forbidden("Not your attempt".to_string()));
    }
    if attempt.status != AttemptStatus::InProgress {
        return Err(AppError::Conflict("Attempt is already finalized".to_string()));
    }

    sqlx::query("UPDATE exam_attempts SET status = $1 WHERE id = $2")
        .bind(AttemptStatus::Abandoned)
        .bind(attempt_id)
        .execute(&pool)
        .await?;

    Ok(StatusCode::OK)
}

/// Returns the student's effective outcome on an exam, aggregated across
/// all their attempts.
pub async fn get_outcome(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id();
    let exam = fetch_exam(&pool, exam_id).await?;

    expire_overdue(&pool, &exam, student_id).await?;

    let attempts = fetch_attempts(&pool, exam_id, student_id).await?;
    Ok(Json(engine::aggregate(&exam, &attempts)))
}

fn lock_error(reason: Option<LockReason>) -> AppError {
    match reason {
        Some(LockReason::NotOpenYet) => {
            AppError::Conflict("This exam is not open yet".to_string())
        }
        Some(LockReason::Closed) => {
            AppError::Conflict("The submission window for this exam has closed".to_string())
        }
        _ => AppError::Forbidden("Complete previous lessons and exams first".to_string()),
    }
}

pub(crate) async fn fetch_exam(pool: &PgPool, id: i64) -> Result<Exam, AppError> {
    sqlx::query_as::<_, Exam>(
        r#"
        SELECT id, section_id, title, description, position,
               open_at, close_at, allow_late_submission, late_penalty_percent,
               max_attempts, scoring_method, passing_score, total_points,
               questions, created_at
        FROM exams
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Exam not found".to_string()))
}

async fn course_of_exam(pool: &PgPool, exam_id: i64) -> Result<i64, AppError> {
    sqlx::query_scalar(
        "SELECT s.course_id FROM exams e JOIN sections s ON e.section_id = s.id WHERE e.id = $1",
    )
    .bind(exam_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Exam not found".to_string()))
}

async fn fetch_attempt(pool: &PgPool, id: i64) -> Result<ExamAttempt, AppError> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM exam_attempts WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Attempt not found".to_string()))
}

async fn fetch_attempts(
    pool: &PgPool,
    exam_id: i64,
    student_id: i64,
) -> Result<Vec<ExamAttempt>, AppError> {
    let attempts = sqlx::query_as::<_, ExamAttempt>(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM exam_attempts
         WHERE exam_id = $1 AND student_id = $2
         ORDER BY started_at"
    ))
    .bind(exam_id)
    .bind(student_id)
    .fetch_all(pool)
    .await?;
    Ok(attempts)
}

/// Loads the exam's question set keyed by id.
async fn fetch_questions(
    pool: &PgPool,
    exam: &Exam,
) -> Result<HashMap<i64, Question>, AppError> {
    let ids: Vec<i64> = exam.questions.iter().map(|q| q.question_id).collect();

    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, prompt, kind, points, negative_marking, negative_points, created_at
        FROM questions
        WHERE id = ANY($1)
        "#,
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    Ok(questions.into_iter().map(|q| (q.id, q)).collect())
}

/// Caller-driven expiry sweep: an open sitting on an exam that has closed
/// without a late allowance can never be submitted, so it is flipped to
/// `expired` before attempts are read or written.
async fn expire_overdue(pool: &PgPool, exam: &Exam, student_id: i64) -> Result<(), AppError> {
    let Some(close_at) = exam.close_at else {
        return Ok(());
    };
    if exam.allow_late_submission || chrono::Utc::now() <= close_at {
        return Ok(());
    }

    sqlx::query(
        "UPDATE exam_attempts SET status = $1
         WHERE exam_id = $2 AND student_id = $3 AND status = $4",
    )
    .bind(AttemptStatus::Expired)
    .bind(exam.id)
    .bind(student_id)
    .bind(AttemptStatus::InProgress)
    .execute(pool)
    .await?;

    Ok(())
}
