// src/handlers/admin.rs

use std::collections::HashSet;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        content::{ExamQuestionRef, ScoringMethod},
        question::{CreateQuestionRequest, QuestionKind},
    },
    utils::html::clean_html,
};

/// DTO for creating a course.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCourseRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    pub cover_img: Option<String>,
    #[serde(default)]
    pub published: bool,
}

/// Creates a new course.
/// Admin only.
pub async fn create_course(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO courses (title, description, category, cover_img, published)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(&payload.category)
    .bind(&payload.cover_img)
    .bind(payload.published)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create course: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// DTO for updating a course. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateCourseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub cover_img: Option<String>,
    pub published: Option<bool>,
}

/// Updates a course by ID.
/// Admin only.
pub async fn update_course(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.title.is_none()
        && payload.description.is_none()
        && payload.category.is_none()
        && payload.cover_img.is_none()
        && payload.published.is_none()
    {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE courses SET ");
    let mut separated = builder.separated(", ");

    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title);
    }

    if let Some(description) = payload.description {
        separated.push("description = ");
        separated.push_bind_unseparated(description);
    }

    if let Some(category) = payload.category {
        separated.push("category = ");
        separated.push_bind_unseparated(category);
    }

    if let Some(cover_img) = payload.cover_img {
        separated.push("cover_img = ");
        separated.push_bind_unseparated(cover_img);
    }

    if let Some(published) = payload.published {
        separated.push("published = ");
        separated.push_bind_unseparated(published);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update course: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Course not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes a course by ID. Cascades to sections, lessons and exams.
/// Admin only.
pub async fn delete_course(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM courses WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete course: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Course not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// DTO for creating a section.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSectionRequest {
    pub course_id: i64,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub position: i64,
}

/// Creates a new section within a course.
/// Admin only.
pub async fn create_section(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateSectionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO sections (course_id, title, position) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(payload.course_id)
    .bind(&payload.title)
    .bind(payload.position)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create section: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// DTO for updating a section. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateSectionRequest {
    pub title: Option<String>,
    pub position: Option<i64>,
}

/// Updates a section by ID.
/// Admin only.
pub async fn update_section(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateSectionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let _exists: i64 = sqlx::query_scalar("SELECT id FROM sections WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Section not found".to_string()))?;

    if let Some(title) = payload.title {
        sqlx::query("UPDATE sections SET title = $1 WHERE id = $2")
            .bind(title)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    if let Some(position) = payload.position {
        sqlx::query("UPDATE sections SET position = $1 WHERE id = $2")
            .bind(position)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    Ok(StatusCode::OK)
}

/// Deletes a section by ID.
/// Admin only.
pub async fn delete_section(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM sections WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Section not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// DTO for creating a lesson.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateLessonRequest {
    pub section_id: i64,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub content: String,
    pub position: i64,
    #[serde(default)]
    pub is_free: bool,
}

/// Creates a new lesson. The HTML body is sanitized before storage.
/// Admin only.
pub async fn create_lesson(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateLessonRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO lessons (section_id, title, content, position, is_free)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(payload.section_id)
    .bind(&payload.title)
    .bind(clean_html(&payload.content))
    .bind(payload.position)
    .bind(payload.is_free)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create lesson: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// DTO for updating a lesson. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateLessonRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub position: Option<i64>,
    pub is_free: Option<bool>,
}

/// Updates a lesson by ID.
/// Admin only.
pub async fn update_lesson(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateLessonRequest>,
) -> Result<impl IntoResponse, AppError> {
    let _exists: i64 = sqlx::query_scalar("SELECT id FROM lessons WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Lesson not found".to_string()))?;

    if let Some(title) = payload.title {
        sqlx::query("UPDATE lessons SET title = $1 WHERE id = $2")
            .bind(title)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    if let Some(content) = payload.content {
        sqlx::query("UPDATE lessons SET content = $1 WHERE id = $2")
            .bind(clean_html(&content))
            .bind(id)
            .execute(&pool)
            .await?;
    }

    if let Some(position) = payload.position {
        sqlx::query("UPDATE lessons SET position = $1 WHERE id = $2")
            .bind(position)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    if let Some(is_free) = payload.is_free {
        sqlx::query("UPDATE lessons SET is_free = $1 WHERE id = $2")
            .bind(is_free)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    Ok(StatusCode::OK)
}

/// Deletes a lesson by ID.
/// Admin only.
pub async fn delete_lesson(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM lessons WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Lesson not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// DTO for creating or replacing an exam definition.
#[derive(Debug, Deserialize, Validate)]
pub struct ExamPayload {
    pub section_id: i64,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub description: Option<String>,
    pub position: i64,
    pub open_at: Option<chrono::DateTime<chrono::Utc>>,
    pub close_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub allow_late_submission: bool,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 100.0))]
    pub late_penalty_percent: f64,
    /// Absent means unlimited; zero would make every sitting impossible.
    #[validate(range(min = 1))]
    pub max_attempts: Option<i32>,
    pub scoring_method: ScoringMethod,
    #[validate(range(min = 0.0))]
    pub passing_score: f64,
    #[validate(range(min = 0.0))]
    pub total_points: f64,
    #[serde(default)]
    pub questions: Vec<ExamQuestionRef>,
}

async fn validate_exam_payload(pool: &PgPool, payload: &ExamPayload) -> Result<(), AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    for qref in &payload.questions {
        if qref.weight < 0.0 {
            return Err(AppError::BadRequest("Question weight must be >= 0".to_string()));
        }
        if qref.question_points.is_some_and(|p| p < 0.0) {
            return Err(AppError::BadRequest("Question points must be >= 0".to_string()));
        }
    }

    let ids: Vec<i64> = payload
        .questions
        .iter()
        .map(|q| q.question_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE id = ANY($1)")
        .bind(&ids)
        .fetch_one(pool)
        .await?;

    if found != ids.len() as i64 {
        return Err(AppError::BadRequest(
            "Exam references an unknown question".to_string(),
        ));
    }

    Ok(())
}

/// Creates a new exam.
/// Admin only.
pub async fn create_exam(
    State(pool): State<PgPool>,
    Json(payload): Json<ExamPayload>,
) -> Result<impl IntoResponse, AppError> {
    validate_exam_payload(&pool, &payload).await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO exams
        (section_id, title, description, position, open_at, close_at,
         allow_late_submission, late_penalty_percent, max_attempts,
         scoring_method, passing_score, total_points, questions)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING id
        "#,
    )
    .bind(payload.section_id)
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(payload.position)
    .bind(payload.open_at)
    .bind(payload.close_at)
    .bind(payload.allow_late_submission)
    .bind(payload.late_penalty_percent)
    .bind(payload.max_attempts)
    .bind(payload.scoring_method)
    .bind(payload.passing_score)
    .bind(payload.total_points)
    .bind(sqlx::types::Json(&payload.questions))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create exam: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Replaces an exam definition by ID. Attempts already graded against the
/// old definition keep their stored scores.
/// Admin only.
pub async fn update_exam(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<ExamPayload>,
) -> Result<impl IntoResponse, AppError> {
    validate_exam_payload(&pool, &payload).await?;

    let result = sqlx::query(
        r#"
        UPDATE exams
        SET section_id = $1, title = $2, description = $3, position = $4,
            open_at = $5, close_at = $6, allow_late_submission = $7,
            late_penalty_percent = $8, max_attempts = $9, scoring_method = $10,
            passing_score = $11, total_points = $12, questions = $13
        WHERE id = $14
        "#,
    )
    .bind(payload.section_id)
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(payload.position)
    .bind(payload.open_at)
    .bind(payload.close_at)
    .bind(payload.allow_late_submission)
    .bind(payload.late_penalty_percent)
    .bind(payload.max_attempts)
    .bind(payload.scoring_method)
    .bind(payload.passing_score)
    .bind(payload.total_points)
    .bind(sqlx::types::Json(&payload.questions))
    .bind(id)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to update exam: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Exam not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes an exam by ID.
/// Admin only.
pub async fn delete_exam(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM exams WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Exam not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

fn validate_question(payload: &CreateQuestionRequest) -> Result<(), AppError> {
    if payload.prompt.trim().is_empty() {
        return Err(AppError::BadRequest("Prompt cannot be empty".to_string()));
    }
    if payload.points < 0.0 || payload.negative_points < 0.0 {
        return Err(AppError::BadRequest("Points must be >= 0".to_string()));
    }

    match &payload.kind {
        QuestionKind::SingleChoice { options } => {
            let correct = options.iter().filter(|o| o.is_correct).count();
            if correct != 1 {
                return Err(AppError::BadRequest(
                    "A single-choice question needs exactly one correct option".to_string(),
                ));
            }
        }
        QuestionKind::MultipleChoice {
            options,
            max_selectable,
        } => {
            if !options.iter().any(|o| o.is_correct) {
                return Err(AppError::BadRequest(
                    "A multiple-choice question needs at least one correct option".to_string(),
                ));
            }
            if max_selectable.is_some_and(|max| max == 0) {
                return Err(AppError::BadRequest(
                    "max_selectable must be at least 1".to_string(),
                ));
            }
        }
        QuestionKind::ShortAnswer {
            expected_answers, ..
        } => {
            if expected_answers.is_empty() {
                return Err(AppError::BadRequest(
                    "A short-answer question needs at least one expected answer".to_string(),
                ));
            }
        }
    }

    Ok(())
}

/// Creates a new question.
/// Admin only.
pub async fn create_question(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_question(&payload)?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO questions (prompt, kind, points, negative_marking, negative_points)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(&payload.prompt)
    .bind(sqlx::types::Json(&payload.kind))
    .bind(payload.points)
    .bind(payload.negative_marking)
    .bind(payload.negative_points)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Replaces a question definition by ID.
/// Admin only.
pub async fn update_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_question(&payload)?;

    let result = sqlx::query(
        r#"
        UPDATE questions
        SET prompt = $1, kind = $2, points = $3, negative_marking = $4, negative_points = $5
        WHERE id = $6
        "#,
    )
    .bind(&payload.prompt)
    .bind(sqlx::types::Json(&payload.kind))
    .bind(payload.points)
    .bind(payload.negative_marking)
    .bind(payload.negative_points)
    .bind(id)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to update question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes a question by ID.
/// Admin only.
pub async fn delete_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
