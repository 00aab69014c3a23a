// src/handlers/reviews.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError, models::course::ReviewWithAuthor, utils::html::clean_html, utils::jwt::Claims,
};

use super::progress::ensure_enrolled;

/// DTO for creating or replacing a course review.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewRequest {
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

/// Creates or updates the current student's review of a course.
/// One review per (course, student); a second submission replaces it.
pub async fn create_review(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
    Json(payload): Json<CreateReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let student_id = claims.user_id();
    ensure_enrolled(&pool, course_id, student_id).await?;

    let comment = payload.comment.as_deref().map(clean_html);

    sqlx::query(
        r#"
        INSERT INTO course_reviews (course_id, student_id, rating, comment)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (course_id, student_id) DO UPDATE
            SET rating = EXCLUDED.rating,
                comment = EXCLUDED.comment,
                created_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(course_id)
    .bind(student_id)
    .bind(payload.rating)
    .bind(comment)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to save review: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(StatusCode::CREATED)
}

/// Lists the reviews of a course with author usernames.
pub async fn list_reviews(
    State(pool): State<PgPool>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let reviews = sqlx::query_as::<_, ReviewWithAuthor>(
        r#"
        SELECT u.username, r.rating, r.comment, r.created_at
        FROM course_reviews r
        JOIN users u ON r.student_id = u.id
        WHERE r.course_id = $1
        ORDER BY r.created_at DESC
        "#,
    )
    .bind(course_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch reviews: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(reviews))
}
