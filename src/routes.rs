// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, courses, exams, progress, reviews},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, courses, lessons, exams, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (Database Pool + Config).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let course_routes = Router::new()
        .route("/", get(courses::list_courses))
        .route("/{id}", get(courses::get_course))
        .route("/{id}/reviews", get(reviews::list_reviews))
        // Protected course routes
        .merge(
            Router::new()
                .route("/{id}/enroll", post(progress::enroll))
                .route("/{id}/reviews", post(reviews::create_review))
                .route(
                    "/{course_id}/access/{kind}/{item_id}",
                    get(progress::check_access),
                )
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    let lesson_routes = Router::new()
        .route("/{id}/complete", post(progress::complete_lesson))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let exam_routes = Router::new()
        .route("/{id}", get(exams::get_exam))
        // Protected exam routes
        .merge(
            Router::new()
                .route("/{id}/attempts", post(exams::start_attempt))
                .route("/{id}/outcome", get(exams::get_outcome))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    let attempt_routes = Router::new()
        .route("/{id}/submit", post(exams::submit_attempt))
        .route("/{id}/abandon", post(exams::abandon_attempt))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/courses", post(admin::create_course))
        .route(
            "/courses/{id}",
            put(admin::update_course).delete(admin::delete_course),
        )
        .route("/sections", post(admin::create_section))
        .route(
            "/sections/{id}",
            put(admin::update_section).delete(admin::delete_section),
        )
        .route("/lessons", post(admin::create_lesson))
        .route(
            "/lessons/{id}",
            put(admin::update_lesson).delete(admin::delete_lesson),
        )
        .route("/exams", post(admin::create_exam))
        .route(
            "/exams/{id}",
            put(admin::update_exam).delete(admin::delete_exam),
        )
        .route("/questions", post(admin::create_question))
        .route(
            "/questions/{id}",
            delete(admin::delete_question).put(admin::update_question),
        )
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/courses", course_routes)
        .nest("/api/lessons", lesson_routes)
        .nest("/api/exams", exam_routes)
        .nest("/api/attempts", attempt_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
