// tests/outcome_tests.rs

use chrono::{Duration, Utc};
use sqlx::types::Json;

use opencourse::engine::aggregate;
use opencourse::models::attempt::{AttemptStatus, ExamAttempt, OutcomeStatus};
use opencourse::models::content::{Exam, ScoringMethod};

fn exam(scoring_method: ScoringMethod, passing_score: f64, max_attempts: Option<i32>) -> Exam {
    Exam {
        id: 1,
        section_id: 1,
        title: "Final".to_string(),
        description: None,
        position: 1,
        open_at: None,
        close_at: None,
        allow_late_submission: false,
        late_penalty_percent: 0.0,
        max_attempts,
        scoring_method,
        passing_score,
        total_points: 100.0,
        questions: Json(Vec::new()),
        created_at: None,
    }
}

/// Builds an attempt started `minutes_ago` minutes in the past. Submitted
/// attempts get a `submitted_at` one minute after their start.
fn attempt(id: i64, status: AttemptStatus, score: f64, minutes_ago: i64) -> ExamAttempt {
    let started_at = Utc::now() - Duration::minutes(minutes_ago);
    ExamAttempt {
        id,
        exam_id: 1,
        student_id: 7,
        started_at,
        submitted_at: (status == AttemptStatus::Submitted)
            .then(|| started_at + Duration::minutes(1)),
        status,
        answers: Json(Vec::new()),
        score,
        max_score: 100.0,
        passed: false,
    }
}

#[test]
fn no_attempts_yields_not_started() {
    let exam = exam(ScoringMethod::Highest, 60.0, Some(3));

    let outcome = aggregate(&exam, &[]);

    assert_eq!(outcome.status, OutcomeStatus::NotStarted);
    assert_eq!(outcome.attempts_count, 0);
    assert_eq!(outcome.remaining_attempts, Some(3));
    assert!(!outcome.passed);
}

#[test]
fn open_latest_attempt_yields_in_progress() {
    let exam = exam(ScoringMethod::Highest, 60.0, None);
    let attempts = vec![
        attempt(1, AttemptStatus::Submitted, 70.0, 60),
        attempt(2, AttemptStatus::InProgress, 0.0, 5),
    ];

    let outcome = aggregate(&exam, &attempts);

    assert_eq!(outcome.status, OutcomeStatus::InProgress);
    // The earlier pass still counts for the flag.
    assert!(outcome.passed);
}

#[test]
fn highest_method_selects_the_best_submitted_score() {
    let exam = exam(ScoringMethod::Highest, 60.0, None);
    let attempts = vec![
        attempt(1, AttemptStatus::Submitted, 40.0, 90),
        attempt(2, AttemptStatus::Submitted, 75.0, 60),
        attempt(3, AttemptStatus::Submitted, 55.0, 30),
    ];

    let outcome = aggregate(&exam, &attempts);

    assert_eq!(outcome.effective_score, 75.0);
    assert_eq!(outcome.status, OutcomeStatus::Passed);
}

#[test]
fn latest_method_selects_the_most_recent_submitted_score() {
    let exam = exam(ScoringMethod::Latest, 60.0, None);
    let attempts = vec![
        attempt(1, AttemptStatus::Submitted, 80.0, 90),
        attempt(2, AttemptStatus::Submitted, 50.0, 30),
    ];

    let outcome = aggregate(&exam, &attempts);

    assert_eq!(outcome.effective_score, 50.0);
    assert_eq!(outcome.best_score, 80.0);
    assert_eq!(outcome.latest_score, 50.0);
    assert_eq!(outcome.status, OutcomeStatus::Failed);
}

#[test]
fn average_method_takes_the_unweighted_mean() {
    let exam = exam(ScoringMethod::Average, 60.0, None);
    let attempts = vec![
        attempt(1, AttemptStatus::Submitted, 40.0, 90),
        attempt(2, AttemptStatus::Submitted, 80.0, 30),
    ];

    let outcome = aggregate(&exam, &attempts);

    assert!((outcome.effective_score - 60.0).abs() < 1e-9);
    // Comparison is >=, so the mean exactly at the threshold passes.
    assert!(outcome.passed);
}

#[test]
fn non_submitted_attempts_count_toward_the_limit_but_not_the_score() {
    let exam = exam(ScoringMethod::Highest, 60.0, Some(3));
    let attempts = vec![
        attempt(1, AttemptStatus::Expired, 90.0, 90),
        attempt(2, AttemptStatus::Abandoned, 95.0, 60),
        attempt(3, AttemptStatus::Submitted, 70.0, 30),
    ];

    let outcome = aggregate(&exam, &attempts);

    assert_eq!(outcome.attempts_count, 3);
    assert_eq!(outcome.remaining_attempts, Some(0));
    assert_eq!(outcome.effective_score, 70.0);
}

#[test]
fn only_terminal_non_submitted_attempts_cannot_pass() {
    let exam = exam(ScoringMethod::Highest, 0.0, None);
    let attempts = vec![attempt(1, AttemptStatus::Expired, 0.0, 30)];

    let outcome = aggregate(&exam, &attempts);

    // Even a zero threshold needs at least one submitted attempt.
    assert!(!outcome.passed);
    assert_eq!(outcome.status, OutcomeStatus::Failed);
}

#[test]
fn remaining_attempts_never_goes_negative() {
    let exam = exam(ScoringMethod::Highest, 60.0, Some(1));
    let attempts = vec![
        attempt(1, AttemptStatus::Submitted, 10.0, 90),
        attempt(2, AttemptStatus::Submitted, 20.0, 30),
    ];

    let outcome = aggregate(&exam, &attempts);

    assert_eq!(outcome.remaining_attempts, Some(0));
}

#[test]
fn highest_effective_score_is_monotonic_in_added_attempts() {
    let exam = exam(ScoringMethod::Highest, 60.0, None);
    let mut attempts = Vec::new();
    let mut previous = 0.0;

    for (i, score) in [30.0, 80.0, 10.0, 55.0].into_iter().enumerate() {
        attempts.push(attempt(i as i64 + 1, AttemptStatus::Submitted, score, 90 - i as i64));
        let outcome = aggregate(&exam, &attempts);
        assert!(outcome.effective_score >= previous);
        previous = outcome.effective_score;
    }
}
