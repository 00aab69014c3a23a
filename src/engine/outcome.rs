// src/engine/outcome.rs

//! Attempt Aggregator: folds every attempt of one (student, exam) pair
//! into a single effective outcome per the exam's scoring policy.

use crate::models::{
    attempt::{AttemptStatus, EffectiveOutcome, ExamAttempt, OutcomeStatus},
    content::{Exam, ScoringMethod},
};

/// Combines a student's attempts into one effective outcome.
///
/// Only `submitted` attempts participate in score selection; every attempt
/// counts toward `attempts_count` so attempt limits keep their bite.
pub fn aggregate(exam: &Exam, attempts: &[ExamAttempt]) -> EffectiveOutcome {
    let attempts_count = attempts.len() as i64;
    let remaining_attempts = exam
        .max_attempts
        .map(|max| (i64::from(max) - attempts_count).max(0) as i32);

    if attempts.is_empty() {
        return EffectiveOutcome {
            status: OutcomeStatus::NotStarted,
            effective_score: 0.0,
            best_score: 0.0,
            latest_score: 0.0,
            attempts_count: 0,
            remaining_attempts,
            passed: false,
        };
    }

    let submitted: Vec<&ExamAttempt> = attempts
        .iter()
        .filter(|a| a.status == AttemptStatus::Submitted)
        .collect();

    let best_score = submitted.iter().map(|a| a.score).fold(0.0, f64::max);
    let latest_score = submitted
        .iter()
        .max_by_key(|a| a.submitted_at)
        .map(|a| a.score)
        .unwrap_or(0.0);

    let effective_score = match exam.scoring_method {
        ScoringMethod::Highest => best_score,
        ScoringMethod::Latest => latest_score,
        ScoringMethod::Average => {
            if submitted.is_empty() {
                0.0
            } else {
                submitted.iter().map(|a| a.score).sum::<f64>() / submitted.len() as f64
            }
        }
    };

    // Same comparison as grading. Without a single submitted attempt there
    // is nothing to pass, whatever the threshold.
    let passed = !submitted.is_empty() && effective_score >= exam.passing_score;

    let latest_attempt_open = attempts
        .iter()
        .max_by_key(|a| a.started_at)
        .map(|a| a.status == AttemptStatus::InProgress)
        .unwrap_or(false);

    let status = if latest_attempt_open {
        OutcomeStatus::InProgress
    } else if passed {
        OutcomeStatus::Passed
    } else {
        OutcomeStatus::Failed
    };

    EffectiveOutcome {
        status,
        effective_score,
        best_score,
        latest_score,
        attempts_count,
        remaining_attempts,
        passed,
    }
}
