// src/engine/grading.rs

//! Attempt Grader: scores one exam submission against its question set.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    attempt::{AnswerRecord, AnswerValue, SubmittedAnswer},
    content::{Exam, ExamQuestionRef},
    question::{Question, QuestionKind},
};

/// Fatal grading failures. These abort the operation before any partial
/// state is produced; no half-graded attempt is ever persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GradingError {
    #[error("This exam is not open yet")]
    ExamNotOpen,
    #[error("The submission window for this exam has closed")]
    SubmissionWindowClosed,
    #[error("The attempt limit for this exam has been reached")]
    AttemptLimitExceeded,
}

/// A fully graded submission, ready to be persisted by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct GradedAttempt {
    /// Final score, clamped to `[0, max_score]`.
    pub score: f64,

    /// Sum of effective per-question maxima, computed from the question
    /// set. Deliberately independent of the exam's stored `total_points`.
    pub max_score: f64,

    pub passed: bool,
    pub late_penalty_applied: bool,
    pub answers: Vec<AnswerRecord>,
}

/// Rejects attempt creation (and re-grading) once the attempt limit is
/// exhausted. Advisory only: the store must still serialize the
/// check-and-insert per (student, exam).
pub fn check_attempt_allowed(exam: &Exam, prior_attempts: i64) -> Result<(), GradingError> {
    if let Some(max) = exam.max_attempts {
        if prior_attempts >= max as i64 {
            return Err(GradingError::AttemptLimitExceeded);
        }
    }
    Ok(())
}

/// Rejects opening a new sitting outside the exam's time window.
///
/// Distinct from unlock checks: the sequencer keeps a passed exam
/// unlocked for review, but a fresh attempt still needs an open window.
pub fn check_window_open(exam: &Exam, now: DateTime<Utc>) -> Result<(), GradingError> {
    if exam.open_at.is_some_and(|open_at| now < open_at) {
        return Err(GradingError::ExamNotOpen);
    }
    if exam
        .close_at
        .is_some_and(|close_at| now > close_at && !exam.allow_late_submission)
    {
        return Err(GradingError::SubmissionWindowClosed);
    }
    Ok(())
}

/// A question's per-exam maximum contribution: the reference's point
/// override (when present) replacing the base points, times the weight.
pub fn effective_points(qref: &ExamQuestionRef, question: &Question) -> f64 {
    qref.question_points.unwrap_or(question.points) * qref.weight
}

/// Grades one submission. Pure: persistence of the resulting attempt and
/// its status transition belong to the caller.
///
/// Answers referencing questions not on the exam are ignored. Every exam
/// question yields one answer record, omitted ones included.
pub fn grade(
    exam: &Exam,
    questions_by_id: &HashMap<i64, Question>,
    answers: &[SubmittedAnswer],
    submitted_at: DateTime<Utc>,
) -> Result<GradedAttempt, GradingError> {
    let mut late = false;
    if let Some(close_at) = exam.close_at {
        if submitted_at > close_at {
            if !exam.allow_late_submission {
                return Err(GradingError::SubmissionWindowClosed);
            }
            late = true;
        }
    }

    // First answer per question wins; duplicates are client noise.
    let mut by_question: HashMap<i64, &AnswerValue> = HashMap::new();
    for answer in answers {
        by_question.entry(answer.question_id).or_insert(&answer.value);
    }

    let mut graded = Vec::with_capacity(exam.questions.len());
    let mut raw_total = 0.0;
    let mut max_score = 0.0;

    for qref in exam.questions.iter() {
        let Some(question) = questions_by_id.get(&qref.question_id) else {
            // Dangling reference; nothing to grade against.
            continue;
        };

        let maximum = effective_points(qref, question);
        max_score += maximum;

        let value = by_question.get(&qref.question_id).copied();
        let verdict = evaluate(&question.kind.0, value);

        let score = match verdict {
            Verdict::Correct => maximum,
            // An omission is distinct from a wrong answer: no penalty.
            Verdict::Incorrect if question.negative_marking => {
                -question.negative_points * qref.weight
            }
            _ => 0.0,
        };
        raw_total += score;

        graded.push(AnswerRecord {
            question_id: qref.question_id,
            value: value.cloned(),
            is_correct: verdict == Verdict::Correct,
            score,
            max_score: maximum,
        });
    }

    let mut total = raw_total;
    if late {
        total *= (100.0 - exam.late_penalty_percent) / 100.0;
    }

    // Negative marking may drive the raw sum below zero; the persisted
    // score never leaves [0, max_score].
    let score = total.clamp(0.0, max_score);

    Ok(GradedAttempt {
        score,
        max_score,
        passed: score >= exam.passing_score,
        late_penalty_applied: late,
        answers: graded,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Correct,
    Incorrect,
    Omitted,
}

/// Per-variant comparison. An answer whose shape does not match the
/// question variant, or that exceeds `max_selectable`, counts as incorrect
/// without surfacing an error mid-exam.
fn evaluate(kind: &QuestionKind, value: Option<&AnswerValue>) -> Verdict {
    let Some(value) = value else {
        return Verdict::Omitted;
    };

    match (kind, value) {
        (QuestionKind::SingleChoice { options }, AnswerValue::Choice { option_id }) => {
            match options.iter().find(|o| o.is_correct) {
                Some(correct) if correct.id == *option_id => Verdict::Correct,
                _ => Verdict::Incorrect,
            }
        }
        (
            QuestionKind::MultipleChoice {
                options,
                max_selectable,
            },
            AnswerValue::Choices { option_ids },
        ) => {
            if let Some(max) = max_selectable {
                if option_ids.len() > *max {
                    return Verdict::Incorrect;
                }
            }
            let chosen: std::collections::HashSet<i64> = option_ids.iter().copied().collect();
            let correct: std::collections::HashSet<i64> = options
                .iter()
                .filter(|o| o.is_correct)
                .map(|o| o.id)
                .collect();
            // Exact set equality; partial credit is not awarded.
            if chosen == correct {
                Verdict::Correct
            } else {
                Verdict::Incorrect
            }
        }
        (
            QuestionKind::ShortAnswer {
                expected_answers,
                case_sensitive,
            },
            AnswerValue::Text { text },
        ) => {
            let submitted = text.trim();
            let matched = expected_answers.iter().any(|expected| {
                let expected = expected.trim();
                if *case_sensitive {
                    expected == submitted
                } else {
                    expected.to_lowercase() == submitted.to_lowercase()
                }
            });
            if matched {
                Verdict::Correct
            } else {
                Verdict::Incorrect
            }
        }
        _ => Verdict::Incorrect,
    }
}
