// tests/grading_tests.rs

use std::collections::HashMap;

use chrono::{Duration, Utc};
use sqlx::types::Json;

use opencourse::engine::{GradingError, check_attempt_allowed, check_window_open, grade};
use opencourse::models::attempt::{AnswerValue, SubmittedAnswer};
use opencourse::models::content::{Exam, ExamQuestionRef, ScoringMethod};
use opencourse::models::question::{ChoiceOption, Question, QuestionKind};

fn exam_with(questions: Vec<ExamQuestionRef>) -> Exam {
    Exam {
        id: 1,
        section_id: 1,
        title: "Checkpoint".to_string(),
        description: None,
        position: 1,
        open_at: None,
        close_at: None,
        allow_late_submission: false,
        late_penalty_percent: 0.0,
        max_attempts: None,
        scoring_method: ScoringMethod::Highest,
        passing_score: 0.0,
        total_points: 0.0,
        questions: Json(questions),
        created_at: None,
    }
}

fn qref(question_id: i64) -> ExamQuestionRef {
    ExamQuestionRef {
        question_id,
        weight: 1.0,
        question_points: None,
    }
}

fn opt(id: i64, is_correct: bool) -> ChoiceOption {
    ChoiceOption {
        id,
        text: format!("Option {id}"),
        is_correct,
    }
}

fn question(id: i64, kind: QuestionKind, points: f64) -> Question {
    Question {
        id,
        prompt: format!("Question {id}"),
        kind: Json(kind),
        points,
        negative_marking: false,
        negative_points: 0.0,
        created_at: None,
    }
}

fn single_choice(id: i64, points: f64) -> Question {
    question(
        id,
        QuestionKind::SingleChoice {
            options: vec![opt(1, true), opt(2, false), opt(3, false)],
        },
        points,
    )
}

fn by_id(questions: Vec<Question>) -> HashMap<i64, Question> {
    questions.into_iter().map(|q| (q.id, q)).collect()
}

fn choose(question_id: i64, option_id: i64) -> SubmittedAnswer {
    SubmittedAnswer {
        question_id,
        value: AnswerValue::Choice { option_id },
    }
}

fn choose_many(question_id: i64, option_ids: Vec<i64>) -> SubmittedAnswer {
    SubmittedAnswer {
        question_id,
        value: AnswerValue::Choices { option_ids },
    }
}

fn write(question_id: i64, text: &str) -> SubmittedAnswer {
    SubmittedAnswer {
        question_id,
        value: AnswerValue::Text {
            text: text.to_string(),
        },
    }
}

#[test]
fn single_choice_correct_awards_effective_points() {
    // Arrange
    let mut exam = exam_with(vec![qref(10)]);
    exam.passing_score = 2.0;
    let questions = by_id(vec![single_choice(10, 2.0)]);

    // Act
    let graded = grade(&exam, &questions, &[choose(10, 1)], Utc::now()).unwrap();

    // Assert
    assert_eq!(graded.score, 2.0);
    assert_eq!(graded.max_score, 2.0);
    assert!(graded.passed);
    assert!(graded.answers[0].is_correct);
}

#[test]
fn multiple_choice_partial_set_is_incorrect() {
    // Correct set is {1, 3}; submitting only {1} scores zero.
    let exam = exam_with(vec![qref(20)]);
    let questions = by_id(vec![question(
        20,
        QuestionKind::MultipleChoice {
            options: vec![opt(1, true), opt(2, false), opt(3, true)],
            max_selectable: None,
        },
        4.0,
    )]);

    let graded = grade(&exam, &questions, &[choose_many(20, vec![1])], Utc::now()).unwrap();

    assert_eq!(graded.score, 0.0);
    assert!(!graded.answers[0].is_correct);
}

#[test]
fn multiple_choice_exact_set_is_correct_regardless_of_order() {
    let exam = exam_with(vec![qref(20)]);
    let questions = by_id(vec![question(
        20,
        QuestionKind::MultipleChoice {
            options: vec![opt(1, true), opt(2, false), opt(3, true)],
            max_selectable: None,
        },
        4.0,
    )]);

    let graded = grade(&exam, &questions, &[choose_many(20, vec![3, 1])], Utc::now()).unwrap();

    assert_eq!(graded.score, 4.0);
}

#[test]
fn multiple_choice_over_max_selectable_is_incorrect() {
    let exam = exam_with(vec![qref(20)]);
    let questions = by_id(vec![question(
        20,
        QuestionKind::MultipleChoice {
            options: vec![opt(1, true), opt(2, true), opt(3, true)],
            max_selectable: Some(2),
        },
        4.0,
    )]);

    // Exactly the correct set, but more selections than allowed.
    let graded = grade(&exam, &questions, &[choose_many(20, vec![1, 2, 3])], Utc::now()).unwrap();

    assert_eq!(graded.score, 0.0);
    assert!(!graded.answers[0].is_correct);
}

#[test]
fn short_answer_matches_case_insensitively_by_default() {
    let exam = exam_with(vec![qref(30)]);
    let questions = by_id(vec![question(
        30,
        QuestionKind::ShortAnswer {
            expected_answers: vec!["Paris".to_string()],
            case_sensitive: false,
        },
        1.0,
    )]);

    let graded = grade(&exam, &questions, &[write(30, "  paris ")], Utc::now()).unwrap();

    assert_eq!(graded.score, 1.0);
}

#[test]
fn short_answer_case_sensitive_rejects_wrong_case() {
    let exam = exam_with(vec![qref(30)]);
    let questions = by_id(vec![question(
        30,
        QuestionKind::ShortAnswer {
            expected_answers: vec!["Paris".to_string()],
            case_sensitive: true,
        },
        1.0,
    )]);

    let graded = grade(&exam, &questions, &[write(30, "paris")], Utc::now()).unwrap();

    assert_eq!(graded.score, 0.0);
}

#[test]
fn late_submission_applies_percentage_penalty() {
    // closeAt in the past, 20% penalty, raw total 80 -> 64.
    let mut exam = exam_with(vec![qref(10)]);
    exam.close_at = Some(Utc::now() - Duration::days(1));
    exam.allow_late_submission = true;
    exam.late_penalty_percent = 20.0;
    let questions = by_id(vec![single_choice(10, 80.0)]);

    let graded = grade(&exam, &questions, &[choose(10, 1)], Utc::now()).unwrap();

    assert!(graded.late_penalty_applied);
    assert!((graded.score - 64.0).abs() < 1e-9);
    // The ceiling is untouched by the penalty.
    assert_eq!(graded.max_score, 80.0);
}

#[test]
fn closed_exam_without_late_allowance_is_rejected() {
    let mut exam = exam_with(vec![qref(10)]);
    exam.close_at = Some(Utc::now() - Duration::hours(1));
    exam.allow_late_submission = false;
    let questions = by_id(vec![single_choice(10, 2.0)]);

    let result = grade(&exam, &questions, &[choose(10, 1)], Utc::now());

    assert_eq!(result.unwrap_err(), GradingError::SubmissionWindowClosed);
}

#[test]
fn max_score_is_computed_from_questions_not_total_points() {
    let mut exam = exam_with(vec![
        qref(10),
        ExamQuestionRef {
            question_id: 11,
            weight: 2.0,
            question_points: Some(5.0),
        },
    ]);
    // A drifted display value must not leak into grading.
    exam.total_points = 999.0;
    let questions = by_id(vec![single_choice(10, 3.0), single_choice(11, 1.0)]);

    let graded = grade(&exam, &questions, &[], Utc::now()).unwrap();

    // 3.0 + 5.0 * 2 = 13.0
    assert_eq!(graded.max_score, 13.0);
}

#[test]
fn question_points_override_takes_precedence_and_weight_multiplies() {
    let exam = exam_with(vec![ExamQuestionRef {
        question_id: 10,
        weight: 3.0,
        question_points: Some(4.0),
    }]);
    let questions = by_id(vec![single_choice(10, 100.0)]);

    let graded = grade(&exam, &questions, &[choose(10, 1)], Utc::now()).unwrap();

    assert_eq!(graded.score, 12.0);
    assert_eq!(graded.max_score, 12.0);
}

#[test]
fn negative_marking_penalizes_wrong_answers_but_total_never_goes_negative() {
    let exam = exam_with(vec![qref(10), qref(11)]);
    let mut q1 = single_choice(10, 2.0);
    q1.negative_marking = true;
    q1.negative_points = 5.0;
    let mut q2 = single_choice(11, 2.0);
    q2.negative_marking = true;
    q2.negative_points = 5.0;
    let questions = by_id(vec![q1, q2]);

    // Both wrong: raw total is -10, persisted score is clamped to 0.
    let graded = grade(&exam, &questions, &[choose(10, 2), choose(11, 2)], Utc::now()).unwrap();

    assert_eq!(graded.answers[0].score, -5.0);
    assert_eq!(graded.score, 0.0);
    assert!(graded.score >= 0.0 && graded.score <= graded.max_score);
}

#[test]
fn omitted_answer_is_not_penalized() {
    let exam = exam_with(vec![qref(10), qref(11)]);
    let mut q1 = single_choice(10, 2.0);
    q1.negative_marking = true;
    q1.negative_points = 5.0;
    let questions = by_id(vec![q1, single_choice(11, 2.0)]);

    // Question 10 is omitted entirely; question 11 answered correctly.
    let graded = grade(&exam, &questions, &[choose(11, 1)], Utc::now()).unwrap();

    let omitted = &graded.answers[0];
    assert_eq!(omitted.question_id, 10);
    assert_eq!(omitted.value, None);
    assert_eq!(omitted.score, 0.0);
    assert_eq!(graded.score, 2.0);
}

#[test]
fn answers_for_unknown_questions_are_ignored() {
    let exam = exam_with(vec![qref(10)]);
    let questions = by_id(vec![single_choice(10, 2.0)]);

    let graded = grade(
        &exam,
        &questions,
        &[choose(999, 1), choose(10, 1)],
        Utc::now(),
    )
    .unwrap();

    assert_eq!(graded.answers.len(), 1);
    assert_eq!(graded.score, 2.0);
}

#[test]
fn mismatched_answer_shape_counts_as_incorrect() {
    let exam = exam_with(vec![qref(10)]);
    let questions = by_id(vec![single_choice(10, 2.0)]);

    // A text answer to a single-choice question.
    let graded = grade(&exam, &questions, &[write(10, "1")], Utc::now()).unwrap();

    assert_eq!(graded.score, 0.0);
    assert!(!graded.answers[0].is_correct);
}

#[test]
fn grading_is_idempotent() {
    let mut exam = exam_with(vec![qref(10), qref(30)]);
    exam.passing_score = 2.0;
    let questions = by_id(vec![
        single_choice(10, 2.0),
        question(
            30,
            QuestionKind::ShortAnswer {
                expected_answers: vec!["ownership".to_string()],
                case_sensitive: false,
            },
            1.0,
        ),
    ]);
    let answers = [choose(10, 1), write(30, "Ownership")];
    let submitted_at = Utc::now();

    let first = grade(&exam, &questions, &answers, submitted_at).unwrap();
    let second = grade(&exam, &questions, &answers, submitted_at).unwrap();

    assert_eq!(first, second);
}

#[test]
fn attempt_limit_is_enforced_before_grading() {
    let mut exam = exam_with(vec![qref(10)]);
    exam.max_attempts = Some(2);

    assert!(check_attempt_allowed(&exam, 0).is_ok());
    assert!(check_attempt_allowed(&exam, 1).is_ok());
    assert_eq!(
        check_attempt_allowed(&exam, 2).unwrap_err(),
        GradingError::AttemptLimitExceeded
    );
}

#[test]
fn window_check_rejects_new_sittings_before_open_at() {
    let mut exam = exam_with(vec![qref(10)]);
    exam.open_at = Some(Utc::now() + Duration::hours(1));

    assert_eq!(
        check_window_open(&exam, Utc::now()).unwrap_err(),
        GradingError::ExamNotOpen
    );
}

#[test]
fn window_check_rejects_new_sittings_on_a_closed_exam() {
    let mut exam = exam_with(vec![qref(10)]);
    exam.close_at = Some(Utc::now() - Duration::hours(1));

    assert_eq!(
        check_window_open(&exam, Utc::now()).unwrap_err(),
        GradingError::SubmissionWindowClosed
    );

    // A late allowance keeps the window open past close_at.
    exam.allow_late_submission = true;
    assert!(check_window_open(&exam, Utc::now()).is_ok());
}

#[test]
fn unlimited_attempts_when_max_is_absent() {
    let exam = exam_with(vec![qref(10)]);

    assert!(check_attempt_allowed(&exam, 10_000).is_ok());
}
