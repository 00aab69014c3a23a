// tests/sequencer_tests.rs

use chrono::{Duration, Utc};
use sqlx::types::Json;

use opencourse::engine::{
    ContentKind, GradingError, LockReason, SequenceItem, StudentFacts, check_window_open,
    is_unlocked,
};
use opencourse::models::attempt::{EffectiveOutcome, OutcomeStatus};
use opencourse::models::content::{Exam, ScoringMethod};

fn outcome(passed: bool) -> EffectiveOutcome {
    EffectiveOutcome {
        status: if passed {
            OutcomeStatus::Passed
        } else {
            OutcomeStatus::Failed
        },
        effective_score: if passed { 90.0 } else { 20.0 },
        best_score: if passed { 90.0 } else { 20.0 },
        latest_score: if passed { 90.0 } else { 20.0 },
        attempts_count: 1,
        remaining_attempts: None,
        passed,
    }
}

fn facts() -> StudentFacts {
    StudentFacts::default()
}

#[test]
fn first_item_is_unlocked_with_empty_history() {
    let catalog = vec![
        SequenceItem::lesson(1, 1, 1, false),
        SequenceItem::lesson(2, 1, 2, false),
    ];

    let decision = is_unlocked(&catalog, ContentKind::Lesson, 1, &facts(), Utc::now());

    assert!(decision.unlocked);
    assert_eq!(decision.reason, None);
}

#[test]
fn later_lesson_is_locked_until_predecessors_complete() {
    let catalog = vec![
        SequenceItem::lesson(1, 1, 1, false),
        SequenceItem::lesson(2, 1, 2, false),
    ];

    let locked = is_unlocked(&catalog, ContentKind::Lesson, 2, &facts(), Utc::now());
    assert!(!locked.unlocked);
    assert_eq!(locked.reason, Some(LockReason::PrerequisitesIncomplete));

    let mut facts = facts();
    facts.completed_lessons.insert(1);
    let unlocked = is_unlocked(&catalog, ContentKind::Lesson, 2, &facts, Utc::now());
    assert!(unlocked.unlocked);
}

#[test]
fn free_lesson_bypasses_prerequisites() {
    let catalog = vec![
        SequenceItem::lesson(1, 1, 1, false),
        SequenceItem::lesson(2, 1, 2, true),
    ];

    let decision = is_unlocked(&catalog, ContentKind::Lesson, 2, &facts(), Utc::now());

    assert!(decision.unlocked);
}

#[test]
fn failed_exam_blocks_the_following_lesson() {
    // Exam at position 1, lesson at position 2; one failed attempt.
    let catalog = vec![
        SequenceItem::exam(10, 1, 1, None, None, false),
        SequenceItem::lesson(2, 1, 2, false),
    ];
    let mut facts = facts();
    facts.exam_outcomes.insert(10, outcome(false));

    let decision = is_unlocked(&catalog, ContentKind::Lesson, 2, &facts, Utc::now());

    assert!(!decision.unlocked);
    assert_eq!(decision.reason, Some(LockReason::PrerequisitesIncomplete));
}

#[test]
fn passed_exam_unlocks_the_following_lesson() {
    let catalog = vec![
        SequenceItem::exam(10, 1, 1, None, None, false),
        SequenceItem::lesson(2, 1, 2, false),
    ];
    let mut facts = facts();
    facts.exam_outcomes.insert(10, outcome(true));

    let decision = is_unlocked(&catalog, ContentKind::Lesson, 2, &facts, Utc::now());

    assert!(decision.unlocked);
}

#[test]
fn exam_with_future_open_at_reports_not_open_yet() {
    // First item, so prerequisites are trivially satisfied.
    let catalog = vec![SequenceItem::exam(
        10,
        1,
        1,
        Some(Utc::now() + Duration::hours(2)),
        None,
        false,
    )];

    let decision = is_unlocked(&catalog, ContentKind::Exam, 10, &facts(), Utc::now());

    assert!(!decision.unlocked);
    assert_eq!(decision.reason, Some(LockReason::NotOpenYet));
}

#[test]
fn closed_exam_reports_closed_unless_late_submission_is_allowed() {
    let close_at = Some(Utc::now() - Duration::hours(2));

    let strict = vec![SequenceItem::exam(10, 1, 1, None, close_at, false)];
    let decision = is_unlocked(&strict, ContentKind::Exam, 10, &facts(), Utc::now());
    assert!(!decision.unlocked);
    assert_eq!(decision.reason, Some(LockReason::Closed));

    let lenient = vec![SequenceItem::exam(10, 1, 1, None, close_at, true)];
    let decision = is_unlocked(&lenient, ContentKind::Exam, 10, &facts(), Utc::now());
    assert!(decision.unlocked);
}

#[test]
fn prerequisite_failure_outranks_the_time_window() {
    // Prerequisites incomplete AND the window not yet open: the student
    // is told about the prerequisite first.
    let catalog = vec![
        SequenceItem::lesson(1, 1, 1, false),
        SequenceItem::exam(
            10,
            1,
            2,
            Some(Utc::now() + Duration::hours(2)),
            None,
            false,
        ),
    ];

    let decision = is_unlocked(&catalog, ContentKind::Exam, 10, &facts(), Utc::now());

    assert_eq!(decision.reason, Some(LockReason::PrerequisitesIncomplete));
}

#[test]
fn completed_lesson_stays_unlocked_for_review() {
    let catalog = vec![
        SequenceItem::lesson(1, 1, 1, false),
        SequenceItem::lesson(2, 1, 2, false),
        SequenceItem::lesson(3, 1, 3, false),
    ];
    // Lesson 3 completed even though lesson 1 was later reset.
    let mut facts = facts();
    facts.completed_lessons.insert(3);

    let decision = is_unlocked(&catalog, ContentKind::Lesson, 3, &facts, Utc::now());

    assert!(decision.unlocked);
}

#[test]
fn passed_exam_stays_unlocked_for_review_outside_its_window() {
    // Time windows gate new attempts, not review of a resolved exam.
    let catalog = vec![SequenceItem::exam(
        10,
        1,
        1,
        None,
        Some(Utc::now() - Duration::days(7)),
        false,
    )];
    let mut facts = facts();
    facts.exam_outcomes.insert(10, outcome(true));

    let decision = is_unlocked(&catalog, ContentKind::Exam, 10, &facts, Utc::now());

    assert!(decision.unlocked);
}

#[test]
fn review_unlock_does_not_reopen_the_window_for_new_sittings() {
    let close_at = Utc::now() - Duration::days(7);
    let exam = Exam {
        id: 10,
        section_id: 1,
        title: "Final".to_string(),
        description: None,
        position: 1,
        open_at: None,
        close_at: Some(close_at),
        allow_late_submission: false,
        late_penalty_percent: 0.0,
        max_attempts: Some(3),
        scoring_method: ScoringMethod::Highest,
        passing_score: 60.0,
        total_points: 100.0,
        questions: Json(Vec::new()),
        created_at: None,
    };
    let catalog = vec![SequenceItem::exam(10, 1, 1, None, Some(close_at), false)];
    let mut facts = facts();
    facts.exam_outcomes.insert(10, outcome(true));

    // The passed exam stays unlocked so the student can revisit it...
    let decision = is_unlocked(&catalog, ContentKind::Exam, 10, &facts, Utc::now());
    assert!(decision.unlocked);

    // ...but a fresh attempt on the closed exam is still refused.
    assert_eq!(
        check_window_open(&exam, Utc::now()).unwrap_err(),
        GradingError::SubmissionWindowClosed
    );
}

#[test]
fn exams_and_lessons_interleave_across_sections() {
    // Section 1: lesson 1, exam 10; section 2: lesson 2.
    let catalog = vec![
        SequenceItem::lesson(2, 2, 1, false),
        SequenceItem::exam(10, 1, 2, None, None, false),
        SequenceItem::lesson(1, 1, 1, false),
    ];
    let mut facts = facts();
    facts.completed_lessons.insert(1);

    // The exam in section 1 still gates the lesson in section 2.
    let decision = is_unlocked(&catalog, ContentKind::Lesson, 2, &facts, Utc::now());
    assert!(!decision.unlocked);

    facts.exam_outcomes.insert(10, outcome(true));
    let decision = is_unlocked(&catalog, ContentKind::Lesson, 2, &facts, Utc::now());
    assert!(decision.unlocked);
}

#[test]
fn duplicate_positions_degrade_to_a_stable_id_tie_break() {
    // Two lessons claim position 1; the lower id is treated as first.
    let catalog = vec![
        SequenceItem::lesson(5, 1, 1, false),
        SequenceItem::lesson(4, 1, 1, false),
    ];

    let first = is_unlocked(&catalog, ContentKind::Lesson, 4, &facts(), Utc::now());
    assert!(first.unlocked);

    let second = is_unlocked(&catalog, ContentKind::Lesson, 5, &facts(), Utc::now());
    assert!(!second.unlocked);
    assert_eq!(second.reason, Some(LockReason::PrerequisitesIncomplete));
}

#[test]
fn orphaned_item_does_not_panic_and_applies_window_checks() {
    let catalog = vec![SequenceItem::lesson(1, 1, 1, false)];

    // A lesson nobody knows about: no predecessors, so it unlocks.
    let decision = is_unlocked(&catalog, ContentKind::Lesson, 99, &facts(), Utc::now());
    assert!(decision.unlocked);

    // An unknown exam has no stored window, so only prerequisites apply.
    let decision = is_unlocked(&catalog, ContentKind::Exam, 99, &facts(), Utc::now());
    assert!(decision.unlocked);
}
