// tests/admin_validation_tests.rs

use validator::Validate;

use opencourse::handlers::admin::ExamPayload;
use opencourse::models::content::ScoringMethod;

fn payload() -> ExamPayload {
    ExamPayload {
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
        passing_score: 60.0,
        total_points: 100.0,
        questions: Vec::new(),
    }
}

#[test]
fn exam_payload_accepts_positive_or_absent_max_attempts() {
    assert!(payload().validate().is_ok());

    let mut limited = payload();
    limited.max_attempts = Some(3);
    assert!(limited.validate().is_ok());
}

#[test]
fn exam_payload_rejects_non_positive_max_attempts() {
    // Zero or negative limits would refuse every sitting up front.
    let mut zero = payload();
    zero.max_attempts = Some(0);
    assert!(zero.validate().is_err());

    let mut negative = payload();
    negative.max_attempts = Some(-1);
    assert!(negative.validate().is_err());
}

#[test]
fn exam_payload_rejects_out_of_range_late_penalty() {
    let mut over = payload();
    over.late_penalty_percent = 150.0;
    assert!(over.validate().is_err());
}
