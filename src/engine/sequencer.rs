// src/engine/sequencer.rs

//! Content Sequencer: decides whether a lesson or exam is currently
//! accessible to a student.
//!
//! Unlock state is never stored. It is recomputed from completion and
//! outcome facts on every access check, so retroactive edits to earlier
//! progress can never leave a stale flag behind.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::attempt::EffectiveOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Lesson,
    Exam,
}

/// One curriculum item projected onto the flattened ordering axis.
/// Lessons and exams of a section share a single `position` axis so an
/// instructor can interleave checkpoint exams between lessons.
#[derive(Debug, Clone)]
pub struct SequenceItem {
    pub kind: ContentKind,
    pub id: i64,
    pub section_position: i64,
    pub position: i64,
    /// Lessons only; free lessons bypass prerequisite checks.
    pub is_free: bool,
    pub open_at: Option<DateTime<Utc>>,
    pub close_at: Option<DateTime<Utc>>,
    pub allow_late_submission: bool,
}

impl SequenceItem {
    pub fn lesson(id: i64, section_position: i64, position: i64, is_free: bool) -> Self {
        SequenceItem {
            kind: ContentKind::Lesson,
            id,
            section_position,
            position,
            is_free,
            open_at: None,
            close_at: None,
            allow_late_submission: false,
        }
    }

    pub fn exam(
        id: i64,
        section_position: i64,
        position: i64,
        open_at: Option<DateTime<Utc>>,
        close_at: Option<DateTime<Utc>>,
        allow_late_submission: bool,
    ) -> Self {
        SequenceItem {
            kind: ContentKind::Exam,
            id,
            section_position,
            position,
            is_free: false,
            open_at,
            close_at,
            allow_late_submission,
        }
    }
}

/// Per-student snapshot consumed by the sequencer: raw completion flags
/// for lessons, aggregated outcomes for exams.
#[derive(Debug, Clone, Default)]
pub struct StudentFacts {
    pub completed_lessons: HashSet<i64>,
    pub exam_outcomes: HashMap<i64, EffectiveOutcome>,
}

impl StudentFacts {
    pub fn lesson_completed(&self, lesson_id: i64) -> bool {
        self.completed_lessons.contains(&lesson_id)
    }

    pub fn exam_passed(&self, exam_id: i64) -> bool {
        self.exam_outcomes
            .get(&exam_id)
            .map(|o| o.passed)
            .unwrap_or(false)
    }
}

/// Why an item is locked. Designed to be directly user-facing keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockReason {
    PrerequisitesIncomplete,
    NotOpenYet,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnlockDecision {
    pub unlocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<LockReason>,
}

impl UnlockDecision {
    pub fn unlocked() -> Self {
        UnlockDecision {
            unlocked: true,
            reason: None,
        }
    }

    pub fn locked(reason: LockReason) -> Self {
        UnlockDecision {
            unlocked: false,
            reason: Some(reason),
        }
    }
}

/// Computes the unlock decision for one item.
///
/// The catalog may arrive in any order and may be malformed (duplicate
/// positions, orphaned items); this never panics. Duplicate positions
/// degrade to a stable tie-break by item id, and an item missing from the
/// catalog is treated as having no known predecessors, with exam time
/// windows still applying.
pub fn is_unlocked(
    catalog: &[SequenceItem],
    kind: ContentKind,
    item_id: i64,
    facts: &StudentFacts,
    now: DateTime<Utc>,
) -> UnlockDecision {
    // Already-resolved items stay open for review: time windows gate new
    // attempts, not revisiting a finished lesson or a passed exam.
    match kind {
        ContentKind::Lesson if facts.lesson_completed(item_id) => {
            return UnlockDecision::unlocked();
        }
        ContentKind::Exam if facts.exam_passed(item_id) => {
            return UnlockDecision::unlocked();
        }
        _ => {}
    }

    let ordered = flatten(catalog);
    let target_index = ordered
        .iter()
        .position(|item| item.kind == kind && item.id == item_id);
    let target = target_index.map(|index| ordered[index]);

    if kind == ContentKind::Lesson && target.map(|t| t.is_free).unwrap_or(false) {
        return UnlockDecision::unlocked();
    }

    // The very first item has no predecessors and this loop is empty.
    let prerequisites_met = match target_index {
        Some(index) => ordered[..index].iter().all(|item| satisfied(item, facts)),
        None => true,
    };
    if !prerequisites_met {
        return UnlockDecision::locked(LockReason::PrerequisitesIncomplete);
    }

    if kind == ContentKind::Exam {
        if let Some(exam) = target {
            if let Some(open_at) = exam.open_at {
                if now < open_at {
                    return UnlockDecision::locked(LockReason::NotOpenYet);
                }
            }
            if let Some(close_at) = exam.close_at {
                if now > close_at && !exam.allow_late_submission {
                    return UnlockDecision::locked(LockReason::Closed);
                }
            }
        }
    }

    UnlockDecision::unlocked()
}

/// Flattens the catalog into one globally ordered sequence: sections by
/// their order, items within a section by position, ties stably by id.
fn flatten(catalog: &[SequenceItem]) -> Vec<&SequenceItem> {
    let mut ordered: Vec<&SequenceItem> = catalog.iter().collect();
    ordered.sort_by_key(|item| (item.section_position, item.position, item.id));
    ordered
}

/// A predecessor holds when a lesson is completed or free, or an exam's
/// effective outcome is a pass.
fn satisfied(item: &SequenceItem, facts: &StudentFacts) -> bool {
    match item.kind {
        ContentKind::Lesson => item.is_free || facts.lesson_completed(item.id),
        ContentKind::Exam => facts.exam_passed(item.id),
    }
}
