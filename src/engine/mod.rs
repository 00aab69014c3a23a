// src/engine/mod.rs

//! The learning-progression and assessment engine.
//!
//! All three components are pure, synchronous computations over immutable
//! snapshots supplied by the caller: they perform no I/O and hold no state
//! between calls. Handlers load the snapshot, call in here, and persist
//! whatever comes out.

pub mod grading;
pub mod outcome;
pub mod sequencer;

pub use grading::{GradedAttempt, GradingError, check_attempt_allowed, check_window_open, grade};
pub use outcome::aggregate;
pub use sequencer::{ContentKind, LockReason, SequenceItem, StudentFacts, UnlockDecision, is_unlocked};
