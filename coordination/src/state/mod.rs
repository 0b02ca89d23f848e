//! Shared marking state
//!
//! Two regions, each behind its own [`CriticalSection`](crate::sync::CriticalSection):
//!
//! - **rubric**: the rubric entries every TA reviews and edits
//! - **exam**: the exam the pool is grading, its per-question statuses, and
//!   the termination flag
//!
//! No operation needs both locks, so there is no lock ordering to get wrong.
//!
//! ```text
//!                ┌────────────── SharedExamState ──────────────┐
//!  rubric lock ─▶│ RubricRegion  [RubricEntry; Q]              │
//!                │                                             │
//!  exam lock   ─▶│ ExamRegion    ExamProgress + TerminationFlag│
//!                └─────────────────────────────────────────────┘
//! ```

pub mod regions;
pub mod shared;
pub mod types;

pub use regions::{AdvanceOutcome, ExamRegion, RubricEdit, RubricRegion, ScanOutcome};
pub use shared::{SharedExamState, SharedState, TerminationFlag, EXAM_LOCK, RUBRIC_LOCK};
pub use types::{
    next_grade, Claim, ExamProgress, ExamRecord, QuestionStatus, RubricEntry, TerminationReason,
    DEFAULT_QUESTION_COUNT, SENTINEL_STUDENT_ID,
};
