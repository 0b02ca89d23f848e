//! Per-worker tallies returned when a TA exits

use serde::{Deserialize, Serialize};

use super::WorkerId;

/// What one TA did over the whole run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub worker: WorkerId,
    /// Full passes over the rubric
    pub rubric_passes: u32,
    /// Grades this TA incremented
    pub rubric_edits: u32,
    /// Rubric saves that failed (edits stayed in memory)
    pub failed_saves: u32,
    /// Questions this TA committed as marked
    pub questions_marked: u32,
    /// Backoff sleeps while others held every remaining question
    pub idle_waits: u32,
    /// Exams this TA loaded after the previous one was fully marked
    pub exams_advanced: u32,
    /// Whether this TA raised the termination flag
    pub ended_run: bool,
}

impl WorkerReport {
    pub fn new(worker: WorkerId) -> Self {
        Self {
            worker,
            rubric_passes: 0,
            rubric_edits: 0,
            failed_saves: 0,
            questions_marked: 0,
            idle_waits: 0,
            exams_advanced: 0,
            ended_run: false,
        }
    }
}
