//! Event types for the marking pool
//!
//! Exam events are published while the exam lock is held, rubric events while
//! the rubric lock is held, so each stream follows its lock's order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::TerminationReason;
use crate::worker::WorkerId;

/// Everything observable that a TA does to shared state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GradingEvent {
    /// A rubric grade was incremented
    RubricEdited {
        worker: WorkerId,
        /// Zero-based rubric slot
        slot: usize,
        rubric_id: i32,
        previous: char,
        grade: char,
        timestamp: DateTime<Utc>,
    },

    /// Writing the rubric back to the store failed
    RubricSaveFailed {
        worker: WorkerId,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A question went from unmarked to in progress
    QuestionClaimed {
        worker: WorkerId,
        exam_index: u32,
        student_id: String,
        question: usize,
        timestamp: DateTime<Utc>,
    },

    /// A question went from in progress to marked
    QuestionMarked {
        worker: WorkerId,
        exam_index: u32,
        student_id: String,
        question: usize,
        timestamp: DateTime<Utc>,
    },

    /// The pool moved on to a new exam
    ExamAdvanced {
        worker: WorkerId,
        from_index: u32,
        exam_index: u32,
        student_id: String,
        timestamp: DateTime<Utc>,
    },

    /// The termination flag was raised
    PoolTerminated {
        /// `None` when raised by the coordinator rather than a TA
        worker: Option<WorkerId>,
        reason: TerminationReason,
        timestamp: DateTime<Utc>,
    },

    /// A worker reached its terminal state
    WorkerExited {
        worker: WorkerId,
        timestamp: DateTime<Utc>,
    },
}

impl GradingEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            GradingEvent::RubricEdited { timestamp, .. } => *timestamp,
            GradingEvent::RubricSaveFailed { timestamp, .. } => *timestamp,
            GradingEvent::QuestionClaimed { timestamp, .. } => *timestamp,
            GradingEvent::QuestionMarked { timestamp, .. } => *timestamp,
            GradingEvent::ExamAdvanced { timestamp, .. } => *timestamp,
            GradingEvent::PoolTerminated { timestamp, .. } => *timestamp,
            GradingEvent::WorkerExited { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            GradingEvent::RubricEdited { .. } => "rubric_edited",
            GradingEvent::RubricSaveFailed { .. } => "rubric_save_failed",
            GradingEvent::QuestionClaimed { .. } => "question_claimed",
            GradingEvent::QuestionMarked { .. } => "question_marked",
            GradingEvent::ExamAdvanced { .. } => "exam_advanced",
            GradingEvent::PoolTerminated { .. } => "pool_terminated",
            GradingEvent::WorkerExited { .. } => "worker_exited",
        }
    }

    /// Get the worker that caused this event, if any
    pub fn worker(&self) -> Option<WorkerId> {
        match self {
            GradingEvent::RubricEdited { worker, .. }
            | GradingEvent::RubricSaveFailed { worker, .. }
            | GradingEvent::QuestionClaimed { worker, .. }
            | GradingEvent::QuestionMarked { worker, .. }
            | GradingEvent::ExamAdvanced { worker, .. }
            | GradingEvent::WorkerExited { worker, .. } => Some(*worker),
            GradingEvent::PoolTerminated { worker, .. } => *worker,
        }
    }

    /// Get the exam index if this event is exam-scoped
    pub fn exam_index(&self) -> Option<u32> {
        match self {
            GradingEvent::QuestionClaimed { exam_index, .. }
            | GradingEvent::QuestionMarked { exam_index, .. }
            | GradingEvent::ExamAdvanced { exam_index, .. } => Some(*exam_index),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = GradingEvent::QuestionClaimed {
            worker: WorkerId(2),
            exam_index: 1,
            student_id: "0001".to_string(),
            question: 3,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "question_claimed");
        assert_eq!(json["worker"], 2);
        assert_eq!(json["question"], 3);

        let back: GradingEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_accessors() {
        let event = GradingEvent::PoolTerminated {
            worker: None,
            reason: TerminationReason::NoInitialExam,
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_type(), "pool_terminated");
        assert_eq!(event.worker(), None);
        assert_eq!(event.exam_index(), None);

        let event = GradingEvent::RubricEdited {
            worker: WorkerId(1),
            slot: 0,
            rubric_id: 1,
            previous: 'A',
            grade: 'B',
            timestamp: Utc::now(),
        };
        assert_eq!(event.worker(), Some(WorkerId(1)));
        assert_eq!(event.exam_index(), None);
    }
}
