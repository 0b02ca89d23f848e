//! Coordination error types
//!
//! Setup failures are fatal and surface before any worker is spawned.
//! Rubric save failures are not represented here: they are logged and
//! counted by the worker that hit them, and the run carries on.

use thiserror::Error;

use crate::persistence::PersistenceError;
use crate::worker::WorkerId;

/// Result type alias for coordination operations
pub type CoordinationResult<T> = Result<T, CoordinationError>;

/// Errors that can occur while setting up or running the marking pool
#[derive(Error, Debug)]
pub enum CoordinationError {
    /// Fewer than two workers requested
    #[error("Pool needs at least {min} workers, got {requested}")]
    InvalidPoolSize { requested: usize, min: usize },

    /// Shared state could not be allocated or seeded
    #[error("Fatal setup error: {message}")]
    FatalSetup { message: String },

    /// Rubric could not be read at startup, so there is no valid initial state
    #[error("Failed to load rubric: {source}")]
    PersistenceRead {
        #[source]
        source: PersistenceError,
    },

    /// First exam exists but could not be read at startup
    #[error("Failed to load exam {index}: {source}")]
    ExamRead {
        index: u32,
        #[source]
        source: PersistenceError,
    },

    /// A worker tried a transition the protocol forbids
    #[error("Protocol violation: {message}")]
    ProtocolViolation { message: String },

    /// A worker panicked or returned an error
    #[error("{worker} failed: {message}")]
    WorkerFailed { worker: WorkerId, message: String },
}

impl CoordinationError {
    /// Create a fatal setup error
    pub fn fatal_setup(message: impl Into<String>) -> Self {
        Self::FatalSetup {
            message: message.into(),
        }
    }

    /// Create a protocol violation error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            message: message.into(),
        }
    }

    /// Rubric could not be read at startup
    pub fn rubric_read(source: PersistenceError) -> Self {
        Self::PersistenceRead { source }
    }

    /// First exam could not be read at startup
    pub fn exam_read(index: u32, source: PersistenceError) -> Self {
        Self::ExamRead { index, source }
    }

    /// Create a worker failure error
    pub fn worker_failed(worker: WorkerId, message: impl Into<String>) -> Self {
        Self::WorkerFailed {
            worker,
            message: message.into(),
        }
    }

    /// Whether this error aborted the run before any worker started
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPoolSize { .. }
                | Self::FatalSetup { .. }
                | Self::PersistenceRead { .. }
                | Self::ExamRead { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_setup_errors_are_classified() {
        let err = CoordinationError::InvalidPoolSize {
            requested: 1,
            min: 2,
        };
        assert!(err.is_setup_error());
        assert!(CoordinationError::fatal_setup("empty rubric").is_setup_error());

        let read = CoordinationError::rubric_read(PersistenceError::Malformed {
            path: PathBuf::from("rubric.txt"),
            message: "no entries".to_string(),
        });
        assert!(read.is_setup_error());
        let exam = CoordinationError::exam_read(
            1,
            PersistenceError::malformed("exams/exam_01.txt", "missing student id line"),
        );
        assert!(exam.is_setup_error());

        assert!(!CoordinationError::protocol("double commit").is_setup_error());
        assert!(!CoordinationError::worker_failed(WorkerId(1), "panicked").is_setup_error());
    }

    #[test]
    fn test_error_messages() {
        let err = CoordinationError::InvalidPoolSize {
            requested: 1,
            min: 2,
        };
        assert_eq!(err.to_string(), "Pool needs at least 2 workers, got 1");

        let err = CoordinationError::worker_failed(WorkerId(3), "panicked");
        assert_eq!(err.to_string(), "TA 3 failed: panicked");

        let err = CoordinationError::exam_read(
            1,
            PersistenceError::malformed("exam_01.txt", "missing student id line"),
        );
        assert_eq!(
            err.to_string(),
            "Failed to load exam 1: Malformed exam_01.txt: missing student id line"
        );
    }
}
