//! TA workers
//!
//! Each worker repeats the same cycle until it sees the pool finished:
//!
//! ```text
//!   ┌────────┐  terminated  ┌────────────┐
//!   │  Gate  │─────────────▶│ Terminated │
//!   └───┬────┘              └────────────┘
//!       │                          ▲
//!       ▼                          │ terminated / end of data / sentinel
//!   ┌──────────────┐        ┌──────┴───────┐
//!   │ RubricReview │───────▶│ ClaimAndMark │
//!   └──────────────┘        └──────┬───────┘
//!       ▲                          │ exam advanced
//!       └──────────────────────────┘
//! ```
//!
//! RubricReview only takes the rubric lock; ClaimAndMark only takes the exam
//! lock. A worker never holds both.

pub mod report;
pub mod ta;

use serde::{Deserialize, Serialize};

pub use report::WorkerReport;
pub use ta::Worker;

/// One-based TA number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub usize);

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TA {}", self.0)
    }
}

/// Where a worker is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    /// Checking the termination flag before a new cycle
    Gate,
    /// Going over the rubric slot by slot
    RubricReview,
    /// Claiming, marking and committing questions
    ClaimAndMark,
    /// Saw the pool finished; will not touch shared state again
    Terminated,
}

impl std::fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gate => write!(f, "gate"),
            Self::RubricReview => write!(f, "rubric_review"),
            Self::ClaimAndMark => write!(f, "claim_and_mark"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}
