//! Exam Coordination Library
//!
//! A pool of TA workers that share one rubric and one exam at a time:
//!
//! - Every TA reviews the rubric slot by slot, sometimes bumping a grade and
//!   saving the rubric (under the rubric lock)
//! - TAs then claim and mark questions of the current exam (under the exam
//!   lock); each question is claimed by exactly one TA
//! - Whoever finds the exam fully marked loads the next one, still holding
//!   the exam lock
//! - A missing exam, the sentinel student `9999`, or an unreadable exam file
//!   raises the termination flag, and every TA exits at its next check
//!
//! # Modules
//!
//! - [`state`]: the shared rubric and exam regions and the termination flag
//! - [`sync`]: the instrumented critical section guarding each region
//! - [`worker`]: the TA state machine
//! - [`coordinator`]: setup, launch and teardown of a run
//! - [`persistence`]: rubric and exam storage (files or memory)
//! - [`events`]: broadcast bus of grading events for observers
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use exam_coordination::{Coordinator, FileStore, PoolConfig, StoreConfig};
//!
//! # async fn example() -> exam_coordination::CoordinationResult<()> {
//! let store = Arc::new(FileStore::from_config(&StoreConfig::default()));
//! let summary = Coordinator::new(PoolConfig::with_workers(4), store)
//!     .run()
//!     .await?;
//! println!("marked {} exams", summary.exams_completed);
//! # Ok(())
//! # }
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod persistence;
pub mod state;
pub mod sync;
pub mod worker;

pub use config::{DelayRange, PoolConfig, StoreConfig, TimingConfig, MIN_WORKERS};
pub use coordinator::{Coordinator, Pool, RunSummary};
pub use error::{CoordinationError, CoordinationResult};
pub use events::{EventBus, EventFilter, GradingEvent, SharedEventBus};
pub use persistence::{
    FileStore, MemoryStore, Persistence, PersistenceError, PersistenceResult, SharedPersistence,
};
pub use state::{
    ExamProgress, ExamRecord, QuestionStatus, RubricEntry, SharedExamState, SharedState,
    TerminationReason,
};
pub use sync::{CriticalSection, LockStats};
pub use worker::{Worker, WorkerId, WorkerReport};
