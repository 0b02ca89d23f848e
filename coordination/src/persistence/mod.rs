//! Persistence collaborator
//!
//! The narrow interface the pool uses to reach the rubric and exam store.
//! The core never touches the filesystem directly.
//!
//! - [`FileStore`]: `rubric.txt` plus `exams/exam_NN.txt`
//! - [`MemoryStore`]: in-process store with failure injection, for tests and
//!   embedding

pub mod file;
pub mod format;
pub mod memory;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::state::{ExamRecord, RubricEntry};

pub use file::FileStore;
pub use memory::MemoryStore;

/// Result type alias for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Errors that can occur while reading or writing the store
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// IO error on a specific file
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File exists but its content is unusable
    #[error("Malformed {path}: {message}")]
    Malformed { path: PathBuf, message: String },
}

impl PersistenceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Where the rubric and exams live
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Read the rubric. Failing here is fatal for the run.
    async fn load_rubric(&self) -> PersistenceResult<Vec<RubricEntry>>;

    /// Write the whole rubric back. Best effort: callers log and carry on.
    async fn save_rubric(&self, entries: &[RubricEntry]) -> PersistenceResult<()>;

    /// Read exam `index`. `Ok(None)` means there is no such exam, which the
    /// pool treats as the end of work.
    async fn load_exam(&self, index: u32) -> PersistenceResult<Option<ExamRecord>>;
}

/// Shared reference to a persistence implementation
pub type SharedPersistence = std::sync::Arc<dyn Persistence>;
