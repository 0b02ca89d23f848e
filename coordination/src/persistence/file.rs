//! File-backed store: `rubric.txt` and `exams/exam_NN.txt`

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::format::{exam_file_name, parse_exam, parse_rubric, render_rubric};
use super::{Persistence, PersistenceError, PersistenceResult};
use crate::config::StoreConfig;
use crate::state::{ExamRecord, RubricEntry};

/// Rubric file plus a directory of numbered exam files
#[derive(Debug, Clone)]
pub struct FileStore {
    rubric_path: PathBuf,
    exams_dir: PathBuf,
    question_count: usize,
}

impl FileStore {
    pub fn new(
        rubric_path: impl Into<PathBuf>,
        exams_dir: impl Into<PathBuf>,
        question_count: usize,
    ) -> Self {
        Self {
            rubric_path: rubric_path.into(),
            exams_dir: exams_dir.into(),
            question_count,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(
            &config.rubric_path,
            &config.exams_dir,
            config.question_count,
        )
    }

    pub fn rubric_path(&self) -> &Path {
        &self.rubric_path
    }

    /// Path of exam `index` inside the exams directory
    pub fn exam_path(&self, index: u32) -> PathBuf {
        self.exams_dir.join(exam_file_name(index))
    }
}

#[async_trait]
impl Persistence for FileStore {
    async fn load_rubric(&self) -> PersistenceResult<Vec<RubricEntry>> {
        let text = tokio::fs::read_to_string(&self.rubric_path)
            .await
            .map_err(|e| PersistenceError::io(&self.rubric_path, e))?;

        let entries = parse_rubric(&text, self.question_count);
        if entries.is_empty() {
            return Err(PersistenceError::malformed(
                &self.rubric_path,
                "no \"<id>, <grade>\" lines found",
            ));
        }

        debug!(
            path = %self.rubric_path.display(),
            entries = entries.len(),
            "Loaded rubric"
        );
        Ok(entries)
    }

    async fn save_rubric(&self, entries: &[RubricEntry]) -> PersistenceResult<()> {
        tokio::fs::write(&self.rubric_path, render_rubric(entries))
            .await
            .map_err(|e| PersistenceError::io(&self.rubric_path, e))
    }

    async fn load_exam(&self, index: u32) -> PersistenceResult<Option<ExamRecord>> {
        let path = self.exam_path(index);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No exam file");
                return Ok(None);
            }
            Err(e) => return Err(PersistenceError::io(&path, e)),
        };

        parse_exam(&text)
            .map(Some)
            .ok_or_else(|| PersistenceError::malformed(&path, "missing student id line"))
    }
}
