//! In-memory store
//!
//! Behaves like [`FileStore`](super::FileStore) without touching disk. Saved
//! rubrics are kept as rendered text so byte-level checks match the file
//! format, and save failures can be switched on to exercise the best-effort
//! path.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::format::{parse_rubric, render_rubric};
use super::{Persistence, PersistenceError, PersistenceResult};
use crate::state::{ExamRecord, RubricEntry};

const MEMORY_RUBRIC: &str = "memory://rubric";

/// Rubric text and numbered exams held in process
#[derive(Debug, Default)]
pub struct MemoryStore {
    rubric: Mutex<String>,
    exams: Mutex<BTreeMap<u32, ExamRecord>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
    exam_loads: AtomicUsize,
}

impl MemoryStore {
    /// Store holding `entries` and no exams
    pub fn new(entries: &[RubricEntry]) -> Self {
        Self::from_rubric_text(render_rubric(entries))
    }

    /// Store whose rubric is the given raw text
    pub fn from_rubric_text(text: impl Into<String>) -> Self {
        Self {
            rubric: Mutex::new(text.into()),
            ..Self::default()
        }
    }

    /// Add exam `index` for `student_id`
    pub fn with_exam(self, index: u32, student_id: impl Into<String>) -> Self {
        self.insert_exam(index, student_id);
        self
    }

    /// Add exams 1..=n with student ids `0001`, `0002`, ...
    pub fn with_exams(self, count: u32) -> Self {
        for index in 1..=count {
            self.insert_exam(index, format!("{:04}", index));
        }
        self
    }

    pub fn insert_exam(&self, index: u32, student_id: impl Into<String>) {
        self.exams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(index, ExamRecord::new(student_id));
    }

    /// Make every subsequent save fail (or succeed again)
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Current rubric text, exactly as a file would contain it
    pub fn rubric_text(&self) -> String {
        self.rubric.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Calls to `load_exam` so far
    pub fn exam_load_count(&self) -> usize {
        self.exam_loads.load(Ordering::SeqCst)
    }

    /// Student id stored for exam `index`
    pub fn student_for(&self, index: u32) -> Option<String> {
        self.exams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&index)
            .map(|r| r.student_id.clone())
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn load_rubric(&self) -> PersistenceResult<Vec<RubricEntry>> {
        let entries = parse_rubric(&self.rubric_text(), usize::MAX);
        if entries.is_empty() {
            return Err(PersistenceError::malformed(
                PathBuf::from(MEMORY_RUBRIC),
                "no rubric entries",
            ));
        }
        Ok(entries)
    }

    async fn save_rubric(&self, entries: &[RubricEntry]) -> PersistenceResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(PersistenceError::io(
                PathBuf::from(MEMORY_RUBRIC),
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "saves disabled"),
            ));
        }
        *self.rubric.lock().unwrap_or_else(|e| e.into_inner()) = render_rubric(entries);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_exam(&self, index: u32) -> PersistenceResult<Option<ExamRecord>> {
        self.exam_loads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .exams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&index)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> Vec<RubricEntry> {
        vec![RubricEntry::new(1, 'A'), RubricEntry::new(2, 'B')]
    }

    #[tokio::test]
    async fn test_round_trip_is_idempotent() {
        let store = MemoryStore::new(&entries());
        let before = store.rubric_text();

        let loaded = store.load_rubric().await.unwrap();
        store.save_rubric(&loaded).await.unwrap();

        assert_eq!(store.rubric_text(), before);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_saves_leave_text_untouched() {
        let store = MemoryStore::new(&entries());
        store.set_fail_saves(true);

        let mut changed = entries();
        changed[0].grade = 'Z';
        assert!(store.save_rubric(&changed).await.is_err());
        assert_eq!(store.rubric_text(), "1, A\n2, B\n");
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_exams() {
        let store = MemoryStore::new(&entries())
            .with_exams(2)
            .with_exam(3, "9999");

        assert_eq!(
            store.load_exam(1).await.unwrap(),
            Some(ExamRecord::new("0001"))
        );
        assert!(store.load_exam(3).await.unwrap().unwrap().is_sentinel());
        assert_eq!(store.load_exam(4).await.unwrap(), None);
        assert_eq!(store.exam_load_count(), 3);
        assert_eq!(store.student_for(2).as_deref(), Some("0002"));
    }

    #[tokio::test]
    async fn test_empty_rubric_is_malformed() {
        let store = MemoryStore::from_rubric_text("");
        assert!(matches!(
            store.load_rubric().await,
            Err(PersistenceError::Malformed { .. })
        ));
    }
}
