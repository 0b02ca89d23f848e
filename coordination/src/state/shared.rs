//! State shared by every TA in the pool

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::regions::{ExamRegion, RubricRegion};
use super::types::{ExamProgress, ExamRecord, RubricEntry, TerminationReason};
use crate::error::{CoordinationError, CoordinationResult};
use crate::sync::{CriticalSection, LockStats};

/// Name of the lock guarding the rubric
pub const RUBRIC_LOCK: &str = "rubric";
/// Name of the lock guarding exam progress and termination
pub const EXAM_LOCK: &str = "exam";

/// Process-wide "finished" flag. Goes from false to true once and stays there.
///
/// Only raised from inside the exam critical section. `is_raised` may be
/// called without the lock for monitoring, but a worker deciding to stop
/// must read it through [`ExamRegion::is_terminated`].
#[derive(Debug, Default)]
pub struct TerminationFlag {
    raised: AtomicBool,
}

impl TerminationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}

/// Shared reference to SharedExamState
pub type SharedState = Arc<SharedExamState>;

/// Rubric, current exam and termination flag, each region behind its own lock
#[derive(Debug)]
pub struct SharedExamState {
    rubric: CriticalSection<RubricRegion>,
    exam: CriticalSection<ExamRegion>,
    flag: Arc<TerminationFlag>,
    question_count: usize,
}

impl SharedExamState {
    /// Seed the shared state from the loaded rubric and the first exam.
    ///
    /// The question count is the rubric length. A missing first exam, or the
    /// sentinel student as the first exam, leaves the pool already finished.
    pub fn new(
        rubric: Vec<RubricEntry>,
        first_exam: Option<ExamRecord>,
        first_index: u32,
    ) -> CoordinationResult<Self> {
        if rubric.is_empty() {
            return Err(CoordinationError::fatal_setup(
                "rubric has no entries; nothing to mark against",
            ));
        }

        let question_count = rubric.len();
        let flag = Arc::new(TerminationFlag::new());

        let (progress, reason) = match first_exam {
            None => (
                ExamProgress::empty(first_index, question_count),
                Some(TerminationReason::NoInitialExam),
            ),
            Some(record) => {
                let reason = record.is_sentinel().then_some(TerminationReason::Sentinel {
                    exam_index: first_index,
                });
                (
                    ExamProgress::new(record.student_id, first_index, question_count),
                    reason,
                )
            }
        };

        let mut exam = ExamRegion::new(progress, flag.clone());
        if let Some(reason) = reason {
            exam.terminate(reason);
        }

        Ok(Self {
            rubric: CriticalSection::new(RUBRIC_LOCK, RubricRegion::new(rubric)),
            exam: CriticalSection::new(EXAM_LOCK, exam),
            flag,
            question_count,
        })
    }

    /// Create a shared reference to this state
    pub fn shared(self) -> SharedState {
        Arc::new(self)
    }

    /// Rubric lock
    pub fn rubric(&self) -> &CriticalSection<RubricRegion> {
        &self.rubric
    }

    /// Exam lock
    pub fn exam(&self) -> &CriticalSection<ExamRegion> {
        &self.exam
    }

    /// Lock-free view of the termination flag
    pub fn termination(&self) -> &TerminationFlag {
        &self.flag
    }

    pub fn question_count(&self) -> usize {
        self.question_count
    }

    pub fn lock_stats(&self) -> (LockStats, LockStats) {
        (self.rubric.stats(), self.exam.stats())
    }

    /// Tear down the locks and hand back what they protected
    pub fn into_parts(self) -> (RubricRegion, ExamRegion) {
        (self.rubric.into_inner(), self.exam.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::regions::ScanOutcome;

    fn rubric() -> Vec<RubricEntry> {
        (1..=5).map(|id| RubricEntry::new(id, 'A')).collect()
    }

    #[test]
    fn test_flag_is_monotonic() {
        let flag = TerminationFlag::new();
        assert!(!flag.is_raised());
        flag.raise();
        flag.raise();
        assert!(flag.is_raised());
    }

    #[tokio::test]
    async fn test_seeded_state() {
        let state = SharedExamState::new(rubric(), Some(ExamRecord::new("0001")), 1).unwrap();
        assert_eq!(state.question_count(), 5);
        assert!(!state.termination().is_raised());

        let exam = state.exam().acquire().await;
        assert_eq!(exam.exam_index(), 1);
        assert_eq!(exam.student_id(), "0001");
        assert!(!exam.is_terminated());
    }

    #[tokio::test]
    async fn test_missing_first_exam_starts_finished() {
        let state = SharedExamState::new(rubric(), None, 1).unwrap();
        assert!(state.termination().is_raised());

        let mut exam = state.exam().acquire().await;
        assert_eq!(exam.claim_next(), ScanOutcome::Terminated);
        assert_eq!(
            exam.termination_reason(),
            Some(&TerminationReason::NoInitialExam)
        );
    }

    #[tokio::test]
    async fn test_sentinel_first_exam_starts_finished() {
        let state = SharedExamState::new(rubric(), Some(ExamRecord::new("9999")), 1).unwrap();
        let exam = state.exam().acquire().await;
        assert!(exam.is_terminated());
        assert_eq!(
            exam.termination_reason(),
            Some(&TerminationReason::Sentinel { exam_index: 1 })
        );
    }

    #[test]
    fn test_empty_rubric_is_fatal() {
        let err = SharedExamState::new(Vec::new(), Some(ExamRecord::new("0001")), 1).unwrap_err();
        assert!(matches!(err, CoordinationError::FatalSetup { .. }));
    }

    #[tokio::test]
    async fn test_locks_are_independent() {
        let state = SharedExamState::new(rubric(), Some(ExamRecord::new("0001")), 1).unwrap();
        let _rubric = state.rubric().acquire().await;
        assert!(state.exam().try_acquire().is_some());
        assert!(state.rubric().try_acquire().is_none());

        let (rubric_stats, exam_stats) = state.lock_stats();
        assert_eq!(rubric_stats.name, RUBRIC_LOCK);
        assert_eq!(exam_stats.name, EXAM_LOCK);
    }
}
