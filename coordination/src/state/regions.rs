//! The two lock-protected regions of shared state
//!
//! Neither region exposes its fields. Every mutation goes through a method,
//! and callers only reach those methods through a held
//! [`SectionGuard`](crate::sync::SectionGuard), so holding the right lock is
//! enforced by the borrow checker rather than by convention.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::shared::TerminationFlag;
use super::types::{
    next_grade, Claim, ExamProgress, ExamRecord, QuestionStatus, RubricEntry, TerminationReason,
};
use crate::error::{CoordinationError, CoordinationResult};

// ============================================================================
// Rubric region
// ============================================================================

/// A single grade change made during rubric review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricEdit {
    /// Zero-based rubric slot
    pub slot: usize,
    pub id: i32,
    pub previous: char,
    pub grade: char,
}

/// Rubric entries, guarded by the rubric lock
#[derive(Debug, Clone)]
pub struct RubricRegion {
    entries: Vec<RubricEntry>,
}

impl RubricRegion {
    pub fn new(entries: Vec<RubricEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[RubricEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Increment the grade of one slot in place. `None` if the slot does not exist.
    pub fn bump_grade(&mut self, slot: usize) -> Option<RubricEdit> {
        let entry = self.entries.get_mut(slot)?;
        let previous = entry.grade;
        entry.grade = next_grade(previous);
        Some(RubricEdit {
            slot,
            id: entry.id,
            previous,
            grade: entry.grade,
        })
    }

    pub fn into_entries(self) -> Vec<RubricEntry> {
        self.entries
    }
}

// ============================================================================
// Exam region
// ============================================================================

/// Result of scanning the current exam for work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The pool is finished; stop working
    Terminated,
    /// This worker now owns the question
    Claimed(Claim),
    /// Nothing left to claim, but other TAs are still marking
    Busy { in_progress: usize },
    /// Every question is marked; the caller must advance the exam
    AllMarked,
}

/// Result of moving the pool past a fully marked exam
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// A fresh exam is ready to be claimed
    Loaded { exam_index: u32, student_id: String },
    /// The sentinel student was loaded and the pool is finished
    Sentinel { exam_index: u32 },
    /// No exam file after the current one; the pool is finished
    EndOfData { last_exam_index: u32 },
}

impl AdvanceOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Loaded { .. })
    }
}

/// Exam progress and termination state, guarded by the exam lock
#[derive(Debug)]
pub struct ExamRegion {
    progress: ExamProgress,
    flag: Arc<TerminationFlag>,
    reason: Option<TerminationReason>,
    exams_completed: u32,
}

impl ExamRegion {
    pub(crate) fn new(progress: ExamProgress, flag: Arc<TerminationFlag>) -> Self {
        Self {
            progress,
            flag,
            reason: None,
            exams_completed: 0,
        }
    }

    pub fn progress(&self) -> &ExamProgress {
        &self.progress
    }

    pub fn exam_index(&self) -> u32 {
        self.progress.exam_index
    }

    pub fn student_id(&self) -> &str {
        &self.progress.student_id
    }

    /// Copy of the current exam, taken under the lock
    pub fn snapshot(&self) -> ExamProgress {
        self.progress.clone()
    }

    /// Termination as seen by the lock holder. This is the check that gates
    /// whether a worker keeps doing protected work.
    pub fn is_terminated(&self) -> bool {
        self.flag.is_raised()
    }

    pub fn termination_reason(&self) -> Option<&TerminationReason> {
        self.reason.as_ref()
    }

    /// Exams whose questions were all marked
    pub fn exams_completed(&self) -> u32 {
        self.exams_completed
    }

    /// Claim the lowest-index unmarked question, if any.
    pub fn claim_next(&mut self) -> ScanOutcome {
        if self.is_terminated() {
            return ScanOutcome::Terminated;
        }

        match self.progress.first_unmarked() {
            Some(question) => {
                self.progress.statuses[question] = QuestionStatus::InProgress;
                ScanOutcome::Claimed(Claim {
                    exam_index: self.progress.exam_index,
                    question,
                    student_id: self.progress.student_id.clone(),
                })
            }
            None if self.progress.all_marked() => ScanOutcome::AllMarked,
            None => ScanOutcome::Busy {
                in_progress: self.progress.count(QuestionStatus::InProgress),
            },
        }
    }

    /// Commit a claimed question as marked.
    pub fn complete(&mut self, claim: &Claim) -> CoordinationResult<()> {
        if claim.exam_index != self.progress.exam_index {
            return Err(CoordinationError::protocol(format!(
                "claim for exam {} committed while exam {} is current",
                claim.exam_index, self.progress.exam_index
            )));
        }

        let status = self
            .progress
            .statuses
            .get_mut(claim.question)
            .ok_or_else(|| {
                CoordinationError::protocol(format!("question {} out of range", claim.question))
            })?;

        if *status != QuestionStatus::InProgress {
            return Err(CoordinationError::protocol(format!(
                "question {} of exam {} is {}, expected in_progress",
                claim.question_number(),
                claim.exam_index,
                status
            )));
        }

        *status = QuestionStatus::Marked;
        Ok(())
    }

    /// Replace the fully marked exam with the next one, or finish the pool.
    ///
    /// `next` is what persistence returned for `exam_index + 1`. There is no
    /// index past `u32::MAX`, so the pool ends there as if no exam followed.
    pub fn advance(&mut self, next: Option<ExamRecord>) -> CoordinationResult<AdvanceOutcome> {
        self.close_current()?;

        let (record, next_index) = match (next, self.next_index()) {
            (Some(record), Some(next_index)) => (record, next_index),
            _ => {
                let last_exam_index = self.progress.exam_index;
                self.terminate(TerminationReason::EndOfData { last_exam_index });
                return Ok(AdvanceOutcome::EndOfData { last_exam_index });
            }
        };

        let sentinel = record.is_sentinel();
        self.progress =
            ExamProgress::new(record.student_id, next_index, self.progress.statuses.len());

        if sentinel {
            self.terminate(TerminationReason::Sentinel {
                exam_index: next_index,
            });
            return Ok(AdvanceOutcome::Sentinel {
                exam_index: next_index,
            });
        }

        Ok(AdvanceOutcome::Loaded {
            exam_index: next_index,
            student_id: self.progress.student_id.clone(),
        })
    }

    /// The next exam exists but could not be read: finish the pool.
    pub fn fail_advance(
        &mut self,
        message: impl Into<String>,
    ) -> CoordinationResult<TerminationReason> {
        self.close_current()?;
        let reason = TerminationReason::LoadFailed {
            exam_index: self.progress.exam_index.saturating_add(1),
            message: message.into(),
        };
        self.terminate(reason.clone());
        Ok(reason)
    }

    /// Index of the exam after the current one, if there can be one
    pub fn next_index(&self) -> Option<u32> {
        self.progress.exam_index.checked_add(1)
    }

    /// Raise the termination flag. Only the first reason is kept.
    ///
    /// Returns `true` if this call was the one that ended the run.
    pub fn terminate(&mut self, reason: TerminationReason) -> bool {
        if self.reason.is_some() {
            return false;
        }
        self.reason = Some(reason);
        self.flag.raise();
        true
    }

    fn close_current(&mut self) -> CoordinationResult<()> {
        if self.is_terminated() {
            return Err(CoordinationError::protocol(
                "exam advance attempted after termination",
            ));
        }
        if !self.progress.all_marked() {
            return Err(CoordinationError::protocol(format!(
                "exam {} advanced with {} question(s) not marked",
                self.progress.exam_index,
                self.progress.statuses.len() - self.progress.count(QuestionStatus::Marked)
            )));
        }
        self.exams_completed += 1;
        Ok(())
    }
}
