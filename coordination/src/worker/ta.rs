//! The TA state machine

use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use super::{WorkerId, WorkerPhase, WorkerReport};
use crate::config::TimingConfig;
use crate::error::CoordinationResult;
use crate::events::{GradingEvent, SharedEventBus};
use crate::persistence::SharedPersistence;
use crate::state::{AdvanceOutcome, Claim, ExamRegion, ScanOutcome, SharedState};
use crate::sync::SectionGuard;

/// How a pass of the mark loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkOutcome {
    /// A different exam is now current; review the rubric for it
    NextExam,
    /// The pool is finished
    Terminated,
}

/// One TA
pub struct Worker {
    id: WorkerId,
    shared: SharedState,
    persistence: SharedPersistence,
    bus: SharedEventBus,
    timing: TimingConfig,
    rng: StdRng,
    phase: WorkerPhase,
    report: WorkerReport,
}

impl Worker {
    /// Create a worker. With a seed, its delays and edits are reproducible.
    pub fn new(
        id: WorkerId,
        shared: SharedState,
        persistence: SharedPersistence,
        bus: SharedEventBus,
        timing: TimingConfig,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id.0 as u64)),
            None => StdRng::from_entropy(),
        };

        Self {
            id,
            shared,
            persistence,
            bus,
            timing,
            rng,
            phase: WorkerPhase::Gate,
            report: WorkerReport::new(id),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Run until the pool is finished, then report.
    pub async fn run(mut self) -> CoordinationResult<WorkerReport> {
        loop {
            self.enter(WorkerPhase::Gate);
            let Some(exam_index) = self.gate().await else {
                break;
            };

            self.enter(WorkerPhase::RubricReview);
            self.review_rubric(exam_index).await;

            self.enter(WorkerPhase::ClaimAndMark);
            if self.mark_exam(exam_index).await? == MarkOutcome::Terminated {
                break;
            }
        }

        self.enter(WorkerPhase::Terminated);
        self.bus.publish(GradingEvent::WorkerExited {
            worker: self.id,
            timestamp: Utc::now(),
        });
        info!(ta = self.id.0, "{}: Finished work", self.id);
        Ok(self.report)
    }

    fn enter(&mut self, phase: WorkerPhase) {
        debug!(ta = self.id.0, from = %self.phase, to = %phase, "Phase change");
        self.phase = phase;
    }

    /// Check the flag under the exam lock. Returns the exam to review for.
    async fn gate(&self) -> Option<u32> {
        let exam = self.shared.exam().acquire().await;
        if exam.is_terminated() {
            None
        } else {
            Some(exam.exam_index())
        }
    }

    // ── RubricReview ──────────────────────────────────────────────────────

    async fn review_rubric(&mut self, exam_index: u32) {
        let shared = Arc::clone(&self.shared);
        let edit_probability = self.timing.edit_probability();

        info!(ta = self.id.0, exam_index, "{}: Reviewing rubric", self.id);
        self.report.rubric_passes += 1;

        for slot in 0..shared.question_count() {
            let delay = self.timing.review_delay.sample(&mut self.rng);
            tokio::time::sleep(delay).await;

            if !self.rng.gen_bool(edit_probability) {
                continue;
            }

            let mut rubric = shared.rubric().acquire().await;
            let Some(edit) = rubric.bump_grade(slot) else {
                continue;
            };

            info!(
                ta = self.id.0,
                question = slot + 1,
                from = %edit.previous,
                to = %edit.grade,
                "{}: Modifying rubric for Q{}",
                self.id,
                slot + 1
            );
            self.report.rubric_edits += 1;
            self.bus.publish(GradingEvent::RubricEdited {
                worker: self.id,
                slot,
                rubric_id: edit.id,
                previous: edit.previous,
                grade: edit.grade,
                timestamp: Utc::now(),
            });

            // Still under the rubric lock: saves land in edit order
            if let Err(e) = self.persistence.save_rubric(rubric.entries()).await {
                warn!(ta = self.id.0, error = %e, "Failed to save rubric; edit kept in memory");
                self.report.failed_saves += 1;
                self.bus.publish(GradingEvent::RubricSaveFailed {
                    worker: self.id,
                    message: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }
    }

    // ── ClaimAndMark ──────────────────────────────────────────────────────

    async fn mark_exam(&mut self, reviewed_for: u32) -> CoordinationResult<MarkOutcome> {
        let shared = Arc::clone(&self.shared);

        loop {
            let mut exam = shared.exam().acquire().await;

            if exam.is_terminated() {
                return Ok(MarkOutcome::Terminated);
            }
            if exam.exam_index() != reviewed_for {
                debug!(
                    ta = self.id.0,
                    reviewed_for,
                    current = exam.exam_index(),
                    "Exam changed since rubric review"
                );
                return Ok(MarkOutcome::NextExam);
            }

            match exam.claim_next() {
                ScanOutcome::Terminated => return Ok(MarkOutcome::Terminated),
                ScanOutcome::Claimed(claim) => {
                    self.bus.publish(GradingEvent::QuestionClaimed {
                        worker: self.id,
                        exam_index: claim.exam_index,
                        student_id: claim.student_id.clone(),
                        question: claim.question,
                        timestamp: Utc::now(),
                    });
                    drop(exam);
                    self.mark(claim).await?;
                }
                ScanOutcome::Busy { in_progress } => {
                    drop(exam);
                    self.report.idle_waits += 1;
                    debug!(ta = self.id.0, in_progress, "Nothing to claim; backing off");
                    tokio::time::sleep(self.timing.idle_backoff()).await;
                }
                ScanOutcome::AllMarked => return self.advance(exam).await,
            }
        }
    }

    /// Mark a claimed question outside any lock, then commit it.
    async fn mark(&mut self, claim: Claim) -> CoordinationResult<()> {
        info!(
            ta = self.id.0,
            exam_index = claim.exam_index,
            "{}: Marking Q{} for Student {}",
            self.id,
            claim.question_number(),
            claim.student_id
        );

        let delay = self.timing.marking_delay.sample(&mut self.rng);
        tokio::time::sleep(delay).await;

        let mut exam = self.shared.exam().acquire().await;
        exam.complete(&claim)?;
        self.bus.publish(GradingEvent::QuestionMarked {
            worker: self.id,
            exam_index: claim.exam_index,
            student_id: claim.student_id.clone(),
            question: claim.question,
            timestamp: Utc::now(),
        });
        drop(exam);

        self.report.questions_marked += 1;
        info!(
            ta = self.id.0,
            exam_index = claim.exam_index,
            "{}: Finished Q{} for Student {}",
            self.id,
            claim.question_number(),
            claim.student_id
        );
        Ok(())
    }

    /// Every question is marked: load the next exam while still holding the
    /// exam lock, so nobody sees a half-replaced exam.
    async fn advance(
        &mut self,
        mut exam: SectionGuard<'_, ExamRegion>,
    ) -> CoordinationResult<MarkOutcome> {
        let from_index = exam.exam_index();
        let outcome = match exam.next_index() {
            Some(next_index) => {
                info!(
                    ta = self.id.0,
                    "{}: Exam {} finished. Loading exam {}...",
                    self.id,
                    exam.student_id(),
                    next_index
                );
                match self.persistence.load_exam(next_index).await {
                    Ok(next) => exam.advance(next)?,
                    Err(e) => {
                        warn!(
                            ta = self.id.0,
                            exam_index = next_index,
                            error = %e,
                            "Failed to load exam"
                        );
                        exam.fail_advance(e.to_string())?;
                        self.finish_run(&exam);
                        return Ok(MarkOutcome::Terminated);
                    }
                }
            }
            None => {
                info!(
                    ta = self.id.0,
                    "{}: Exam {} finished. No exam index left",
                    self.id,
                    exam.student_id()
                );
                exam.advance(None)?
            }
        };

        match outcome {
            AdvanceOutcome::Loaded {
                exam_index,
                student_id,
            } => {
                self.report.exams_advanced += 1;
                self.bus.publish(GradingEvent::ExamAdvanced {
                    worker: self.id,
                    from_index,
                    exam_index,
                    student_id,
                    timestamp: Utc::now(),
                });
                Ok(MarkOutcome::NextExam)
            }
            AdvanceOutcome::Sentinel { exam_index } => {
                self.report.exams_advanced += 1;
                self.bus.publish(GradingEvent::ExamAdvanced {
                    worker: self.id,
                    from_index,
                    exam_index,
                    student_id: exam.student_id().to_string(),
                    timestamp: Utc::now(),
                });
                self.finish_run(&exam);
                Ok(MarkOutcome::Terminated)
            }
            AdvanceOutcome::EndOfData { .. } => {
                self.finish_run(&exam);
                Ok(MarkOutcome::Terminated)
            }
        }
    }

    /// Record that this worker ended the run. Called with the exam lock held.
    fn finish_run(&mut self, exam: &ExamRegion) {
        self.report.ended_run = true;
        if let Some(reason) = exam.termination_reason() {
            info!(ta = self.id.0, %reason, "System: Terminating ({})", reason);
            self.bus.publish(GradingEvent::PoolTerminated {
                worker: Some(self.id),
                reason: reason.clone(),
                timestamp: Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DelayRange;
    use crate::events::{drain, EventBus};
    use crate::persistence::{MemoryStore, Persistence};
    use crate::state::{QuestionStatus, RubricEntry, SharedExamState, TerminationReason};

    fn rubric() -> Vec<RubricEntry> {
        (1..=5).map(|id| RubricEntry::new(id, 'A')).collect()
    }

    fn timing(edit_probability: f64) -> TimingConfig {
        TimingConfig {
            review_delay: DelayRange::new(5, 10),
            marking_delay: DelayRange::new(10, 20),
            idle_backoff_ms: 5,
            rubric_edit_probability: edit_probability,
        }
    }

    async fn solo_run(
        store: Arc<MemoryStore>,
        edit_probability: f64,
    ) -> (WorkerReport, SharedState, Vec<GradingEvent>) {
        let first = store.load_exam(1).await.unwrap();
        let shared = SharedExamState::new(rubric(), first, 1).unwrap().shared();
        let bus = EventBus::new().shared();
        let mut rx = bus.subscribe();

        let worker = Worker::new(
            WorkerId(1),
            shared.clone(),
            store,
            bus,
            timing(edit_probability),
            Some(11),
        );
        let report = worker.run().await.unwrap();
        (report, shared, drain(&mut rx))
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_worker_marks_every_question_in_order() {
        let store = Arc::new(MemoryStore::new(&rubric()).with_exams(2));
        let (report, shared, events) = solo_run(store, 0.0).await;

        assert_eq!(report.questions_marked, 10);
        assert_eq!(report.exams_advanced, 1);
        assert_eq!(report.rubric_passes, 2);
        assert_eq!(report.idle_waits, 0);
        assert!(report.ended_run);

        let claimed: Vec<(u32, usize)> = events
            .iter()
            .filter_map(|e| match e {
                GradingEvent::QuestionClaimed {
                    exam_index,
                    question,
                    ..
                } => Some((*exam_index, *question)),
                _ => None,
            })
            .collect();
        let expected: Vec<(u32, usize)> = (1..=2)
            .flat_map(|exam| (0..5).map(move |q| (exam, q)))
            .collect();
        assert_eq!(claimed, expected);

        let exam = shared.exam().acquire().await;
        assert!(exam.progress().all_marked());
        assert_eq!(
            exam.termination_reason(),
            Some(&TerminationReason::EndOfData { last_exam_index: 2 })
        );
        assert!(matches!(
            events.last(),
            Some(GradingEvent::WorkerExited { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_slot_edited_when_probability_is_one() {
        let store = Arc::new(MemoryStore::new(&rubric()).with_exams(1));
        let (report, shared, _) = solo_run(store.clone(), 1.0).await;

        assert_eq!(report.rubric_edits, 5);
        assert_eq!(store.save_count(), 5);
        assert_eq!(store.rubric_text(), "1, B\n2, B\n3, B\n4, B\n5, B\n");

        let rubric = shared.rubric().acquire().await;
        assert!(rubric.entries().iter().all(|e| e.grade == 'B'));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_saves_are_counted_not_fatal() {
        let store = Arc::new(MemoryStore::new(&rubric()).with_exams(1));
        store.set_fail_saves(true);
        let (report, shared, events) = solo_run(store.clone(), 1.0).await;

        assert_eq!(report.failed_saves, 5);
        assert_eq!(report.questions_marked, 5);
        assert_eq!(store.rubric_text(), "1, A\n2, A\n3, A\n4, A\n5, A\n");
        assert_eq!(
            events
                .iter()
                .filter(|e| e.event_type() == "rubric_save_failed")
                .count(),
            5
        );

        // Edits are still visible in shared state
        let rubric = shared.rubric().acquire().await;
        assert!(rubric.entries().iter().all(|e| e.grade == 'B'));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sentinel_stops_with_questions_unmarked() {
        let store = Arc::new(MemoryStore::new(&rubric()).with_exams(1).with_exam(2, "9999"));
        let (report, shared, events) = solo_run(store, 0.0).await;

        assert_eq!(report.questions_marked, 5);
        let exam = shared.exam().acquire().await;
        assert_eq!(exam.student_id(), "9999");
        assert_eq!(exam.progress().count(QuestionStatus::Unmarked), 5);
        assert_eq!(
            exam.termination_reason(),
            Some(&TerminationReason::Sentinel { exam_index: 2 })
        );
        assert!(events.iter().any(|e| matches!(
            e,
            GradingEvent::ExamAdvanced { exam_index: 2, student_id, .. } if student_id == "9999"
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_possible_exam_index_ends_the_run() {
        let store = Arc::new(MemoryStore::new(&rubric()).with_exam(u32::MAX, "0001"));
        let first = store.load_exam(u32::MAX).await.unwrap();
        let shared = SharedExamState::new(rubric(), first, u32::MAX)
            .unwrap()
            .shared();
        let worker = Worker::new(
            WorkerId(1),
            shared.clone(),
            store.clone(),
            EventBus::new().shared(),
            timing(0.0),
            Some(4),
        );

        let report = worker.run().await.unwrap();

        assert_eq!(report.questions_marked, 5);
        assert!(report.ended_run);
        assert_eq!(store.exam_load_count(), 1);
        let exam = shared.exam().acquire().await;
        assert_eq!(
            exam.termination_reason(),
            Some(&TerminationReason::EndOfData {
                last_exam_index: u32::MAX
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_exits_immediately_when_already_finished() {
        let store = Arc::new(MemoryStore::new(&rubric()));
        let (report, _, events) = solo_run(store, 1.0).await;

        assert_eq!(report.rubric_passes, 0);
        assert_eq!(report.questions_marked, 0);
        assert!(!report.ended_run);
        assert_eq!(events.len(), 1);
    }
}
