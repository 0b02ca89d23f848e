//! Pool coordinator
//!
//! Loads the initial state, spawns the TAs, waits for every one of them to
//! exit, then tears the shared state down into a [`RunSummary`].
//!
//! ```text
//! Coordinator::setup()          Pool::launch()
//!   load rubric ──┐               spawn TA 1..=N ──▶ JoinSet
//!   load exam N ──┼─▶ Pool ──▶    join all
//!   seed state  ──┘               tear down ──▶ RunSummary
//! ```
//!
//! Setup failures are fatal and nothing is spawned. Once the TAs are running,
//! the only way out is every TA observing the termination flag.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{PoolConfig, MIN_WORKERS};
use crate::error::{CoordinationError, CoordinationResult};
use crate::events::{EventBus, GradingEvent, SharedEventBus};
use crate::persistence::SharedPersistence;
use crate::state::{RubricEntry, SharedExamState, SharedState, TerminationReason};
use crate::sync::LockStats;
use crate::worker::{Worker, WorkerId, WorkerReport};

/// Outcome of a completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub worker_count: usize,
    /// Exams whose questions were all marked
    pub exams_completed: u32,
    /// Index of the exam that was current when the run ended
    pub last_exam_index: u32,
    pub termination: Option<TerminationReason>,
    /// Rubric as it stood at the end of the run
    pub rubric: Vec<RubricEntry>,
    pub rubric_lock: LockStats,
    pub exam_lock: LockStats,
    /// One report per TA, ordered by id
    pub workers: Vec<WorkerReport>,
    pub elapsed_ms: u64,
}

impl RunSummary {
    /// Questions marked across all TAs
    pub fn questions_marked(&self) -> u32 {
        self.workers.iter().map(|w| w.questions_marked).sum()
    }

    /// Rubric edits across all TAs
    pub fn rubric_edits(&self) -> u32 {
        self.workers.iter().map(|w| w.rubric_edits).sum()
    }

    /// Rubric saves that failed across all TAs
    pub fn failed_saves(&self) -> u32 {
        self.workers.iter().map(|w| w.failed_saves).sum()
    }
}

/// Builds a pool from configuration and a store
pub struct Coordinator {
    config: PoolConfig,
    persistence: SharedPersistence,
    bus: SharedEventBus,
}

impl Coordinator {
    pub fn new(config: PoolConfig, persistence: SharedPersistence) -> Self {
        let bus = EventBus::with_capacity(config.event_capacity).shared();
        Self {
            config,
            persistence,
            bus,
        }
    }

    /// Publish on an existing bus instead of a private one
    pub fn with_bus(mut self, bus: SharedEventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Bus the pool will publish on. Subscribe before launching to see
    /// every event.
    pub fn bus(&self) -> SharedEventBus {
        self.bus.clone()
    }

    /// Validate the config and load the initial shared state.
    pub async fn setup(&self) -> CoordinationResult<Pool> {
        if self.config.worker_count < MIN_WORKERS {
            return Err(CoordinationError::InvalidPoolSize {
                requested: self.config.worker_count,
                min: MIN_WORKERS,
            });
        }

        let rubric = self
            .persistence
            .load_rubric()
            .await
            .map_err(CoordinationError::rubric_read)?;
        info!(entries = rubric.len(), "Loaded rubric");

        let first_index = self.config.first_exam_index;
        let first_exam = self
            .persistence
            .load_exam(first_index)
            .await
            .map_err(|e| CoordinationError::exam_read(first_index, e))?;
        match &first_exam {
            Some(record) => info!(
                exam_index = first_index,
                student_id = %record.student_id,
                "Loaded first exam"
            ),
            None => warn!(exam_index = first_index, "No first exam; nothing to mark"),
        }

        let shared = SharedExamState::new(rubric, first_exam, first_index)?.shared();

        // Already finished before anyone started
        if let Some(reason) = shared.exam().acquire().await.termination_reason() {
            info!(%reason, "Pool finished at setup");
            self.bus.publish(GradingEvent::PoolTerminated {
                worker: None,
                reason: reason.clone(),
                timestamp: Utc::now(),
            });
        }

        Ok(Pool {
            run_id: Uuid::new_v4(),
            config: self.config.clone(),
            shared,
            persistence: self.persistence.clone(),
            bus: self.bus.clone(),
        })
    }

    /// Set up and launch in one go
    pub async fn run(&self) -> CoordinationResult<RunSummary> {
        self.setup().await?.launch().await
    }
}

/// Initialized shared state, ready to have TAs launched against it
pub struct Pool {
    run_id: Uuid,
    config: PoolConfig,
    shared: SharedState,
    persistence: SharedPersistence,
    bus: SharedEventBus,
}

impl Pool {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Shared state the TAs will run against
    pub fn shared(&self) -> SharedState {
        self.shared.clone()
    }

    pub fn bus(&self) -> SharedEventBus {
        self.bus.clone()
    }

    /// Spawn TAs 1..=N, wait for all of them, and summarize.
    ///
    /// If a TA panics or errors, the pool is terminated so the others drain
    /// out, and the first failure is returned once everyone has exited.
    pub async fn launch(self) -> CoordinationResult<RunSummary> {
        let started_at = Utc::now();
        let start = Instant::now();
        let worker_count = self.config.worker_count;

        info!(run_id = %self.run_id, workers = worker_count, "Launching TAs");

        let mut join_set: JoinSet<(WorkerId, CoordinationResult<WorkerReport>)> = JoinSet::new();
        let mut task_ids = HashMap::new();

        for n in 1..=worker_count {
            let id = WorkerId(n);
            let worker = Worker::new(
                id,
                self.shared.clone(),
                self.persistence.clone(),
                self.bus.clone(),
                self.config.timing.clone(),
                self.config.seed,
            );

            let span = info_span!("ta", id = n, run_id = %self.run_id);
            let handle = join_set.spawn(async move { (id, worker.run().await) }.instrument(span));
            task_ids.insert(handle.id(), id);
        }

        let mut reports = Vec::with_capacity(worker_count);
        let mut first_failure: Option<CoordinationError> = None;

        while let Some(joined) = join_set.join_next().await {
            let failure = match joined {
                Ok((_, Ok(report))) => {
                    reports.push(report);
                    continue;
                }
                Ok((id, Err(e))) => CoordinationError::worker_failed(id, e.to_string()),
                Err(e) => {
                    let id = task_ids.get(&e.id()).copied().unwrap_or(WorkerId(0));
                    let message = if e.is_panic() { "panicked" } else { "cancelled" };
                    CoordinationError::worker_failed(id, message)
                }
            };

            error!(error = %failure, "TA exited abnormally");
            self.abort_run(&failure).await;
            first_failure.get_or_insert(failure);
        }

        if let Some(failure) = first_failure {
            return Err(failure);
        }

        reports.sort_by_key(|r| r.worker);
        let summary = self.tear_down(reports, started_at, start).await;
        info!(
            run_id = %summary.run_id,
            exams_completed = summary.exams_completed,
            questions_marked = summary.questions_marked(),
            elapsed_ms = summary.elapsed_ms,
            "All TAs finished"
        );
        Ok(summary)
    }

    /// Raise the flag so surviving TAs stop at their next check.
    async fn abort_run(&self, failure: &CoordinationError) {
        let mut exam = self.shared.exam().acquire().await;
        let reason = TerminationReason::Aborted {
            message: failure.to_string(),
        };
        if exam.terminate(reason.clone()) {
            self.bus.publish(GradingEvent::PoolTerminated {
                worker: None,
                reason,
                timestamp: Utc::now(),
            });
        }
    }

    async fn tear_down(
        self,
        workers: Vec<WorkerReport>,
        started_at: DateTime<Utc>,
        start: Instant,
    ) -> RunSummary {
        let (rubric_lock, exam_lock) = self.shared.lock_stats();

        let (rubric, exams_completed, last_exam_index, termination) =
            match Arc::try_unwrap(self.shared) {
                Ok(state) => {
                    let (rubric, exam) = state.into_parts();
                    (
                        rubric.into_entries(),
                        exam.exams_completed(),
                        exam.exam_index(),
                        exam.termination_reason().cloned(),
                    )
                }
                // Someone still holds a handle; read through the locks instead
                Err(shared) => {
                    let rubric = shared.rubric().acquire().await.entries().to_vec();
                    let exam = shared.exam().acquire().await;
                    (
                        rubric,
                        exam.exams_completed(),
                        exam.exam_index(),
                        exam.termination_reason().cloned(),
                    )
                }
            };

        RunSummary {
            run_id: self.run_id,
            started_at,
            worker_count: self.config.worker_count,
            exams_completed,
            last_exam_index,
            termination,
            rubric,
            rubric_lock,
            exam_lock,
            workers,
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    }
}
