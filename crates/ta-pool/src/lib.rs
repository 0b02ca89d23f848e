//! TA pool runner
//!
//! Wires the command line to [`exam_coordination`]: resolves config, builds a
//! file store, runs the pool and renders the summary. While the pool runs, a
//! progress log follows marks, exam advances and termination on the event bus.

pub mod cli;

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use exam_coordination::events::{EventBusExt, EventFilter, FilteredReceiver};
use exam_coordination::{Coordinator, FileStore, GradingEvent, RunSummary, TerminationReason};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

pub use cli::{Args, FileConfig};

/// Run the pool described by `args` to completion.
pub async fn run(args: &Args) -> Result<RunSummary> {
    let (pool, store) = args.resolve()?;
    info!(
        workers = pool.worker_count,
        rubric = %store.rubric_path.display(),
        exams_dir = %store.exams_dir.display(),
        "Starting TA pool"
    );

    let persistence = Arc::new(FileStore::from_config(&store));
    let coordinator = Coordinator::new(pool, persistence);
    let progress = tokio::spawn(progress_log(
        coordinator.bus().subscribe_filtered(progress_filter()),
    ));

    let result = coordinator.run().await;
    // Last sender gone: the log sees the channel close and returns
    drop(coordinator);
    match progress.await {
        Ok(marked) => debug!(marked, "Progress log closed"),
        Err(e) => warn!(error = %e, "Progress log task failed"),
    }

    result.context("TA pool failed")
}

/// Events the progress log follows
pub fn progress_filter() -> EventFilter {
    EventFilter::new().types(vec!["question_marked", "exam_advanced", "pool_terminated"])
}

/// Log pool progress until the bus closes. Returns the marks seen.
pub async fn progress_log(mut events: FilteredReceiver) -> u64 {
    let mut marked = 0u64;
    loop {
        match events.recv().await {
            Ok(GradingEvent::QuestionMarked {
                worker,
                exam_index,
                question,
                ..
            }) => {
                marked += 1;
                debug!(%worker, exam_index, question = question + 1, marked, "Question marked");
            }
            Ok(GradingEvent::ExamAdvanced {
                exam_index,
                student_id,
                ..
            }) => info!(exam_index, %student_id, marked, "Now marking exam"),
            Ok(GradingEvent::PoolTerminated { reason, .. }) => {
                info!(%reason, marked, "Pool terminated")
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Progress log fell behind; events dropped")
            }
            Err(RecvError::Closed) => return marked,
        }
    }
}

/// Summary as printed on stdout
pub fn render(summary: &RunSummary, json: bool) -> Result<String> {
    if json {
        return serde_json::to_string_pretty(summary).context("Failed to serialize summary");
    }

    let mut out = String::new();
    let reason = match &summary.termination {
        Some(TerminationReason::EndOfData { .. }) => "all exams marked".to_string(),
        Some(reason) => reason.to_string(),
        None => "not terminated".to_string(),
    };
    let _ = writeln!(out, "System: all {} TAs finished ({})", summary.worker_count, reason);
    let _ = writeln!(
        out,
        "Exams completed: {}, questions marked: {}, rubric edits: {}",
        summary.exams_completed,
        summary.questions_marked(),
        summary.rubric_edits()
    );
    if summary.failed_saves() > 0 {
        let _ = writeln!(out, "Rubric saves failed: {}", summary.failed_saves());
    }
    for worker in &summary.workers {
        let _ = writeln!(
            out,
            "  {}: marked {}, edited {}",
            worker.worker, worker.questions_marked, worker.rubric_edits
        );
    }
    Ok(out)
}
