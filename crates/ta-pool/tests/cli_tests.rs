//! End-to-end runs of the ta-pool front end against files in a temp dir

use std::fs;
use std::path::Path;

use clap::Parser;
use exam_coordination::TerminationReason;
use ta_pool::{render, run, Args, FileConfig};
use tempfile::TempDir;

const FAST_CONFIG: &str = r#"
[pool]
first_exam_index = 1

[pool.timing]
review_delay = { min_ms = 1, max_ms = 2 }
marking_delay = { min_ms = 1, max_ms = 3 }
idle_backoff_ms = 1
rubric_edit_probability = 0.5

[store]
question_count = 5
"#;

fn workspace(exams: &[&str]) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("rubric.txt"),
        "1, A\n2, B\n3, C\n4, D\n5, E\n",
    )
    .unwrap();
    fs::create_dir(dir.path().join("exams")).unwrap();
    for (i, student) in exams.iter().enumerate() {
        fs::write(
            dir.path().join(format!("exams/exam_{:02}.txt", i + 1)),
            format!("{}\n", student),
        )
        .unwrap();
    }
    fs::write(dir.path().join("pool.toml"), FAST_CONFIG).unwrap();
    dir
}

fn args(dir: &Path, extra: &[&str]) -> Args {
    let config = dir.join("pool.toml");
    let rubric = dir.join("rubric.txt");
    let exams = dir.join("exams");
    let mut argv = vec![
        "ta-pool".to_string(),
        "2".to_string(),
        "--config".to_string(),
        config.display().to_string(),
        "--rubric".to_string(),
        rubric.display().to_string(),
        "--exams-dir".to_string(),
        exams.display().to_string(),
    ];
    argv.extend(extra.iter().map(|s| s.to_string()));
    Args::try_parse_from(argv).unwrap()
}

#[test]
fn test_rejects_fewer_than_two_workers() {
    assert!(Args::try_parse_from(["ta-pool", "1"]).is_err());
    assert!(Args::try_parse_from(["ta-pool", "0"]).is_err());
}

#[test]
fn test_rejects_non_numeric_worker_count() {
    assert!(Args::try_parse_from(["ta-pool", "many"]).is_err());
    assert!(Args::try_parse_from(["ta-pool"]).is_err());
}

#[test]
fn test_flags_override_config_file() {
    let dir = workspace(&["1001"]);
    let parsed = args(dir.path(), &["--seed", "77"]);
    let (pool, store) = parsed.resolve().unwrap();

    assert_eq!(pool.worker_count, 2);
    assert_eq!(pool.seed, Some(77));
    assert_eq!(pool.timing.idle_backoff_ms, 1);
    assert_eq!(pool.timing.marking_delay.max_ms, 3);
    assert_eq!(store.rubric_path, dir.path().join("rubric.txt"));
    assert_eq!(store.exams_dir, dir.path().join("exams"));
}

#[test]
fn test_missing_config_file_is_an_error() {
    let parsed = Args::try_parse_from(["ta-pool", "2", "--config", "/nonexistent/pool.toml"])
        .unwrap();
    assert!(parsed.resolve().is_err());
}

#[test]
fn test_empty_config_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.toml");
    fs::write(&path, "").unwrap();

    let config = FileConfig::load(&path).unwrap();
    assert_eq!(config.pool.first_exam_index, 1);
    assert_eq!(config.store.question_count, 5);
    assert_eq!(config.pool.timing.idle_backoff_ms, 100);
}

#[tokio::test]
async fn test_run_marks_both_exams_and_rewrites_rubric() {
    let dir = workspace(&["1001", "1002"]);
    let parsed = args(dir.path(), &["--seed", "5"]);

    let summary = run(&parsed).await.unwrap();

    assert_eq!(summary.exams_completed, 2);
    assert_eq!(summary.questions_marked(), 10);
    assert_eq!(
        summary.termination,
        Some(TerminationReason::EndOfData { last_exam_index: 2 })
    );

    let rubric = fs::read_to_string(dir.path().join("rubric.txt")).unwrap();
    assert_eq!(rubric.lines().count(), 5);
    let expected: String = summary
        .rubric
        .iter()
        .map(|e| format!("{}, {}\n", e.id, e.grade))
        .collect();
    assert_eq!(summary.failed_saves(), 0);
    assert_eq!(rubric, expected);

    let text = render(&summary, false).unwrap();
    assert!(text.contains("all 2 TAs finished (all exams marked)"));
    assert!(text.contains("TA 1: marked"));
}

#[tokio::test]
async fn test_json_summary_is_valid() {
    let dir = workspace(&["1001", "9999", "1003"]);
    let parsed = args(dir.path(), &["--json"]);

    let summary = run(&parsed).await.unwrap();
    let json = render(&summary, parsed.json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["worker_count"], 2);
    assert_eq!(value["termination"]["kind"], "sentinel");
    assert_eq!(value["termination"]["exam_index"], 2);
    assert_eq!(value["workers"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_missing_rubric_fails_the_run() {
    let dir = workspace(&["1001"]);
    fs::remove_file(dir.path().join("rubric.txt")).unwrap();

    let err = run(&args(dir.path(), &[])).await.unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to load rubric"));
}
