//! Pool and store configuration
//!
//! Defaults reproduce the reference setup: 5 questions, 0.5-1 s per rubric
//! slot, 1-2 s per question, 100 ms idle backoff, 50% chance to edit a slot.
//! Every field can be overridden from a TOML file (via serde) or from
//! `TA_POOL_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::events::DEFAULT_CHANNEL_CAPACITY;
use crate::state::DEFAULT_QUESTION_COUNT;

/// Smallest pool the protocol is meant for
pub const MIN_WORKERS: usize = 2;

/// Inclusive range of milliseconds to sleep for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Fixed delay
    pub const fn fixed(ms: u64) -> Self {
        Self::new(ms, ms)
    }

    /// Pick a delay uniformly from the range. A reversed range is treated as
    /// its lower bound.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let ms = if self.max_ms <= self.min_ms {
            self.min_ms
        } else {
            rng.gen_range(self.min_ms..=self.max_ms)
        };
        Duration::from_millis(ms)
    }
}

/// How long TAs spend on each step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Time spent looking at one rubric slot
    pub review_delay: DelayRange,
    /// Time spent marking one question
    pub marking_delay: DelayRange,
    /// Sleep when every remaining question is claimed by someone else
    pub idle_backoff_ms: u64,
    /// Chance of editing a rubric slot after reviewing it
    pub rubric_edit_probability: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            review_delay: DelayRange::new(500, 1000),
            marking_delay: DelayRange::new(1000, 2000),
            idle_backoff_ms: 100,
            rubric_edit_probability: 0.5,
        }
    }
}

impl TimingConfig {
    /// Millisecond-scale timings for tests and dry runs
    pub fn fast() -> Self {
        Self {
            review_delay: DelayRange::new(1, 3),
            marking_delay: DelayRange::new(2, 6),
            idle_backoff_ms: 1,
            rubric_edit_probability: 0.5,
        }
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    /// Edit probability clamped to [0, 1]
    pub fn edit_probability(&self) -> f64 {
        if self.rubric_edit_probability.is_nan() {
            return 0.0;
        }
        self.rubric_edit_probability.clamp(0.0, 1.0)
    }
}

/// Pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of TAs
    pub worker_count: usize,
    /// Index of the first exam file to load
    pub first_exam_index: u32,
    /// Seed for the TAs' random delays and edits; entropy if unset
    pub seed: Option<u64>,
    /// Undelivered events kept per subscriber
    pub event_capacity: usize,
    pub timing: TimingConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: MIN_WORKERS,
            first_exam_index: 1,
            seed: None,
            event_capacity: DEFAULT_CHANNEL_CAPACITY,
            timing: TimingConfig::default(),
        }
    }
}

impl PoolConfig {
    /// Default config for `worker_count` TAs
    pub fn with_workers(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Self::default()
        }
    }

    pub fn timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `TA_POOL_*` environment variables
    pub fn apply_env(&mut self) {
        if let Some(n) = env_parse("TA_POOL_WORKERS") {
            self.worker_count = n;
        }
        if let Some(n) = env_parse("TA_POOL_FIRST_EXAM") {
            self.first_exam_index = n;
        }
        if let Some(seed) = env_parse("TA_POOL_SEED") {
            self.seed = Some(seed);
        }
        if let Some(n) = env_parse("TA_POOL_EVENT_CAPACITY") {
            self.event_capacity = n;
        }
        if let Some(ms) = env_parse("TA_POOL_REVIEW_MIN_MS") {
            self.timing.review_delay.min_ms = ms;
        }
        if let Some(ms) = env_parse("TA_POOL_REVIEW_MAX_MS") {
            self.timing.review_delay.max_ms = ms;
        }
        if let Some(ms) = env_parse("TA_POOL_MARKING_MIN_MS") {
            self.timing.marking_delay.min_ms = ms;
        }
        if let Some(ms) = env_parse("TA_POOL_MARKING_MAX_MS") {
            self.timing.marking_delay.max_ms = ms;
        }
        if let Some(ms) = env_parse("TA_POOL_IDLE_MS") {
            self.timing.idle_backoff_ms = ms;
        }
        if let Some(p) = env_parse("TA_POOL_EDIT_PROBABILITY") {
            self.timing.rubric_edit_probability = p;
        }
    }
}

/// Where the file store reads and writes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub rubric_path: PathBuf,
    pub exams_dir: PathBuf,
    /// Rubric entries to read (and questions per exam)
    pub question_count: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            rubric_path: PathBuf::from("rubric.txt"),
            exams_dir: PathBuf::from("exams"),
            question_count: DEFAULT_QUESTION_COUNT,
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `TA_POOL_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("TA_POOL_RUBRIC") {
            self.rubric_path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("TA_POOL_EXAMS_DIR") {
            self.exams_dir = PathBuf::from(dir);
        }
        if let Some(n) = env_parse("TA_POOL_QUESTIONS") {
            self.question_count = n;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_defaults_match_reference_setup() {
        let config = PoolConfig::default();
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.first_exam_index, 1);
        assert_eq!(config.timing.review_delay, DelayRange::new(500, 1000));
        assert_eq!(config.timing.marking_delay, DelayRange::new(1000, 2000));
        assert_eq!(config.timing.idle_backoff(), Duration::from_millis(100));
        assert_eq!(config.timing.edit_probability(), 0.5);

        let store = StoreConfig::default();
        assert_eq!(store.question_count, 5);
        assert_eq!(store.rubric_path, PathBuf::from("rubric.txt"));
    }

    #[test]
    fn test_delay_sampling_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let range = DelayRange::new(10, 20);
        for _ in 0..100 {
            let d = range.sample(&mut rng);
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(20));
        }
        assert_eq!(
            DelayRange::new(30, 5).sample(&mut rng),
            Duration::from_millis(30)
        );
        assert_eq!(DelayRange::fixed(4).sample(&mut rng), Duration::from_millis(4));
    }

    #[test]
    fn test_edit_probability_is_clamped() {
        let mut timing = TimingConfig::fast();
        timing.rubric_edit_probability = 3.0;
        assert_eq!(timing.edit_probability(), 1.0);
        timing.rubric_edit_probability = -1.0;
        assert_eq!(timing.edit_probability(), 0.0);
        timing.rubric_edit_probability = f64::NAN;
        assert_eq!(timing.edit_probability(), 0.0);
    }

    #[test]
    fn test_partial_deserialization_keeps_defaults() {
        let config: PoolConfig = serde_json::from_str(
            r#"{"worker_count": 4, "timing": {"idle_backoff_ms": 5}}"#,
        )
        .unwrap();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.timing.idle_backoff_ms, 5);
        assert_eq!(config.timing.review_delay, DelayRange::new(500, 1000));
        assert_eq!(config.event_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_builder_helpers() {
        let config = PoolConfig::with_workers(3)
            .timing(TimingConfig::fast())
            .seed(42);
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.timing.idle_backoff_ms, 1);
    }
}
