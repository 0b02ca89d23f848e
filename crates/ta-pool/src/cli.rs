//! Command line and config file layering
//!
//! Precedence, lowest first: built-in defaults, `--config` TOML file,
//! `TA_POOL_*` environment, flags.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use exam_coordination::{PoolConfig, StoreConfig, MIN_WORKERS};
use serde::Deserialize;

#[derive(Debug, Parser)]
#[command(
    name = "ta-pool",
    version,
    about = "Run a pool of TAs marking exams against a shared rubric"
)]
pub struct Args {
    /// Number of TAs (at least 2)
    #[arg(value_parser = parse_worker_count)]
    pub workers: usize,

    /// TOML file with [pool] and [store] tables
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Rubric file to read and rewrite
    #[arg(long, value_name = "FILE")]
    pub rubric: Option<PathBuf>,

    /// Directory holding exam_NN.txt files
    #[arg(long, value_name = "DIR")]
    pub exams_dir: Option<PathBuf>,

    /// Seed for reproducible delays and rubric edits
    #[arg(long)]
    pub seed: Option<u64>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

fn parse_worker_count(raw: &str) -> Result<usize, String> {
    let n: usize = raw
        .parse()
        .map_err(|_| format!("`{raw}` is not a number of TAs"))?;
    if n < MIN_WORKERS {
        return Err(format!("need at least {MIN_WORKERS} TAs, got {n}"));
    }
    Ok(n)
}

/// Contents of a `--config` file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub pool: PoolConfig,
    pub store: StoreConfig,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))
    }
}

impl Args {
    /// Resolve the final pool and store config from every layer.
    pub fn resolve(&self) -> Result<(PoolConfig, StoreConfig)> {
        let FileConfig {
            mut pool,
            mut store,
        } = match &self.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        pool.apply_env();
        store.apply_env();

        pool.worker_count = self.workers;
        if let Some(seed) = self.seed {
            pool.seed = Some(seed);
        }
        if let Some(rubric) = &self.rubric {
            store.rubric_path = rubric.clone();
        }
        if let Some(dir) = &self.exams_dir {
            store.exams_dir = dir.clone();
        }

        Ok((pool, store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_worker_count() {
        assert_eq!(parse_worker_count("2"), Ok(2));
        assert_eq!(parse_worker_count("16"), Ok(16));
        assert!(parse_worker_count("1").is_err());
        assert!(parse_worker_count("0").is_err());
        assert!(parse_worker_count("-3").is_err());
        assert!(parse_worker_count("two").is_err());
    }

    #[test]
    fn test_flags_parse() {
        let args = Args::try_parse_from([
            "ta-pool",
            "3",
            "--rubric",
            "r.txt",
            "--exams-dir",
            "piles",
            "--seed",
            "9",
            "--json",
        ])
        .unwrap();
        assert_eq!(args.workers, 3);
        assert_eq!(args.rubric, Some(PathBuf::from("r.txt")));
        assert_eq!(args.exams_dir, Some(PathBuf::from("piles")));
        assert_eq!(args.seed, Some(9));
        assert!(args.json);
    }
}
