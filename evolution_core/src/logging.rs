//! Run journal: one JSON line per generation, plus tracing setup.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

const LOG_DIR: &str = "logs";

fn log_dir() -> io::Result<()> {
    fs::create_dir_all(LOG_DIR)
}

fn append_json_line<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    serde_json::to_writer(&mut file, value)
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    file.write_all(b"\n")
}

pub(crate) fn timestamp_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Outcome of one generation of architecture search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub generation: usize,
    pub best_fitness: f32,
    pub validation_accuracy: f32,
    /// Accuracy of the retrained best network on its own training images
    pub train_accuracy: f32,
    pub parameters: usize,
    pub training_time_ms: u128,
    pub chromosome: String,
    pub timestamp_ms: u128,
}

/// Destination for per-generation results.
pub trait ResultsSink {
    fn record(&mut self, record: &GenerationRecord) -> io::Result<()>;
}

/// Appends records to a JSONL file.
#[derive(Debug, Clone)]
pub struct JsonlResultsLog {
    path: PathBuf,
}

impl JsonlResultsLog {
    /// Journal at `path`; missing parent directories are created.
    pub fn new<P: Into<PathBuf>>(path: P) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    /// `logs/evolution.jsonl` under the working directory.
    pub fn in_log_dir() -> io::Result<Self> {
        log_dir()?;
        Ok(Self {
            path: Path::new(LOG_DIR).join("evolution.jsonl"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultsSink for JsonlResultsLog {
    fn record(&mut self, record: &GenerationRecord) -> io::Result<()> {
        append_json_line(&self.path, record)
    }
}

/// Keeps records in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryResultsLog {
    pub records: Vec<GenerationRecord>,
}

impl ResultsSink for MemoryResultsLog {
    fn record(&mut self, record: &GenerationRecord) -> io::Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// Installs a `tracing` subscriber filtered by `RUST_LOG`, defaulting to
/// `info`. Later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(generation: usize) -> GenerationRecord {
        GenerationRecord {
            generation,
            best_fitness: 12.5,
            validation_accuracy: 0.9,
            train_accuracy: 0.95,
            parameters: 25_000,
            training_time_ms: 40,
            chromosome: "FC output".into(),
            timestamp_ms: timestamp_ms(),
        }
    }

    #[test]
    fn test_jsonl_appends_one_line_per_record() {
        let dir = std::env::temp_dir().join(format!("cnn_evolution_log_{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("run.jsonl");
        let _ = fs::remove_dir_all(&dir);

        let mut log = JsonlResultsLog::new(&path).unwrap();
        log.record(&record(1)).unwrap();
        log.record(&record(2)).unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<GenerationRecord> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].generation, 2);
        assert_eq!(lines[0].chromosome, "FC output");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_memory_log_collects_records() {
        let mut log = MemoryResultsLog::default();
        log.record(&record(0)).unwrap();
        log.record(&record(1)).unwrap();
        let generations: Vec<_> = log.records.iter().map(|r| r.generation).collect();
        assert_eq!(generations, [0, 1]);
    }
}
