//! Per-task attempt log: JSONL, one object per proposal attempt.
//!
//! Each task gets its own file `task_<id>.jsonl` under the log directory.
//! Lines are independent, so a crash mid-write loses at most one attempt.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How one attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Applied and verified.
    Accepted,
    GeneratorError { reason: String },
    InvalidDiff { reason: String },
    ApplyConflict { reason: String },
    VerificationFailed { diagnostics: String },
}

impl AttemptOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AttemptOutcome::Accepted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub task_id: usize,
    pub task: String,
    /// 1-based attempt number for this task.
    pub iteration: u32,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone)]
pub struct AttemptLog {
    dir: PathBuf,
}

impl AttemptLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, task_id: usize) -> PathBuf {
        self.dir.join(format!("task_{task_id}.jsonl"))
    }

    pub fn append(&self, record: &AttemptRecord) -> io::Result<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(record.task_id))?;

        writeln!(file, "{json}")?;
        file.flush()
    }

    /// All attempts recorded for a task; malformed lines are skipped.
    pub fn read(&self, task_id: usize) -> io::Result<Vec<AttemptRecord>> {
        let path = self.path_for(task_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = io::BufReader::new(fs::File::open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(rec) = serde_json::from_str::<AttemptRecord>(&line) {
                records.push(rec);
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(task_id: usize, iteration: u32, outcome: AttemptOutcome) -> AttemptRecord {
        AttemptRecord {
            task_id,
            task: "tune cooldown".into(),
            iteration,
            at: Utc::now(),
            outcome,
        }
    }

    #[test]
    fn append_and_read_per_task() {
        let dir = tempfile::tempdir().unwrap();
        let log = AttemptLog::new(dir.path().join("attempts"));
        log.append(&record(0, 1, AttemptOutcome::InvalidDiff { reason: "no header".into() }))
            .unwrap();
        log.append(&record(0, 2, AttemptOutcome::Accepted)).unwrap();
        log.append(&record(1, 1, AttemptOutcome::Accepted)).unwrap();

        let zero = log.read(0).unwrap();
        assert_eq!(zero.len(), 2);
        assert_eq!(zero[0].iteration, 1);
        assert!(zero[1].outcome.is_accepted());
        assert_eq!(log.read(1).unwrap().len(), 1);
        assert!(log.read(7).unwrap().is_empty());
    }

    #[test]
    fn lines_are_flat_json_and_garbage_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = AttemptLog::new(dir.path());
        log.append(&record(3, 1, AttemptOutcome::VerificationFailed { diagnostics: "1 failed".into() }))
            .unwrap();
        let text = fs::read_to_string(log.path_for(3)).unwrap();
        assert!(text.contains("\"outcome\":\"verification_failed\""));

        fs::write(log.path_for(3), format!("{text}not json\n")).unwrap();
        assert_eq!(log.read(3).unwrap().len(), 1);
    }
}
