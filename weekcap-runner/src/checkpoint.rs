//! Durable harvest progress.
//!
//! The checkpoint is a single pretty-printed JSON file. Saves are atomic:
//! write `<path>.tmp`, fsync, rename over `<path>`. A failed save leaves the
//! previous checkpoint untouched. A file that parses but is internally
//! inconsistent is reported as corrupt rather than silently discarded.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use weekcap_core::domain::DailySample;

pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("checkpoint serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("checkpoint {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("checkpoint {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

fn default_version() -> u32 {
    CHECKPOINT_VERSION
}

/// Harvest progress as persisted on disk.
///
/// `last_committed_date` is the date of the last sample in `samples`, real or
/// sentinel. `last_attempted_date` may run ahead of it when a fetch was in
/// flight at save time. Resuming always starts the day after the committed one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default = "default_version")]
    pub version: u32,
    pub run_start: NaiveDate,
    pub run_end: NaiveDate,
    #[serde(default)]
    pub samples: Vec<DailySample>,
    #[serde(default)]
    pub last_committed_date: Option<NaiveDate>,
    #[serde(default)]
    pub last_attempted_date: Option<NaiveDate>,
    #[serde(default)]
    pub day_count: u64,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn new(run_start: NaiveDate, run_end: NaiveDate) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            run_start,
            run_end,
            samples: Vec::new(),
            last_committed_date: None,
            last_attempted_date: None,
            day_count: 0,
            saved_at: None,
        }
    }

    /// Number of missing-day sentinels.
    pub fn missing_days(&self) -> usize {
        self.samples.iter().filter(|s| s.is_missing()).count()
    }

    /// Day the next fetch should target.
    pub fn resume_date(&self) -> NaiveDate {
        self.last_committed_date
            .and_then(|d| d.succ_opt())
            .unwrap_or(self.run_start)
    }

    /// Internal consistency check: counts agree and dates run one per day.
    pub fn check_consistency(&self) -> Result<(), String> {
        if self.day_count != self.samples.len() as u64 {
            return Err(format!(
                "day_count {} but {} samples",
                self.day_count,
                self.samples.len()
            ));
        }
        let last = self.samples.last().map(|s| s.date);
        if last != self.last_committed_date {
            return Err(format!(
                "last_committed_date {:?} but last sample is {:?}",
                self.last_committed_date, last
            ));
        }
        if let Some(w) = self
            .samples
            .windows(2)
            .find(|w| w[0].date.succ_opt() != Some(w[1].date))
        {
            return Err(format!("{} is not followed by the next day ({})", w[0].date, w[1].date));
        }
        Ok(())
    }
}

/// File-backed checkpoint store. Single writer, single reader.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut s = OsString::from(self.path.as_os_str());
        s.push(".tmp");
        PathBuf::from(s)
    }

    fn io_err(&self, source: io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Load the checkpoint, or `None` if there is no file.
    pub fn load(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };
        let checkpoint: Checkpoint =
            serde_json::from_str(&content).map_err(|source| CheckpointError::Parse {
                path: self.path.clone(),
                source,
            })?;
        checkpoint
            .check_consistency()
            .map_err(|reason| CheckpointError::Corrupt {
                path: self.path.clone(),
                reason,
            })?;
        Ok(Some(checkpoint))
    }

    /// Atomically replace the checkpoint file.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let json = serde_json::to_string_pretty(checkpoint)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        let tmp = self.tmp_path();
        let written = File::create(&tmp).and_then(|mut f| {
            f.write_all(json.as_bytes())?;
            f.sync_all()
        });
        if let Err(e) = written.and_then(|()| fs::rename(&tmp, &self.path)) {
            let _ = fs::remove_file(&tmp);
            return Err(self.io_err(e));
        }

        debug!(
            path = %self.path.display(),
            day_count = checkpoint.day_count,
            "checkpoint saved"
        );
        Ok(())
    }

    /// Delete the checkpoint. A missing file is not an error.
    pub fn clear(&self) -> Result<(), CheckpointError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_err(e)),
        }
    }
}
