//! Final smoothed-weekly artifact.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use weekcap_core::domain::SmoothedWeek;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("output I/O on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("output serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputMetadata {
    pub run_start: NaiveDate,
    pub run_end: NaiveDate,
    pub total_days: u64,
    pub total_weeks: usize,
    pub generated_at: DateTime<Utc>,
}

/// `{ metadata, data }` where `data` is the smoothed weekly series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalOutput {
    pub metadata: OutputMetadata,
    pub data: Vec<SmoothedWeek>,
}

impl FinalOutput {
    pub fn new(run_start: NaiveDate, run_end: NaiveDate, total_days: u64, data: Vec<SmoothedWeek>) -> Self {
        Self {
            metadata: OutputMetadata {
                run_start,
                run_end,
                total_days,
                total_weeks: data.len(),
                generated_at: Utc::now(),
            },
            data,
        }
    }

    /// Write as pretty JSON via a temp file and rename.
    pub fn write_atomic(&self, path: &Path) -> Result<(), OutputError> {
        let io_err = |source| OutputError::Io {
            path: path.to_path_buf(),
            source,
        };
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut tmp = OsString::from(path.as_os_str());
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        if let Err(e) = fs::write(&tmp, json).and_then(|()| fs::rename(&tmp, path)) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(e));
        }
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self, OutputError> {
        let content = fs::read_to_string(path).map_err(|source| OutputError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weekcap_core::domain::SmoothedEntity;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2016, 1, day).unwrap()
    }

    fn output() -> FinalOutput {
        FinalOutput::new(
            d(1),
            d(31),
            31,
            vec![SmoothedWeek {
                week_start: d(15),
                entities: vec![SmoothedEntity {
                    name: "Bitcoin".into(),
                    weighted_price: 430.0,
                    weighted_market_cap: 6.5e9,
                }],
            }],
        )
    }

    #[test]
    fn serializes_camel_case_layout() {
        let json = serde_json::to_value(output()).unwrap();
        assert_eq!(json["metadata"]["runStart"], "2016-01-01");
        assert_eq!(json["metadata"]["totalDays"], 31);
        assert_eq!(json["metadata"]["totalWeeks"], 1);
        assert!(json["metadata"]["generatedAt"].is_string());
        assert_eq!(json["data"][0]["weekStart"], "2016-01-15");
        assert_eq!(json["data"][0]["entities"][0]["marketCap"], 6.5e9);
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("weekly.json");
        let out = output();
        out.write_atomic(&path).unwrap();
        assert_eq!(FinalOutput::read(&path).unwrap(), out);
        assert!(!dir.path().join("out").join("weekly.json.tmp").exists());
    }
}
