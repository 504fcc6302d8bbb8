//! Harvest configuration loaded from TOML.
//!
//! Every field has a default matching the reference run (2016-01-01 through
//! 2025-05-20, top 50, flush every 100 days), so an empty file is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use weekcap_core::data::{RetryPolicy, DEFAULT_LISTING_DEPTH};
use weekcap_core::domain::DEFAULT_TOP_K;
use weekcap_core::SmoothingWeights;

use crate::pacing::{FixedPacing, PacingPolicy, RandomPacing};

pub const DEFAULT_CHECKPOINT_FILE: &str = "scraping_progress.json";
pub const DEFAULT_OUTPUT_FILE: &str = "weekly_crypto_data.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("end date {end} is before start date {start}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },

    #[error("top_k must be at least 1")]
    ZeroTopK,

    #[error("min_concurrency {min} exceeds max_concurrency {max}")]
    ConcurrencyRange { min: u32, max: u32 },

    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
}

/// What to do when a day fails for a reason other than rate limiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record a missing-day sentinel, checkpoint, and stop the run.
    #[default]
    Abort,
    /// Record a missing-day sentinel and carry on with the next day.
    Continue,
}

/// Top-level harvest configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub run: RunSection,
    pub smoothing: SmoothingSection,
    pub pacing: PacingSection,
    pub retry: RetrySection,
    pub source: SourceSection,
    pub paths: PathsSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub top_k: usize,
    /// Days between periodic checkpoint flushes; 0 disables them.
    pub flush_every: u32,
    pub failure_policy: FailurePolicy,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2016, 1, 1).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2025, 5, 20).unwrap_or_default(),
            top_k: DEFAULT_TOP_K,
            flush_every: 100,
            failure_policy: FailurePolicy::Abort,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingSection {
    pub weights: SmoothingWeights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingSection {
    /// Upper bound of the uniform politeness delay between days.
    pub max_delay_ms: u64,
    pub min_concurrency: u32,
    pub max_concurrency: u32,
    /// Fixes the pacing sequence; unseeded runs draw from OS entropy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for PacingSection {
    fn default() -> Self {
        Self {
            max_delay_ms: 250,
            min_concurrency: 1,
            max_concurrency: 3,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub rate_limit_wait_secs: u64,
    /// Total attempts per day while rate limited; 0 retries forever.
    pub max_attempts: u32,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            rate_limit_wait_secs: 60,
            max_attempts: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    pub listing_depth: usize,
    pub timeout_secs: u64,
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            listing_depth: DEFAULT_LISTING_DEPTH,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub checkpoint: PathBuf,
    pub output: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_dir: Option<PathBuf>,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            checkpoint: PathBuf::from(DEFAULT_CHECKPOINT_FILE),
            output: PathBuf::from(DEFAULT_OUTPUT_FILE),
            image_dir: None,
        }
    }
}

impl HarvestConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check cross-field constraints. Weights are validated while parsing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.end_date < self.run.start_date {
            return Err(ConfigError::InvertedRange {
                start: self.run.start_date,
                end: self.run.end_date,
            });
        }
        if self.run.top_k == 0 {
            return Err(ConfigError::ZeroTopK);
        }
        if self.pacing.min_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.pacing.min_concurrency > self.pacing.max_concurrency {
            return Err(ConfigError::ConcurrencyRange {
                min: self.pacing.min_concurrency,
                max: self.pacing.max_concurrency,
            });
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let wait = Duration::from_secs(self.retry.rate_limit_wait_secs);
        match self.retry.max_attempts {
            0 => RetryPolicy::unbounded(wait),
            n => RetryPolicy::capped(wait, n),
        }
    }

    /// Build the pacing strategy described by `[pacing]`.
    ///
    /// A zero delay with equal concurrency bounds needs no randomness at all.
    pub fn pacing_policy(&self) -> Box<dyn PacingPolicy> {
        let p = &self.pacing;
        if p.max_delay_ms == 0 && p.min_concurrency == p.max_concurrency {
            return Box::new(FixedPacing::new(Duration::ZERO, p.min_concurrency));
        }
        let max_delay = Duration::from_millis(p.max_delay_ms);
        let range = p.min_concurrency..=p.max_concurrency;
        match p.seed {
            Some(seed) => Box::new(RandomPacing::seeded(max_delay, range, seed)),
            None => Box::new(RandomPacing::from_entropy(max_delay, range)),
        }
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source.timeout_secs)
    }
}
