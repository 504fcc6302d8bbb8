//! Weekcap Runner: checkpointed harvesting and the weekly pipeline.
//!
//! This crate builds on `weekcap-core` to provide:
//! - TOML harvest configuration with reference defaults
//! - Atomic JSON checkpoint store
//! - Politeness pacing policies
//! - The resumable day-by-day harvester
//! - Final output artifact and the end-to-end pipeline

pub mod checkpoint;
pub mod config;
pub mod harvester;
pub mod output;
pub mod pacing;
pub mod pipeline;

pub use checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
pub use config::{ConfigError, FailurePolicy, HarvestConfig};
pub use harvester::{
    HarvestError, HarvestOutcome, HarvestPhase, HarvestReport, Harvester, SampleAccumulator,
};
pub use output::{FinalOutput, OutputError, OutputMetadata};
pub use pacing::{FixedPacing, Pace, PacingPolicy, RandomPacing};
pub use pipeline::{rebuild, reduce, run_pipeline, PipelineError, PipelineSummary};
