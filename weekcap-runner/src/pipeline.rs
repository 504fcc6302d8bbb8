//! End-to-end pipeline: harvest → aggregate → smooth → write → clear.
//!
//! The checkpoint is only cleared after the output file is safely written, so
//! a crash anywhere before that point can be resumed or rebuilt.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};
use weekcap_core::data::{ImageStore, Sleeper, SourceFetcher};
use weekcap_core::domain::{DailySample, SmoothedWeek};
use weekcap_core::{aggregate, smooth, AggregateError, SmoothError, SmoothingWeights};

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::config::HarvestConfig;
use crate::harvester::{HarvestError, HarvestPhase, HarvestReport, Harvester};
use crate::output::{FinalOutput, OutputError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Harvest(#[from] HarvestError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Smooth(#[from] SmoothError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("no checkpoint at {0}")]
    MissingCheckpoint(PathBuf),
}

/// Result of a completed pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub report: HarvestReport,
    pub weekly_buckets: usize,
    pub smoothed_weeks: usize,
    pub output: PathBuf,
}

/// Aggregate daily samples into weekly buckets, then smooth them.
///
/// Returns the bucket count alongside the smoothed series.
pub fn reduce(
    samples: &[DailySample],
    run_start: NaiveDate,
    top_k: usize,
    weights: &SmoothingWeights,
) -> Result<(usize, Vec<SmoothedWeek>), PipelineError> {
    let buckets = aggregate(samples, run_start, top_k)?;
    let smoothed = smooth(&buckets, weights, top_k)?;
    Ok((buckets.len(), smoothed))
}

/// Run the full pipeline described by `config` against `fetcher`.
pub fn run_pipeline(
    config: &HarvestConfig,
    fetcher: &dyn SourceFetcher,
    sleeper: &dyn Sleeper,
    images: Option<&ImageStore>,
) -> Result<PipelineSummary, PipelineError> {
    let store = CheckpointStore::new(&config.paths.checkpoint);
    let mut harvester = Harvester::new(fetcher, store.clone())
        .with_sleeper(sleeper)
        .with_pacing(config.pacing_policy())
        .with_retry(config.retry_policy())
        .with_failure_policy(config.run.failure_policy)
        .with_flush_every(config.run.flush_every);
    if let Some(images) = images {
        harvester = harvester.with_images(images);
    }

    let (start, end) = (config.run.start_date, config.run.end_date);
    info!(%start, %end, source = fetcher.name(), "starting harvest");
    let outcome = harvester.run(start, end)?;

    harvester.advance(HarvestPhase::Aggregating);
    let buckets = aggregate(&outcome.samples, start, config.run.top_k)?;
    info!(weeks = buckets.len(), "weekly buckets built");

    harvester.advance(HarvestPhase::Smoothing);
    let smoothed = smooth(&buckets, &config.smoothing.weights, config.run.top_k)?;

    let output = FinalOutput::new(start, end, outcome.report.total_days, smoothed);
    output.write_atomic(&config.paths.output)?;
    info!(
        path = %config.paths.output.display(),
        weeks = output.metadata.total_weeks,
        "output written"
    );

    if let Err(e) = store.clear() {
        warn!(error = %e, "could not remove checkpoint after successful run");
    }
    harvester.advance(HarvestPhase::Done);

    Ok(PipelineSummary {
        report: outcome.report,
        weekly_buckets: buckets.len(),
        smoothed_weeks: output.metadata.total_weeks,
        output: config.paths.output.clone(),
    })
}

/// Recompute the output from an existing checkpoint without fetching.
///
/// The checkpoint is left in place.
pub fn rebuild(
    checkpoint: &Path,
    output: &Path,
    top_k: usize,
    weights: &SmoothingWeights,
) -> Result<FinalOutput, PipelineError> {
    let store = CheckpointStore::new(checkpoint);
    let cp = store
        .load()?
        .ok_or_else(|| PipelineError::MissingCheckpoint(checkpoint.to_path_buf()))?;

    let (weeks, smoothed) = reduce(&cp.samples, cp.run_start, top_k, weights)?;
    let run_end = cp.last_committed_date.unwrap_or(cp.run_start);
    let result = FinalOutput::new(cp.run_start, run_end, cp.day_count, smoothed);
    result.write_atomic(output)?;
    info!(
        days = cp.day_count,
        weeks,
        smoothed = result.metadata.total_weeks,
        path = %output.display(),
        "rebuilt output from checkpoint"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::Checkpoint;
    use crate::config::FailurePolicy;
    use weekcap_core::data::{synthetic_listings, RecordingSleeper, ScriptedFetcher, ScriptedResponse};

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2016, m, day).unwrap()
    }

    fn config(dir: &Path) -> HarvestConfig {
        let mut c = HarvestConfig::default();
        c.run.start_date = d(1, 1);
        c.run.end_date = d(2, 29);
        c.pacing.max_delay_ms = 0;
        c.pacing.max_concurrency = 1;
        c.paths.checkpoint = dir.join("progress.json");
        c.paths.output = dir.join("weekly.json");
        c
    }

    #[test]
    fn full_run_writes_output_and_clears_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let fetcher = ScriptedFetcher::with_generator(|day| synthetic_listings(day, 60));
        let sleeper = RecordingSleeper::new();

        let summary = run_pipeline(&cfg, &fetcher, &sleeper, None).unwrap();
        assert_eq!(summary.report.total_days, 60);
        assert_eq!(summary.weekly_buckets, 9);
        assert_eq!(summary.smoothed_weeks, 7);
        assert!(!cfg.paths.checkpoint.exists());

        let out = FinalOutput::read(&cfg.paths.output).unwrap();
        assert_eq!(out.metadata.total_days, 60);
        assert_eq!(out.data[0].week_start, d(1, 15));
        assert!(out.data.iter().all(|w| w.entities.len() == 50));
        assert!(sleeper.calls().iter().all(|s| s.is_zero()));
    }

    #[test]
    fn aborted_run_keeps_checkpoint_and_writes_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let fetcher = ScriptedFetcher::with_generator(|day| synthetic_listings(day, 10));
        fetcher.push(d(1, 20), ScriptedResponse::Fail("HTTP 502".into()));

        let err = run_pipeline(&cfg, &fetcher, &RecordingSleeper::new(), None).unwrap_err();
        assert!(matches!(err, PipelineError::Harvest(HarvestError::Aborted { .. })));
        assert!(cfg.paths.checkpoint.exists());
        assert!(!cfg.paths.output.exists());
    }

    #[test]
    fn continue_policy_finishes_with_missing_days() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.run.failure_policy = FailurePolicy::Continue;
        let fetcher = ScriptedFetcher::with_generator(|day| synthetic_listings(day, 10));
        fetcher.push(d(1, 20), ScriptedResponse::Fail("HTTP 502".into()));

        let summary = run_pipeline(&cfg, &fetcher, &RecordingSleeper::new(), None).unwrap();
        assert_eq!(summary.report.total_days, 60);
        assert_eq!(summary.report.missing_days, 1);
        assert!(summary.report.success_rate() < 1.0);
    }

    #[test]
    fn rebuild_matches_checkpoint_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("progress.json"));
        let mut cp = Checkpoint::new(d(1, 1), d(12, 31));
        for day in d(1, 1).iter_days().take(21) {
            let entities = synthetic_listings(day, 5)
                .iter()
                .filter_map(|l| l.to_record().ok())
                .collect();
            cp.samples.push(DailySample::observed(day, entities));
        }
        cp.day_count = 21;
        cp.last_committed_date = Some(d(1, 21));
        store.save(&cp).unwrap();

        let out_path = dir.path().join("rebuilt.json");
        let out = rebuild(store.path(), &out_path, 50, &SmoothingWeights::default()).unwrap();
        assert_eq!(out.data.len(), 1);
        assert_eq!(out.metadata.run_end, d(1, 21));
        assert!(store.path().exists());
        assert!(out_path.exists());
    }

    #[test]
    fn rebuild_without_checkpoint_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = rebuild(
            &dir.path().join("none.json"),
            &dir.path().join("out.json"),
            50,
            &SmoothingWeights::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::MissingCheckpoint(_)));
    }
}
