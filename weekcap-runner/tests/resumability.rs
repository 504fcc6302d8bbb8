//! Integration tests for checkpoint/resume behavior.
//!
//! A run resumed from a checkpoint must produce the same smoothed series as an
//! uninterrupted run, without fetching any committed day again.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use proptest::prelude::*;
use weekcap_core::data::{synthetic_listings, RecordingSleeper, ScriptedFetcher, ScriptedResponse};
use weekcap_core::domain::{DailySample, SmoothedWeek};
use weekcap_runner::{
    run_pipeline, Checkpoint, CheckpointStore, FailurePolicy, FinalOutput, HarvestConfig,
    Harvester,
};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn scratch_dir(label: &str) -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "weekcap_resume_{label}_{}_{id}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2016, 1, 1).unwrap()
}

fn end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2016, 3, 31).unwrap()
}

fn config(dir: &std::path::Path) -> HarvestConfig {
    let mut c = HarvestConfig::default();
    c.run.start_date = start();
    c.run.end_date = end();
    c.run.flush_every = 10;
    c.pacing.max_delay_ms = 0;
    c.pacing.max_concurrency = 1;
    c.paths.checkpoint = dir.join("scraping_progress.json");
    c.paths.output = dir.join("weekly_crypto_data.json");
    c
}

fn fetcher() -> ScriptedFetcher {
    ScriptedFetcher::with_generator(|day| synthetic_listings(day, 70))
}

fn full_run() -> Vec<SmoothedWeek> {
    let dir = scratch_dir("full");
    let cfg = config(&dir);
    run_pipeline(&cfg, &fetcher(), &RecordingSleeper::new(), None).unwrap();
    let out = FinalOutput::read(&cfg.paths.output).unwrap();
    let _ = std::fs::remove_dir_all(&dir);
    out.data
}

/// Checkpoint holding the first `n` days exactly as a harvest would record them.
fn seeded_checkpoint(n: usize) -> Checkpoint {
    let mut cp = Checkpoint::new(start(), end());
    for day in start().iter_days().take(n) {
        let entities = synthetic_listings(day, 70)
            .iter()
            .filter_map(|l| l.to_record().ok())
            .collect();
        cp.samples.push(DailySample::observed(day, entities));
    }
    cp.day_count = n as u64;
    cp.last_committed_date = cp.samples.last().map(|s| s.date);
    cp
}

fn resumed_run(n: usize) -> (Vec<SmoothedWeek>, ScriptedFetcher) {
    let dir = scratch_dir("resumed");
    let cfg = config(&dir);
    CheckpointStore::new(&cfg.paths.checkpoint)
        .save(&seeded_checkpoint(n))
        .unwrap();

    let f = fetcher();
    let summary = run_pipeline(&cfg, &f, &RecordingSleeper::new(), None).unwrap();
    assert_eq!(summary.report.total_days, 91);
    assert_eq!(summary.report.fetched_this_run, 91 - n as u64);
    let out = FinalOutput::read(&cfg.paths.output).unwrap();
    let _ = std::fs::remove_dir_all(&dir);
    (out.data, f)
}

#[test]
fn resumed_run_matches_uninterrupted_run() {
    let reference = full_run();
    let (resumed, f) = resumed_run(40);

    assert_eq!(resumed, reference);
    for day in start().iter_days().take(40) {
        assert_eq!(f.calls_for(day), 0, "{day} was fetched again");
    }
    assert_eq!(f.calls().first(), Some(&NaiveDate::from_ymd_opt(2016, 2, 10).unwrap()));
}

#[test]
fn fully_committed_checkpoint_fetches_nothing() {
    let (resumed, f) = resumed_run(91);
    assert!(f.calls().is_empty());
    assert_eq!(resumed, full_run());
}

#[test]
fn abort_then_resume_keeps_sentinel_and_skips_failed_day() {
    let dir = scratch_dir("abort");
    let cfg = config(&dir);
    let bad = NaiveDate::from_ymd_opt(2016, 2, 3).unwrap();

    let first = fetcher();
    first.push(bad, ScriptedResponse::Fail("HTTP 500".into()));
    assert!(run_pipeline(&cfg, &first, &RecordingSleeper::new(), None).is_err());

    let cp = CheckpointStore::new(&cfg.paths.checkpoint).load().unwrap().unwrap();
    assert_eq!(cp.last_committed_date, Some(bad));
    assert_eq!(cp.missing_days(), 1);

    let second = fetcher();
    let summary = run_pipeline(&cfg, &second, &RecordingSleeper::new(), None).unwrap();
    assert_eq!(second.calls_for(bad), 0);
    assert_eq!(summary.report.total_days, 91);
    assert_eq!(summary.report.missing_days, 1);
    assert_eq!(summary.report.resumed_from, bad.succ_opt());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_day_keeps_day_count_continuous() {
    let dir = scratch_dir("missing");
    let store = CheckpointStore::new(dir.join("cp.json"));
    let f = fetcher();
    let day3 = NaiveDate::from_ymd_opt(2016, 1, 3).unwrap();
    f.push(day3, ScriptedResponse::Fail("HTTP 404".into()));

    let sleeper = RecordingSleeper::new();
    let outcome = Harvester::new(&f, store.clone())
        .with_sleeper(&sleeper)
        .with_failure_policy(FailurePolicy::Continue)
        .run(start(), NaiveDate::from_ymd_opt(2016, 1, 5).unwrap())
        .unwrap();

    assert_eq!(outcome.samples.len(), 5);
    assert_eq!(outcome.samples.iter().filter(|s| s.is_missing()).count(), 1);
    assert!(outcome.samples[2].is_missing());

    let cp = store.load().unwrap().unwrap();
    assert_eq!(cp.day_count, 5);
    assert_eq!(cp.samples.len(), 5);
    let _ = std::fs::remove_dir_all(&dir);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn resume_point_does_not_change_output(n in 0usize..=91) {
        let reference = full_run();
        let (resumed, _) = resumed_run(n);
        prop_assert_eq!(resumed, reference);
    }
}
