//! Checkpointed daily harvester.
//!
//! Walks the day range from the resume point to the end date, one fetch per
//! day, appending exactly one sample per day (observed or missing). The
//! accumulated state is flushed to the checkpoint store every `flush_every`
//! days, before a fatal abort, and at the end of the range.
//!
//! Phases:
//!
//! ```text
//! Idle → Resuming → Harvesting ⇄ Flushing → Aggregating → Smoothing → Done
//!                        └────────→ Flushing → FatalAborted
//! ```

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use weekcap_core::data::{
    fetch_with_retry, DataError, ImageStats, ImageStore, Listing, RetryPolicy, Sleeper,
    SourceFetcher, ThreadSleeper,
};
use weekcap_core::domain::{DailySample, EntityRecord};

use crate::checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
use crate::config::FailurePolicy;
use crate::pacing::{FixedPacing, PacingPolicy};

static THREAD_SLEEPER: ThreadSleeper = ThreadSleeper;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("end date {end} is before start date {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("harvest aborted at {day}: {source}")]
    Aborted {
        day: NaiveDate,
        #[source]
        source: DataError,
    },

    #[error("sample for {got} recorded out of sequence (expected {expected})")]
    OutOfSequence { expected: NaiveDate, got: NaiveDate },
}

// ── Phases ───────────────────────────────────────────────────────────

/// Where a harvest run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestPhase {
    Idle,
    Resuming,
    Harvesting,
    Flushing,
    Aggregating,
    Smoothing,
    Done,
    FatalAborted,
}

impl HarvestPhase {
    pub fn can_advance_to(self, next: HarvestPhase) -> bool {
        use HarvestPhase::*;
        matches!(
            (self, next),
            (Idle, Resuming)
                | (Resuming, Harvesting)
                | (Harvesting, Flushing)
                | (Flushing, Harvesting)
                | (Flushing, Aggregating)
                | (Flushing, FatalAborted)
                | (Harvesting, Aggregating)
                | (Aggregating, Smoothing)
                | (Smoothing, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, HarvestPhase::Done | HarvestPhase::FatalAborted)
    }
}

// ── Accumulator ──────────────────────────────────────────────────────

/// Append-only run state: the samples collected so far plus bookkeeping.
///
/// Wraps the [`Checkpoint`] it will be flushed as, so a flush borrows it
/// instead of copying the sample set.
#[derive(Debug, Clone)]
pub struct SampleAccumulator {
    state: Checkpoint,
}

impl SampleAccumulator {
    pub fn fresh(run_start: NaiveDate, run_end: NaiveDate) -> Self {
        Self {
            state: Checkpoint::new(run_start, run_end),
        }
    }

    pub fn from_checkpoint(mut checkpoint: Checkpoint, run_end: NaiveDate) -> Self {
        checkpoint.run_end = run_end;
        Self { state: checkpoint }
    }

    /// The only date [`record`](Self::record) will accept next.
    pub fn next_date(&self) -> NaiveDate {
        self.state.resume_date()
    }

    pub fn mark_attempt(&mut self, day: NaiveDate) {
        self.state.last_attempted_date = Some(day);
    }

    /// Append the sample for the next day.
    pub fn record(&mut self, sample: DailySample) -> Result<(), HarvestError> {
        let expected = self.next_date();
        if sample.date != expected {
            return Err(HarvestError::OutOfSequence {
                expected,
                got: sample.date,
            });
        }
        self.state.last_committed_date = Some(sample.date);
        self.state.samples.push(sample);
        self.state.day_count += 1;
        Ok(())
    }

    pub fn day_count(&self) -> u64 {
        self.state.day_count
    }

    pub fn samples(&self) -> &[DailySample] {
        &self.state.samples
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.state
    }

    fn stamp(&mut self) {
        self.state.saved_at = Some(Utc::now());
    }

    pub fn into_samples(self) -> Vec<DailySample> {
        self.state.samples
    }
}

// ── Report ───────────────────────────────────────────────────────────

/// What a completed harvest did.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestReport {
    pub run_start: NaiveDate,
    pub run_end: NaiveDate,
    pub total_days: u64,
    pub observed_days: u64,
    pub missing_days: u64,
    pub fetched_this_run: u64,
    /// First day fetched by this run when it continued from a checkpoint.
    pub resumed_from: Option<NaiveDate>,
    pub flushes: u32,
    pub flush_failures: u32,
    pub dropped_records: u64,
    pub images: Option<ImageStats>,
}

impl HarvestReport {
    pub fn success_rate(&self) -> f64 {
        if self.total_days == 0 {
            return 0.0;
        }
        self.observed_days as f64 / self.total_days as f64
    }
}

#[derive(Debug)]
pub struct HarvestOutcome {
    pub samples: Vec<DailySample>,
    pub report: HarvestReport,
}

// ── Harvester ────────────────────────────────────────────────────────

pub struct Harvester<'a> {
    fetcher: &'a dyn SourceFetcher,
    store: CheckpointStore,
    sleeper: &'a dyn Sleeper,
    pacing: Box<dyn PacingPolicy + 'a>,
    retry: RetryPolicy,
    failure_policy: FailurePolicy,
    flush_every: u32,
    images: Option<&'a ImageStore>,
    phase: HarvestPhase,
    flushes: u32,
    flush_failures: u32,
    dropped_records: u64,
}

impl<'a> Harvester<'a> {
    /// Harvester with reference defaults: no pacing delay, unbounded 60 s
    /// rate-limit retry, abort on failure, flush every 100 days.
    pub fn new(fetcher: &'a dyn SourceFetcher, store: CheckpointStore) -> Self {
        Self {
            fetcher,
            store,
            sleeper: &THREAD_SLEEPER,
            pacing: Box::new(FixedPacing::none()),
            retry: RetryPolicy::default(),
            failure_policy: FailurePolicy::Abort,
            flush_every: 100,
            images: None,
            phase: HarvestPhase::Idle,
            flushes: 0,
            flush_failures: 0,
            dropped_records: 0,
        }
    }

    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_pacing(mut self, pacing: Box<dyn PacingPolicy + 'a>) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Days between periodic flushes; 0 disables periodic flushing.
    pub fn with_flush_every(mut self, days: u32) -> Self {
        self.flush_every = days;
        self
    }

    pub fn with_images(mut self, images: &'a ImageStore) -> Self {
        self.images = Some(images);
        self
    }

    pub fn phase(&self) -> HarvestPhase {
        self.phase
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Move to `next`, logging the transition.
    pub fn advance(&mut self, next: HarvestPhase) {
        if !self.phase.can_advance_to(next) {
            warn!(from = ?self.phase, to = ?next, "unexpected phase transition");
        }
        debug!(from = ?self.phase, to = ?next, "phase");
        self.phase = next;
    }

    /// Harvest every day in `[start, end]` not already in the checkpoint.
    pub fn run(&mut self, start: NaiveDate, end: NaiveDate) -> Result<HarvestOutcome, HarvestError> {
        if end < start {
            return Err(HarvestError::InvalidRange { start, end });
        }

        self.advance(HarvestPhase::Resuming);
        let mut acc = self.resume(start, end)?;
        let resumed_from = (acc.day_count() > 0).then(|| acc.next_date());

        self.advance(HarvestPhase::Harvesting);
        let mut fetched_this_run = 0u64;
        let mut day = acc.next_date();
        while day <= end {
            acc.mark_attempt(day);
            let pace = self.pacing.next_pace();

            match fetch_with_retry(self.fetcher, day, &self.retry, self.sleeper) {
                Ok(listings) => {
                    let entities = self.accept(day, &listings);
                    debug!(date = %day, entities = entities.len(), concurrency = pace.concurrency, "day harvested");
                    acc.record(DailySample::observed(day, entities))?;
                }
                Err(e) => {
                    acc.record(DailySample::missing(day, e.to_string()))?;
                    match self.failure_policy {
                        FailurePolicy::Abort => {
                            error!(date = %day, error = %e, day_count = acc.day_count(), "fetch failed, aborting");
                            self.advance(HarvestPhase::Flushing);
                            self.flush(&mut acc);
                            self.advance(HarvestPhase::FatalAborted);
                            return Err(HarvestError::Aborted { day, source: e });
                        }
                        FailurePolicy::Continue => {
                            warn!(date = %day, error = %e, "fetch failed, recorded missing day");
                        }
                    }
                }
            }
            fetched_this_run += 1;

            if self.flush_every > 0 && acc.day_count() % u64::from(self.flush_every) == 0 {
                self.advance(HarvestPhase::Flushing);
                self.flush(&mut acc);
                info!(day_count = acc.day_count(), date = %day, "progress");
                self.advance(HarvestPhase::Harvesting);
            }

            let Some(next) = day.succ_opt() else { break };
            if next <= end {
                self.sleeper.sleep(pace.delay);
            }
            day = next;
        }

        if fetched_this_run > 0 {
            self.advance(HarvestPhase::Flushing);
            self.flush(&mut acc);
        }

        let missing_days = acc.checkpoint().missing_days() as u64;
        let report = HarvestReport {
            run_start: start,
            run_end: end,
            total_days: acc.day_count(),
            observed_days: acc.day_count() - missing_days,
            missing_days,
            fetched_this_run,
            resumed_from,
            flushes: self.flushes,
            flush_failures: self.flush_failures,
            dropped_records: self.dropped_records,
            images: self.images.map(ImageStore::stats),
        };
        info!(
            total_days = report.total_days,
            missing_days = report.missing_days,
            fetched = report.fetched_this_run,
            "harvest complete"
        );

        Ok(HarvestOutcome {
            samples: acc.into_samples(),
            report,
        })
    }

    /// Pick up a compatible checkpoint, or start fresh.
    ///
    /// A checkpoint that fails to load is an error; one that belongs to a
    /// different range is set aside with a warning.
    fn resume(&self, start: NaiveDate, end: NaiveDate) -> Result<SampleAccumulator, HarvestError> {
        let Some(checkpoint) = self.store.load()? else {
            info!(%start, %end, "no checkpoint, starting fresh");
            return Ok(SampleAccumulator::fresh(start, end));
        };

        let first = checkpoint.samples.first().map(|s| s.date);
        let committed = checkpoint.last_committed_date;
        let starts_at_start = first.map_or(true, |f| f == start) && checkpoint.run_start == start;
        let committed_in_range = committed.map_or(true, |c| c >= start && c <= end);

        if !(starts_at_start && committed_in_range) {
            warn!(
                path = %self.store.path().display(),
                checkpoint_start = %checkpoint.run_start,
                ?committed,
                %start,
                %end,
                "checkpoint does not match this run, starting fresh"
            );
            return Ok(SampleAccumulator::fresh(start, end));
        }

        info!(
            day_count = checkpoint.day_count,
            resume = %checkpoint.resume_date(),
            missing = checkpoint.missing_days(),
            "resuming from checkpoint"
        );
        Ok(SampleAccumulator::from_checkpoint(checkpoint, end))
    }

    /// Validate listings into records, dropping malformed ones, and hand any
    /// logos to the image store.
    fn accept(&mut self, day: NaiveDate, listings: &[Listing]) -> Vec<EntityRecord> {
        let mut records = Vec::with_capacity(listings.len());
        for listing in listings {
            match listing.to_record() {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(date = %day, error = %e, "dropping malformed record");
                    self.dropped_records += 1;
                    continue;
                }
            }
            if let (Some(store), Some(url)) = (self.images, listing.image_url.as_deref()) {
                store.fetch(url, &listing.name);
            }
        }
        records
    }

    /// Persist the accumulator. Failures are logged; the run continues on
    /// in-memory state and the previous checkpoint stays intact.
    fn flush(&mut self, acc: &mut SampleAccumulator) {
        acc.stamp();
        match self.store.save(acc.checkpoint()) {
            Ok(()) => self.flushes += 1,
            Err(e) => {
                self.flush_failures += 1;
                warn!(error = %e, day_count = acc.day_count(), "checkpoint save failed, continuing");
            }
        }
    }
}
