//! Weekly aggregator: daily samples → ranked 7-day buckets.
//!
//! Buckets are anchored at the run start, not at calendar weeks:
//! `week_start(d) = run_start + 7 * floor((d - run_start) / 7)`.
//! Within a bucket each entity is averaged over the days it was actually
//! observed, so an entity listed on 3 of 7 days is averaged over 3.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use thiserror::Error;

use crate::domain::{DailySample, WeeklyBucket, WeeklyEntity};
use crate::rank::rank_top_k;

/// Days per bucket.
pub const WEEK_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error("samples out of order: {current} does not follow {previous}")]
    OutOfOrder {
        previous: NaiveDate,
        current: NaiveDate,
    },

    #[error("sample {date} is before run start {run_start}")]
    BeforeRunStart {
        date: NaiveDate,
        run_start: NaiveDate,
    },
}

/// Start of the bucket containing `day`.
///
/// Uses floor division, so days before `run_start` map to earlier buckets
/// rather than collapsing onto the first one.
pub fn week_start(day: NaiveDate, run_start: NaiveDate) -> NaiveDate {
    let offset = (day - run_start).num_days();
    run_start + Duration::days(offset.div_euclid(WEEK_DAYS) * WEEK_DAYS)
}

#[derive(Debug, Default)]
struct Running {
    price_sum: f64,
    cap_sum: f64,
    days: u32,
}

impl Running {
    fn add(&mut self, price: f64, market_cap: f64) {
        self.price_sum += price;
        self.cap_sum += market_cap;
        self.days += 1;
    }

    fn finish(self, name: String) -> WeeklyEntity {
        let n = f64::from(self.days);
        WeeklyEntity {
            name,
            avg_price: self.price_sum / n,
            avg_market_cap: self.cap_sum / n,
        }
    }
}

/// Partition `samples` into weekly buckets, each ranked by average market cap
/// and truncated to `top_k`.
///
/// Samples must be strictly increasing by date and not before `run_start`.
/// Missing-day sentinels contribute nothing, but a week made only of
/// sentinels is still emitted (empty), and weeks between the first and last
/// sample that have no samples at all are filled with empty buckets so the
/// sequence is always contiguous.
pub fn aggregate(
    samples: &[DailySample],
    run_start: NaiveDate,
    top_k: usize,
) -> Result<Vec<WeeklyBucket>, AggregateError> {
    let mut weeks: BTreeMap<NaiveDate, BTreeMap<String, Running>> = BTreeMap::new();
    let mut previous: Option<NaiveDate> = None;

    for sample in samples {
        if sample.date < run_start {
            return Err(AggregateError::BeforeRunStart {
                date: sample.date,
                run_start,
            });
        }
        if let Some(prev) = previous {
            if sample.date <= prev {
                return Err(AggregateError::OutOfOrder {
                    previous: prev,
                    current: sample.date,
                });
            }
        }
        previous = Some(sample.date);

        let bucket = weeks.entry(week_start(sample.date, run_start)).or_default();
        for e in &sample.entities {
            bucket.entry(e.name.clone()).or_default().add(e.price, e.market_cap);
        }
    }

    let (Some(&first), Some(&last)) = (weeks.keys().next(), weeks.keys().next_back()) else {
        return Ok(Vec::new());
    };

    let mut buckets = Vec::with_capacity(weeks.len());
    let mut start = first;
    while start <= last {
        let bucket = match weeks.remove(&start) {
            Some(per_entity) => {
                let entities = per_entity
                    .into_iter()
                    .map(|(name, running)| running.finish(name))
                    .collect();
                WeeklyBucket {
                    week_start: start,
                    entities: rank_top_k(entities, top_k),
                }
            }
            None => WeeklyBucket::empty(start),
        };
        buckets.push(bucket);
        start += Duration::days(WEEK_DAYS);
    }
    Ok(buckets)
}
