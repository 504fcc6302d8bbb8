//! Integration tests for the source layer feeding the weekly reduction.
//!
//! Everything runs against the scripted source and a recording sleeper, so no
//! test touches the network or the wall clock.

use std::time::Duration;

use chrono::NaiveDate;
use weekcap_core::data::{
    fetch_with_retry, synthetic_listings, Listing, RecordingSleeper, RetryPolicy, ScriptedFetcher,
    ScriptedResponse, SourceFetcher,
};
use weekcap_core::domain::DailySample;
use weekcap_core::{aggregate, smooth, SmoothingWeights};

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2016, 1, 1).unwrap()
}

fn collect_days(fetcher: &dyn SourceFetcher, days: u64, sleeper: &RecordingSleeper) -> Vec<DailySample> {
    let policy = RetryPolicy::unbounded(Duration::from_secs(60));
    start()
        .iter_days()
        .take(days as usize)
        .map(|day| match fetch_with_retry(fetcher, day, &policy, sleeper) {
            Ok(listings) => DailySample::observed(
                day,
                listings.iter().filter_map(|l| l.to_record().ok()).collect(),
            ),
            Err(e) => DailySample::missing(day, e.to_string()),
        })
        .collect()
}

#[test]
fn rate_limited_days_are_retried_not_lost() {
    let fetcher = ScriptedFetcher::with_generator(|d| synthetic_listings(d, 60));
    let third = start() + chrono::Duration::days(2);
    fetcher.push(third, ScriptedResponse::RateLimited);
    fetcher.push(third, ScriptedResponse::RateLimited);

    let sleeper = RecordingSleeper::new();
    let samples = collect_days(&fetcher, 21, &sleeper);

    assert_eq!(samples.len(), 21);
    assert!(samples.iter().all(|s| !s.is_missing()));
    assert_eq!(fetcher.calls_for(third), 3);
    assert_eq!(sleeper.total(), Duration::from_secs(120));
}

#[test]
fn malformed_listings_are_dropped_but_day_is_kept() {
    let fetcher = ScriptedFetcher::new();
    fetcher.push(
        start(),
        ScriptedResponse::Listings(vec![
            Listing::new("Bitcoin", 6.5e9, 430.0),
            Listing::new("Broken", f64::NAN, 1.0),
            Listing::new("", 5.0, 1.0),
        ]),
    );

    let samples = collect_days(&fetcher, 1, &RecordingSleeper::new());
    assert_eq!(samples[0].entities.len(), 1);
    assert_eq!(samples[0].entities[0].name, "Bitcoin");
}

#[test]
fn failed_day_becomes_sentinel_and_reduction_still_runs() {
    let fetcher = ScriptedFetcher::with_generator(|d| synthetic_listings(d, 60));
    let bad = start() + chrono::Duration::days(9);
    fetcher.push(bad, ScriptedResponse::Fail("HTTP 500".into()));

    let samples = collect_days(&fetcher, 28, &RecordingSleeper::new());
    assert_eq!(samples.len(), 28);
    assert_eq!(samples.iter().filter(|s| s.is_missing()).count(), 1);

    let buckets = aggregate(&samples, start(), 50).unwrap();
    assert_eq!(buckets.len(), 4);
    let smoothed = smooth(&buckets, &SmoothingWeights::default(), 50).unwrap();
    assert_eq!(smoothed.len(), 2);
    assert_eq!(smoothed[0].week_start, buckets[2].week_start);
    assert!(smoothed.iter().all(|w| w.entities.len() == 50));
}
