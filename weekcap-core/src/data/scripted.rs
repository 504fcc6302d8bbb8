//! In-memory source for tests, benchmarks and dry runs.
//!
//! Responses are queued per day; a day with nothing queued falls back to an
//! optional generator, or fails.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{Datelike, NaiveDate};

use super::provider::{DataError, Listing, SourceFetcher};

/// A canned answer for one `fetch_day` call.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Listings(Vec<Listing>),
    RateLimited,
    Fail(String),
}

type Generator = Box<dyn Fn(NaiveDate) -> Vec<Listing> + Send + Sync>;

/// Scripted [`SourceFetcher`] that records every call it receives.
#[derive(Default)]
pub struct ScriptedFetcher {
    queued: Mutex<HashMap<NaiveDate, VecDeque<ScriptedResponse>>>,
    calls: Mutex<Vec<NaiveDate>>,
    generator: Option<Generator>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer unscripted days with `generator(day)`.
    pub fn with_generator(
        generator: impl Fn(NaiveDate) -> Vec<Listing> + Send + Sync + 'static,
    ) -> Self {
        Self {
            generator: Some(Box::new(generator)),
            ..Self::default()
        }
    }

    /// Queue a response for `day`. Queued responses are consumed in order.
    pub fn push(&self, day: NaiveDate, response: ScriptedResponse) {
        if let Ok(mut queued) = self.queued.lock() {
            queued.entry(day).or_default().push_back(response);
        }
    }

    /// Every day requested so far, in call order.
    pub fn calls(&self) -> Vec<NaiveDate> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// How many times `day` was requested.
    pub fn calls_for(&self, day: NaiveDate) -> usize {
        self.calls().iter().filter(|d| **d == day).count()
    }

    fn next_queued(&self, day: NaiveDate) -> Option<ScriptedResponse> {
        self.queued
            .lock()
            .ok()
            .and_then(|mut q| q.get_mut(&day).and_then(|v| v.pop_front()))
    }
}

impl SourceFetcher for ScriptedFetcher {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fetch_day(&self, day: NaiveDate) -> Result<Vec<Listing>, DataError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(day);
        }
        match self.next_queued(day) {
            Some(ScriptedResponse::Listings(listings)) => Ok(listings),
            Some(ScriptedResponse::RateLimited) => Err(DataError::RateLimited {
                retry_after_secs: 60,
            }),
            Some(ScriptedResponse::Fail(msg)) => Err(DataError::Other(msg)),
            None => match &self.generator {
                Some(generate) => Ok(generate(day)),
                None => Err(DataError::Other(format!("no scripted response for {day}"))),
            },
        }
    }
}

/// Deterministic synthetic ranking of `n` entities for `day`.
///
/// Values drift from day to day so weekly averages and smoothing have
/// something to chew on, and a few entities drop in and out of the list.
pub fn synthetic_listings(day: NaiveDate, n: usize) -> Vec<Listing> {
    let ordinal = day.num_days_from_ce() as u64;
    let mut listings = Vec::with_capacity(n);
    for i in 0..n as u64 {
        // Entities whose slot lines up with the day drop out for that day.
        if i > 2 && (ordinal + i) % 11 == 0 {
            continue;
        }
        let wobble = ((ordinal * 7 + i * 13) % 17) as f64 / 100.0;
        let base_cap = 1.0e9 / (i as f64 + 1.0);
        let base_price = 500.0 / (i as f64 + 1.0);
        let mut listing = Listing::new(
            format!("Coin{i:03}"),
            base_cap * (1.0 + wobble),
            base_price * (1.0 + wobble),
        );
        listing.rank = Some(i as u32 + 1);
        listing.symbol = Some(format!("C{i}"));
        listings.push(listing);
    }
    listings
}
