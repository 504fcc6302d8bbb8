//! Weekly projections derived from the daily sample set.
//!
//! Both types are pure, re-derivable views: they are computed once at the end
//! of a harvest (or from a checkpoint) and never mutated afterwards.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::rank::Ranked;

/// Per-entity averages over the days of one week bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyEntity {
    pub name: String,
    pub avg_price: f64,
    pub avg_market_cap: f64,
}

/// One 7-day bucket anchored at the run start.
///
/// `entities` is sorted descending by `avg_market_cap` and holds at most K
/// entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyBucket {
    pub week_start: NaiveDate,
    pub entities: Vec<WeeklyEntity>,
}

impl WeeklyBucket {
    pub fn empty(week_start: NaiveDate) -> Self {
        Self {
            week_start,
            entities: Vec::new(),
        }
    }

    /// Look up an entity by name.
    pub fn get(&self, name: &str) -> Option<&WeeklyEntity> {
        self.entities.iter().find(|e| e.name == name)
    }
}

/// Per-entity weighted values across a 3-bucket smoothing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmoothedEntity {
    pub name: String,
    #[serde(rename = "price")]
    pub weighted_price: f64,
    #[serde(rename = "marketCap")]
    pub weighted_market_cap: f64,
}

/// Smoothed ranking for the most recent bucket of a window.
///
/// `week_start` is the start of the *current* bucket, not the oldest one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmoothedWeek {
    pub week_start: NaiveDate,
    pub entities: Vec<SmoothedEntity>,
}

impl Ranked for WeeklyEntity {
    fn rank_name(&self) -> &str {
        &self.name
    }

    fn rank_metric(&self) -> f64 {
        self.avg_market_cap
    }
}

impl Ranked for SmoothedEntity {
    fn rank_name(&self) -> &str {
        &self.name
    }

    fn rank_metric(&self) -> f64 {
        self.weighted_market_cap
    }
}
