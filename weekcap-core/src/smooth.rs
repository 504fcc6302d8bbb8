//! Rolling smoother: trailing 3-bucket weighted average with re-ranking.
//!
//! For every bucket with at least two predecessors, each entity seen anywhere
//! in the window gets
//!
//! ```text
//! weighted = w0 * current + w1 * previous + w2 * two_back
//! ```
//!
//! where a bucket the entity is absent from contributes zero. Entities whose
//! weighted price and weighted market cap are both exactly zero are dropped.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{SmoothedEntity, SmoothedWeek, WeeklyBucket, WeeklyEntity};
use crate::rank::rank_top_k;

/// Buckets per smoothing window.
pub const WINDOW: usize = 3;

const SUM_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeightsError {
    #[error("expected 3 smoothing weights, got {0}")]
    WrongCount(usize),

    #[error("smoothing weight {0} is not a finite non-negative number")]
    Invalid(f64),

    #[error("smoothing weights sum to {0}, expected 1.0")]
    BadSum(f64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SmoothError {
    #[error("buckets out of order: {current} does not follow {previous}")]
    OutOfOrder {
        previous: NaiveDate,
        current: NaiveDate,
    },
}

/// Window weights, most recent bucket first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct SmoothingWeights([f64; WINDOW]);

impl SmoothingWeights {
    pub fn new(weights: [f64; WINDOW]) -> Result<Self, WeightsError> {
        if let Some(&bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(WeightsError::Invalid(bad));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(WeightsError::BadSum(sum));
        }
        Ok(Self(weights))
    }

    pub fn from_slice(weights: &[f64]) -> Result<Self, WeightsError> {
        let arr: [f64; WINDOW] = weights
            .try_into()
            .map_err(|_| WeightsError::WrongCount(weights.len()))?;
        Self::new(arr)
    }

    pub fn as_array(&self) -> [f64; WINDOW] {
        self.0
    }
}

impl Default for SmoothingWeights {
    fn default() -> Self {
        Self([0.5, 0.3, 0.2])
    }
}

impl TryFrom<Vec<f64>> for SmoothingWeights {
    type Error = WeightsError;

    fn try_from(v: Vec<f64>) -> Result<Self, Self::Error> {
        Self::from_slice(&v)
    }
}

impl From<SmoothingWeights> for Vec<f64> {
    fn from(w: SmoothingWeights) -> Self {
        w.0.to_vec()
    }
}

/// Smooth every bucket that has two predecessors.
///
/// Returns one [`SmoothedWeek`] per bucket index `2..len`, labelled with that
/// bucket's week start. Fewer than three buckets yields an empty result.
pub fn smooth(
    buckets: &[WeeklyBucket],
    weights: &SmoothingWeights,
    top_k: usize,
) -> Result<Vec<SmoothedWeek>, SmoothError> {
    if let Some(w) = buckets.windows(2).find(|w| w[1].week_start <= w[0].week_start) {
        return Err(SmoothError::OutOfOrder {
            previous: w[0].week_start,
            current: w[1].week_start,
        });
    }
    if buckets.len() < WINDOW {
        return Ok(Vec::new());
    }

    Ok(buckets
        .windows(WINDOW)
        .map(|w| smooth_window([&w[2], &w[1], &w[0]], weights, top_k))
        .collect())
}

/// `window` is ordered most recent first.
fn smooth_window(
    window: [&WeeklyBucket; WINDOW],
    weights: &SmoothingWeights,
    top_k: usize,
) -> SmoothedWeek {
    let names: BTreeSet<&str> = window
        .iter()
        .flat_map(|b| b.entities.iter().map(|e| e.name.as_str()))
        .collect();

    let mut entities = Vec::with_capacity(names.len());
    for name in names {
        let mut weighted_price = 0.0;
        let mut weighted_market_cap = 0.0;
        for (bucket, w) in window.iter().zip(weights.as_array()) {
            if let Some(WeeklyEntity {
                avg_price,
                avg_market_cap,
                ..
            }) = bucket.get(name)
            {
                weighted_price += w * avg_price;
                weighted_market_cap += w * avg_market_cap;
            }
        }
        if weighted_price == 0.0 && weighted_market_cap == 0.0 {
            continue;
        }
        entities.push(SmoothedEntity {
            name: name.to_string(),
            weighted_price,
            weighted_market_cap,
        });
    }

    SmoothedWeek {
        week_start: window[0].week_start,
        entities: rank_top_k(entities, top_k),
    }
}
