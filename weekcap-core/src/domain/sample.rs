//! Daily samples: one harvested ranking per calendar day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single entity observation on one day.
///
/// Identity is the `name` string. Both metrics are finite and non-negative;
/// construct through [`EntityRecord::new`] to enforce that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub name: String,
    pub market_cap: f64,
    pub price: f64,
}

/// A single entity's fields failed validation.
///
/// The offending entity is dropped from the day's sample; the rest of the day
/// is kept.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedRecord {
    #[error("entity has an empty name")]
    EmptyName,

    #[error("{name}: market cap {value} is not a finite non-negative number")]
    InvalidMarketCap { name: String, value: f64 },

    #[error("{name}: price {value} is not a finite non-negative number")]
    InvalidPrice { name: String, value: f64 },
}

impl EntityRecord {
    /// Validate and build a record.
    pub fn new(name: impl Into<String>, market_cap: f64, price: f64) -> Result<Self, MalformedRecord> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(MalformedRecord::EmptyName);
        }
        if !is_valid_metric(market_cap) {
            return Err(MalformedRecord::InvalidMarketCap {
                name: trimmed.to_string(),
                value: market_cap,
            });
        }
        if !is_valid_metric(price) {
            return Err(MalformedRecord::InvalidPrice {
                name: trimmed.to_string(),
                value: price,
            });
        }
        Ok(Self {
            name: trimmed.to_string(),
            market_cap,
            price,
        })
    }
}

fn is_valid_metric(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

/// The harvested ranking for one calendar day.
///
/// A day whose fetch failed irrecoverably is kept as a *missing* sentinel:
/// no entities, with `missing` carrying the failure reason. Sentinels keep the
/// day count continuous so a failed day never silently shortens the range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySample {
    pub date: NaiveDate,
    #[serde(default)]
    pub entities: Vec<EntityRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<String>,
}

impl DailySample {
    pub fn observed(date: NaiveDate, entities: Vec<EntityRecord>) -> Self {
        Self {
            date,
            entities,
            missing: None,
        }
    }

    pub fn missing(date: NaiveDate, reason: impl Into<String>) -> Self {
        Self {
            date,
            entities: Vec::new(),
            missing: Some(reason.into()),
        }
    }

    /// True for a sentinel recorded after a failed fetch.
    pub fn is_missing(&self) -> bool {
        self.missing.is_some()
    }
}
