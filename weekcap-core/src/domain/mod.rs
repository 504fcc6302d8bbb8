//! Domain types for weekcap

pub mod sample;
pub mod weekly;

pub use sample::{DailySample, EntityRecord, MalformedRecord};
pub use weekly::{SmoothedEntity, SmoothedWeek, WeeklyBucket, WeeklyEntity};

/// Default ranking depth for weekly and smoothed lists.
pub const DEFAULT_TOP_K: usize = 50;
