//! Politeness pacing between days.
//!
//! A pacing policy hands out a delay before each fetch plus a nominal
//! concurrency level. Fetches stay sequential; the concurrency value is only
//! reported so runs can be compared against the upstream's tolerance.

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Delay and nominal concurrency for one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pace {
    pub delay: Duration,
    pub concurrency: u32,
}

pub trait PacingPolicy: Send {
    fn next_pace(&mut self) -> Pace;
}

/// Uniform random delay in `[0, max_delay]` and concurrency in `range`.
pub struct RandomPacing {
    rng: StdRng,
    max_delay_ms: u64,
    concurrency: RangeInclusive<u32>,
}

impl RandomPacing {
    /// Reproducible pacing sequence.
    pub fn seeded(max_delay: Duration, concurrency: RangeInclusive<u32>, seed: u64) -> Self {
        Self::with_rng(max_delay, concurrency, StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy(max_delay: Duration, concurrency: RangeInclusive<u32>) -> Self {
        Self::with_rng(max_delay, concurrency, StdRng::from_entropy())
    }

    fn with_rng(max_delay: Duration, concurrency: RangeInclusive<u32>, rng: StdRng) -> Self {
        let (lo, hi) = (*concurrency.start(), *concurrency.end());
        Self {
            rng,
            max_delay_ms: u64::try_from(max_delay.as_millis()).unwrap_or(u64::MAX),
            concurrency: lo.max(1)..=hi.max(lo.max(1)),
        }
    }
}

impl PacingPolicy for RandomPacing {
    fn next_pace(&mut self) -> Pace {
        let delay_ms = self.rng.gen_range(0..=self.max_delay_ms);
        let concurrency = self.rng.gen_range(self.concurrency.clone());
        Pace {
            delay: Duration::from_millis(delay_ms),
            concurrency,
        }
    }
}

/// The same pace every time. `FixedPacing::none()` disables delays entirely.
#[derive(Debug, Clone, Copy)]
pub struct FixedPacing(Pace);

impl FixedPacing {
    pub fn new(delay: Duration, concurrency: u32) -> Self {
        Self(Pace {
            delay,
            concurrency: concurrency.max(1),
        })
    }

    pub fn none() -> Self {
        Self::new(Duration::ZERO, 1)
    }
}

impl PacingPolicy for FixedPacing {
    fn next_pace(&mut self) -> Pace {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_pacing_stays_in_bounds() {
        let mut p = RandomPacing::seeded(Duration::from_millis(250), 1..=3, 42);
        for _ in 0..500 {
            let pace = p.next_pace();
            assert!(pace.delay <= Duration::from_millis(250));
            assert!((1..=3).contains(&pace.concurrency));
        }
    }

    #[test]
    fn seeded_pacing_is_reproducible() {
        let mut a = RandomPacing::seeded(Duration::from_millis(250), 1..=3, 7);
        let mut b = RandomPacing::seeded(Duration::from_millis(250), 1..=3, 7);
        let sa: Vec<Pace> = (0..20).map(|_| a.next_pace()).collect();
        let sb: Vec<Pace> = (0..20).map(|_| b.next_pace()).collect();
        assert_eq!(sa, sb);
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let mut p = RandomPacing::seeded(Duration::ZERO, 0..=0, 1);
        assert_eq!(p.next_pace(), Pace { delay: Duration::ZERO, concurrency: 1 });
        assert_eq!(FixedPacing::new(Duration::ZERO, 0).next_pace().concurrency, 1);
    }

    #[test]
    fn fixed_none_never_waits() {
        assert_eq!(FixedPacing::none().next_pace().delay, Duration::ZERO);
    }
}
