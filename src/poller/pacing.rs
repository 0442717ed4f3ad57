//! Adaptive delay control for the polling loop.
//!
//! The delay shrinks geometrically as items arrive and grows linearly on
//! every cycle, bounded above. The loop therefore polls fastest while
//! results are streaming in and settles toward the ceiling once the server
//! goes quiet.

use anyhow::{bail, Result};
use std::time::Duration;

const DEFAULT_INITIAL_DELAY_MS: f64 = 1_000.0;
const DEFAULT_ITEM_DIVISOR: f64 = 2.0;
const DEFAULT_GROWTH_INCREMENT_MS: f64 = 1_000.0;
const DEFAULT_MAX_DELAY_MS: f64 = 10_000.0;

/// Tunable constants governing the adaptive poll delay.
///
/// The defaults shrink the delay by half per received item, grow it by one
/// second per cycle, and cap it at ten seconds. Delays are tracked as
/// fractional milliseconds: repeated shrinking below one millisecond is
/// deliberate and accumulates exactly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingPolicy {
    pub initial_delay_ms: f64,
    pub item_divisor: f64,
    pub growth_increment_ms: f64,
    pub max_delay_ms: f64,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            item_divisor: DEFAULT_ITEM_DIVISOR,
            growth_increment_ms: DEFAULT_GROWTH_INCREMENT_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl PacingPolicy {
    pub fn with_initial_delay_ms(mut self, delay_ms: f64) -> Self {
        self.initial_delay_ms = delay_ms;
        self
    }

    pub fn with_item_divisor(mut self, divisor: f64) -> Self {
        self.item_divisor = divisor;
        self
    }

    pub fn with_growth_increment_ms(mut self, increment_ms: f64) -> Self {
        self.growth_increment_ms = increment_ms;
        self
    }

    pub fn with_max_delay_ms(mut self, max_ms: f64) -> Self {
        self.max_delay_ms = max_ms;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !self.initial_delay_ms.is_finite() || self.initial_delay_ms <= 0.0 {
            bail!("initial_delay_ms must be a positive number of milliseconds");
        }
        if !self.item_divisor.is_finite() || self.item_divisor < 1.0 {
            bail!("item_divisor must be at least 1.0");
        }
        if !self.growth_increment_ms.is_finite() || self.growth_increment_ms < 0.0 {
            bail!("growth_increment_ms cannot be negative");
        }
        if !self.max_delay_ms.is_finite() || self.max_delay_ms < self.initial_delay_ms {
            bail!("max_delay_ms must be at least initial_delay_ms");
        }
        Ok(())
    }
}

/// Running delay state for one polling session.
///
/// A cycle interacts with the pacer in three steps: [`record_items`] once
/// the page has been rendered, [`sleep_delay`] to obtain the wait before the
/// next fetch, then [`grow_for_next_cycle`] after the sleep has been taken.
///
/// [`record_items`]: PollPacer::record_items
/// [`sleep_delay`]: PollPacer::sleep_delay
/// [`grow_for_next_cycle`]: PollPacer::grow_for_next_cycle
#[derive(Debug, Clone)]
pub struct PollPacer {
    policy: PacingPolicy,
    current_ms: f64,
}

impl PollPacer {
    pub fn new(policy: PacingPolicy) -> Self {
        Self {
            current_ms: policy.initial_delay_ms,
            policy,
        }
    }

    /// Shrinks the delay once per received item.
    ///
    /// Shrinks are applied one division at a time, so a burst of items pulls
    /// the delay down multiplicatively with no lower bound other than zero.
    pub fn record_items(&mut self, count: usize) {
        for _ in 0..count {
            self.current_ms /= self.policy.item_divisor;
        }
    }

    /// Delay to wait before the next fetch, at the current (post-shrink) value.
    pub fn sleep_delay(&self) -> Duration {
        Duration::from_secs_f64(self.current_ms / 1_000.0)
    }

    /// Current delay in fractional milliseconds.
    pub fn current_delay_ms(&self) -> f64 {
        self.current_ms
    }

    /// Applies the per-cycle growth and ceiling.
    ///
    /// Every cycle creeps the delay back toward the ceiling regardless of
    /// how many items arrived; only the shrink step counters it.
    pub fn grow_for_next_cycle(&mut self) {
        self.current_ms =
            (self.current_ms + self.policy.growth_increment_ms).min(self.policy.max_delay_ms);
    }
}
