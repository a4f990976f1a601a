//! Jittered pacing between feed page fetches.
//!
//! A [`ThrottlePolicy`] is the configurable `[throttle]` section; a
//! [`ThrottleSchedule`] applies it during one walk, deciding after each page
//! whether to pause and for how long. Pauses never follow the last page.

use std::time::Duration;

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Jittered pacing between page fetches.
///
/// After every `k` pages the walker pauses for a duration drawn uniformly from
/// `min_pause_secs..=max_pause_secs`; `k` itself is drawn uniformly from
/// `min_interval_pages..=max_interval_pages`, once before the first page and
/// again after each pause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottlePolicy {
    pub enabled: bool,
    pub min_interval_pages: u64,
    pub max_interval_pages: u64,
    pub min_pause_secs: u64,
    pub max_pause_secs: u64,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_pages: 1,
            max_interval_pages: 5,
            min_pause_secs: 6,
            max_pause_secs: 10,
        }
    }
}

impl ThrottlePolicy {
    /// A policy that never pauses.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    fn interval_bounds(&self) -> (u64, u64) {
        let lo = self.min_interval_pages.max(1);
        (lo, self.max_interval_pages.max(lo))
    }

    fn pause_bounds(&self) -> (u64, u64) {
        let lo = self.min_pause_secs;
        (lo, self.max_pause_secs.max(lo))
    }
}

/// Per-run throttle state: the page of the last pause and the current interval.
#[derive(Debug)]
pub struct ThrottleSchedule<R = StdRng> {
    policy: ThrottlePolicy,
    rng: R,
    pin: u64,
    interval: u64,
}

impl<R: Rng> ThrottleSchedule<R> {
    /// Create a schedule, drawing the first interval up front.
    pub fn new(policy: ThrottlePolicy, mut rng: R) -> Self {
        let (lo, hi) = policy.interval_bounds();
        let interval = rng.random_range(lo..=hi);
        Self {
            policy,
            rng,
            pin: 0,
            interval,
        }
    }

    /// Pages remaining until the next pause, counted from the last one.
    #[must_use]
    pub const fn interval(&self) -> u64 {
        self.interval
    }

    /// Decide whether to pause after `page` of `page_count`.
    ///
    /// Never pauses after the last page.
    pub fn after_page(&mut self, page: u64, page_count: u64) -> Option<Duration> {
        if !self.policy.enabled || page >= page_count {
            return None;
        }
        if page.saturating_sub(self.pin) != self.interval {
            return None;
        }

        let (pause_lo, pause_hi) = self.policy.pause_bounds();
        let pause = self.rng.random_range(pause_lo..=pause_hi);
        let (lo, hi) = self.policy.interval_bounds();
        self.pin = page;
        self.interval = self.rng.random_range(lo..=hi);
        tracing::debug!(
            page,
            pause_secs = pause,
            next_interval = self.interval,
            "Throttle pause scheduled"
        );
        Some(Duration::from_secs(pause))
    }
}
