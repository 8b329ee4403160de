//! Sliding-window command-cost tracking, one meter per client.
//!
//! Every valid command a client sends carries a cost roughly proportional
//! to how expensive it is to serve (locks for writing, iterating the
//! session list, and so on). Costs accumulate in a per-client meter; only
//! costs added during the last `window_seconds` count. A regular game
//! client cannot reach the default threshold, so any client that does is
//! treated as a flooder and handled per the configured reaction.
//!
//! The window is lazily pruned on each query rather than on a timer: a
//! flooder queries the meter constantly (once per command), and a silent
//! client cannot exceed the limit in the first place.

use std::collections::VecDeque;

use crate::clock::monotonic_ms;

/// Per-client sliding-window cost meter.
#[derive(Debug)]
pub struct PenaltyMeter {
    window_ms: u64,
    max_points: u32,
    queue: VecDeque<PenaltyEntry>,
    total: u32,
}

#[derive(Debug)]
struct PenaltyEntry {
    stamp_ms: u64,
    cost: u32,
}

impl PenaltyMeter {
    pub fn new(window_seconds: u64, max_points: u32) -> Self {
        PenaltyMeter {
            window_ms: window_seconds.saturating_mul(1000),
            max_points,
            queue: VecDeque::new(),
            total: 0,
        }
    }

    /// Record `cost` points at the current time.
    pub fn add(&mut self, cost: u32) {
        self.add_at(monotonic_ms(), cost);
    }

    /// Prune entries older than the window, then check the threshold.
    pub fn over_limit(&mut self) -> bool {
        self.over_limit_at(monotonic_ms())
    }

    fn add_at(&mut self, now_ms: u64, cost: u32) {
        self.queue.push_back(PenaltyEntry {
            stamp_ms: now_ms,
            cost,
        });
        self.total += cost;
        tracing::trace!(cost, total = self.total, "penalty added");
    }

    fn over_limit_at(&mut self, now_ms: u64) -> bool {
        // Entries stamped in the future (clock skew) yield a saturated
        // elapsed time of zero and are retained.
        while self
            .queue
            .front()
            .is_some_and(|e| now_ms.saturating_sub(e.stamp_ms) > self.window_ms)
        {
            if let Some(expired) = self.queue.pop_front() {
                self.total -= expired.cost;
            }
        }
        self.total >= self.max_points
    }

    /// Sum of costs currently inside the window.
    pub fn total(&self) -> u32 {
        self.total
    }
}
