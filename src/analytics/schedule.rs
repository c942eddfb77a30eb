//! Adaptive flush interval.
//!
//! The interval shrinks while the queue is under pressure and relaxes while
//! it is nearly empty, always staying within `[min, max]`.

use std::time::Duration;

/// Flush interval that adapts to queue pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushSchedule {
    current_ms: u64,
    min_ms: u64,
    max_ms: u64,
    high_water: usize,
    low_water: usize,
}

impl FlushSchedule {
    /// Creates a schedule starting at `base`, clamped to `[min, max]`.
    ///
    /// Queue lengths above `high_water` halve the interval; lengths below
    /// `low_water` grow it by half.
    #[must_use]
    pub fn new(
        base: Duration,
        min: Duration,
        max: Duration,
        high_water: usize,
        low_water: usize,
    ) -> Self {
        let min_ms = duration_ms(min);
        let max_ms = duration_ms(max).max(min_ms);
        Self {
            current_ms: duration_ms(base).clamp(min_ms, max_ms),
            min_ms,
            max_ms,
            high_water,
            low_water,
        }
    }

    /// Current interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.current_ms)
    }

    /// Adjusts the interval for `queue_len` and returns the new value.
    pub fn adapt(&mut self, queue_len: usize) -> Duration {
        if queue_len > self.high_water {
            self.current_ms = (self.current_ms >> 1).max(self.min_ms);
        } else if queue_len < self.low_water {
            self.current_ms = self
                .current_ms
                .saturating_add(self.current_ms >> 1)
                .min(self.max_ms);
        }
        self.interval()
    }

    /// Replaces the interval, clamped to the configured bounds.
    pub fn reset(&mut self, interval: Duration) {
        self.current_ms = duration_ms(interval).clamp(self.min_ms, self.max_ms);
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
