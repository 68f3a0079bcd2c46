//! Flush trigger strategies
//!
//! Strategies are immutable value objects re-evaluated on every check. The
//! combined rule is:
//!
//! ```text
//! ready = pending > 0 AND (forced OR size_ready OR time_ready)
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of pending events that triggers a flush
pub const DEFAULT_EVENTS_BEFORE_FLUSH: usize = 10;

/// Default interval between time-triggered flushes
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Flush once enough events are pending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeStrategy {
    /// Pending count at which the queue is ready; also the batch size limit
    pub events_before_flush: usize,
}

impl SizeStrategy {
    pub fn new(events_before_flush: usize) -> Self {
        Self {
            events_before_flush,
        }
    }

    /// Whether `pending` events are enough to flush
    pub fn is_ready(&self, pending: usize) -> bool {
        pending >= self.events_before_flush
    }
}

impl Default for SizeStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_EVENTS_BEFORE_FLUSH)
    }
}

/// Flush once enough time has passed since the last successful flush
///
/// The reference point is persisted by the store, so time owed before a
/// restart still counts after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeStrategy {
    pub interval: Duration,
}

impl TimeStrategy {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Whether `interval` has elapsed between `last_flush` and `now`
    ///
    /// Without a reference point the strategy never fires; a clock that moved
    /// backwards is treated as no time elapsed.
    pub fn is_ready(&self, now: DateTime<Utc>, last_flush: Option<DateTime<Utc>>) -> bool {
        let Some(last) = last_flush else {
            return false;
        };

        match (now - last).to_std() {
            Ok(elapsed) => elapsed >= self.interval,
            Err(_) => false,
        }
    }
}

impl Default for TimeStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_INTERVAL)
    }
}

/// Why a flush was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    Forced,
    Size,
    Time,
}

impl FlushReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushReason::Forced => "forced",
            FlushReason::Size => "size",
            FlushReason::Time => "time",
        }
    }
}

/// Why a flush was not started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing pending
    Empty,
    /// Neither threshold has been reached
    NotReady,
}

/// Outcome of evaluating the trigger policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushDecision {
    Flush(FlushReason),
    Skip(SkipReason),
}

impl FlushDecision {
    pub fn should_flush(&self) -> bool {
        matches!(self, FlushDecision::Flush(_))
    }
}

/// Combination of the size and time strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TriggerPolicy {
    pub size: SizeStrategy,
    pub time: TimeStrategy,
}

impl TriggerPolicy {
    pub fn new(size: SizeStrategy, time: TimeStrategy) -> Self {
        Self { size, time }
    }

    /// Maximum number of events fetched into one batch
    pub fn batch_limit(&self) -> usize {
        self.size.events_before_flush
    }

    /// Decide whether to flush
    ///
    /// An empty queue is never flushed, forced or not.
    pub fn evaluate(
        &self,
        forced: bool,
        pending: usize,
        now: DateTime<Utc>,
        last_flush: Option<DateTime<Utc>>,
    ) -> FlushDecision {
        if pending == 0 {
            FlushDecision::Skip(SkipReason::Empty)
        } else if forced {
            FlushDecision::Flush(FlushReason::Forced)
        } else if self.size.is_ready(pending) {
            FlushDecision::Flush(FlushReason::Size)
        } else if self.time.is_ready(now, last_flush) {
            FlushDecision::Flush(FlushReason::Time)
        } else {
            FlushDecision::Skip(SkipReason::NotReady)
        }
    }
}
