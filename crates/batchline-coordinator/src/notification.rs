//! Notifications and statistics published by the coordinator

use batchline_core::{EventId, FlushReason};
use chrono::{DateTime, Utc};

/// Something the coordinator did, broadcast to subscribers
///
/// Delivery to subscribers is best-effort: a slow receiver lags and misses
/// notifications instead of slowing the worker down.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    /// An event was durably stored
    Enqueued { id: EventId },

    /// An event could not be stored and was dropped
    EnqueueFailed { id: EventId, error: String },

    /// A batch was fetched and handed to the transport
    BatchStarted {
        batch_id: u64,
        ids: Vec<EventId>,
        reason: FlushReason,
    },

    /// The transport confirmed a batch and its events were removed
    BatchDelivered { batch_id: u64, ids: Vec<EventId> },

    /// The transport failed; the batch stays pending
    BatchFailed {
        batch_id: u64,
        size: usize,
        error: String,
    },

    /// A delivered batch could not be removed and may be sent again
    DeleteFailed { batch_id: u64, error: String },
}

/// Point-in-time view of a coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Events waiting in the store, including an in-flight batch
    pub pending: usize,
    /// Whether a batch is awaiting its transport resolution
    pub in_flight: bool,
    pub last_successful_flush_at: Option<DateTime<Utc>>,
    pub batches_delivered: u64,
    pub batches_failed: u64,
    pub events_delivered: u64,
}
