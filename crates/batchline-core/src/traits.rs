//! Collaborator contracts
//!
//! The coordinator talks to exactly two collaborators: a durable store that
//! holds pending events and a transport that delivers batches. Both are
//! trait objects so storage engines and delivery mechanisms can be swapped
//! without touching the batching logic.

use std::collections::HashSet;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{StorageError, TransportError};
use crate::event::{EventId, EventRecord, PendingEvent};

/// Durable storage for pending events
///
/// All operations must have completed, and for writes be durable, by the
/// time the returned future resolves. The coordinator serializes its own
/// calls, so implementations only need to be internally consistent.
///
/// # Example
///
/// ```rust,ignore
/// use batchline_core::{EventRecord, EventStore};
///
/// async fn stash<S: EventStore>(store: &S) -> Result<(), batchline_core::StorageError> {
///     store.insert(&EventRecord::new("{\"tap\":1}")).await?;
///     let batch = store.fetch_oldest(10).await?;
///     assert_eq!(batch.len(), 1);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a record
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be made durable. The event
    /// is then lost; callers must surface the error.
    async fn insert(&self, record: &EventRecord) -> Result<(), StorageError>;

    /// Number of pending events
    async fn count(&self) -> Result<usize, StorageError>;

    /// Up to `limit` oldest events, in insertion order
    ///
    /// Returns fewer than `limit` when fewer exist, and an empty vector when
    /// the store is empty.
    async fn fetch_oldest(&self, limit: usize) -> Result<Vec<PendingEvent>, StorageError>;

    /// Remove the given events in one step
    ///
    /// Unknown IDs are ignored. Returns how many records were removed.
    async fn delete(&self, ids: &HashSet<EventId>) -> Result<usize, StorageError>;

    /// Timestamp of the last successful delivery, if one was recorded
    async fn last_successful_flush(&self) -> Result<Option<DateTime<Utc>>, StorageError>;

    /// Persist the timestamp of a successful delivery
    async fn set_last_successful_flush(&self, at: DateTime<Utc>) -> Result<(), StorageError>;
}

/// Delivers a batch of payloads somewhere
///
/// `Ok(())` means the receiver confirmed the whole batch and its events may
/// be deleted. Any error leaves the batch pending for a later retry; timeouts
/// are the transport's own business.
#[async_trait]
pub trait BatchTransport: Send + Sync {
    /// Attempt delivery of `batch`, preserving its order
    async fn send_batch(&self, batch: Vec<Bytes>) -> Result<(), TransportError>;
}
