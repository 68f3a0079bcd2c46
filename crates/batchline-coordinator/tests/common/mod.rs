//! Shared helpers for coordinator integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use batchline_coordinator::{
    BatchCoordinator, CoordinatorConfig, CoordinatorEvent, CoordinatorStats,
};
use batchline_core::{EventId, EventRecord, EventStore, PendingEvent, StorageError};
use batchline_storage::InMemoryEventStore;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

pub const WAIT: Duration = Duration::from_secs(5);

/// Config that only flushes on size, forced flushes and startup replay
pub fn config(size_threshold: usize) -> CoordinatorConfig {
    batchline_logging::init_testing();
    CoordinatorConfig::default()
        .with_size_threshold(size_threshold)
        .with_time_interval(Duration::from_secs(3600))
}

pub fn payload(n: usize) -> Bytes {
    Bytes::from(format!(r#"{{"seq":{}}}"#, n))
}

pub fn payloads(range: std::ops::Range<usize>) -> Vec<Bytes> {
    range.map(payload).collect()
}

/// Wait for the first notification matching `pred`
pub async fn wait_event<F>(
    events: &mut broadcast::Receiver<CoordinatorEvent>,
    pred: F,
) -> CoordinatorEvent
where
    F: Fn(&CoordinatorEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("notification channel failed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for notification")
}

pub fn is_delivered(event: &CoordinatorEvent) -> bool {
    matches!(event, CoordinatorEvent::BatchDelivered { .. })
}

pub fn is_failed(event: &CoordinatorEvent) -> bool {
    matches!(event, CoordinatorEvent::BatchFailed { .. })
}

/// Poll statistics until `pred` holds
pub async fn wait_for_stats<F>(coordinator: &BatchCoordinator, pred: F) -> CoordinatorStats
where
    F: Fn(&CoordinatorStats) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let stats = coordinator.stats().await.unwrap();
            if pred(&stats) {
                return stats;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for coordinator state")
}

/// Wait until nothing is pending or in flight
pub async fn wait_until_drained(coordinator: &BatchCoordinator) {
    wait_for_stats(coordinator, |stats| stats.pending == 0 && !stats.in_flight).await;
}

/// Insert records straight into a store, as a previous run would have
pub async fn seed(store: &dyn EventStore, payloads: &[Bytes]) -> Vec<EventId> {
    let mut ids = Vec::new();
    for payload in payloads {
        let record = EventRecord::new(payload.clone());
        ids.push(record.id);
        store.insert(&record).await.unwrap();
    }
    ids
}

/// In-memory store whose inserts and deletes can be made to fail
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryEventStore,
    pub fail_inserts: AtomicBool,
    pub fail_deletes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl EventStore for FlakyStore {
    async fn insert(&self, record: &EventRecord) -> Result<(), StorageError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StorageError::database("disk full"));
        }
        self.inner.insert(record).await
    }

    async fn count(&self) -> Result<usize, StorageError> {
        self.inner.count().await
    }

    async fn fetch_oldest(&self, limit: usize) -> Result<Vec<PendingEvent>, StorageError> {
        self.inner.fetch_oldest(limit).await
    }

    async fn delete(&self, ids: &HashSet<EventId>) -> Result<usize, StorageError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::database("delete refused"));
        }
        self.inner.delete(ids).await
    }

    async fn last_successful_flush(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        self.inner.last_successful_flush().await
    }

    async fn set_last_successful_flush(&self, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.inner.set_last_successful_flush(at).await
    }
}
