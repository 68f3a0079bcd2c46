//! In-memory event store
//!
//! Nothing survives the process, so this store is only suitable for tests,
//! simulations and queues where loss on exit is acceptable.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use batchline_core::{EventId, EventRecord, EventStore, PendingEvent, StorageError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::trace;

#[derive(Debug, Default)]
struct Inner {
    /// Insertion sequence -> record
    events: BTreeMap<u64, EventRecord>,
    /// Event ID -> insertion sequence
    index: HashMap<EventId, u64>,
    next_sequence: u64,
    last_flush: Option<DateTime<Utc>>,
}

/// In-memory implementation of [`EventStore`]
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending events, without going through the async API
    pub fn len(&self) -> usize {
        self.inner.read().events.len()
    }

    /// Check if there are any pending events
    pub fn is_empty(&self) -> bool {
        self.inner.read().events.is_empty()
    }

    /// Whether an event with this ID is pending
    pub fn contains(&self, id: &EventId) -> bool {
        self.inner.read().index.contains_key(id)
    }

    /// Snapshot of all pending records in insertion order
    pub fn records(&self) -> Vec<EventRecord> {
        self.inner.read().events.values().cloned().collect()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn insert(&self, record: &EventRecord) -> Result<(), StorageError> {
        let mut inner = self.inner.write();

        // Replace semantics for a re-inserted ID keep the index consistent
        if let Some(old) = inner.index.remove(&record.id) {
            inner.events.remove(&old);
        }

        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.events.insert(sequence, record.clone());
        inner.index.insert(record.id, sequence);

        trace!(event_id = %record.id, sequence, "Inserted event");
        Ok(())
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.len())
    }

    async fn fetch_oldest(&self, limit: usize) -> Result<Vec<PendingEvent>, StorageError> {
        let inner = self.inner.read();
        Ok(inner
            .events
            .values()
            .take(limit)
            .map(|record| PendingEvent {
                id: record.id,
                payload: record.payload.clone(),
            })
            .collect())
    }

    async fn delete(&self, ids: &HashSet<EventId>) -> Result<usize, StorageError> {
        let mut inner = self.inner.write();
        let mut removed = 0;

        for id in ids {
            if let Some(sequence) = inner.index.remove(id) {
                inner.events.remove(&sequence);
                removed += 1;
            }
        }

        trace!(requested = ids.len(), removed, "Deleted events");
        Ok(removed)
    }

    async fn last_successful_flush(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        Ok(self.inner.read().last_flush)
    }

    async fn set_last_successful_flush(&self, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.inner.write().last_flush = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_count_fetch() {
        let store = InMemoryEventStore::new();
        assert!(store.is_empty());

        for i in 0..5 {
            store
                .insert(&EventRecord::new(format!("event {}", i)))
                .await
                .unwrap();
        }

        assert_eq!(store.count().await.unwrap(), 5);

        let batch = store.fetch_oldest(3).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].payload, "event 0");
        assert_eq!(batch[2].payload, "event 2");
    }

    #[tokio::test]
    async fn test_fetch_more_than_available() {
        let store = InMemoryEventStore::new();
        store.insert(&EventRecord::new("only")).await.unwrap();

        let batch = store.fetch_oldest(10).await.unwrap();
        assert_eq!(batch.len(), 1);

        let empty = InMemoryEventStore::new();
        assert!(empty.fetch_oldest(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_ignores_unknown_ids() {
        let store = InMemoryEventStore::new();
        let record = EventRecord::new("a");
        store.insert(&record).await.unwrap();

        let ids: HashSet<_> = [record.id, EventId::generate()].into_iter().collect();
        let removed = store.delete(&ids).await.unwrap();

        assert_eq!(removed, 1);
        assert!(store.is_empty());
        assert!(!store.contains(&record.id));
    }

    #[tokio::test]
    async fn test_order_after_partial_delete() {
        let store = InMemoryEventStore::new();
        let records: Vec<_> = (0..4).map(|i| EventRecord::new(format!("{}", i))).collect();
        for record in &records {
            store.insert(record).await.unwrap();
        }

        let ids: HashSet<_> = [records[0].id, records[2].id].into_iter().collect();
        store.delete(&ids).await.unwrap();
        store.insert(&EventRecord::new("4")).await.unwrap();

        let payloads: Vec<_> = store
            .fetch_oldest(10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.payload)
            .collect();
        assert_eq!(payloads, vec!["1", "3", "4"]);
    }

    #[tokio::test]
    async fn test_last_successful_flush() {
        let store = InMemoryEventStore::new();
        assert!(store.last_successful_flush().await.unwrap().is_none());

        let now = Utc::now();
        store.set_last_successful_flush(now).await.unwrap();
        assert_eq!(store.last_successful_flush().await.unwrap(), Some(now));
    }
}
