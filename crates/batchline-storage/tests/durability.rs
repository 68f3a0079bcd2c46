//! Durability tests for the redb event store
//!
//! These tests drop the store without any orderly shutdown and reopen the
//! same database file, which is what a process restart looks like to it.

use std::collections::HashSet;

use batchline_core::{EventId, EventRecord, EventStore};
use batchline_storage::{InMemoryEventStore, RedbEventStore, RedbStoreConfig};
use chrono::Utc;
use tempfile::TempDir;

// ============================================================================
// Restart Tests
// ============================================================================

/// Every event whose insert returned Ok is fetchable after reopening
#[tokio::test]
async fn test_inserted_events_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let config = RedbStoreConfig::new(temp_dir.path(), "restart");

    let mut ids = Vec::new();
    {
        let store = RedbEventStore::open(config.clone()).unwrap();
        for i in 0..25 {
            let record = EventRecord::new(format!("{{\"n\":{}}}", i));
            store.insert(&record).await.unwrap();
            ids.push(record.id);
        }
        // Dropped without any close call
    }

    let store = RedbEventStore::open(config).unwrap();
    assert_eq!(store.count().await.unwrap(), 25);

    let fetched: Vec<EventId> = store
        .fetch_oldest(100)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(fetched, ids);
}

/// Deletes are durable too: delivered events do not come back
#[tokio::test]
async fn test_deletes_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let config = RedbStoreConfig::new(temp_dir.path(), "deletes");

    let survivor = EventRecord::new("survivor");
    {
        let store = RedbEventStore::open(config.clone()).unwrap();
        let delivered = EventRecord::new("delivered");
        store.insert(&delivered).await.unwrap();
        store.insert(&survivor).await.unwrap();

        let ids: HashSet<_> = [delivered.id].into_iter().collect();
        store.delete(&ids).await.unwrap();
    }

    let store = RedbEventStore::open(config).unwrap();
    let remaining = store.fetch_oldest(10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, survivor.id);
}

/// The last successful flush timestamp is persisted alongside the queue
#[tokio::test]
async fn test_flush_timestamp_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let config = RedbStoreConfig::new(temp_dir.path(), "timestamps");
    let at = Utc::now() - chrono::Duration::hours(6);

    {
        let store = RedbEventStore::open(config.clone()).unwrap();
        store.set_last_successful_flush(at).await.unwrap();
    }

    let store = RedbEventStore::open(config).unwrap();
    let restored = store.last_successful_flush().await.unwrap().unwrap();
    assert_eq!(restored.timestamp_millis(), at.timestamp_millis());
}

/// Separate database names are separate queues
#[tokio::test]
async fn test_database_names_are_isolated() {
    let temp_dir = TempDir::new().unwrap();

    let clicks = RedbEventStore::open(RedbStoreConfig::new(temp_dir.path(), "clicks")).unwrap();
    let views = RedbEventStore::open(RedbStoreConfig::new(temp_dir.path(), "views")).unwrap();

    clicks.insert(&EventRecord::new("click")).await.unwrap();

    assert_eq!(clicks.count().await.unwrap(), 1);
    assert_eq!(views.count().await.unwrap(), 0);
    assert_ne!(clicks.path(), views.path());
}

/// A file that is not a redb database is reported at open time
#[test]
fn test_corrupt_file_fails_open() {
    let temp_dir = TempDir::new().unwrap();
    let config = RedbStoreConfig::new(temp_dir.path(), "garbage");
    std::fs::write(config.db_path(), b"definitely not a database").unwrap();

    assert!(RedbEventStore::open(config).is_err());
}

// ============================================================================
// Contract Tests
// ============================================================================

async fn exercise_contract(store: &dyn EventStore) {
    assert_eq!(store.count().await.unwrap(), 0);
    assert!(store.fetch_oldest(5).await.unwrap().is_empty());

    let records: Vec<_> = (0..12)
        .map(|i| EventRecord::new(format!("{}", i)))
        .collect();
    for record in &records {
        store.insert(record).await.unwrap();
    }

    let batch = store.fetch_oldest(10).await.unwrap();
    assert_eq!(batch.len(), 10);
    for (fetched, original) in batch.iter().zip(&records) {
        assert_eq!(fetched.id, original.id);
        assert_eq!(fetched.payload, original.payload);
    }

    let ids: HashSet<_> = batch.iter().map(|e| e.id).collect();
    assert_eq!(store.delete(&ids).await.unwrap(), 10);
    assert_eq!(store.count().await.unwrap(), 2);

    let rest = store.fetch_oldest(10).await.unwrap();
    assert_eq!(rest[0].id, records[10].id);
    assert_eq!(rest[1].id, records[11].id);
}

#[tokio::test]
async fn test_in_memory_store_contract() {
    let store = InMemoryEventStore::new();
    exercise_contract(&store).await;
}

#[tokio::test]
async fn test_redb_store_contract() {
    let temp_dir = TempDir::new().unwrap();
    let store = RedbEventStore::open(RedbStoreConfig::new(temp_dir.path(), "contract")).unwrap();
    exercise_contract(&store).await;
}
