//! redb-backed persistent event store
//!
//! One database file per queue name. Each insert and each delete-by-key-set
//! is a single committed write transaction, so a returned `Ok` means the
//! change survives a crash.
//!
//! ## Tables
//!
//! ```text
//! events     u64 insertion sequence -> postcard(EventRecord)
//! event_ids  event id bytes         -> insertion sequence
//! meta       key                    -> i64 (unix millis)
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use batchline_core::{EventId, EventRecord, EventStore, PendingEvent, StorageError};
use chrono::{DateTime, TimeZone, Utc};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use tracing::{debug, info, instrument, trace};

// Key: insertion sequence, Value: serialized EventRecord
const EVENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("events");

// Key: event id bytes, Value: insertion sequence
const EVENT_IDS: TableDefinition<&[u8], u64> = TableDefinition::new("event_ids");

// Key: meta key, Value: unix millis
const META: TableDefinition<&str, i64> = TableDefinition::new("meta");

const LAST_SUCCESSFUL_FLUSH: &str = "last_successful_flush_at";

/// Configuration for the redb event store
#[derive(Debug, Clone)]
pub struct RedbStoreConfig {
    /// Directory holding queue databases
    pub data_dir: PathBuf,
    /// Queue name; namespaces the database file
    pub database_name: String,
    /// Cache size in bytes
    pub cache_size: usize,
}

impl Default for RedbStoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            database_name: "batchline".to_string(),
            cache_size: 16 * 1024 * 1024, // 16MB
        }
    }
}

impl RedbStoreConfig {
    /// Create a configuration for a named queue under `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>, database_name: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            database_name: database_name.into(),
            ..Default::default()
        }
    }

    /// Set the cache size
    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    /// Path of the database file
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.redb", self.database_name))
    }
}

/// Check that a queue name is usable as a file name
///
/// Names must be non-empty and contain only ASCII letters, digits, `_`, `-`
/// and `.` (but not be `.` or `..`).
pub fn validate_database_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(StorageError::InvalidName(name.to_string()));
    }

    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}

fn db_err(err: impl std::fmt::Display) -> StorageError {
    StorageError::database(err.to_string())
}

/// Persistent implementation of [`EventStore`] on top of redb
pub struct RedbEventStore {
    db: Arc<Database>,
    path: PathBuf,
}

impl std::fmt::Debug for RedbEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbEventStore")
            .field("path", &self.path)
            .finish()
    }
}

impl RedbEventStore {
    /// Open or create the queue database described by `config`
    #[instrument(name = "store.open", skip(config), fields(database = %config.database_name))]
    pub fn open(config: RedbStoreConfig) -> Result<Self, StorageError> {
        validate_database_name(&config.database_name)?;

        std::fs::create_dir_all(&config.data_dir)?;

        let path = config.db_path();
        let db = Database::builder()
            .set_cache_size(config.cache_size)
            .create(&path)
            .map_err(db_err)?;

        let store = Self {
            db: Arc::new(db),
            path,
        };
        store.init_tables()?;

        info!(path = %store.path.display(), "Opened event store");
        Ok(store)
    }

    /// Path of the underlying database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_tables(&self) -> Result<(), StorageError> {
        let write_txn = self.db.begin_write().map_err(db_err)?;

        write_txn.open_table(EVENTS).map_err(db_err)?;
        write_txn.open_table(EVENT_IDS).map_err(db_err)?;
        write_txn.open_table(META).map_err(db_err)?;

        write_txn.commit().map_err(db_err)?;

        debug!("Initialized event store tables");
        Ok(())
    }
}

#[async_trait]
impl EventStore for RedbEventStore {
    #[instrument(skip(self, record), fields(event_id = %record.id))]
    async fn insert(&self, record: &EventRecord) -> Result<(), StorageError> {
        let value = postcard::to_allocvec(record)
            .map_err(|e| StorageError::serialization(format!("event {}: {}", record.id, e)))?;

        let write_txn = self.db.begin_write().map_err(db_err)?;
        let sequence = {
            let mut events = write_txn.open_table(EVENTS).map_err(db_err)?;
            let mut ids = write_txn.open_table(EVENT_IDS).map_err(db_err)?;

            if let Some(old) = ids.remove(record.id.as_bytes().as_slice()).map_err(db_err)? {
                let old = old.value();
                events.remove(old).map_err(db_err)?;
            }

            let sequence = events
                .last()
                .map_err(db_err)?
                .map(|(key, _)| key.value() + 1)
                .unwrap_or(0);

            events.insert(sequence, value.as_slice()).map_err(db_err)?;
            ids.insert(record.id.as_bytes().as_slice(), sequence)
                .map_err(db_err)?;
            sequence
        };
        write_txn.commit().map_err(db_err)?;

        trace!(sequence, "Inserted event");
        Ok(())
    }

    async fn count(&self) -> Result<usize, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let events = read_txn.open_table(EVENTS).map_err(db_err)?;
        let len = events.len().map_err(db_err)?;
        Ok(len as usize)
    }

    #[instrument(skip(self))]
    async fn fetch_oldest(&self, limit: usize) -> Result<Vec<PendingEvent>, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let events = read_txn.open_table(EVENTS).map_err(db_err)?;

        let mut batch = Vec::with_capacity(limit.min(1024));
        for entry in events.iter().map_err(db_err)?.take(limit) {
            let (key, value) = entry.map_err(db_err)?;
            let record: EventRecord = postcard::from_bytes(value.value()).map_err(|e| {
                StorageError::deserialization(format!("event at sequence {}: {}", key.value(), e))
            })?;
            batch.push(record.into_pending());
        }

        trace!(fetched = batch.len(), "Fetched pending events");
        Ok(batch)
    }

    #[instrument(skip(self, ids), fields(requested = ids.len()))]
    async fn delete(&self, ids: &HashSet<EventId>) -> Result<usize, StorageError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let write_txn = self.db.begin_write().map_err(db_err)?;
        let removed = {
            let mut events = write_txn.open_table(EVENTS).map_err(db_err)?;
            let mut index = write_txn.open_table(EVENT_IDS).map_err(db_err)?;
            let mut removed = 0;

            for id in ids {
                let sequence = index
                    .remove(id.as_bytes().as_slice())
                    .map_err(db_err)?
                    .map(|guard| guard.value());

                if let Some(sequence) = sequence {
                    events.remove(sequence).map_err(db_err)?;
                    removed += 1;
                }
            }
            removed
        };
        write_txn.commit().map_err(db_err)?;

        debug!(removed, "Deleted delivered events");
        Ok(removed)
    }

    async fn last_successful_flush(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let meta = read_txn.open_table(META).map_err(db_err)?;

        let Some(millis) = meta
            .get(LAST_SUCCESSFUL_FLUSH)
            .map_err(db_err)?
            .map(|guard| guard.value())
        else {
            return Ok(None);
        };

        Utc.timestamp_millis_opt(millis)
            .single()
            .map(Some)
            .ok_or_else(|| StorageError::corrupt(format!("invalid flush timestamp {}", millis)))
    }

    async fn set_last_successful_flush(&self, at: DateTime<Utc>) -> Result<(), StorageError> {
        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut meta = write_txn.open_table(META).map_err(db_err)?;
            meta.insert(LAST_SUCCESSFUL_FLUSH, at.timestamp_millis())
                .map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (RedbEventStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = RedbEventStore::open(RedbStoreConfig::new(temp_dir.path(), "test")).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_database_name_validation() {
        assert!(validate_database_name("analytics").is_ok());
        assert!(validate_database_name("events-v2.queue_1").is_ok());
        assert!(validate_database_name("").is_err());
        assert!(validate_database_name("..").is_err());
        assert!(validate_database_name("../escape").is_err());
        assert!(validate_database_name("with space").is_err());
    }

    #[test]
    fn test_db_path_uses_name() {
        let config = RedbStoreConfig::new("/tmp/queues", "clicks");
        assert_eq!(config.db_path(), PathBuf::from("/tmp/queues/clicks.redb"));
    }

    #[tokio::test]
    async fn test_insert_and_fetch_in_order() {
        let (store, _temp) = create_test_store();

        for i in 0..5 {
            store
                .insert(&EventRecord::new(format!("payload {}", i)))
                .await
                .unwrap();
        }

        assert_eq!(store.count().await.unwrap(), 5);

        let batch = store.fetch_oldest(3).await.unwrap();
        let payloads: Vec<_> = batch.iter().map(|e| e.payload.clone()).collect();
        assert_eq!(payloads, vec!["payload 0", "payload 1", "payload 2"]);
    }

    #[tokio::test]
    async fn test_delete_by_ids() {
        let (store, _temp) = create_test_store();

        let records: Vec<_> = (0..3).map(|i| EventRecord::new(format!("{}", i))).collect();
        for record in &records {
            store.insert(record).await.unwrap();
        }

        let ids: HashSet<_> = [records[0].id, records[1].id, EventId::generate()]
            .into_iter()
            .collect();
        assert_eq!(store.delete(&ids).await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 1);

        let remaining = store.fetch_oldest(10).await.unwrap();
        assert_eq!(remaining[0].id, records[2].id);

        // Deleting again is a no-op
        assert_eq!(store.delete(&ids).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sequence_continues_after_delete() {
        let (store, _temp) = create_test_store();

        let first = EventRecord::new("first");
        let second = EventRecord::new("second");
        store.insert(&first).await.unwrap();
        store.insert(&second).await.unwrap();

        store
            .delete(&[first.id].into_iter().collect())
            .await
            .unwrap();
        store.insert(&EventRecord::new("third")).await.unwrap();

        let batch = store.fetch_oldest(10).await.unwrap();
        assert_eq!(batch[0].payload, "second");
        assert_eq!(batch[1].payload, "third");
    }

    #[tokio::test]
    async fn test_flush_timestamp_roundtrip() {
        let (store, _temp) = create_test_store();
        assert!(store.last_successful_flush().await.unwrap().is_none());

        let at = Utc.timestamp_millis_opt(1_700_000_000_123).single().unwrap();
        store.set_last_successful_flush(at).await.unwrap();
        assert_eq!(store.last_successful_flush().await.unwrap(), Some(at));
    }

    #[test]
    fn test_flush_timestamp_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let config = RedbStoreConfig::new(temp_dir.path(), "reopen");
        let at = Utc.timestamp_millis_opt(1_700_000_600_000).single().unwrap();

        {
            let store = RedbEventStore::open(config.clone()).unwrap();
            tokio_test::block_on(store.set_last_successful_flush(at)).unwrap();
        }

        let store = RedbEventStore::open(config).unwrap();
        let restored = tokio_test::block_on(store.last_successful_flush()).unwrap();
        assert_eq!(restored, Some(at));
    }

    #[tokio::test]
    async fn test_small_cache_still_stores_events() {
        let temp_dir = TempDir::new().unwrap();
        let config = RedbStoreConfig::new(temp_dir.path(), "small").with_cache_size(64 * 1024);
        assert_eq!(config.cache_size, 64 * 1024);

        let store = RedbEventStore::open(config).unwrap();
        for i in 0..50 {
            store
                .insert(&EventRecord::new(vec![i as u8; 512]))
                .await
                .unwrap();
        }
        assert_eq!(store.count().await.unwrap(), 50);
        assert_eq!(store.fetch_oldest(100).await.unwrap().len(), 50);
    }

    #[tokio::test]
    async fn test_unreadable_record_is_deserialization_error() {
        let (store, _temp) = create_test_store();

        let write_txn = store.db.begin_write().unwrap();
        {
            let mut events = write_txn.open_table(EVENTS).unwrap();
            events.insert(7u64, [0xffu8; 3].as_slice()).unwrap();
        }
        write_txn.commit().unwrap();

        let err = store.fetch_oldest(10).await.unwrap_err();
        assert!(matches!(err, StorageError::Deserialization(_)), "{err:?}");
        assert!(err.to_string().contains("sequence 7"));
    }

    #[test]
    fn test_invalid_name_rejected_on_open() {
        let temp_dir = TempDir::new().unwrap();
        let result = RedbEventStore::open(RedbStoreConfig::new(temp_dir.path(), "bad/name"));
        assert!(matches!(result, Err(StorageError::InvalidName(_))));
    }
}
