//! # Batchline Storage
//!
//! Durable store implementations for the pending-event queue.
//!
//! ## Features
//!
//! - **InMemoryEventStore**: In-memory implementation for tests and ephemeral queues
//! - **RedbEventStore**: redb-backed implementation where every insert and
//!   delete is a committed transaction
//!
//! ## Example
//!
//! ```rust,ignore
//! use batchline_core::{EventRecord, EventStore};
//! use batchline_storage::{RedbEventStore, RedbStoreConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = RedbEventStore::open(RedbStoreConfig::new("./data", "analytics")).unwrap();
//!
//!     store.insert(&EventRecord::new("{\"screen\":\"home\"}")).await.unwrap();
//!     assert_eq!(store.count().await.unwrap(), 1);
//!
//!     let batch = store.fetch_oldest(10).await.unwrap();
//!     let ids = batch.iter().map(|e| e.id).collect();
//!     store.delete(&ids).await.unwrap();
//! }
//! ```

pub mod memory;
pub mod persistent;

pub use memory::InMemoryEventStore;
pub use persistent::{RedbEventStore, RedbStoreConfig, validate_database_name};

// Re-export the contract for convenience
pub use batchline_core::{EventStore, StorageError};
