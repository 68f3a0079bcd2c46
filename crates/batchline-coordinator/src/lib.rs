//! # Batchline Coordinator
//!
//! The batching coordinator: accepts events, keeps them in a durable store,
//! and hands batches to a transport when a trigger fires. Events are only
//! removed after the transport confirms their batch.
//!
//! ## Triggers
//!
//! - **Size**: enough events are pending (`size_threshold`)
//! - **Time**: `time_interval` passed since the last successful flush; the
//!   timestamp is persisted, so time owed before a restart still counts
//! - **Timer**: a recurring forced flush every `time_interval`
//! - **Startup replay**: a forced flush as soon as the coordinator starts
//!
//! At most one batch is in flight at a time. A failed batch stays pending and
//! is resent, unchanged, on the next trigger.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use batchline_coordinator::{BatchCoordinator, CoordinatorConfig};
//! use batchline_transport::{HttpTransport, HttpTransportConfig};
//!
//! let transport = HttpTransport::new(HttpTransportConfig::new("https://ingest.example.com/events"))?;
//! let config = CoordinatorConfig::with_data_dir("./data").with_database_name("analytics");
//! let coordinator = BatchCoordinator::open(config, Arc::new(transport)).await?;
//!
//! coordinator.enqueue(r#"{"screen":"home"}"#)?;
//! coordinator.flush(true)?;
//! coordinator.shutdown().await;
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod notification;
mod worker;

pub use config::CoordinatorConfig;
pub use coordinator::BatchCoordinator;
pub use error::{CoordinatorError, CoordinatorResult};
pub use notification::{CoordinatorEvent, CoordinatorStats};
