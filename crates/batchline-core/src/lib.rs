//! # Batchline Core
//!
//! Core types, traits, and error definitions for Batchline, a durable
//! client-side event batching pipeline.
//!
//! This crate provides the foundational abstractions that the storage,
//! transport, and coordinator crates build on:
//!
//! - [`EventRecord`] / [`EventId`]: the persisted unit of the pending queue
//! - [`SizeStrategy`] / [`TimeStrategy`] / [`TriggerPolicy`]: flush readiness
//! - [`EventStore`]: the durable store contract
//! - [`BatchTransport`]: the delivery contract
//! - [`PayloadCodec`]: boundary serializers for typed events
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use batchline_core::{FlushDecision, FlushReason, SizeStrategy, TimeStrategy, TriggerPolicy};
//!
//! let policy = TriggerPolicy::new(SizeStrategy::new(10), TimeStrategy::new(Duration::from_secs(10)));
//! let now = chrono::Utc::now();
//!
//! assert!(!policy.evaluate(false, 9, now, Some(now)).should_flush());
//! assert_eq!(
//!     policy.evaluate(false, 10, now, Some(now)),
//!     FlushDecision::Flush(FlushReason::Size)
//! );
//! ```

pub mod codec;
pub mod error;
pub mod event;
pub mod strategy;
pub mod traits;

pub use codec::{JsonCodec, PayloadCodec, PostcardCodec};
pub use error::{CodecError, StorageError, TransportError};
pub use event::{EventId, EventRecord, PendingEvent};
pub use strategy::{
    DEFAULT_EVENTS_BEFORE_FLUSH, DEFAULT_FLUSH_INTERVAL, FlushDecision, FlushReason, SizeStrategy,
    SkipReason, TimeStrategy, TriggerPolicy,
};
pub use traits::{BatchTransport, EventStore};
