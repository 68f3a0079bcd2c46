//! Pending event records

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a pending event
///
/// Always generated by the coordinator at enqueue time, never by the caller,
/// so uniqueness does not depend on payload content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Generate a new random event ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Raw 16-byte representation, used as a storage key
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A persisted event waiting for delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Coordinator-assigned identifier
    pub id: EventId,
    /// Opaque payload bytes
    pub payload: Bytes,
    /// When the event was enqueued
    pub enqueued_at: DateTime<Utc>,
}

impl EventRecord {
    /// Create a record with a freshly generated ID, stamped now
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self::with_timestamp(payload, Utc::now())
    }

    /// Create a record with a freshly generated ID and an explicit timestamp
    pub fn with_timestamp(payload: impl Into<Bytes>, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id: EventId::generate(),
            payload: payload.into(),
            enqueued_at,
        }
    }

    /// Strip the record down to what a batch needs
    pub fn into_pending(self) -> PendingEvent {
        PendingEvent {
            id: self.id,
            payload: self.payload,
        }
    }
}

/// An event as returned by [`crate::EventStore::fetch_oldest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEvent {
    pub id: EventId,
    pub payload: Bytes,
}
