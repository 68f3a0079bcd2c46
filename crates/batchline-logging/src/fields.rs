//! Field and span names shared by log consumers
//!
//! `tracing` takes field names as identifiers, so the emitting crates spell
//! these out literally; the JSONL output tests pin them to the values here.

pub const EVENT_ID: &str = "event_id";
pub const BATCH_SIZE: &str = "batch_size";
pub const PENDING: &str = "pending";
pub const DATABASE: &str = "database";

pub mod spans {
    /// Opening a redb queue (`RedbEventStore::open`)
    pub const STORE_OPEN: &str = "store.open";
}
