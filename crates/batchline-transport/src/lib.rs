//! # Batchline Transport
//!
//! Implementations of [`BatchTransport`] for Batchline.
//!
//! ## Implementations
//!
//! - [`HttpTransport`]: POSTs each batch as a JSON array to an ingestion URL;
//!   only HTTP 200 counts as delivered
//! - [`MockTransport`]: In-memory transport for testing, with scripted
//!   failures and the ability to hold a delivery open
//!
//! Callers with their own delivery mechanism implement [`BatchTransport`]
//! directly: return `Ok(())` once the receiver confirmed the batch, or any
//! [`TransportError`] to have it retried later.

pub mod http;
pub mod mock;

pub use http::{HttpTransport, HttpTransportConfig};
pub use mock::{MockBehavior, MockTransport};

pub use batchline_core::{BatchTransport, TransportError};
