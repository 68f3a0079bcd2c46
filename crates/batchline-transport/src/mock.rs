//! Mock transport implementation for testing
//!
//! Records every batch it is asked to deliver and lets tests script the
//! outcome. Deliveries can be held open to observe the coordinator while a
//! batch is in flight.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use batchline_transport::{MockBehavior, MockTransport};
//!
//! let transport = Arc::new(MockTransport::new());
//! transport.set_behavior(MockBehavior::FailTimes(2));
//!
//! // ... hand `transport.clone()` to a coordinator ...
//!
//! assert!(transport.wait_for_calls(3, Duration::from_secs(5)).await);
//! assert_eq!(transport.max_outstanding(), 1);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use batchline_core::{BatchTransport, TransportError};
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::trace;

/// Scripted outcome of the next deliveries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockBehavior {
    /// Every delivery succeeds
    #[default]
    Succeed,
    /// Every delivery fails
    Fail,
    /// The next `n` deliveries fail, then deliveries succeed
    FailTimes(usize),
}

/// A transport that records batches instead of sending them
#[derive(Debug)]
pub struct MockTransport {
    behavior: Mutex<MockBehavior>,
    /// Every batch handed to `send_batch`, in call order
    attempts: Mutex<Vec<Vec<Bytes>>>,
    /// Batches that were reported as delivered
    delivered: Mutex<Vec<Vec<Bytes>>>,
    outstanding: AtomicUsize,
    max_outstanding: AtomicUsize,
    calls: watch::Sender<usize>,
    open: watch::Sender<bool>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a transport that accepts every batch
    pub fn new() -> Self {
        Self::with_behavior(MockBehavior::Succeed)
    }

    /// Create a transport that rejects every batch
    pub fn failing() -> Self {
        Self::with_behavior(MockBehavior::Fail)
    }

    /// Create a transport with a scripted behavior
    pub fn with_behavior(behavior: MockBehavior) -> Self {
        let (calls, _) = watch::channel(0);
        let (open, _) = watch::channel(true);
        Self {
            behavior: Mutex::new(behavior),
            attempts: Mutex::new(Vec::new()),
            delivered: Mutex::new(Vec::new()),
            outstanding: AtomicUsize::new(0),
            max_outstanding: AtomicUsize::new(0),
            calls,
            open,
        }
    }

    /// Change the outcome of subsequent deliveries
    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock() = behavior;
    }

    /// Make subsequent deliveries wait until [`release`](Self::release)
    pub fn hold(&self) {
        self.open.send_replace(false);
    }

    /// Let held deliveries complete
    pub fn release(&self) {
        self.open.send_replace(true);
    }

    /// Number of `send_batch` calls so far
    pub fn calls(&self) -> usize {
        *self.calls.borrow()
    }

    /// All attempted batches, in call order
    pub fn attempts(&self) -> Vec<Vec<Bytes>> {
        self.attempts.lock().clone()
    }

    /// Batches reported as delivered, in call order
    pub fn delivered(&self) -> Vec<Vec<Bytes>> {
        self.delivered.lock().clone()
    }

    /// Every delivered payload, flattened
    pub fn delivered_payloads(&self) -> Vec<Bytes> {
        self.delivered.lock().iter().flatten().cloned().collect()
    }

    /// Calls currently in progress
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous calls observed
    pub fn max_outstanding(&self) -> usize {
        self.max_outstanding.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` calls were made
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait_for_calls(&self, count: usize, timeout: Duration) -> bool {
        let mut rx = self.calls.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|calls| *calls >= count))
            .await
            .map(|result| result.is_ok())
            .unwrap_or(false)
    }

    fn next_outcome(&self) -> Result<(), TransportError> {
        let mut behavior = self.behavior.lock();
        match *behavior {
            MockBehavior::Succeed => Ok(()),
            MockBehavior::Fail => Err(TransportError::rejected("mock failure")),
            MockBehavior::FailTimes(0) => {
                *behavior = MockBehavior::Succeed;
                Ok(())
            }
            MockBehavior::FailTimes(n) => {
                *behavior = MockBehavior::FailTimes(n - 1);
                Err(TransportError::rejected("mock failure"))
            }
        }
    }
}

#[async_trait]
impl BatchTransport for MockTransport {
    async fn send_batch(&self, batch: Vec<Bytes>) -> Result<(), TransportError> {
        let now = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_outstanding.fetch_max(now, Ordering::SeqCst);

        self.attempts.lock().push(batch.clone());
        self.calls.send_modify(|calls| *calls += 1);
        trace!(batch_size = batch.len(), "Mock delivery started");

        let mut open = self.open.subscribe();
        // The sender lives in `self`, so this only ends once released
        let _ = open.wait_for(|open| *open).await;

        let outcome = self.next_outcome();
        if outcome.is_ok() {
            self.delivered.lock().push(batch);
        }

        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}
