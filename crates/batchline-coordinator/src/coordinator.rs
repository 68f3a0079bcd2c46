//! Public handle to a running coordinator

use std::fmt;
use std::sync::Arc;

use batchline_core::{BatchTransport, EventId, EventRecord, EventStore, PayloadCodec};
use batchline_storage::RedbEventStore;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::notification::{CoordinatorEvent, CoordinatorStats};
use crate::worker::{Command, Worker};

/// Handle to a batching coordinator
///
/// Cloning is cheap; all clones drive the same worker. The worker stops
/// after [`shutdown`](Self::shutdown) or once every handle is dropped.
#[derive(Clone)]
pub struct BatchCoordinator {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<CoordinatorEvent>,
    config: Arc<CoordinatorConfig>,
}

impl fmt::Debug for BatchCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchCoordinator")
            .field("database", &self.config.database_name)
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

impl BatchCoordinator {
    /// Start a coordinator over an existing store and transport
    ///
    /// Must be called from within a tokio runtime. Events already in the
    /// store are replayed with a forced flush as soon as the worker starts.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Config`] for an invalid configuration and
    /// [`CoordinatorError::Storage`] if the flush timestamp cannot be read
    /// or initialized.
    pub async fn spawn(
        config: CoordinatorConfig,
        store: Arc<dyn EventStore>,
        transport: Arc<dyn BatchTransport>,
    ) -> CoordinatorResult<Self> {
        config.validate()?;

        let last_flush = match store.last_successful_flush().await? {
            Some(at) => at,
            None => {
                // Start the time trigger's clock now
                let now = Utc::now();
                store.set_last_successful_flush(now).await?;
                debug!(database = %config.database_name, "Initialized flush timestamp");
                now
            }
        };

        let (commands, receiver) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_channel_capacity);

        let worker = Worker::new(
            store,
            transport,
            config.trigger_policy(),
            config.database_name.clone(),
            config.debug_enabled,
            commands.downgrade(),
            events.clone(),
            last_flush,
        );
        tokio::spawn(worker.run(receiver));

        let coordinator = Self {
            commands,
            events,
            config: Arc::new(config),
        };

        // Retry whatever an earlier run left behind
        coordinator.flush(true)?;
        Ok(coordinator)
    }

    /// Open the on-disk queue named by `config` and start a coordinator
    pub async fn open(
        config: CoordinatorConfig,
        transport: Arc<dyn BatchTransport>,
    ) -> CoordinatorResult<Self> {
        config.validate()?;
        let store = RedbEventStore::open(config.store_config())
            .map_err(|e| CoordinatorError::config(format!("cannot open queue: {}", e)))?;
        info!(path = %store.path().display(), "Opened event queue");

        Self::spawn(config, Arc::new(store), transport).await
    }

    /// Queue a payload for delivery
    ///
    /// Returns as soon as the event is submitted. A storage failure drops
    /// the event and is reported as [`CoordinatorEvent::EnqueueFailed`].
    pub fn enqueue(&self, payload: impl Into<Bytes>) -> CoordinatorResult<EventId> {
        self.submit(EventRecord::new(payload))
    }

    /// Queue a payload with a caller-supplied enqueue timestamp
    pub fn enqueue_at(
        &self,
        payload: impl Into<Bytes>,
        enqueued_at: DateTime<Utc>,
    ) -> CoordinatorResult<EventId> {
        self.submit(EventRecord::with_timestamp(payload, enqueued_at))
    }

    /// Queue a payload and wait until it is durably stored
    pub async fn enqueue_durable(&self, payload: impl Into<Bytes>) -> CoordinatorResult<EventId> {
        let (ack, stored) = oneshot::channel();
        self.send(Command::Enqueue {
            record: EventRecord::new(payload),
            ack: Some(ack),
        })?;
        stored.await.map_err(|_| CoordinatorError::Closed)?
    }

    /// Encode a value with `codec` and queue the result
    pub fn enqueue_encoded<T, C>(&self, codec: &C, value: &T) -> CoordinatorResult<EventId>
    where
        C: PayloadCodec<T>,
    {
        let payload = codec.encode(value)?;
        self.enqueue(payload)
    }

    /// Request a flush
    ///
    /// A forced flush skips the size and time checks but never sends an
    /// empty batch, and never starts while another batch is in flight.
    pub fn flush(&self, forced: bool) -> CoordinatorResult<()> {
        self.send(Command::Flush { forced })
    }

    /// Current statistics, answered after every previously submitted command
    pub async fn stats(&self) -> CoordinatorResult<CoordinatorStats> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Stats { reply })?;
        response.await.map_err(|_| CoordinatorError::Closed)?
    }

    /// Subscribe to coordinator notifications
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    /// Stop the coordinator
    ///
    /// Waits for an in-flight batch to resolve. Events still pending stay
    /// in the store for the next coordinator over the same queue.
    pub async fn shutdown(&self) {
        let (done, finished) = oneshot::channel();
        if self.send(Command::Shutdown { done }).is_ok() {
            let _ = finished.await;
        }
    }

    /// Whether the worker has stopped
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Configuration this coordinator runs with
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    fn submit(&self, record: EventRecord) -> CoordinatorResult<EventId> {
        let id = record.id;
        self.send(Command::Enqueue { record, ack: None })?;
        Ok(id)
    }

    fn send(&self, command: Command) -> CoordinatorResult<()> {
        self.commands
            .send(command)
            .map_err(|_| CoordinatorError::Closed)
    }
}
