//! The coordinator's worker task
//!
//! Every state transition runs here, one command at a time. Callers post
//! commands through an mpsc channel and the recurring timer ticks inside the
//! same `select!` loop, so the queue state needs no locks. Transport calls
//! run in their own task and re-enter the loop as
//! [`Command::BatchResolved`].

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use batchline_core::{
    BatchTransport, EventId, EventRecord, EventStore, FlushDecision, SkipReason, TriggerPolicy,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::notification::{CoordinatorEvent, CoordinatorStats};

/// Logs at `debug` when verbose operation logging is on, `trace` otherwise
macro_rules! op_log {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::debug!($($arg)+);
        } else {
            tracing::trace!($($arg)+);
        }
    };
}

/// Messages processed by the worker, in submission order
pub(crate) enum Command {
    Enqueue {
        record: EventRecord,
        ack: Option<oneshot::Sender<CoordinatorResult<EventId>>>,
    },
    Flush {
        forced: bool,
    },
    BatchResolved {
        batch_id: u64,
        outcome: Delivery,
    },
    Stats {
        reply: oneshot::Sender<CoordinatorResult<CoordinatorStats>>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// How a transport call ended
#[derive(Debug)]
pub(crate) enum Delivery {
    Delivered,
    Failed(String),
}

struct InFlightBatch {
    batch_id: u64,
    ids: Vec<EventId>,
}

#[derive(Default)]
struct Counters {
    batches_delivered: u64,
    batches_failed: u64,
    events_delivered: u64,
}

pub(crate) struct Worker {
    store: Arc<dyn EventStore>,
    transport: Arc<dyn BatchTransport>,
    policy: TriggerPolicy,
    database: String,
    verbose: bool,
    /// Lets transport tasks report back without keeping the worker alive
    completions: mpsc::WeakUnboundedSender<Command>,
    events: broadcast::Sender<CoordinatorEvent>,
    in_flight: Option<InFlightBatch>,
    last_flush: Option<DateTime<Utc>>,
    next_batch_id: u64,
    counters: Counters,
    shutting_down: bool,
    shutdown_waiters: Vec<oneshot::Sender<()>>,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        store: Arc<dyn EventStore>,
        transport: Arc<dyn BatchTransport>,
        policy: TriggerPolicy,
        database: String,
        verbose: bool,
        completions: mpsc::WeakUnboundedSender<Command>,
        events: broadcast::Sender<CoordinatorEvent>,
        last_flush: DateTime<Utc>,
    ) -> Self {
        Self {
            store,
            transport,
            policy,
            database,
            verbose,
            completions,
            events,
            in_flight: None,
            last_flush: Some(last_flush),
            next_batch_id: 0,
            counters: Counters::default(),
            shutting_down: false,
            shutdown_waiters: Vec::new(),
        }
    }

    /// Run until shut down or until every handle is dropped
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let period = self.policy.time.interval;
        info!(
            database = %self.database,
            size_threshold = self.policy.size.events_before_flush,
            interval_ms = period.as_millis() as u64,
            "Coordinator started"
        );

        // The startup replay covers t=0, so the first tick is one period out
        let mut timer = tokio::time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        info!(database = %self.database, "All handles dropped, coordinator stopping");
                        break;
                    };
                    if self.handle(command).await.is_break() {
                        break;
                    }
                }
                _ = timer.tick(), if !self.shutting_down => {
                    op_log!(self.verbose, database = %self.database, "Flush timer fired");
                    self.flush(true).await;
                }
            }
        }

        // Commands queued behind a shutdown still get answered; enqueued
        // events are stored and picked up by the next coordinator.
        commands.close();
        self.shutting_down = true;
        while let Some(command) = commands.recv().await {
            let _ = self.handle(command).await;
        }

        let waiters = std::mem::take(&mut self.shutdown_waiters);
        let database = std::mem::take(&mut self.database);
        // Release the store before anyone learns that shutdown finished
        drop(self);
        for done in waiters {
            let _ = done.send(());
        }
        info!(database = %database, "Coordinator stopped");
    }

    async fn handle(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Enqueue { record, ack } => {
                self.enqueue(record, ack).await;
                ControlFlow::Continue(())
            }
            Command::Flush { forced } => {
                self.flush(forced).await;
                ControlFlow::Continue(())
            }
            Command::BatchResolved { batch_id, outcome } => {
                self.resolve(batch_id, outcome).await;
                self.stop_if_drained()
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.stats().await);
                ControlFlow::Continue(())
            }
            Command::Shutdown { done } => {
                info!(
                    database = %self.database,
                    in_flight = self.in_flight.is_some(),
                    "Coordinator shutdown requested"
                );
                self.shutting_down = true;
                self.shutdown_waiters.push(done);
                self.stop_if_drained()
            }
        }
    }

    fn stop_if_drained(&self) -> ControlFlow<()> {
        if self.shutting_down && self.in_flight.is_none() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    async fn enqueue(
        &mut self,
        record: EventRecord,
        ack: Option<oneshot::Sender<CoordinatorResult<EventId>>>,
    ) {
        let id = record.id;
        match self.store.insert(&record).await {
            Ok(()) => {
                op_log!(
                    self.verbose,
                    event_id = %id,
                    payload_bytes = record.payload.len(),
                    "Event stored"
                );
                self.emit(CoordinatorEvent::Enqueued { id });
                if let Some(ack) = ack {
                    let _ = ack.send(Ok(id));
                }
                self.flush(false).await;
            }
            Err(e) => {
                error!(
                    event_id = %id,
                    database = %self.database,
                    error = %e,
                    "Failed to store event, dropping it"
                );
                self.emit(CoordinatorEvent::EnqueueFailed {
                    id,
                    error: e.to_string(),
                });
                if let Some(ack) = ack {
                    let _ = ack.send(Err(e.into()));
                }
            }
        }
    }

    async fn flush(&mut self, forced: bool) {
        if self.shutting_down {
            return;
        }
        if let Some(batch) = &self.in_flight {
            op_log!(
                self.verbose,
                batch_id = batch.batch_id,
                forced,
                "Flush skipped, batch in flight"
            );
            return;
        }

        let pending = match self.store.count().await {
            Ok(pending) => pending,
            Err(e) => {
                error!(database = %self.database, error = %e, "Failed to count pending events");
                return;
            }
        };

        let reason = match self
            .policy
            .evaluate(forced, pending, Utc::now(), self.last_flush)
        {
            FlushDecision::Flush(reason) => reason,
            FlushDecision::Skip(skip) => {
                op_log!(
                    self.verbose,
                    pending,
                    forced,
                    reason = skip_label(skip),
                    "Flush not needed"
                );
                return;
            }
        };

        let batch = match self.store.fetch_oldest(self.policy.batch_limit()).await {
            Ok(batch) if batch.is_empty() => return,
            Ok(batch) => batch,
            Err(e) => {
                error!(database = %self.database, error = %e, "Failed to fetch pending events");
                return;
            }
        };

        self.next_batch_id += 1;
        let batch_id = self.next_batch_id;
        let (ids, payloads): (Vec<EventId>, Vec<Bytes>) =
            batch.into_iter().map(|event| (event.id, event.payload)).unzip();

        info!(
            batch_id,
            batch_size = ids.len(),
            pending,
            reason = reason.as_str(),
            "Flushing batch"
        );

        self.in_flight = Some(InFlightBatch {
            batch_id,
            ids: ids.clone(),
        });
        self.emit(CoordinatorEvent::BatchStarted {
            batch_id,
            ids,
            reason,
        });
        self.dispatch(batch_id, payloads);
    }

    /// Hand a batch to the transport outside the worker loop
    fn dispatch(&self, batch_id: u64, payloads: Vec<Bytes>) {
        let transport = Arc::clone(&self.transport);
        let completions = self.completions.clone();

        tokio::spawn(async move {
            // A panicking transport must still clear the in-flight batch
            let attempt = tokio::spawn(async move { transport.send_batch(payloads).await });
            let outcome = match attempt.await {
                Ok(Ok(())) => Delivery::Delivered,
                Ok(Err(e)) => Delivery::Failed(e.to_string()),
                Err(e) => Delivery::Failed(format!("transport task failed: {}", e)),
            };

            if let Some(tx) = completions.upgrade() {
                let _ = tx.send(Command::BatchResolved { batch_id, outcome });
            }
        });
    }

    async fn resolve(&mut self, batch_id: u64, outcome: Delivery) {
        let Some(batch) = self.in_flight.take_if(|b| b.batch_id == batch_id) else {
            warn!(batch_id, "Resolution for unknown batch ignored");
            return;
        };

        match outcome {
            Delivery::Delivered => self.complete(batch).await,
            Delivery::Failed(error) => {
                self.counters.batches_failed += 1;
                warn!(
                    batch_id,
                    batch_size = batch.ids.len(),
                    error = %error,
                    "Batch delivery failed, will retry"
                );
                self.emit(CoordinatorEvent::BatchFailed {
                    batch_id,
                    size: batch.ids.len(),
                    error,
                });
            }
        }
    }

    async fn complete(&mut self, batch: InFlightBatch) {
        let InFlightBatch { batch_id, ids } = batch;
        self.counters.batches_delivered += 1;
        self.counters.events_delivered += ids.len() as u64;

        let keys: HashSet<EventId> = ids.iter().copied().collect();
        match self.store.delete(&keys).await {
            Ok(removed) => {
                let now = Utc::now();
                if let Err(e) = self.store.set_last_successful_flush(now).await {
                    warn!(error = %e, "Failed to persist flush timestamp");
                }
                self.last_flush = Some(now);

                info!(batch_id, batch_size = ids.len(), removed, "Batch delivered");
                self.emit(CoordinatorEvent::BatchDelivered { batch_id, ids });

                // Drain a backlog without waiting for the next trigger
                self.flush(false).await;
            }
            Err(e) => {
                error!(
                    batch_id,
                    batch_size = ids.len(),
                    error = %e,
                    "Failed to remove delivered events, they may be sent again"
                );
                self.emit(CoordinatorEvent::DeleteFailed {
                    batch_id,
                    error: e.to_string(),
                });
            }
        }
    }

    async fn stats(&self) -> CoordinatorResult<CoordinatorStats> {
        let pending = self.store.count().await.map_err(CoordinatorError::from)?;
        Ok(CoordinatorStats {
            pending,
            in_flight: self.in_flight.is_some(),
            last_successful_flush_at: self.last_flush,
            batches_delivered: self.counters.batches_delivered,
            batches_failed: self.counters.batches_failed,
            events_delivered: self.counters.events_delivered,
        })
    }

    fn emit(&self, event: CoordinatorEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

fn skip_label(skip: SkipReason) -> &'static str {
    match skip {
        SkipReason::Empty => "empty",
        SkipReason::NotReady => "not_ready",
    }
}
