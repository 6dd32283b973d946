//! Persistent queue.
//!
//! Composes the durable [`Store`] with the in-memory [`EventQueue`]
//! dispatcher: events are persisted first, then dispatched, and the terminal
//! outcome of each delivery is written back to the stored record by a
//! follower task. On startup every record still marked pending is replayed
//! into the dispatcher in insertion order, preserving per-key FIFO across
//! restarts and giving at-least-once delivery.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;

use crate::dispatcher::{EventQueue, Job};
use crate::error::{Error, Result};
use crate::event::EventContainer;
use crate::store::{EventRecord, EventStatus, Store};

/// Aggregate delivery counts for one routing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusItem {
    pub routing_key: String,
    pub pending: u64,
    pub success: u64,
    pub error: u64,
}

impl StatusItem {
    fn new(routing_key: &str) -> Self {
        Self {
            routing_key: routing_key.to_string(),
            pending: 0,
            success: 0,
            error: 0,
        }
    }
}

/// Durable front of the dispatcher. All public queue operations go through
/// this type.
pub struct PersistentQueue {
    store: Store,
    dispatcher: EventQueue,
    followers: TaskTracker,
}

impl PersistentQueue {
    pub fn new(store: Store, dispatcher: EventQueue) -> Self {
        Self {
            store,
            dispatcher,
            followers: TaskTracker::new(),
        }
    }

    /// Access the underlying store, e.g. for status lookups by event key.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Replay every pending record into the dispatcher.
    ///
    /// Records are replayed in id order, so per-key FIFO ordering holds
    /// across a restart.
    pub async fn start(&self) -> Result<()> {
        let pending = self.store.find_by_status(EventStatus::Pending).await?;
        tracing::info!(count = pending.len(), "enqueuing pending events");
        for record in pending {
            self.process_event(record);
        }
        Ok(())
    }

    /// Persist an event and hand it to the dispatcher.
    ///
    /// Returns the record's local key. Only synchronous errors (invalid
    /// routing key, malformed payload, store write failure) surface here;
    /// delivery outcomes are observable via [`PersistentQueue::status`].
    /// The record is durable before the key is returned, and dispatch may
    /// overlap with the return of this call.
    pub async fn enqueue(&self, event: EventContainer) -> Result<String> {
        let mut record = EventRecord::new(&event)?;
        tracing::info!(
            key = %record.key,
            routing_key = %record.routing_key,
            "enqueuing event"
        );

        self.store.save(&mut record).await?;
        let key = record.key.clone();
        self.process_event(record);
        Ok(key)
    }

    /// Dispatch a stored record and follow its response channel.
    ///
    /// The follower owns the record until it writes the terminal outcome.
    /// Outcomes that are not terminal for the record (buffer overflow, a
    /// stopped job, a dropped response channel) leave it pending so the next
    /// startup replays it.
    fn process_event(&self, mut record: EventRecord) {
        let (response_tx, response_rx) = oneshot::channel();
        let job = Job {
            key: record.key.clone(),
            container: record.container(),
            response: response_tx,
        };

        if let Err(err) = self.dispatcher.enqueue(job) {
            // Records are validated before they are saved, so this only
            // fires for a payload that was corrupted at rest.
            tracing::error!(key = %record.key, error = %err, "failed to dispatch stored event");
            return;
        }

        let store = self.store.clone();
        self.followers.spawn(async move {
            let outcome = match response_rx.await {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::Stopped),
            };

            match outcome {
                Ok(response) => {
                    record.status = EventStatus::Success;
                    record.response_body = Some(response.body);
                    tracing::info!(key = %record.key, "event delivered");
                }
                Err(Error::BufferOverflow { routing_key, limit }) => {
                    tracing::warn!(
                        key = %record.key,
                        routing_key = %routing_key,
                        limit,
                        "dispatcher buffer full, event stays pending"
                    );
                    return;
                }
                Err(Error::Stopped) => {
                    tracing::debug!(key = %record.key, "job stopped, event stays pending");
                    return;
                }
                Err(err) => {
                    record.status = EventStatus::Error;
                    record.response_body = err.response_body().map(|body| body.to_vec());
                    tracing::info!(key = %record.key, error = %err, "event delivery failed");
                }
            }

            if let Err(err) = store.update(&mut record).await {
                // The record stays pending on disk and is replayed at the
                // next startup.
                tracing::error!(
                    key = %record.key,
                    error = %err,
                    "failed to record delivery outcome"
                );
            }
        });
    }

    /// Re-dispatch events that settled in `error`, in id order.
    ///
    /// An empty routing key retries every errored event; otherwise only the
    /// given key's. Statuses are not pre-mutated: the worker path overwrites
    /// them with the next terminal outcome. Returns how many events were
    /// re-dispatched.
    pub async fn retry(&self, routing_key: Option<&str>) -> Result<usize> {
        let errored = self.store.find_by_status(EventStatus::Error).await?;
        let mut count = 0;
        for record in errored {
            if routing_key.is_none_or(|rk| rk == record.routing_key) {
                count += 1;
                self.process_event(record);
            }
        }
        tracing::info!(count, "retrying errored events");
        Ok(count)
    }

    /// Aggregate per-routing-key delivery counts. An empty routing key
    /// groups across all keys.
    pub async fn status(&self, routing_key: Option<&str>) -> Result<Vec<StatusItem>> {
        let records = match routing_key {
            Some(rk) => self.store.find_by_routing_key(rk).await?,
            None => self.store.all().await?,
        };

        let mut aggregate: BTreeMap<String, StatusItem> = BTreeMap::new();
        for record in records {
            let item = aggregate
                .entry(record.routing_key.clone())
                .or_insert_with(|| StatusItem::new(&record.routing_key));
            match record.status {
                EventStatus::Pending => item.pending += 1,
                EventStatus::Success => item.success += 1,
                EventStatus::Error => item.error += 1,
            }
        }
        Ok(aggregate.into_values().collect())
    }

    /// Drain the dispatcher, wait for all followers to record their
    /// outcomes, then close the store.
    pub async fn shutdown(&self) {
        tracing::info!("shutting down persistent queue");
        self.dispatcher.shutdown().await;
        self.followers.close();
        self.followers.wait().await;
        self.store.close().await;
        tracing::info!("persistent queue shut down");
    }
}
