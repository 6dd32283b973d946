//! In-memory per-routing-key dispatcher.
//!
//! An [`EventQueue`] is internally composed of several individual queues
//! segmented by routing key, ensuring that events are in-order on a per
//! routing key basis. Each of these queues is a bounded channel drained by a
//! single dedicated worker task; across keys delivery is concurrent and
//! unordered.
//!
//! The processor applied to each job is pluggable and is the primary test
//! seam. The default processor sends events to the events API.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::api::{ApiResponse, EventsClient};
use crate::error::{Error, Result};
use crate::event::EventContainer;

pub const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Terminal outcome of one delivery attempt cycle.
pub type Outcome = Result<ApiResponse>;

/// One unit of work for a per-key worker.
pub struct Job {
    /// Local event key, carried for logging.
    pub key: String,
    pub container: EventContainer,
    /// Channel on which the terminal outcome is reported.
    pub response: oneshot::Sender<Outcome>,
}

/// Pluggable job processor: invoked synchronously by a worker, one job at a
/// time per routing key. The token is cancelled when the queue shuts down so
/// a long-running processor can abandon retries.
pub type Processor = Arc<dyn Fn(Job, CancellationToken) -> BoxFuture<'static, ()> + Send + Sync>;

/// Per-routing-key FIFO scheduler with one dedicated worker per observed key.
pub struct EventQueue {
    processor: Processor,
    buffer_size: usize,
    queues: Mutex<HashMap<String, mpsc::Sender<Job>>>,
    workers: TaskTracker,
    stop: CancellationToken,
}

impl EventQueue {
    pub fn new(processor: Processor) -> Self {
        Self {
            processor,
            buffer_size: DEFAULT_BUFFER_SIZE,
            queues: Mutex::new(HashMap::new()),
            workers: TaskTracker::new(),
            stop: CancellationToken::new(),
        }
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// The default processor: one call to the events API per job, with the
    /// terminal outcome forwarded on the job's response channel. Transport
    /// cancellation is reported as [`Error::Stopped`] so followers leave the
    /// record pending.
    pub fn api_processor(client: EventsClient) -> Processor {
        Arc::new(move |job: Job, stop: CancellationToken| {
            let client = client.clone();
            Box::pin(async move {
                let outcome = client.send(&job.container, &stop).await.map_err(|err| {
                    match err {
                        Error::Cancelled => Error::Stopped,
                        other => other,
                    }
                });
                if job.response.send(outcome).is_err() {
                    tracing::debug!(key = %job.key, "response receiver dropped");
                }
            })
        })
    }

    /// Enqueue a job onto its routing key's worker.
    ///
    /// Validates the routing key synchronously. The send itself never
    /// blocks: a full per-key buffer posts a [`Error::BufferOverflow`]
    /// outcome on the job's response channel and still returns `Ok`, so
    /// producers are never pushed back by a local backlog.
    pub fn enqueue(&self, job: Job) -> Result<()> {
        let routing_key = job.container.routing_key()?;
        let sender = self.ensure_worker(&routing_key);

        match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => {
                tracing::warn!(
                    routing_key = %routing_key,
                    limit = self.buffer_size,
                    "per-key buffer full, rejecting job"
                );
                let _ = job.response.send(Err(Error::BufferOverflow {
                    routing_key,
                    limit: self.buffer_size,
                }));
                Ok(())
            }
            Err(TrySendError::Closed(job)) => {
                let _ = job.response.send(Err(Error::Stopped));
                Ok(())
            }
        }
    }

    /// Look up the sender for a routing key, lazily spawning the worker the
    /// first time a key is seen. Worker spawn happens under the map lock;
    /// the producer send is lock-free on the channel.
    fn ensure_worker(&self, routing_key: &str) -> mpsc::Sender<Job> {
        let mut queues = self.queues.lock();
        if let Some(sender) = queues.get(routing_key) {
            return sender.clone();
        }

        let (sender, mut receiver) = mpsc::channel::<Job>(self.buffer_size);
        let processor = self.processor.clone();
        let stop = self.stop.clone();
        let worker_key = routing_key.to_string();
        self.workers.spawn(async move {
            tracing::debug!(routing_key = %worker_key, "worker started");
            while let Some(job) = receiver.recv().await {
                processor(job, stop.clone()).await;
            }
            tracing::debug!(routing_key = %worker_key, "worker stopped");
        });

        queues.insert(routing_key.to_string(), sender.clone());
        sender
    }

    /// Shut down the queue and all associated workers.
    ///
    /// Signals the stop token so in-flight processors can abandon retries,
    /// closes every per-key channel, and waits for workers to drain their
    /// currently-buffered jobs.
    pub async fn shutdown(&self) {
        tracing::info!("shutting down event queue");
        self.stop.cancel();
        self.queues.lock().clear();
        self.workers.close();
        self.workers.wait().await;
        tracing::info!("event queue shut down");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::Instant;

    use super::*;
    use crate::event::EventVersion;

    const KEY_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const KEY_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn event(routing_key: &str) -> EventContainer {
        EventContainer::new(
            EventVersion::V2,
            serde_json::to_vec(&json!({"routing_key": routing_key})).unwrap(),
        )
    }

    fn job(routing_key: &str, label: &str) -> (Job, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Job {
                key: label.to_string(),
                container: event(routing_key),
                response: tx,
            },
            rx,
        )
    }

    fn ok_response() -> ApiResponse {
        ApiResponse {
            status_code: 202,
            body: br#"{"status":"success"}"#.to_vec(),
            details: Default::default(),
        }
    }

    /// Processor that records job labels in arrival order, sleeping first
    /// when the label carries a "slow" marker.
    fn recording_processor(seen: Arc<Mutex<Vec<String>>>) -> Processor {
        Arc::new(move |job: Job, _stop| {
            let seen = seen.clone();
            Box::pin(async move {
                if job.key.starts_with("slow") {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                }
                seen.lock().push(job.key.clone());
                let _ = job.response.send(Ok(ok_response()));
            })
        })
    }

    #[tokio::test]
    async fn jobs_on_one_key_run_in_fifo_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let queue = EventQueue::new(recording_processor(seen.clone()));

        let (first, first_rx) = job(KEY_A, "slow-first");
        let (second, second_rx) = job(KEY_A, "second");
        queue.enqueue(first).unwrap();
        queue.enqueue(second).unwrap();

        first_rx.await.unwrap().unwrap();
        second_rx.await.unwrap().unwrap();
        assert_eq!(*seen.lock(), vec!["slow-first", "second"]);
    }

    #[tokio::test]
    async fn keys_are_processed_concurrently() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let queue = EventQueue::new(recording_processor(seen.clone()));

        let (blocked, _blocked_rx) = job(KEY_A, "slow-a");
        let (quick, quick_rx) = job(KEY_B, "b");
        queue.enqueue(blocked).unwrap();
        queue.enqueue(quick).unwrap();

        // Key B completes while key A's worker is still sleeping.
        let started = Instant::now();
        quick_rx.await.unwrap().unwrap();
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn full_buffer_reports_overflow_without_blocking() {
        // A processor that parks until told, so the buffer stays occupied.
        let release = Arc::new(tokio::sync::Notify::new());
        let release_clone = release.clone();
        let processor: Processor = Arc::new(move |job: Job, _stop| {
            let release = release_clone.clone();
            Box::pin(async move {
                release.notified().await;
                let _ = job.response.send(Ok(ok_response()));
            })
        });

        let queue = EventQueue::new(processor).with_buffer_size(1);

        let (in_flight, _rx1) = job(KEY_A, "one");
        queue.enqueue(in_flight).unwrap();
        // Give the worker time to pull the first job off the channel.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let (buffered, _rx2) = job(KEY_A, "two");
        queue.enqueue(buffered).unwrap();

        let (overflowing, rx3) = job(KEY_A, "three");
        queue.enqueue(overflowing).unwrap();
        let outcome = rx3.await.unwrap();
        assert!(matches!(outcome, Err(Error::BufferOverflow { .. })));

        release.notify_waiters();
    }

    #[tokio::test]
    async fn invalid_routing_key_is_rejected_synchronously() {
        let queue = EventQueue::new(recording_processor(Arc::new(Mutex::new(Vec::new()))));
        let (bad, _rx) = job("short", "bad");
        assert!(matches!(
            queue.enqueue(bad),
            Err(Error::InvalidRoutingKey)
        ));
    }

    #[tokio::test]
    async fn shutdown_drains_buffered_jobs() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let queue = EventQueue::new(recording_processor(seen.clone()));

        for label in ["one", "two", "three"] {
            let (j, _rx) = job(KEY_A, label);
            queue.enqueue(j).unwrap();
        }
        queue.shutdown().await;

        assert_eq!(*seen.lock(), vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn shutdown_cancels_the_stop_token_for_processors() {
        // A processor that cooperatively aborts: it parks on the stop token
        // and reports the job as stopped once shutdown fires.
        let processor: Processor = Arc::new(move |job: Job, stop: CancellationToken| {
            Box::pin(async move {
                stop.cancelled().await;
                let _ = job.response.send(Err(Error::Stopped));
            })
        });

        let queue = EventQueue::new(processor);
        let (j, rx) = job(KEY_A, "stopping");
        queue.enqueue(j).unwrap();
        queue.shutdown().await;

        assert!(matches!(rx.await.unwrap(), Err(Error::Stopped)));
    }
}
