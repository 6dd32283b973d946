//! # fanout: durable per-routing-key event delivery
//!
//! `fanout` is the core of a local event-forwarding daemon: a disk-backed
//! event queue fronted by an in-memory dispatcher that shards events by
//! routing key into single-worker FIFOs and delivers each to an upstream
//! HTTP events API through a retrying transport.
//!
//! ## Architecture
//!
//! The [`PersistentQueue`] owns the whole pipeline. An enqueued event is
//! validated, written durably to the single-file [`Store`], and only then
//! handed to the [`EventQueue`] dispatcher; the producer gets the record's
//! local key back before delivery completes. One worker task per observed
//! routing key drains that key's bounded buffer in strict FIFO order, while
//! distinct keys deliver concurrently. Each delivery goes through the
//! [`EventsClient`], whose [`RetryTransport`] absorbs transient upstream
//! failures (connection errors, 429, 5xx) with capped exponential backoff,
//! so workers observe only terminal outcomes. A follower task records each
//! outcome back on the stored event.
//!
//! Delivery is at-least-once: a record still `pending` when the process
//! dies is replayed on the next [`PersistentQueue::start`], in insertion
//! order. Duplicate suppression is the upstream API's job, via
//! caller-supplied dedup keys.
//!
//! ## Example
//!
//! ```no_run
//! use fanout::{EventContainer, EventQueue, EventsClient, EventVersion, PersistentQueue,
//!              Region, Store};
//!
//! # async fn example() -> fanout::Result<()> {
//! let store = Store::open(std::path::Path::new("events.db")).await?;
//! let client = EventsClient::new(Region::Us)?;
//! let queue = PersistentQueue::new(store, EventQueue::new(EventQueue::api_processor(client)));
//! queue.start().await?;
//!
//! let payload = br#"{"routing_key":"11863b592c824bfc8989d9cba76abcde",
//!     "event_action":"trigger",
//!     "payload":{"summary":"x","source":"y","severity":"error"}}"#;
//! let key = queue
//!     .enqueue(EventContainer::new(EventVersion::V2, payload.to_vec()))
//!     .await?;
//! println!("enqueued as {key}");
//!
//! queue.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod queue;
pub mod store;
pub mod transport;

pub use api::{ApiResponse, EVENT_VERSION_HEADER, EventsClient, Region, ResponseDetails};
pub use dispatcher::{DEFAULT_BUFFER_SIZE, EventQueue, Job, Outcome, Processor};
pub use error::{Error, Result};
pub use event::{EventContainer, EventVersion, ROUTING_KEY_MIN_LEN, generate_key};
pub use queue::{PersistentQueue, StatusItem};
pub use store::{EventRecord, EventStatus, Store};
