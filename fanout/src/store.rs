//! Durable event store.
//!
//! A single-file SQLite database holding [`EventRecord`]s, with secondary
//! indices on routing key and status. Every save and update is committed
//! with full synchronous durability before the call returns; a restart can
//! trust whatever the store reports as pending. Concurrent access within one
//! process is serialized by the single-connection pool.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::error::{Error, Result};
use crate::event::{EventContainer, EventVersion, generate_key};

/// Delivery status of a stored event.
///
/// `pending` is the only status replayed automatically at startup. A record
/// never leaves `success`; an `error` record returns to the worker path only
/// through an explicit retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Success,
    Error,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Success => "success",
            EventStatus::Error => "error",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued or processed event.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRecord {
    /// Monotonically increasing primary key, assigned on save.
    pub id: i64,
    /// Opaque local identifier returned to the producer.
    pub key: String,
    pub routing_key: String,
    pub status: EventStatus,
    pub version: EventVersion,
    pub payload: Vec<u8>,
    /// Captured upstream response bytes from the last attempt, if any.
    pub response_body: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventRecord {
    /// Build a pending record from a producer-submitted event, validating
    /// the routing key and assigning a fresh local key.
    pub fn new(event: &EventContainer) -> Result<Self> {
        let routing_key = event.routing_key()?;
        let now = Utc::now();
        Ok(Self {
            id: 0,
            key: generate_key(),
            routing_key,
            status: EventStatus::Pending,
            version: event.version,
            payload: event.payload.clone(),
            response_body: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Reconstruct the wire event this record was created from.
    pub fn container(&self) -> EventContainer {
        EventContainer::new(self.version, self.payload.clone())
    }
}

const SELECT_COLUMNS: &str = "SELECT id, key, routing_key, status, version, payload, \
                              response_body, created_at, updated_at FROM events";

/// Single-file durable store for event records.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the store file at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);

        // One connection: the store serializes all mutations itself.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Insert a record, assigning its id and timestamps. Durable before
    /// return.
    pub async fn save(&self, record: &mut EventRecord) -> Result<()> {
        let now = Utc::now();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO events (key, routing_key, status, version, payload, response_body, \
             created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&record.key)
        .bind(&record.routing_key)
        .bind(record.status)
        .bind(record.version)
        .bind(&record.payload)
        .bind(&record.response_body)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        record.id = id;
        record.created_at = now;
        record.updated_at = now;
        Ok(())
    }

    /// Overwrite a record by primary key, advancing `updated_at`.
    pub async fn update(&self, record: &mut EventRecord) -> Result<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE events SET key = ?, routing_key = ?, status = ?, version = ?, payload = ?, \
             response_body = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&record.key)
        .bind(&record.routing_key)
        .bind(record.status)
        .bind(record.version)
        .bind(&record.payload)
        .bind(&record.response_body)
        .bind(now)
        .bind(record.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::RecordNotFound(record.key.clone()));
        }
        record.updated_at = now;
        Ok(())
    }

    /// Look up a record by its producer-facing key.
    pub async fn find_by_key(&self, key: &str) -> Result<Option<EventRecord>> {
        let record = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE key = ?"))
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    /// All records with the given status, in id (insertion) order.
    pub async fn find_by_status(&self, status: EventStatus) -> Result<Vec<EventRecord>> {
        let records = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE status = ? ORDER BY id"))
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    /// All records for the given routing key, in id (insertion) order.
    pub async fn find_by_routing_key(&self, routing_key: &str) -> Result<Vec<EventRecord>> {
        let records = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE routing_key = ? ORDER BY id"
        ))
        .bind(routing_key)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Every record, in id order.
    pub async fn all(&self) -> Result<Vec<EventRecord>> {
        let records = sqlx::query_as(&format!("{SELECT_COLUMNS} ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const ROUTING_KEY: &str = "11863b592c824bfc8989d9cba76abcde";

    async fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("events.db")).await.unwrap();
        (dir, store)
    }

    fn record(routing_key: &str) -> EventRecord {
        let event = EventContainer::new(
            EventVersion::V2,
            serde_json::to_vec(&json!({"routing_key": routing_key})).unwrap(),
        );
        EventRecord::new(&event).unwrap()
    }

    #[tokio::test]
    async fn save_assigns_strictly_increasing_ids() {
        let (_dir, store) = temp_store().await;
        let mut first = record(ROUTING_KEY);
        let mut second = record(ROUTING_KEY);
        store.save(&mut first).await.unwrap();
        store.save(&mut second).await.unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn find_by_key_round_trips_the_record() {
        let (_dir, store) = temp_store().await;
        let mut saved = record(ROUTING_KEY);
        store.save(&mut saved).await.unwrap();

        let found = store.find_by_key(&saved.key).await.unwrap().unwrap();
        assert_eq!(found.id, saved.id);
        assert_eq!(found.routing_key, ROUTING_KEY);
        assert_eq!(found.status, EventStatus::Pending);
        assert_eq!(found.version, EventVersion::V2);
        assert_eq!(found.payload, saved.payload);
        assert!(found.response_body.is_none());

        assert!(store.find_by_key("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_persists_status_and_response_body() {
        let (_dir, store) = temp_store().await;
        let mut saved = record(ROUTING_KEY);
        store.save(&mut saved).await.unwrap();

        saved.status = EventStatus::Success;
        saved.response_body = Some(br#"{"status":"success"}"#.to_vec());
        store.update(&mut saved).await.unwrap();

        let found = store.find_by_key(&saved.key).await.unwrap().unwrap();
        assert_eq!(found.status, EventStatus::Success);
        assert_eq!(
            found.response_body.as_deref(),
            Some(br#"{"status":"success"}"#.as_slice())
        );
        assert!(found.updated_at >= found.created_at);
    }

    #[tokio::test]
    async fn update_of_unsaved_record_is_an_error() {
        let (_dir, store) = temp_store().await;
        let mut unsaved = record(ROUTING_KEY);
        assert!(matches!(
            store.update(&mut unsaved).await,
            Err(Error::RecordNotFound(_))
        ));
    }

    #[tokio::test]
    async fn status_and_routing_key_queries_preserve_id_order() {
        let (_dir, store) = temp_store().await;
        let other_key = "ffffffffffffffffffffffffffffffff";

        let mut ids = Vec::new();
        for routing_key in [ROUTING_KEY, other_key, ROUTING_KEY] {
            let mut rec = record(routing_key);
            store.save(&mut rec).await.unwrap();
            ids.push(rec.id);
        }

        let pending = store.find_by_status(EventStatus::Pending).await.unwrap();
        assert_eq!(pending.iter().map(|r| r.id).collect::<Vec<_>>(), ids);

        let for_key = store.find_by_routing_key(ROUTING_KEY).await.unwrap();
        assert_eq!(
            for_key.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![ids[0], ids[2]]
        );

        assert_eq!(store.all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn records_survive_reopening_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.db");

        let key = {
            let store = Store::open(&path).await.unwrap();
            let mut rec = record(ROUTING_KEY);
            store.save(&mut rec).await.unwrap();
            store.close().await;
            rec.key
        };

        let reopened = Store::open(&path).await.unwrap();
        let found = reopened.find_by_key(&key).await.unwrap().unwrap();
        assert_eq!(found.status, EventStatus::Pending);
    }
}
