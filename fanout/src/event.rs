//! Wire event model.
//!
//! Events are carried opaquely: a version tag plus the raw JSON payload the
//! producer submitted. The only field ever interpreted locally is the
//! top-level routing key, which differs by wire version (`service_key` for
//! v1, `routing_key` for v2).

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Minimum character length of a valid routing key.
pub const ROUTING_KEY_MIN_LEN: usize = 32;

/// Events API wire version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum EventVersion {
    V1,
    V2,
}

impl EventVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventVersion::V1 => "v1",
            EventVersion::V2 => "v2",
        }
    }
}

impl fmt::Display for EventVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "v1" => Ok(EventVersion::V1),
            "v2" => Ok(EventVersion::V2),
            other => Err(Error::UnrecognizedVersion(other.to_string())),
        }
    }
}

/// An event as submitted by a producer: a version tag plus opaque payload
/// bytes. The payload is never deserialized beyond routing-key extraction.
#[derive(Debug, Clone)]
pub struct EventContainer {
    pub version: EventVersion,
    pub payload: Vec<u8>,
}

#[derive(Deserialize)]
struct RoutingProbe {
    #[serde(default)]
    routing_key: Option<String>,
    #[serde(default)]
    service_key: Option<String>,
}

impl EventContainer {
    pub fn new(version: EventVersion, payload: Vec<u8>) -> Self {
        Self { version, payload }
    }

    /// Extract and validate the routing key for this event's wire version.
    ///
    /// Fails on malformed JSON and on keys shorter than
    /// [`ROUTING_KEY_MIN_LEN`] characters, including a missing key field.
    pub fn routing_key(&self) -> Result<String> {
        let probe: RoutingProbe = serde_json::from_slice(&self.payload)?;
        let key = match self.version {
            EventVersion::V1 => probe.service_key,
            EventVersion::V2 => probe.routing_key,
        }
        .unwrap_or_default();

        if key.chars().count() < ROUTING_KEY_MIN_LEN {
            return Err(Error::InvalidRoutingKey);
        }
        Ok(key)
    }
}

const KEY_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a random 32-character lowercase alphanumeric key.
///
/// Used for the local event keys returned to producers. Collisions are not
/// checked; at this length the probability is negligible.
pub fn generate_key() -> String {
    let mut rng = rand::rng();
    (0..ROUTING_KEY_MIN_LEN)
        .map(|_| KEY_CHARS[rng.random_range(0..KEY_CHARS.len())] as char)
        .collect()
}
