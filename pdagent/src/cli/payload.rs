//! Producer-side event shapes.
//!
//! The daemon core treats payloads as opaque bytes; these types exist only
//! so the CLI commands and integrations can build well-formed v1/v2 events
//! before submitting them over `/send`.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// A v2 event for `POST /v2/enqueue`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EventV2 {
    pub routing_key: String,
    pub event_action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup_key: Option<String>,
    pub payload: PayloadV2,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PayloadV2 {
    pub summary: String,
    pub source: String,
    pub severity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_details: BTreeMap<String, Value>,
}

/// A v1 event for `POST /generic/2010-04-15/create_event.json`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EventV1 {
    pub service_key: String,
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_key: Option<String>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_url: Option<String>,
}

/// Parse a `KEY=VALUE` pair for `-f` flags.
pub fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("invalid KEY=VALUE pair: {raw}"))
}

pub fn details_map(fields: &[(String, String)]) -> BTreeMap<String, Value> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect()
}
