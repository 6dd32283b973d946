//! Events API client.
//!
//! Serializes nothing itself: the event payload is posted as the raw bytes
//! the producer supplied, to the version-specific endpoint. Retrying is
//! handled by the [`RetryTransport`]; this client only classifies the final
//! response into success or [`Error::Api`].

use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{Error, Result};
use crate::event::{EventContainer, EventVersion};
use crate::transport::RetryTransport;

pub const EVENTS_BASE_US: &str = "https://events.pagerduty.com";
pub const EVENTS_BASE_EU: &str = "https://events.eu.pagerduty.com";

const ENQUEUE_PATH_V2: &str = "/v2/enqueue";
const CREATE_PATH_V1: &str = "/generic/2010-04-15/create_event.json";

pub const EVENT_VERSION_HEADER: &str = "Pd-Event-Version";

// Generous per-attempt timeout; the transport owns retrying.
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Service region, selecting the events API base URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    #[default]
    Us,
    Eu,
}

impl Region {
    pub fn events_base(&self) -> &'static str {
        match self {
            Region::Us => EVENTS_BASE_US,
            Region::Eu => EVENTS_BASE_EU,
        }
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "us" => Ok(Region::Us),
            "eu" => Ok(Region::Eu),
            other => Err(format!("unknown region {other:?}, expected \"us\" or \"eu\"")),
        }
    }
}

/// Structured fields of an events API response body.
///
/// Both API versions are folded into one shape; absent fields stay `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseDetails {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "dedupkey")]
    pub dedup_key: Option<String>,
    #[serde(default)]
    pub incident_key: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// A settled upstream response: HTTP status, raw body, and the parsed
/// structured fields.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status_code: u16,
    pub body: Vec<u8>,
    pub details: ResponseDetails,
}

/// Client for the v1 and v2 events APIs.
#[derive(Debug, Clone)]
pub struct EventsClient {
    http: reqwest::Client,
    transport: RetryTransport,
    base_url: Url,
    user_agent: String,
}

impl EventsClient {
    pub fn new(region: Region) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()?;
        let transport = RetryTransport::new(http.clone());
        Ok(Self {
            http,
            transport,
            base_url: Url::parse(region.events_base())?,
            user_agent: format!("pdagent/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    /// Point the client at a different events base URL. Used by tests.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_transport(mut self, transport: RetryTransport) -> Self {
        self.transport = transport;
        self
    }

    /// POST an event to the version-specific endpoint and parse the
    /// structured response.
    ///
    /// Transient failures are absorbed by the transport; a non-2xx terminal
    /// response surfaces as [`Error::Api`] with the response retained.
    pub async fn send(
        &self,
        event: &EventContainer,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse> {
        let path = match event.version {
            EventVersion::V1 => CREATE_PATH_V1,
            EventVersion::V2 => ENQUEUE_PATH_V2,
        };
        let url = self.base_url.join(path)?;

        let request = self
            .http
            .post(url)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header(EVENT_VERSION_HEADER, event.version.as_str())
            .body(event.payload.clone())
            .build()?;

        let response = self.transport.execute(request, cancel).await?;
        let status_code = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        // Error bodies are not always JSON; parsing is best-effort.
        let details = serde_json::from_slice(&body).unwrap_or_default();
        let response = ApiResponse {
            status_code,
            body,
            details,
        };

        if (200..300).contains(&response.status_code) {
            Ok(response)
        } else {
            Err(Error::Api { response })
        }
    }
}
