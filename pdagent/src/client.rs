//! Control-plane client used by the CLI producers.
//!
//! Talks to a locally running agent daemon over HTTP. Every request carries
//! `Authorization: token <secret>`; the daemon rejects mismatches with 401.

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;

use fanout::{EVENT_VERSION_HEADER, EventVersion};

use crate::errors::Result;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Client {
    http: reqwest::Client,
    address: String,
    secret: String,
}

impl Client {
    pub fn new(address: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            address: address.into(),
            secret: secret.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.address, path)
    }

    fn auth_header(&self) -> String {
        format!("token {}", self.secret)
    }

    /// Submit one event to the agent daemon for queued delivery.
    pub async fn send<E: Serialize>(
        &self,
        version: EventVersion,
        event: &E,
    ) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(self.url("/send"))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header(EVENT_VERSION_HEADER, version.as_str())
            .header(AUTHORIZATION, self.auth_header())
            .json(event)
            .send()
            .await?;
        Ok(response)
    }

    pub async fn queue_retry(&self, routing_key: Option<&str>) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(self.url("/queue/retry"))
            .query(&[("rk", routing_key.unwrap_or_default())])
            .header(AUTHORIZATION, self.auth_header())
            .send()
            .await?;
        Ok(response)
    }

    pub async fn queue_status(&self, routing_key: Option<&str>) -> Result<reqwest::Response> {
        let response = self
            .http
            .get(self.url("/queue/status"))
            .query(&[("rk", routing_key.unwrap_or_default())])
            .header(AUTHORIZATION, self.auth_header())
            .send()
            .await?;
        Ok(response)
    }

    pub async fn health_check(&self) -> Result<reqwest::Response> {
        let response = self
            .http
            .get(self.url("/health"))
            .header(AUTHORIZATION, self.auth_header())
            .send()
            .await?;
        Ok(response)
    }
}
