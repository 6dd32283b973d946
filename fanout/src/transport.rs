//! Retrying HTTP transport.
//!
//! Wraps a [`reqwest::Client`] and reclassifies every outcome into one of
//! success, retryable, or fatal. Retryable outcomes (connection-level
//! failures, 429, 5xx) are retried with capped exponential backoff; the
//! backoff sleep is interruptible through a cancellation token. Because the
//! retrying lives here, callers observe only terminal outcomes: a single
//! `execute` is already idempotent against transient upstream failures.

use std::time::Duration;

use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

const DEFAULT_MAX_RETRIES: u32 = 10;
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);
const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(30);

/// Capped exponential backoff: `min(base * 2^attempt, max)`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before retrying after failed attempt `attempt` (0-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt);
        self.base
            .checked_mul(multiplier)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_BASE, DEFAULT_MAX_INTERVAL)
    }
}

/// HTTP round-tripper with automatic retry support.
///
/// Default cases are when a 429 or 500-series response or a connection-level
/// failure is encountered, with an exponential backoff determined by
/// [`Backoff`] and a maximum attempt count of `max_retries`.
#[derive(Debug, Clone)]
pub struct RetryTransport {
    client: reqwest::Client,
    max_retries: u32,
    backoff: Backoff,
}

impl RetryTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Backoff::default(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Issue `request`, retrying retryable outcomes until success, a fatal
    /// outcome, an exhausted retry budget, or cancellation.
    ///
    /// Fatal non-2xx responses are returned as `Ok`; classifying them is the
    /// caller's concern. On exhaustion the last observed response is returned
    /// with no synthesized error, or the last network error if no response
    /// was ever received.
    pub async fn execute(
        &self,
        request: reqwest::Request,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response> {
        let mut attempt = 0u32;

        loop {
            let req = request.try_clone().ok_or(Error::StreamingBody)?;

            // Success and fatal outcomes return immediately; only retryable
            // ones fall through to the backoff below.
            let retryable = match self.client.execute(req).await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() || !is_retryable_status(status) {
                        return Ok(response);
                    }
                    Ok(response)
                }
                Err(err) => {
                    if !is_retryable_error(&err) {
                        return Err(Error::Http(err));
                    }
                    Err(err)
                }
            };

            attempt += 1;
            if attempt >= self.max_retries {
                return match retryable {
                    Ok(response) => {
                        tracing::error!(
                            status = %response.status(),
                            "exhausted retries, returning last response"
                        );
                        Ok(response)
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "exhausted retries, returning last error");
                        Err(Error::Http(err))
                    }
                };
            }

            let delay = self.backoff.delay(attempt - 1);
            tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "retrying request");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            }
        }
    }
}

/// 429 and the 5xx family can be retried; anything else terminal.
fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Connection-level failures (DNS resolution, refused connections, timeouts)
/// and mid-stream request errors such as an HTTP/2 GOAWAY can be retried;
/// builder and body errors are terminal.
fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || (err.is_request() && !err.is_builder())
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn fast_transport(max_retries: u32) -> RetryTransport {
        RetryTransport::new(reqwest::Client::new())
            .with_max_retries(max_retries)
            .with_backoff(Backoff::new(Duration::from_millis(1), Duration::from_millis(5)))
    }

    fn get(url: &str) -> reqwest::Request {
        reqwest::Client::new().get(url).build().unwrap()
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let backoff = Backoff::default();
        let expected = [1, 2, 4, 8, 16, 30, 30, 30];
        for (attempt, secs) in expected.iter().enumerate() {
            assert_eq!(
                backoff.delay(attempt as u32),
                Duration::from_secs(*secs),
                "attempt {attempt}"
            );
        }
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(64), DEFAULT_MAX_INTERVAL);
    }

    #[tokio::test]
    async fn returns_successful_response_without_retrying() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let transport = fast_transport(10);
        let response = transport
            .execute(get(&format!("{}/ok", server.uri())), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn retries_429_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let transport = fast_transport(10);
        let response = transport
            .execute(
                get(&format!("{}/flaky", server.uri())),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn stops_after_max_retries_and_returns_last_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let transport = fast_transport(3);
        let response = transport
            .execute(
                get(&format!("{}/down", server.uri())),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 503);
    }

    #[tokio::test]
    async fn non_retryable_status_returns_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bad"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let transport = fast_transport(10);
        let response = transport
            .execute(
                get(&format!("{}/bad", server.uri())),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        // Long backoff so the test would hang without cancellation.
        let transport = RetryTransport::new(reqwest::Client::new())
            .with_max_retries(10)
            .with_backoff(Backoff::new(Duration::from_secs(30), Duration::from_secs(30)));

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel_clone.cancel();
        });

        let started = Instant::now();
        let result = transport
            .execute(get(&format!("{}/x", server.uri())), &cancel)
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn connection_failures_surface_last_error_when_exhausted() {
        // Nothing is listening on this port.
        let transport = fast_transport(2);
        let result = transport
            .execute(get("http://127.0.0.1:9/unreachable"), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::Http(_))));
    }
}
