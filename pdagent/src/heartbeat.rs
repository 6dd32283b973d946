//! Periodic heartbeat to the vendor telemetry endpoint.
//!
//! Runs as a background task next to the control server; each beat retries a
//! bounded number of times and gives up until the next tick. Cancelled on
//! shutdown.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use tokio_util::sync::CancellationToken;

pub const HEARTBEAT_URL: &str = "https://api.pagerduty.com/agent/2014-03-14/heartbeat/pdagent";

const HEARTBEAT_FREQUENCY: Duration = Duration::from_secs(60 * 60);
const MAX_RETRIES: u32 = 10;
const RETRY_GAP: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn spawn(shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(HEARTBEAT_URL.to_string(), HEARTBEAT_FREQUENCY, shutdown))
}

pub(crate) async fn run(url: String, frequency: Duration, shutdown: CancellationToken) {
    let client = match reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build() {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(error = %err, "failed to build heartbeat client");
            return;
        }
    };

    tracing::info!("starting heartbeat");
    let mut interval = tokio::time::interval(frequency);
    // The first tick of a tokio interval completes immediately; the first
    // beat should happen one full period after startup.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("heartbeat stopped");
                return;
            }
            _ = interval.tick() => beat(&client, &url).await,
        }
    }
}

async fn beat(client: &reqwest::Client, url: &str) {
    tracing::debug!("sending heartbeat");

    for attempt in 1..=MAX_RETRIES {
        let result = client
            .get(url)
            .header(USER_AGENT, format!("pdagent/{}", env!("CARGO_PKG_VERSION")))
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("heartbeat delivered");
                return;
            }
            Ok(response) => {
                tracing::info!(status = %response.status(), attempt, "heartbeat rejected");
            }
            Err(err) => {
                tracing::info!(error = %err, attempt, "heartbeat request failed");
            }
        }

        if attempt == MAX_RETRIES {
            tracing::warn!("heartbeat retry limit exceeded, giving up until next tick");
            return;
        }
        tokio::time::sleep(RETRY_GAP).await;
    }
}
