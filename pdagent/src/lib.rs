//! # pdagent: local event-forwarding daemon for the PagerDuty Events API
//!
//! `pdagent` buffers alerting events from monitoring tools and delivers
//! them to the PagerDuty Events API with durable persistence, per-routing-key
//! ordered delivery, and at-least-once semantics across restarts. Producers
//! (the bundled CLI commands and the Nagios/Sensu/Zabbix integrations)
//! enqueue through a local authenticated HTTP endpoint; the daemon owns
//! delivery.
//!
//! ## Architecture
//!
//! The heavy lifting lives in the [`fanout`] crate: a durable store, a
//! per-routing-key dispatcher, and a retrying events API client composed
//! into a [`fanout::PersistentQueue`]. This crate is the application shell
//! around it:
//!
//! - [`config`] loads YAML + environment configuration (figment).
//! - [`api`] exposes the control plane: `/send`, `/queue/retry`,
//!   `/queue/status`, `/health`, all behind a shared-secret check.
//! - [`Application`] wires the pieces together and owns the lifecycle:
//!   pidfile acquisition, queue startup (replaying pending events), serving
//!   until SIGINT/SIGTERM, then a bounded-grace drain and cleanup.
//! - [`cli`] holds the producer-side commands that talk to a running
//!   daemon through [`client::Client`].

pub mod api;
pub mod cli;
pub mod client;
pub mod config;
pub mod errors;
pub mod heartbeat;
pub mod pidfile;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use fanout::{EventQueue, EventsClient, PersistentQueue, Store};

pub use config::Config;
use errors::Result;
use pidfile::Pidfile;

/// Grace period for in-flight HTTP handlers after the shutdown signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// State shared across all control-plane handlers.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<PersistentQueue>,
    pub config: Config,
}

/// Build the control-plane router with all endpoints and middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/send", post(api::handlers::send))
        .route("/queue/retry", post(api::handlers::retry))
        .route("/queue/status", get(api::handlers::status))
        .route("/health", get(api::handlers::health))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::middleware::require_secret,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The daemon: owns the pidfile, the persistent queue, and the HTTP server
/// lifecycle.
pub struct Application {
    state: AppState,
    pidfile: Pidfile,
}

impl Application {
    /// Initialize all resources: acquire the pidfile, open the store, and
    /// replay pending events into the dispatcher.
    ///
    /// Fails fast with a distinct error when the pidfile already exists,
    /// leaving the existing file untouched.
    pub async fn new(config: Config) -> Result<Self> {
        let pidfile = Pidfile::acquire(&config.pidfile)?;

        if let Some(parent) = config.database.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Store::open(&config.database).await?;
        let client = EventsClient::new(config.region)?;
        let dispatcher = EventQueue::new(EventQueue::api_processor(client));
        let queue = Arc::new(PersistentQueue::new(store, dispatcher));
        queue.start().await?;

        Ok(Self {
            state: AppState { queue, config },
            pidfile,
        })
    }

    /// Serve the control plane until `shutdown` resolves, then drain.
    ///
    /// On shutdown: the listener stops accepting, in-flight handlers get
    /// [`SHUTDOWN_GRACE`] to finish, the queue drains its workers and
    /// followers, and the pidfile is removed. Every event accepted before
    /// the signal is either delivered or still `pending` in the store.
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(&self.state.config.address).await?;
        tracing::info!(address = %self.state.config.address, "agent listening");

        let heartbeat_shutdown = CancellationToken::new();
        if self.state.config.heartbeat.enabled {
            heartbeat::spawn(heartbeat_shutdown.clone());
        }

        let router = build_router(self.state.clone());
        let (close_tx, close_rx) = tokio::sync::oneshot::channel::<()>();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = close_rx.await;
                })
                .await
        });

        tokio::select! {
            _ = shutdown => {
                tracing::info!("shutdown signal received");
            }
            result = &mut server => {
                // The listener died on its own; clean up and surface it.
                heartbeat_shutdown.cancel();
                self.state.queue.shutdown().await;
                self.pidfile.remove()?;
                result??;
                anyhow::bail!("server exited unexpectedly");
            }
        }

        let _ = close_tx.send(());
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
            Ok(result) => result??,
            Err(_) => {
                tracing::warn!("shutdown grace elapsed, aborting in-flight handlers");
                server.abort();
            }
        }

        heartbeat_shutdown.cancel();
        self.state.queue.shutdown().await;
        self.pidfile.remove()?;
        tracing::info!("agent stopped");
        Ok(())
    }
}
