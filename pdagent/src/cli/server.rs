use clap::Subcommand;

use crate::config::Config;
use crate::errors::Error;
use crate::{Application, pidfile};

#[derive(Subcommand, Debug)]
pub enum ServerCommand {
    /// Gracefully stop a running agent
    Stop,
}

/// Wait for SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            tracing::info!("received SIGTERM, shutting down gracefully");
        },
    }
}

/// Run the daemon until it is signalled to stop.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let app = Application::new(config).await?;
    app.serve(shutdown_signal()).await
}

/// Stop a running daemon by signalling the pid recorded in its pidfile.
pub fn stop(config: &Config) -> anyhow::Result<()> {
    match pidfile::terminate(&config.pidfile) {
        Ok(()) => {
            println!("Server terminated.");
            Ok(())
        }
        Err(err @ Error::PidfileMissing(_)) => {
            eprintln!("Error terminating server: {err}");
            eprintln!(
                "This normally means a server isn't currently running, or you're running \
                 this command using a different configuration."
            );
            Err(err.into())
        }
        Err(err) => {
            eprintln!("Error terminating server: {err}");
            Err(err.into())
        }
    }
}
