//! Command-line interface.
//!
//! All commands except `server` are thin producers: they shape an event (or
//! a queue operation) and submit it to a locally running daemon over the
//! authenticated control plane.

pub mod enqueue;
pub mod health;
pub mod init;
pub mod integrations;
pub mod payload;
pub mod queue;
pub mod send;
pub mod server;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::client::Client;
use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "pdagent", version, about = "PagerDuty event-forwarding agent")]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short = 'f', long, env = "PDAGENT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a default config file, including a generated secret
    Init,
    /// Run the agent daemon (or stop a running one)
    Server {
        #[command(subcommand)]
        command: Option<server::ServerCommand>,
    },
    /// Queue a trigger, acknowledge, or resolve v2 event
    Enqueue(enqueue::EnqueueArgs),
    /// Queue a v1 event using the legacy field names
    Send(send::SendArgs),
    /// Observe or replay the delivery queue
    Queue {
        #[command(subcommand)]
        command: queue::QueueCommand,
    },
    /// Check the running agent's health endpoint
    Health,
    /// Nagios integration
    Nagios {
        #[command(subcommand)]
        command: integrations::nagios::NagiosCommand,
    },
    /// Sensu integration
    Sensu {
        #[command(subcommand)]
        command: integrations::sensu::SensuCommand,
    },
    /// Zabbix integration
    Zabbix {
        #[command(subcommand)]
        command: integrations::zabbix::ZabbixCommand,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Init => init::run(cli.config.as_deref()),
        Command::Server { command: None } => {
            let config = Config::load(cli.config.as_deref())?;
            server::run(config).await
        }
        Command::Server {
            command: Some(server::ServerCommand::Stop),
        } => {
            let config = Config::load(cli.config.as_deref())?;
            server::stop(&config)
        }
        Command::Enqueue(args) => {
            let config = Config::load(cli.config.as_deref())?;
            enqueue::run(&config, args).await
        }
        Command::Send(args) => {
            let config = Config::load(cli.config.as_deref())?;
            send::run(&config, args).await
        }
        Command::Queue { command } => {
            let config = Config::load(cli.config.as_deref())?;
            queue::run(&config, command).await
        }
        Command::Health => {
            let config = Config::load(cli.config.as_deref())?;
            health::run(&config).await
        }
        Command::Nagios { command } => {
            let config = Config::load(cli.config.as_deref())?;
            integrations::nagios::run(&config, command).await
        }
        Command::Sensu { command } => {
            let config = Config::load(cli.config.as_deref())?;
            integrations::sensu::run(&config, command).await
        }
        Command::Zabbix { command } => {
            let config = Config::load(cli.config.as_deref())?;
            integrations::zabbix::run(&config, command).await
        }
    }
}

pub(crate) fn client(config: &Config) -> anyhow::Result<Client> {
    Ok(Client::new(config.address.clone(), config.secret.clone())?)
}

/// Print the daemon's response body, failing the command on non-2xx.
pub(crate) async fn print_response(response: reqwest::Response) -> anyhow::Result<()> {
    let status = response.status();
    let body = response.text().await?;
    println!("{body}");
    if !status.is_success() {
        anyhow::bail!("agent responded with {status}");
    }
    Ok(())
}
