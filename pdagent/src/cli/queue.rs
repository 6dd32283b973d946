use clap::Subcommand;

use crate::config::Config;

#[derive(Subcommand, Debug)]
pub enum QueueCommand {
    /// Show per-routing-key delivery counts
    Status {
        /// Limit to one routing key
        #[arg(short = 'k', long = "routing-key")]
        routing_key: Option<String>,
    },
    /// Re-deliver events that previously failed
    Retry {
        /// Limit to one routing key
        #[arg(short = 'k', long = "routing-key")]
        routing_key: Option<String>,
    },
}

pub async fn run(config: &Config, command: QueueCommand) -> anyhow::Result<()> {
    let client = super::client(config)?;
    let response = match command {
        QueueCommand::Status { routing_key } => {
            client.queue_status(routing_key.as_deref()).await?
        }
        QueueCommand::Retry { routing_key } => client.queue_retry(routing_key.as_deref()).await?,
    };
    super::print_response(response).await
}
