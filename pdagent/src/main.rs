use clap::Parser;

use pdagent::cli::{self, Cli};
use pdagent::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_telemetry()?;
    cli::run(cli).await
}
