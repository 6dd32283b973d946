use clap::{Args, Subcommand};
use serde_json::Value;
use tokio::io::AsyncReadExt;

use fanout::EventVersion;

use crate::cli::payload::EventV1;
use crate::config::Config;

#[derive(Subcommand, Debug)]
pub enum SensuCommand {
    /// Enqueue a Sensu check result read from stdin
    Enqueue(SensuArgs),
}

#[derive(Args, Debug)]
pub struct SensuArgs {
    /// Sensu integration key
    #[arg(short = 'k', long = "integration-key")]
    pub integration_key: String,

    /// Incident key for correlating triggers and resolves
    #[arg(short = 'y', long = "incident-key")]
    pub incident_key: Option<String>,
}

fn string_field<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

fn event_type(check_result: &Value) -> anyhow::Result<&'static str> {
    match string_field(check_result, "/action") {
        Some("resolve") => Ok("resolve"),
        // Anything other than an explicit resolve (including "create") is a
        // trigger.
        Some(_) => Ok("trigger"),
        None => anyhow::bail!("could not get event action, set the \"action\" key"),
    }
}

fn incident_key(args_key: Option<&str>, check_result: &Value) -> anyhow::Result<String> {
    if let Some(key) = args_key {
        return Ok(key.to_string());
    }

    let client_name = string_field(check_result, "/client/name");
    let check_name = string_field(check_result, "/check/name");
    if let (Some(client), Some(check)) = (client_name, check_name) {
        return Ok(format!("{client}/{check}"));
    }

    if let Some(id) = string_field(check_result, "/id") {
        return Ok(id.to_string());
    }

    anyhow::bail!(
        "could not build incident key, set the \"id\" field or \"client.name\" and \
         \"check.name\" fields"
    )
}

fn summary(incident_key: &str, check_result: &Value) -> anyhow::Result<String> {
    match string_field(check_result, "/check/output") {
        Some(output) => Ok(format!("{incident_key} : {output}")),
        None => anyhow::bail!("could not build summary, set the \"check.output\" field"),
    }
}

pub(crate) fn build_event(args: &SensuArgs, check_result: Value) -> anyhow::Result<EventV1> {
    let event_type = event_type(&check_result)?;
    let incident_key = incident_key(args.incident_key.as_deref(), &check_result)?;
    let description = summary(&incident_key, &check_result)?;

    Ok(EventV1 {
        service_key: args.integration_key.clone(),
        event_type: event_type.to_string(),
        incident_key: Some(incident_key),
        description,
        // The whole check result rides along as details.
        details: Some(check_result),
        client: None,
        client_url: None,
    })
}

pub async fn run(config: &Config, command: SensuCommand) -> anyhow::Result<()> {
    let SensuCommand::Enqueue(args) = command;

    let mut stdin = String::new();
    tokio::io::stdin()
        .read_to_string(&mut stdin)
        .await
        .map_err(|_| anyhow::anyhow!("could not read stdin for sensu enqueue command"))?;
    let check_result: Value = serde_json::from_str(&stdin).map_err(|_| {
        anyhow::anyhow!("could not unmarshal check result, perhaps stdin did not contain valid JSON")
    })?;

    let event = build_event(&args, check_result)?;
    let client = crate::cli::client(config)?;
    let response = client.send(EventVersion::V1, &event).await?;
    crate::cli::print_response(response).await
}
