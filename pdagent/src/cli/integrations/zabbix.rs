use std::collections::BTreeMap;

use clap::{Args, Subcommand};
use serde_json::Value;

use fanout::EventVersion;

use crate::cli::payload::EventV1;
use crate::config::Config;

#[derive(Subcommand, Debug)]
pub enum ZabbixCommand {
    /// Enqueue a Zabbix alert: pdagent zabbix enqueue <key> <type> <details>
    Enqueue(ZabbixArgs),
}

/// Zabbix passes three positional arguments from its media type script:
/// the integration key, the message type, and a newline-separated
/// `KEY:VALUE` details blob.
#[derive(Args, Debug)]
pub struct ZabbixArgs {
    pub integration_key: String,
    pub message_type: String,
    pub details: String,
}

pub(crate) struct ZabbixInput {
    pub integration_key: String,
    pub message_type: String,
    pub details: BTreeMap<String, String>,
}

/// Parse the `KEY:VALUE` lines of the details blob. Continuation lines
/// (no colon) are appended to the previous value.
fn parse_raw_details(raw: &str) -> BTreeMap<String, String> {
    let mut details = BTreeMap::new();
    let mut current_key = String::new();

    for line in raw.trim().lines() {
        let line = line.trim();
        match line.split_once(':') {
            Some((key, value)) => {
                current_key = key.to_string();
                details.insert(key.to_string(), value.to_string());
            }
            None if !current_key.is_empty() => {
                if let Some(value) = details.get_mut(&current_key) {
                    value.push_str(line);
                }
            }
            None => {
                details.insert(line.to_string(), line.to_string());
            }
        }
    }
    details
}

pub(crate) fn parse_input(args: ZabbixArgs) -> ZabbixInput {
    let mut details = parse_raw_details(&args.details);
    let mut message_type = args.message_type;

    // Zabbix reports a cancelled escalation as a trigger; convert it so the
    // incident resolves instead of re-firing.
    if message_type == "trigger"
        && details
            .get("NOTE")
            .is_some_and(|note| note.contains("Escalation cancelled"))
    {
        message_type = "resolve".to_string();
        if let Some(note) = details.get_mut("NOTE") {
            note.push_str(" (converted from trigger to resolve by pdagent integration)");
        }
    }

    ZabbixInput {
        integration_key: args.integration_key,
        message_type,
        details,
    }
}

pub(crate) fn build_event(input: ZabbixInput) -> anyhow::Result<EventV1> {
    let incident_key = match (
        input.details.get("incident_key"),
        input.details.get("id"),
        input.details.get("hostname"),
    ) {
        (Some(provided), _, _) => provided.clone(),
        (None, Some(id), Some(hostname)) => format!("{id}-{hostname}"),
        _ => anyhow::bail!(
            "could not build incident key, ensure the event contains \"incident_key\", or \
             \"id\" and \"hostname\""
        ),
    };

    let description = match (
        input.details.get("name"),
        input.details.get("status"),
        input.details.get("hostname"),
    ) {
        (Some(name), Some(status), Some(hostname)) => format!("{name} : {status} for {hostname}"),
        _ => anyhow::bail!(
            "could not build summary, ensure the event contains \"name\", \"status\", and \
             \"hostname\""
        ),
    };

    let client_url = input.details.get("url").cloned();
    let client = client_url
        .as_deref()
        .filter(|url| !url.is_empty())
        .map(|_| "Zabbix".to_string());

    Ok(EventV1 {
        service_key: input.integration_key,
        event_type: input.message_type,
        incident_key: Some(incident_key),
        description,
        details: Some(Value::Object(
            input
                .details
                .into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect(),
        )),
        client,
        client_url,
    })
}

pub async fn run(config: &Config, command: ZabbixCommand) -> anyhow::Result<()> {
    let ZabbixCommand::Enqueue(args) = command;
    let event = build_event(parse_input(args))?;
    let client = crate::cli::client(config)?;
    let response = client.send(EventVersion::V1, &event).await?;
    crate::cli::print_response(response).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(message_type: &str, details: &str) -> ZabbixArgs {
        ZabbixArgs {
            integration_key: "11863b592c824bfc8989d9cba76abcde".to_string(),
            message_type: message_type.to_string(),
            details: details.to_string(),
        }
    }

    #[test]
    fn details_blob_parses_key_value_lines() {
        let details = parse_raw_details("name:High CPU\nstatus:PROBLEM\nhostname:web-1\n");
        assert_eq!(details["name"], "High CPU");
        assert_eq!(details["status"], "PROBLEM");
        assert_eq!(details["hostname"], "web-1");
    }

    #[test]
    fn continuation_lines_extend_the_previous_value() {
        let details = parse_raw_details("NOTE:first part\nsecond part\n");
        assert_eq!(details["NOTE"], "first partsecond part");
    }

    #[test]
    fn builds_a_trigger_with_a_derived_incident_key() {
        let input = parse_input(args(
            "trigger",
            "name:High CPU\nstatus:PROBLEM\nhostname:web-1\nid:123\nurl:https://z.example.com\n",
        ));
        let event = build_event(input).unwrap();

        assert_eq!(event.event_type, "trigger");
        assert_eq!(event.incident_key.as_deref(), Some("123-web-1"));
        assert_eq!(event.description, "High CPU : PROBLEM for web-1");
        assert_eq!(event.client.as_deref(), Some("Zabbix"));
        assert_eq!(event.client_url.as_deref(), Some("https://z.example.com"));
    }

    #[test]
    fn cancelled_escalations_become_resolves() {
        let input = parse_input(args(
            "trigger",
            "name:n\nstatus:OK\nhostname:web-1\nid:1\nNOTE:Escalation cancelled by admin\n",
        ));
        assert_eq!(input.message_type, "resolve");
        assert!(input.details["NOTE"].contains("converted from trigger to resolve"));
    }

    #[test]
    fn missing_fields_are_reported() {
        // No id/hostname/incident_key.
        let input = parse_input(args("trigger", "name:n\nstatus:OK\n"));
        assert!(build_event(input).is_err());

        // No name/status for the summary.
        let input = parse_input(args("trigger", "id:1\nhostname:web-1\n"));
        assert!(build_event(input).is_err());
    }
}
