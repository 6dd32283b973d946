use std::collections::BTreeMap;

use clap::{Args, Subcommand};
use serde_json::Value;

use fanout::EventVersion;

use crate::cli::payload::{EventV1, parse_key_val};
use crate::config::Config;

#[derive(Subcommand, Debug)]
pub enum NagiosCommand {
    /// Enqueue an event from a Nagios notification
    Enqueue(NagiosArgs),
}

#[derive(Args, Debug)]
pub struct NagiosArgs {
    /// Service Events API key
    #[arg(short = 'k', long = "service-key")]
    pub service_key: String,

    /// The Nagios notification type: PROBLEM, ACKNOWLEDGEMENT, or RECOVERY
    #[arg(short = 't', long = "notification-type")]
    pub notification_type: String,

    /// The Nagios source type: host or service
    #[arg(short = 'n', long = "source-type")]
    pub source_type: String,

    /// Incident key for correlating triggers and resolves
    #[arg(short = 'y', long = "incident-key")]
    pub incident_key: Option<String>,

    /// Add the given KEY=VALUE pair to the event details
    #[arg(short = 'f', long = "field", value_parser = parse_key_val)]
    pub fields: Vec<(String, String)>,
}

fn event_type_for(notification_type: &str) -> anyhow::Result<&'static str> {
    match notification_type {
        "PROBLEM" => Ok("trigger"),
        "ACKNOWLEDGEMENT" => Ok("acknowledge"),
        "RECOVERY" => Ok("resolve"),
        other => anyhow::bail!(
            "notification-type must be one of PROBLEM, ACKNOWLEDGEMENT, RECOVERY (got {other:?})"
        ),
    }
}

fn required_fields_for(source_type: &str) -> anyhow::Result<&'static [&'static str]> {
    match source_type {
        "host" => Ok(&["HOSTNAME", "HOSTSTATE"]),
        "service" => Ok(&["HOSTNAME", "SERVICEDESC", "SERVICESTATE"]),
        other => anyhow::bail!("source-type must be one of host, service (got {other:?})"),
    }
}

pub(crate) fn build_event(args: NagiosArgs) -> anyhow::Result<EventV1> {
    let event_type = event_type_for(&args.notification_type)?;
    let required = required_fields_for(&args.source_type)?;

    let mut details: BTreeMap<String, String> = args.fields.iter().cloned().collect();
    for field in required {
        if !details.contains_key(*field) {
            anyhow::bail!(
                "the {field} field must be set for source-type {:?} using the -f flag",
                args.source_type
            );
        }
    }

    let description = required
        .iter()
        .map(|field| format!("{field}={}", details[*field]))
        .collect::<Vec<_>>()
        .join("; ");

    let incident_key = args.incident_key.unwrap_or_else(|| {
        if args.source_type == "host" {
            format!("event_source=host;host_name={}", details["HOSTNAME"])
        } else {
            format!(
                "event_source=service;host_name={};service_desc={}",
                details["HOSTNAME"], details["SERVICEDESC"]
            )
        }
    });

    details.insert("pd_nagios_object".to_string(), args.source_type.clone());

    Ok(EventV1 {
        service_key: args.service_key,
        event_type: event_type.to_string(),
        incident_key: Some(incident_key),
        description,
        details: Some(Value::Object(
            details
                .into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect(),
        )),
        client: None,
        client_url: None,
    })
}

pub async fn run(config: &Config, command: NagiosCommand) -> anyhow::Result<()> {
    let NagiosCommand::Enqueue(args) = command;
    let event = build_event(args)?;
    let client = crate::cli::client(config)?;
    let response = client.send(EventVersion::V1, &event).await?;
    crate::cli::print_response(response).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(source_type: &str, fields: &[(&str, &str)]) -> NagiosArgs {
        NagiosArgs {
            service_key: "11863b592c824bfc8989d9cba76abcde".to_string(),
            notification_type: "PROBLEM".to_string(),
            source_type: source_type.to_string(),
            incident_key: None,
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn host_problems_build_a_trigger_with_a_derived_incident_key() {
        let event = build_event(args(
            "host",
            &[("HOSTNAME", "web-1"), ("HOSTSTATE", "DOWN")],
        ))
        .unwrap();

        assert_eq!(event.event_type, "trigger");
        assert_eq!(event.description, "HOSTNAME=web-1; HOSTSTATE=DOWN");
        assert_eq!(
            event.incident_key.as_deref(),
            Some("event_source=host;host_name=web-1")
        );
        let details = event.details.unwrap();
        assert_eq!(details["pd_nagios_object"], "host");
    }

    #[test]
    fn service_problems_include_the_service_description_in_the_key() {
        let event = build_event(args(
            "service",
            &[
                ("HOSTNAME", "db-1"),
                ("SERVICEDESC", "mysql"),
                ("SERVICESTATE", "CRITICAL"),
            ],
        ))
        .unwrap();

        assert_eq!(
            event.incident_key.as_deref(),
            Some("event_source=service;host_name=db-1;service_desc=mysql")
        );
    }

    #[test]
    fn recovery_maps_to_resolve() {
        let mut recovery = args("host", &[("HOSTNAME", "web-1"), ("HOSTSTATE", "UP")]);
        recovery.notification_type = "RECOVERY".to_string();
        assert_eq!(build_event(recovery).unwrap().event_type, "resolve");
    }

    #[test]
    fn missing_required_fields_are_rejected() {
        assert!(build_event(args("host", &[("HOSTNAME", "web-1")])).is_err());
        assert!(build_event(args("service", &[("HOSTNAME", "web-1")])).is_err());

        let mut bad_type = args("host", &[("HOSTNAME", "h"), ("HOSTSTATE", "UP")]);
        bad_type.notification_type = "NOPE".to_string();
        assert!(build_event(bad_type).is_err());
    }

    #[test]
    fn an_explicit_incident_key_wins() {
        let mut with_key = args("host", &[("HOSTNAME", "web-1"), ("HOSTSTATE", "DOWN")]);
        with_key.incident_key = Some("custom".to_string());
        assert_eq!(
            build_event(with_key).unwrap().incident_key.as_deref(),
            Some("custom")
        );
    }
}
