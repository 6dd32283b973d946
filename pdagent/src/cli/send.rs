use clap::Args;
use serde_json::Value;

use fanout::EventVersion;

use super::payload::{EventV1, details_map, parse_key_val};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Service key for the legacy (v1) events API
    #[arg(short = 'k', long = "service-key")]
    pub service_key: String,

    /// Event type: trigger, acknowledge, or resolve
    #[arg(short = 't', long = "event-type", default_value = "trigger")]
    pub event_type: String,

    /// Incident key for correlating triggers and resolves
    #[arg(short = 'i', long = "incident-key")]
    pub incident_key: Option<String>,

    /// Short description of the problem
    #[arg(short = 'd', long = "description")]
    pub description: String,

    /// The name of the monitoring client submitting the event
    #[arg(short = 'c', long = "client")]
    pub client: Option<String>,

    /// URL of the monitoring client
    #[arg(short = 'u', long = "client-url")]
    pub client_url: Option<String>,

    /// Add the given KEY=VALUE pair to the event details
    #[arg(short = 'f', long = "field", value_parser = parse_key_val)]
    pub fields: Vec<(String, String)>,
}

impl SendArgs {
    pub(crate) fn into_event(self) -> EventV1 {
        let details = if self.fields.is_empty() {
            None
        } else {
            Some(Value::Object(
                details_map(&self.fields).into_iter().collect(),
            ))
        };

        EventV1 {
            service_key: self.service_key,
            event_type: self.event_type,
            incident_key: self.incident_key,
            description: self.description,
            details,
            client: self.client,
            client_url: self.client_url,
        }
    }
}

pub async fn run(config: &Config, args: SendArgs) -> anyhow::Result<()> {
    let client = super::client(config)?;
    let response = client.send(EventVersion::V1, &args.into_event()).await?;
    super::print_response(response).await
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use serde_json::json;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: SendArgs,
    }

    #[test]
    fn flags_map_onto_the_v1_event() {
        let harness = Harness::parse_from([
            "send",
            "-k",
            "11863b592c824bfc8989d9cba76abcde",
            "-d",
            "db on fire",
            "-c",
            "nagios",
            "-u",
            "https://nagios.example.com",
            "-f",
            "HOST=db-1",
        ]);

        let event = harness.args.into_event();
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "service_key": "11863b592c824bfc8989d9cba76abcde",
                "event_type": "trigger",
                "description": "db on fire",
                "details": {"HOST": "db-1"},
                "client": "nagios",
                "client_url": "https://nagios.example.com"
            })
        );
    }
}
