use clap::Args;

use fanout::EventVersion;

use super::payload::{EventV2, PayloadV2, details_map, parse_key_val};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct EnqueueArgs {
    /// Service Events API key
    #[arg(short = 'k', long = "routing-key")]
    pub routing_key: String,

    /// The type of event: trigger, acknowledge, or resolve
    #[arg(short = 't', long = "event-action", default_value = "trigger")]
    pub event_action: String,

    /// Deduplication key for correlating triggers and resolves
    #[arg(short = 'y', long = "dedup-key")]
    pub dedup_key: Option<String>,

    /// A brief text summary of the event
    #[arg(short = 'd', long = "summary")]
    pub summary: String,

    /// The unique location of the affected system
    #[arg(short = 'u', long = "source")]
    pub source: String,

    /// The perceived severity: critical, warning, error, or info
    #[arg(short = 'e', long = "severity", default_value = "error")]
    pub severity: String,

    /// Component of the source machine responsible for the event
    #[arg(long = "component")]
    pub component: Option<String>,

    /// Logical grouping of components of a service
    #[arg(short = 'g', long = "group")]
    pub group: Option<String>,

    /// The class/type of the event
    #[arg(long = "class")]
    pub class: Option<String>,

    /// Add the given KEY=VALUE pair to the event custom details
    #[arg(short = 'f', long = "field", value_parser = parse_key_val)]
    pub fields: Vec<(String, String)>,
}

impl EnqueueArgs {
    pub(crate) fn into_event(self) -> EventV2 {
        EventV2 {
            routing_key: self.routing_key,
            event_action: self.event_action,
            dedup_key: self.dedup_key,
            payload: PayloadV2 {
                summary: self.summary,
                source: self.source,
                severity: self.severity,
                component: self.component,
                group: self.group,
                class: self.class,
                custom_details: details_map(&self.fields),
            },
        }
    }
}

pub async fn run(config: &Config, args: EnqueueArgs) -> anyhow::Result<()> {
    let client = super::client(config)?;
    let response = client.send(EventVersion::V2, &args.into_event()).await?;
    super::print_response(response).await
}
