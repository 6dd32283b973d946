use crate::config::Config;

pub async fn run(config: &Config) -> anyhow::Result<()> {
    let client = super::client(config)?;
    let response = client.health_check().await?;
    super::print_response(response).await
}
