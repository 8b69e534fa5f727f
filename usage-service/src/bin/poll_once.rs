use anyhow::{Context, Result};
use portal_client::{UsagePoll, UsagePortalClient};
use std::{env, sync::Arc};
use usage_service::{
    config::{check_days_back, AppConfig},
    observability,
    pipeline::Pipeline,
    sensor::WaterUsageSensor,
    sinks::{StatisticsBackend, StatisticsSink},
    sources::PortalPollSource,
    transform,
};

/// Runs a single poll cycle, writes statistics and prints the sensor state.
///
/// usage: poll_once [days_back]
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    let days_back = match env::args().nth(1) {
        Some(raw) => {
            let days_back: u32 = raw.parse().with_context(|| format!("invalid days_back '{raw}'"))?;
            check_days_back(days_back)?
        }
        None => cfg.poll.days_back,
    };

    let sensor = WaterUsageSensor::new(&cfg.portal.display_name, cfg.portal.username.trim());
    let client = UsagePortalClient::new(cfg.portal_config()?, cfg.credentials())?;
    let source = PortalPollSource::new(client, cfg.poll_interval(), days_back).with_max_polls(1);
    let store = StatisticsBackend::from_config(&cfg.sink).await?;

    let pipeline: Pipeline<_, UsagePoll, _> = Pipeline {
        source,
        transforms: vec![Arc::new(transform::UsagePollValidation)],
        sink: StatisticsSink::new(store, sensor.clone(), cfg.portal.display_name.clone()),
    };
    pipeline.run().await?;

    let snapshot = sensor.snapshot().await;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
