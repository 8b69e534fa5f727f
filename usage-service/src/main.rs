use std::sync::Arc;

use anyhow::Result;
use portal_client::{UsagePoll, UsagePortalClient};
use usage_service::{
    config::AppConfig,
    metrics_server,
    observability,
    pipeline::Pipeline,
    sensor::WaterUsageSensor,
    sinks::{StatisticsBackend, StatisticsSink},
    sources::PortalPollSource,
    transform,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    tracing::info!(portal = ?cfg.portal, poll = ?cfg.poll, sink = ?cfg.sink.kind, "starting water usage poller");

    let sensor = WaterUsageSensor::new(&cfg.portal.display_name, cfg.portal.username.trim());

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr, sensor.clone())?;
    }

    let client = UsagePortalClient::new(cfg.portal_config()?, cfg.credentials())?;
    let source = PortalPollSource::new(client, cfg.poll_interval(), cfg.poll.days_back);
    let store = StatisticsBackend::from_config(&cfg.sink).await?;
    let sink = StatisticsSink::new(store, sensor, cfg.portal.display_name.clone());

    let pipeline: Pipeline<_, UsagePoll, _> = Pipeline {
        source,
        transforms: vec![Arc::new(transform::UsagePollValidation)],
        sink,
    };

    pipeline.run().await?;
    Ok(())
}
