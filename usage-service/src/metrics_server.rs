use std::net::SocketAddr;

use anyhow::Context;
use axum::{extract::State, routing::get, Json, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::sensor::{SensorSnapshot, WaterUsageSensor};

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Installs the Prometheus recorder and serves `/metrics` and `/sensor`.
pub fn init(bind_addr: &str, sensor: WaterUsageSensor) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .with_context(|| format!("invalid metrics bind address {bind_addr}"))?;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus metrics recorder")?;
    // Only the first call installs a recorder.
    let _ = PROM_HANDLE.set(handle);

    tokio::spawn(async move {
        let app = router(sensor);

        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                tracing::info!(%addr, "metrics server listening");
                if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                    tracing::error!(error = %e, "metrics server error");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to bind metrics listener");
            }
        }
    });

    Ok(())
}

fn router(sensor: WaterUsageSensor) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/sensor", get(sensor_handler))
        .with_state(sensor)
}

async fn metrics_handler() -> String {
    PROM_HANDLE.get().map(PrometheusHandle::render).unwrap_or_default()
}

async fn sensor_handler(State(sensor): State<WaterUsageSensor>) -> Json<SensorSnapshot> {
    Json(sensor.snapshot().await)
}
