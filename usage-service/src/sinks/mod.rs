pub mod ndjson;
pub mod questdb;
pub mod statistics;

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

pub use ndjson::NdjsonStatisticsStore;
pub use questdb::QuestDbStatisticsStore;
pub use statistics::StatisticsSink;

use crate::{
    config::{SinkConfig, SinkKind},
    pipeline::PipelineError,
    statistics::{StatisticData, StatisticMetadata},
};

/// Destination for long-term statistics.
///
/// Each call carries the full series for one statistic id; stores replace
/// rows they already hold rather than appending duplicates.
#[async_trait::async_trait]
pub trait StatisticsStore: Send + Sync {
    async fn add_external_statistics(
        &self,
        metadata: &StatisticMetadata,
        rows: &[StatisticData],
    ) -> Result<(), PipelineError>;
}

pub enum StatisticsBackend {
    Ndjson(NdjsonStatisticsStore),
    QuestDb(QuestDbStatisticsStore),
}

impl StatisticsBackend {
    pub async fn from_config(cfg: &SinkConfig) -> anyhow::Result<Self> {
        match cfg.kind {
            SinkKind::Ndjson => Ok(Self::Ndjson(NdjsonStatisticsStore::new(cfg.path.clone()))),
            SinkKind::Questdb => {
                let uri = cfg
                    .questdb_uri
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("sink.questdb_uri is required for the questdb sink"))?;
                let pool = PgPoolOptions::new()
                    .max_connections(cfg.max_connections)
                    .connect(uri)
                    .await?;
                let store = QuestDbStatisticsStore::new(pool, cfg.max_retries, Duration::from_millis(cfg.retry_backoff_ms));
                store.ensure_table().await?;
                Ok(Self::QuestDb(store))
            }
        }
    }
}

#[async_trait::async_trait]
impl StatisticsStore for StatisticsBackend {
    async fn add_external_statistics(
        &self,
        metadata: &StatisticMetadata,
        rows: &[StatisticData],
    ) -> Result<(), PipelineError> {
        match self {
            Self::Ndjson(s) => s.add_external_statistics(metadata, rows).await,
            Self::QuestDb(s) => s.add_external_statistics(metadata, rows).await,
        }
    }
}
