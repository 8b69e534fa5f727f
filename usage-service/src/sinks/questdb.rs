use std::time::Duration;

use sqlx::{postgres::PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    pipeline::PipelineError,
    statistics::{StatisticData, StatisticMetadata},
};

use super::StatisticsStore;

const INSERT_CHUNK: usize = 500;

/// WAL table with upsert dedup on `(ts, row_id)`; re-sent rows replace the
/// stored ones instead of piling up.
pub const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS water_usage_statistics (\
ts TIMESTAMP, row_id SYMBOL, statistic_id SYMBOL, source SYMBOL, unit SYMBOL, state DOUBLE, sum DOUBLE\
) TIMESTAMP(ts) PARTITION BY DAY WAL DEDUP UPSERT KEYS(ts, row_id)";

/// Writes statistics rows to the `water_usage_statistics` table over pgwire.
///
/// Every row carries a deterministic `row_id`, and the table is created with
/// `DEDUP UPSERT KEYS(ts, row_id)`, so the full series can be re-sent on
/// every poll.
pub struct QuestDbStatisticsStore {
    pool: PgPool,
    max_retries: u32,
    retry_backoff: Duration,
}

impl QuestDbStatisticsStore {
    pub fn new(pool: PgPool, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            pool,
            max_retries,
            retry_backoff,
        }
    }

    /// Creates the statistics table when it does not exist yet.
    pub async fn ensure_table(&self) -> Result<(), PipelineError> {
        sqlx::query(CREATE_TABLE_SQL)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::Sink(format!("failed to create water_usage_statistics: {e}")))?;
        tracing::info!("water_usage_statistics table ready");
        Ok(())
    }

    async fn flush_chunk(&self, metadata: &StatisticMetadata, chunk: &[StatisticData]) -> Result<(), PipelineError> {
        let mut attempt: u32 = 0;
        loop {
            match self.insert_chunk(metadata, chunk).await {
                Ok(()) => {
                    metrics::counter!("questdb_statistics_rows_total").increment(chunk.len() as u64);
                    return Ok(());
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(error = %e, attempt, "questdb statistics write failed, retrying with backoff");
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "questdb statistics write failed, giving up");
                    metrics::counter!("questdb_sink_errors_total").increment(1);
                    return Err(PipelineError::Sink(e.to_string()));
                }
            }
        }
    }

    async fn insert_chunk(&self, metadata: &StatisticMetadata, chunk: &[StatisticData]) -> Result<(), sqlx::Error> {
        insert_query(metadata, chunk).build().execute(&self.pool).await.map(|_| ())
    }
}

fn insert_query<'a>(metadata: &'a StatisticMetadata, chunk: &'a [StatisticData]) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO water_usage_statistics (ts, row_id, statistic_id, source, unit, state, sum) ",
    );

    builder.push_values(chunk, |mut b, row| {
        b.push_bind(row.start)
            .push_bind(row_id(&metadata.statistic_id, row.start))
            .push_bind(&metadata.statistic_id)
            .push_bind(&metadata.source)
            .push_bind(metadata.unit_of_measurement)
            .push_bind(row.state)
            .push_bind(row.sum);
    });

    builder
}

#[async_trait::async_trait]
impl StatisticsStore for QuestDbStatisticsStore {
    async fn add_external_statistics(
        &self,
        metadata: &StatisticMetadata,
        rows: &[StatisticData],
    ) -> Result<(), PipelineError> {
        for chunk in rows.chunks(INSERT_CHUNK) {
            self.flush_chunk(metadata, chunk).await?;
        }
        Ok(())
    }
}

/// Stable id of one statistic row: the series id plus the row's instant.
fn row_id(statistic_id: &str, start: OffsetDateTime) -> String {
    let mut h = blake3::Hasher::new();
    h.update(&(statistic_id.len() as u32).to_le_bytes());
    h.update(statistic_id.as_bytes());
    h.update(&start.unix_timestamp_nanos().to_le_bytes());
    h.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_client::AccountId;
    use time::macros::datetime;

    #[test]
    fn table_is_created_with_upsert_dedup_on_row_id() {
        assert!(CREATE_TABLE_SQL.starts_with("CREATE TABLE IF NOT EXISTS water_usage_statistics ("));
        assert!(CREATE_TABLE_SQL.contains("row_id SYMBOL"));
        assert!(CREATE_TABLE_SQL.contains("TIMESTAMP(ts) PARTITION BY DAY WAL"));
        assert!(CREATE_TABLE_SQL.ends_with("DEDUP UPSERT KEYS(ts, row_id)"));
    }

    #[test]
    fn insert_binds_seven_columns_per_row() {
        let meta = StatisticMetadata::usage("DSRSD", &AccountId::parse("1").unwrap());
        let rows = vec![
            StatisticData { start: datetime!(2024-01-01 00:00 -8), state: 1.0, sum: 1.0 },
            StatisticData { start: datetime!(2024-01-02 00:00 -8), state: 2.0, sum: 3.0 },
        ];

        let builder = insert_query(&meta, &rows);
        let sql = builder.sql().to_string();

        assert!(sql.starts_with(
            "INSERT INTO water_usage_statistics (ts, row_id, statistic_id, source, unit, state, sum) VALUES "
        ));
        assert!(sql.contains("($1, $2, $3, $4, $5, $6, $7), ($8, $9, $10, $11, $12, $13, $14)"));
    }

    #[test]
    fn row_id_ignores_offset_but_not_instant_or_series() {
        let a = row_id("dsrsd_water_usage:1_usage", datetime!(2024-01-01 00:00 -8));
        let same_instant = row_id("dsrsd_water_usage:1_usage", datetime!(2024-01-01 08:00 UTC));
        let next_day = row_id("dsrsd_water_usage:1_usage", datetime!(2024-01-02 00:00 -8));
        let other_account = row_id("dsrsd_water_usage:2_usage", datetime!(2024-01-01 00:00 -8));

        assert_eq!(a, same_instant);
        assert_ne!(a, next_day);
        assert_ne!(a, other_account);
        assert_eq!(a.len(), 64);
    }
}
