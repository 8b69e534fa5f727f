use std::path::PathBuf;

use serde::Serialize;
use tokio::{fs, io::AsyncWriteExt};

use crate::{
    pipeline::PipelineError,
    statistics::{StatisticData, StatisticMetadata},
};

use super::StatisticsStore;

/// Writes the latest statistics to a local file, one JSON object per row.
///
/// Every call rewrites the file through a temporary sibling and a rename, so
/// readers never observe a half-written snapshot.
pub struct NdjsonStatisticsStore {
    path: PathBuf,
}

#[derive(Serialize)]
struct Line<'a> {
    statistic_id: &'a str,
    source: &'a str,
    name: &'a str,
    unit_of_measurement: &'a str,
    #[serde(flatten)]
    row: &'a StatisticData,
}

impl NdjsonStatisticsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn render(metadata: &StatisticMetadata, rows: &[StatisticData]) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for row in rows {
            let line = Line {
                statistic_id: &metadata.statistic_id,
                source: &metadata.source,
                name: &metadata.name,
                unit_of_measurement: metadata.unit_of_measurement,
                row,
            };
            out.push_str(&serde_json::to_string(&line)?);
            out.push('\n');
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl StatisticsStore for NdjsonStatisticsStore {
    async fn add_external_statistics(
        &self,
        metadata: &StatisticMetadata,
        rows: &[StatisticData],
    ) -> Result<(), PipelineError> {
        let body = Self::render(metadata, rows).map_err(|e| PipelineError::Sink(e.to_string()))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| PipelineError::Sink(format!("create {}: {e}", tmp.display())))?;
        file.write_all(body.as_bytes())
            .await
            .map_err(|e| PipelineError::Sink(format!("write {}: {e}", tmp.display())))?;
        file.flush()
            .await
            .map_err(|e| PipelineError::Sink(format!("flush {}: {e}", tmp.display())))?;
        drop(file);

        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| PipelineError::Sink(format!("rename into {}: {e}", self.path.display())))?;

        tracing::debug!(path = %self.path.display(), rows = rows.len(), "statistics file rewritten");
        Ok(())
    }
}
