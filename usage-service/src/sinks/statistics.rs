use futures::StreamExt;
use portal_client::{AccountId, UsagePoll};
use tokio::sync::Mutex;

use crate::{
    pipeline::{Envelope, PipelineError, Sink},
    sensor::WaterUsageSensor,
    statistics::{StatisticMetadata, UsageHistory},
};

use super::StatisticsStore;

/// Folds poll results into the usage history, then republishes statistics
/// and the sensor.
///
/// A failed poll changes nothing, so the sensor keeps its last good state.
pub struct StatisticsSink<S> {
    store: S,
    sensor: WaterUsageSensor,
    display_name: String,
    state: Mutex<HistoryState>,
}

#[derive(Default)]
struct HistoryState {
    account: Option<AccountId>,
    history: UsageHistory,
}

impl<S: StatisticsStore> StatisticsSink<S> {
    pub fn new(store: S, sensor: WaterUsageSensor, display_name: impl Into<String>) -> Self {
        Self {
            store,
            sensor,
            display_name: display_name.into(),
            state: Mutex::new(HistoryState::default()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn handle(&self, poll: UsagePoll) {
        let mut state = self.state.lock().await;

        if state.account.as_ref() != Some(&poll.account_id) {
            if let Some(previous) = &state.account {
                tracing::info!(from = %previous, to = %poll.account_id, "account changed, resetting usage history");
            }
            state.account = Some(poll.account_id.clone());
            state.history = UsageHistory::default();
        }

        let added = state.history.merge(&poll.records);
        tracing::info!(
            account = %poll.account_id,
            received = poll.records.len(),
            added,
            skipped = poll.skipped,
            known = state.history.len(),
            "usage poll merged"
        );

        let metadata = StatisticMetadata::usage(&self.display_name, &poll.account_id);
        let rows = state.history.statistics();
        if let Err(e) = self.store.add_external_statistics(&metadata, &rows).await {
            tracing::error!(error = %e, statistic_id = %metadata.statistic_id, "failed to write statistics");
            metrics::counter!("statistics_write_failures_total").increment(1);
        }

        self.sensor.publish(&state.history, &poll).await;
        metrics::counter!("usage_records_published_total").increment(added as u64);
    }
}

#[async_trait::async_trait]
impl<S: StatisticsStore> Sink<UsagePoll> for StatisticsSink<S> {
    async fn run<I>(&self, mut input: I) -> Result<(), PipelineError>
    where
        I: futures::Stream<Item = Result<Envelope<UsagePoll>, PipelineError>> + Send + Unpin + 'static,
    {
        while let Some(item) = input.next().await {
            match item {
                Ok(env) => self.handle(env.payload).await,
                Err(e) => {
                    tracing::error!(error = %e, "usage poll failed; keeping previous sensor state");
                }
            }
        }
        Ok(())
    }
}
