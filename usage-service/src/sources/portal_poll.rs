use std::{sync::Arc, time::Duration};

use portal_client::{UsagePoll, UsagePortalClient};
use tokio::{sync::Mutex, time::MissedTickBehavior};

use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

/// Runs one full portal cycle per tick and emits its result.
///
/// The first tick fires immediately. A failed cycle is emitted as an error
/// item and polling continues on the next tick.
#[derive(Clone)]
pub struct PortalPollSource {
    client: Arc<Mutex<Option<UsagePortalClient>>>,
    interval: Duration,
    days_back: u32,
    max_polls: Option<u64>,
}

impl PortalPollSource {
    pub fn new(client: UsagePortalClient, interval: Duration, days_back: u32) -> Self {
        Self {
            client: Arc::new(Mutex::new(Some(client))),
            interval,
            days_back,
            max_polls: None,
        }
    }

    /// Ends the stream after `n` cycles; used by one-shot runs and tests.
    pub fn with_max_polls(mut self, n: u64) -> Self {
        self.max_polls = Some(n);
        self
    }
}

#[async_trait::async_trait]
impl Source<UsagePoll> for PortalPollSource {
    async fn stream(&self) -> EnvelopeStream<UsagePoll> {
        let Some(mut client) = self.client.lock().await.take() else {
            let err = PipelineError::Source("portal poll stream already taken".to_string());
            return Box::pin(futures::stream::iter([Err(err)]));
        };

        let period = self.interval;
        let days_back = self.days_back;
        let max_polls = self.max_polls;

        let s = async_stream::stream! {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut polls: u64 = 0;

            loop {
                if max_polls.is_some_and(|max| polls >= max) {
                    break;
                }
                ticker.tick().await;
                polls += 1;
                metrics::counter!("portal_polls_total").increment(1);

                match client.get_usage(days_back).await {
                    Ok(poll) => {
                        tracing::info!(
                            account = %poll.account_id,
                            records = poll.records.len(),
                            skipped = poll.skipped,
                            "portal poll complete"
                        );
                        yield Ok(Envelope::new(poll));
                    }
                    Err(e) => {
                        let kind = e.kind().as_str();
                        tracing::warn!(error = %e, kind, "portal poll failed");
                        metrics::counter!("portal_poll_failures_total", "kind" => kind).increment(1);
                        yield Err(PipelineError::Source(format!("{kind}: {e}")));
                    }
                }
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use portal_client::{Credentials, PortalConfig};

    fn unreachable_client() -> UsagePortalClient {
        let config = PortalConfig::new(
            "http://127.0.0.1:1",
            "dsrsd",
            "America/Los_Angeles",
            Duration::from_secs(2),
        )
        .unwrap();
        UsagePortalClient::new(config, Credentials::new("alice", "secret")).unwrap()
    }

    #[tokio::test]
    async fn unreachable_portal_yields_errors_and_keeps_polling() {
        let source = PortalPollSource::new(unreachable_client(), Duration::from_millis(10), 7).with_max_polls(2);

        let items: Vec<_> = source.stream().await.collect().await;

        assert_eq!(items.len(), 2);
        for item in items {
            let err = item.unwrap_err().to_string();
            assert!(err.contains("transport"), "unexpected error: {err}");
        }
    }

    #[tokio::test]
    async fn second_stream_is_a_single_error() {
        let source = PortalPollSource::new(unreachable_client(), Duration::from_millis(10), 7).with_max_polls(0);

        let first: Vec<_> = source.stream().await.collect().await;
        assert!(first.is_empty());

        let second: Vec<_> = source.stream().await.collect().await;
        assert_eq!(second.len(), 1);
        assert!(second[0].as_ref().is_err());
    }
}
