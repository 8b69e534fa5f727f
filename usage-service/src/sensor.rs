use std::sync::Arc;

use portal_client::{UsagePoll, UsageRecord};
use serde::Serialize;
use time::{macros::format_description, OffsetDateTime};
use tokio::sync::RwLock;

use crate::statistics::{UsageHistory, UNIT_GALLONS};

#[derive(Debug, Clone, Default, Serialize)]
pub struct SensorAttributes {
    pub time_series: Vec<UsageRecord>,
    pub username: String,
    pub account_number: Option<String>,
    /// Long form, e.g. `January 08, 2024`.
    pub start_date: Option<String>,
    /// Last full day of the window: the day before the poll.
    pub end_date: Option<String>,
    pub projected_bill: Option<f64>,
    pub current_bill: Option<f64>,
}

/// Published state of the water usage sensor entity.
#[derive(Debug, Clone, Serialize)]
pub struct SensorSnapshot {
    pub unique_id: String,
    pub name: String,
    pub unit_of_measurement: &'static str,
    pub device_class: &'static str,
    pub state_class: &'static str,
    pub icon: &'static str,
    /// Total gallons over the known history; `None` until the first poll lands.
    pub state: Option<f64>,
    pub attributes: SensorAttributes,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_updated: Option<OffsetDateTime>,
}

/// Shared handle to the sensor; cloned into the sink and the HTTP server.
#[derive(Debug, Clone)]
pub struct WaterUsageSensor {
    inner: Arc<RwLock<SensorSnapshot>>,
}

impl WaterUsageSensor {
    pub fn new(display_name: &str, username: &str) -> Self {
        let snapshot = SensorSnapshot {
            unique_id: format!("{display_name}_{username}"),
            name: format!("{display_name} Water Usage"),
            unit_of_measurement: UNIT_GALLONS,
            device_class: "water",
            state_class: "total",
            icon: "mdi:water",
            state: None,
            attributes: SensorAttributes {
                username: username.to_string(),
                ..SensorAttributes::default()
            },
            last_updated: None,
        };
        Self {
            inner: Arc::new(RwLock::new(snapshot)),
        }
    }

    pub async fn snapshot(&self) -> SensorSnapshot {
        self.inner.read().await.clone()
    }

    /// Replaces state and attributes after a successful poll.
    pub async fn publish(&self, history: &UsageHistory, poll: &UsagePoll) {
        let total = history.total_gallons();
        metrics::gauge!("water_usage_total_gallons").set(total);

        let mut snapshot = self.inner.write().await;
        snapshot.state = Some(total);
        snapshot.last_updated = Some(OffsetDateTime::now_utc());

        let attributes = &mut snapshot.attributes;
        attributes.time_series = history.records();
        attributes.account_number = Some(poll.account_id.to_string());
        attributes.start_date = long_date(poll.window.start);
        attributes.end_date = poll
            .window
            .end
            .checked_sub(time::Duration::days(1))
            .and_then(long_date);
        if let Some(billing) = &poll.billing {
            attributes.projected_bill = billing.projected_total;
            attributes.current_bill = billing.current_total;
        }
    }
}

fn long_date(ts: OffsetDateTime) -> Option<String> {
    ts.format(format_description!("[month repr:long] [day], [year]")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_client::{AccountId, BillingSnapshot, UsageWindow};
    use time::macros::datetime;

    fn poll(records: Vec<UsageRecord>, billing: Option<BillingSnapshot>) -> UsagePoll {
        UsagePoll {
            account_id: AccountId::parse("ACC-9").unwrap(),
            window: UsageWindow {
                start: datetime!(2024-01-08 10:00 -8),
                end: datetime!(2024-01-15 10:00 -8),
            },
            records,
            skipped: 0,
            billing,
        }
    }

    #[tokio::test]
    async fn new_sensor_has_identity_but_no_state() {
        let sensor = WaterUsageSensor::new("DSRSD", "alice");
        let snapshot = sensor.snapshot().await;

        assert_eq!(snapshot.unique_id, "DSRSD_alice");
        assert_eq!(snapshot.name, "DSRSD Water Usage");
        assert_eq!(snapshot.unit_of_measurement, "gal");
        assert_eq!(snapshot.icon, "mdi:water");
        assert!(snapshot.state.is_none());
        assert_eq!(snapshot.attributes.username, "alice");
    }

    #[tokio::test]
    async fn publish_sets_total_and_attributes() {
        let sensor = WaterUsageSensor::new("DSRSD", "alice");
        let records = vec![
            UsageRecord { ts: datetime!(2024-01-09 00:00 -8), gallons: 100.0 },
            UsageRecord { ts: datetime!(2024-01-10 00:00 -8), gallons: 50.5 },
        ];
        let mut history = UsageHistory::default();
        history.merge(&records);

        let billing = BillingSnapshot {
            projected_total: Some(90.0),
            current_total: Some(45.0),
        };
        sensor.publish(&history, &poll(records, Some(billing))).await;

        let snapshot = sensor.snapshot().await;
        assert_eq!(snapshot.state, Some(150.5));
        assert_eq!(snapshot.attributes.time_series.len(), 2);
        assert_eq!(snapshot.attributes.account_number.as_deref(), Some("ACC-9"));
        assert_eq!(snapshot.attributes.start_date.as_deref(), Some("January 08, 2024"));
        assert_eq!(snapshot.attributes.end_date.as_deref(), Some("January 14, 2024"));
        assert_eq!(snapshot.attributes.projected_bill, Some(90.0));
        assert!(snapshot.last_updated.is_some());
    }

    #[tokio::test]
    async fn missing_billing_keeps_previous_bill() {
        let sensor = WaterUsageSensor::new("DSRSD", "alice");
        let history = UsageHistory::default();
        let billing = BillingSnapshot {
            projected_total: Some(90.0),
            current_total: Some(45.0),
        };

        sensor.publish(&history, &poll(vec![], Some(billing))).await;
        sensor.publish(&history, &poll(vec![], None)).await;

        let snapshot = sensor.snapshot().await;
        assert_eq!(snapshot.attributes.current_bill, Some(45.0));
        assert_eq!(snapshot.state, Some(0.0));
    }
}
