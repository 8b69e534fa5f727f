use std::time::Duration;

use mockito::{Matcher, Mock, Server, ServerGuard};
use portal_client::{Credentials, PortalConfig, UsagePortalClient};
use serde_json::json;
use time::macros::datetime;

const WEEK_FIXTURE: &str = include_str!("fixtures/timeseries_week.json");

fn client_for(server: &ServerGuard) -> UsagePortalClient {
    let config = PortalConfig::new(&server.url(), "dsrsd", "America/Los_Angeles", Duration::from_secs(5))
        .expect("valid test config");
    UsagePortalClient::new(config, Credentials::new("alice", "secret")).expect("client builds")
}

async fn mock_session(server: &mut ServerGuard) -> (Mock, Mock, Mock) {
    let login = server
        .mock("POST", "/login")
        .with_status(200)
        .with_header("set-cookie", "connect.sid=s%3Aweek; Path=/; HttpOnly")
        .with_body(r#"{"response":200}"#)
        .expect(1)
        .create_async()
        .await;
    let accounts = server
        .mock("GET", "/accounts")
        .match_header("cookie", "connect.sid=s%3Aweek")
        .with_status(200)
        .with_body(
            json!({ "accounts": [
                { "_id": "1001", "IsAMI": false },
                { "_id": "1002", "IsAMI": true, "metricAggregates": { "billAmount": {
                    "projected": { "billing period": { "total": 96.4 } },
                    "current": { "billing period": { "total": "48.10" } }
                }}}
            ]})
            .to_string(),
        )
        .expect(2)
        .create_async()
        .await;
    let logout = server
        .mock("GET", "/logout")
        .match_header("cookie", "connect.sid=s%3Aweek")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    (login, accounts, logout)
}

#[tokio::test]
async fn week_fixture_round_trips_in_order() {
    let mut server = Server::new_async().await;
    let (login, accounts, logout) = mock_session(&mut server).await;
    let timeseries = server
        .mock("GET", "/timeseries")
        .match_query(Matcher::UrlEncoded("accountNumber".into(), "1002".into()))
        .with_status(200)
        .with_body(WEEK_FIXTURE)
        .expect(1)
        .create_async()
        .await;

    let mut client = client_for(&server);
    let poll = client
        .get_usage_at(datetime!(2024-01-15 06:00 UTC), 7)
        .await
        .expect("poll succeeds");

    let expected = [
        (datetime!(2024-01-08 00:00 -8), 142.6),
        (datetime!(2024-01-09 00:00 -8), 98.0),
        (datetime!(2024-01-10 00:00 -8), 0.0),
        (datetime!(2024-01-11 00:00 -8), 210.25),
        (datetime!(2024-01-12 00:00 -8), 175.5),
        (datetime!(2024-01-13 00:00 -8), 63.4),
        (datetime!(2024-01-14 00:00 -8), 120.0),
    ];
    let actual: Vec<_> = poll.records.iter().map(|r| (r.ts, r.gallons)).collect();
    assert_eq!(actual, expected);
    assert!(poll.records.iter().all(|r| poll.window.contains(r.ts)));
    assert_eq!(poll.skipped, 0);
    assert_eq!(poll.account_id.as_str(), "1002");

    let billing = poll.billing.expect("billing present");
    assert_eq!(billing.projected_total, Some(96.4));
    assert_eq!(billing.current_total, Some(48.1));

    login.assert_async().await;
    accounts.assert_async().await;
    timeseries.assert_async().await;
    logout.assert_async().await;
}

#[tokio::test]
async fn record_without_volume_is_dropped_not_the_series() {
    let mut server = Server::new_async().await;
    let (_login, _accounts, logout) = mock_session(&mut server).await;

    let mut fixture: serde_json::Value = serde_json::from_str(WEEK_FIXTURE).expect("fixture is JSON");
    fixture["timeseries"][3]
        .as_object_mut()
        .expect("entry is an object")
        .remove("waterUseActual");
    let _timeseries = server
        .mock("GET", "/timeseries")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(fixture.to_string())
        .create_async()
        .await;

    let mut client = client_for(&server);
    let poll = client
        .get_usage_at(datetime!(2024-01-15 06:00 UTC), 7)
        .await
        .expect("poll succeeds");

    assert_eq!(poll.records.len(), 6);
    assert_eq!(poll.skipped, 1);
    assert!(poll.records.iter().all(|r| r.gallons != 210.25));
    logout.assert_async().await;
}

#[tokio::test]
async fn expired_session_still_logs_out_once() {
    let mut server = Server::new_async().await;
    let (_login, _accounts, logout) = mock_session(&mut server).await;
    let _timeseries = server
        .mock("GET", "/timeseries")
        .with_status(200)
        .with_body("")
        .create_async()
        .await;

    let mut client = client_for(&server);
    let poll = client
        .get_usage_at(datetime!(2024-01-15 06:00 UTC), 7)
        .await
        .expect("login and account succeed");

    assert!(poll.records.is_empty());
    logout.assert_async().await;
}
