use reqwest::{
    header::{HeaderMap, ACCEPT, CONTENT_TYPE, COOKIE},
    Client, Method, RequestBuilder, StatusCode,
};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::{
    responses::{parse_accounts, parse_billing, parse_timeseries},
    session::{session_token_from_headers, Session},
    Credentials, PortalConfig,
};
use crate::domain::{select_account, AccountId, BillingSnapshot, UsagePoll, UsageSeries, UsageWindow};
use crate::error::{PortalError, PortalResult};

const LOGIN: &str = "login";
const LOGOUT: &str = "logout";
const NOTES: &str = "notes";
const ACCOUNTS: &str = "accounts";
const TIMESERIES: &str = "timeseries";

const LOGIN_SUCCESS: i64 = 200;
const DAILY_INTERVAL: &str = "1 day";
const USAGE_METRICS: &[&str] = &["waterUse", "waterUseReading"];

#[derive(serde::Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Client for one portal account.
///
/// Holds the credentials and the mutable session of the current poll. Calls
/// are strictly sequential; the session is never shared between polls.
pub struct UsagePortalClient {
    http: Client,
    config: PortalConfig,
    credentials: Credentials,
    session: Option<Session>,
    account_id: Option<AccountId>,
}

impl UsagePortalClient {
    pub fn new(config: PortalConfig, credentials: Credentials) -> PortalResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PortalError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            config,
            credentials,
            session: None,
            account_id: None,
        })
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn username(&self) -> &str {
        self.credentials.username()
    }

    /// Token of the current, non-stale session.
    pub fn session_token(&self) -> Option<&str> {
        self.session
            .as_ref()
            .filter(|s| !s.is_stale())
            .map(Session::token)
    }

    pub fn account_id(&self) -> Option<&AccountId> {
        self.account_id.as_ref()
    }

    /// Logs in with the configured credentials and stores the session cookie.
    ///
    /// Any previous session and cached account are discarded first. On failure
    /// no session is kept.
    pub async fn login(&mut self) -> PortalResult<()> {
        self.session = None;
        self.account_id = None;

        match self.try_login().await {
            Ok(()) => {
                info!(username = %self.credentials.username(), "portal login succeeded");
                Ok(())
            }
            Err(e) => {
                self.session = None;
                warn!(username = %self.credentials.username(), error = %e, "portal login failed");
                Err(e)
            }
        }
    }

    async fn try_login(&mut self) -> PortalResult<()> {
        // The landing page hands out the initial session cookie.
        let landing = self
            .request(Method::GET, "")
            .send()
            .await
            .map_err(|source| PortalError::Transport { endpoint: LOGIN, source })?;
        self.remember_session(landing.headers());

        debug!("sending portal login request");
        let response = self
            .request(Method::POST, LOGIN)
            .json(&LoginRequest {
                username: self.credentials.username(),
                password: self.credentials.password(),
            })
            .send()
            .await
            .map_err(|source| PortalError::Transport { endpoint: LOGIN, source })?;
        self.remember_session(response.headers());

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| PortalError::Transport { endpoint: LOGIN, source })?;

        let accepted = match serde_json::from_str::<Value>(&body) {
            Ok(json) => json.get("response").and_then(status_code) == Some(LOGIN_SUCCESS),
            Err(_) => {
                debug!(%status, "login response is not JSON, probing session");
                self.probe_session().await?
            }
        };

        if !accepted {
            return Err(PortalError::Auth("portal rejected the credentials".to_string()));
        }
        if self.session.is_none() {
            return Err(PortalError::Auth("portal did not issue a session cookie".to_string()));
        }
        Ok(())
    }

    /// An authenticated page answers 200 only for a logged-in session.
    async fn probe_session(&mut self) -> PortalResult<bool> {
        if self.session.is_none() {
            return Ok(false);
        }
        let response = self
            .request(Method::GET, NOTES)
            .send()
            .await
            .map_err(|source| PortalError::Transport { endpoint: NOTES, source })?;
        self.remember_session(response.headers());
        Ok(response.status() == StatusCode::OK)
    }

    /// Resolves and caches the account id, preferring an AMI meter.
    pub async fn resolve_account(&mut self) -> PortalResult<AccountId> {
        let body = self.get_json(ACCOUNTS, &[]).await?;
        let accounts = parse_accounts(&body)?;

        let account = select_account(&accounts).ok_or_else(|| PortalError::DataUnavailable {
            endpoint: ACCOUNTS,
            reason: "account list is empty".to_string(),
        })?;

        info!(
            account = %account.id,
            ami = account.is_ami,
            candidates = accounts.len(),
            "resolved portal account"
        );
        self.account_id = Some(account.id.clone());
        Ok(account.id.clone())
    }

    pub async fn fetch_billing_snapshot(&mut self) -> PortalResult<BillingSnapshot> {
        let body = self.get_json(ACCOUNTS, &[]).await?;
        let snapshot = parse_billing(&body, self.account_id.as_ref())?;
        debug!(?snapshot, "fetched billing snapshot");
        Ok(snapshot)
    }

    /// Daily usage for `account_id` over `window`.
    pub async fn fetch_usage(
        &mut self,
        window: &UsageWindow,
        account_id: &AccountId,
    ) -> PortalResult<UsageSeries> {
        let mut query = vec![
            ("startTime", window.start_param()?),
            ("endTime", window.end_param()?),
            ("interval", DAILY_INTERVAL.to_string()),
            ("districtName", self.config.district_name.clone()),
            ("accountNumber", account_id.to_string()),
        ];
        query.extend(USAGE_METRICS.iter().map(|metric| ("metrics", (*metric).to_string())));

        let body = self.get_json(TIMESERIES, &query).await?;
        let series = parse_timeseries(&body, self.config.time_zone)?;

        info!(
            account = %account_id,
            records = series.records.len(),
            skipped = series.skipped.len(),
            "fetched usage time series"
        );
        Ok(series)
    }

    /// Ends the session. Failures are logged only.
    pub async fn logout(&mut self) {
        let Some(session) = self.session.take() else {
            debug!("no portal session to log out");
            return;
        };

        let result = self
            .http
            .get(self.config.url(LOGOUT))
            .header(COOKIE, session.cookie_header())
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => debug!("portal logout succeeded"),
            Ok(response) => warn!(status = %response.status(), "portal logout failed"),
            Err(e) => warn!(error = %e, "portal logout request failed"),
        }
    }

    /// One full poll cycle over the last `days_back` days.
    pub async fn get_usage(&mut self, days_back: u32) -> PortalResult<UsagePoll> {
        self.get_usage_at(OffsetDateTime::now_utc(), days_back).await
    }

    /// Same as [`get_usage`](Self::get_usage) with an explicit clock.
    ///
    /// Login and account resolution failures abort the cycle. Billing and
    /// usage failures are logged and leave their part of the result empty.
    /// Every cycle that logged in also logs out, exactly once.
    pub async fn get_usage_at(&mut self, now: OffsetDateTime, days_back: u32) -> PortalResult<UsagePoll> {
        self.login().await?;
        let outcome = self.collect_usage(now, days_back).await;
        self.logout().await;
        outcome
    }

    async fn collect_usage(&mut self, now: OffsetDateTime, days_back: u32) -> PortalResult<UsagePoll> {
        let window = UsageWindow::trailing_days(now, days_back, self.config.time_zone)?;
        let account_id = self.resolve_account().await?;

        let billing = match self.fetch_billing_snapshot().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(error = %e, kind = e.kind().as_str(), "billing snapshot unavailable");
                None
            }
        };

        let series = match self.fetch_usage(&window, &account_id).await {
            Ok(series) => series,
            Err(e) => {
                warn!(error = %e, kind = e.kind().as_str(), "usage fetch failed");
                UsageSeries::default()
            }
        };

        Ok(UsagePoll {
            account_id,
            window,
            records: series.records,
            skipped: series.skipped.len(),
            billing,
        })
    }

    /// Authenticated GET returning the decoded JSON body.
    ///
    /// Refuses to run without a live session. A 401/403 or an empty or
    /// undecodable body marks the session stale.
    async fn get_json(&mut self, endpoint: &'static str, query: &[(&str, String)]) -> PortalResult<Value> {
        if self.session_token().is_none() {
            return Err(PortalError::Auth(format!("no active session for {endpoint}")));
        }

        debug!(endpoint, "sending portal request");
        let response = self
            .request(Method::GET, endpoint)
            .query(query)
            .send()
            .await
            .map_err(|source| PortalError::Transport { endpoint, source })?;
        self.remember_session(response.headers());

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.mark_session_stale();
            return Err(PortalError::Auth(format!("{endpoint} answered {status}")));
        }
        if !status.is_success() {
            return Err(PortalError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| PortalError::Transport { endpoint, source })?;
        if body.trim().is_empty() {
            self.mark_session_stale();
            return Err(PortalError::Parse {
                endpoint,
                reason: "empty body".to_string(),
            });
        }

        match serde_json::from_str(&body) {
            Ok(json) => Ok(json),
            Err(e) => {
                self.mark_session_stale();
                Err(PortalError::Parse {
                    endpoint,
                    reason: e.to_string(),
                })
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .http
            .request(method, self.config.url(path))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        if let Some(session) = &self.session {
            builder = builder.header(COOKIE, session.cookie_header());
        }
        builder
    }

    fn remember_session(&mut self, headers: &HeaderMap) {
        if let Some(token) = session_token_from_headers(headers) {
            self.session = Some(Session::new(token));
        }
    }

    fn mark_session_stale(&mut self) {
        if let Some(session) = self.session.as_mut() {
            warn!("portal session looks expired");
            session.mark_stale();
        }
    }
}

fn status_code(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
