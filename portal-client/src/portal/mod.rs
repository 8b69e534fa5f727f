//! Cookie-session client for AquaHawk-style water usage portals.

mod client;
mod responses;
mod session;

use std::{fmt, time::Duration};

use chrono_tz::Tz;

use crate::error::{PortalError, PortalResult};

pub use client::UsagePortalClient;
pub use responses::{parse_accounts, parse_billing, parse_timeseries};

pub const DEFAULT_BASE_URL: &str = "https://dsrsd.aquahawk.us";
pub const DEFAULT_DISTRICT_NAME: &str = "dsrsd";
pub const DEFAULT_TIME_ZONE: Tz = chrono_tz::America::Los_Angeles;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the portal lives and how it expects to be queried.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub base_url: String,
    pub district_name: String,
    /// Zone the portal interprets request windows in.
    pub time_zone: Tz,
    pub request_timeout: Duration,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            district_name: DEFAULT_DISTRICT_NAME.to_string(),
            time_zone: DEFAULT_TIME_ZONE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl PortalConfig {
    pub fn new(
        base_url: &str,
        district_name: &str,
        time_zone: &str,
        request_timeout: Duration,
    ) -> PortalResult<Self> {
        let url = reqwest::Url::parse(base_url)
            .map_err(|e| PortalError::Config(format!("invalid base_url '{base_url}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PortalError::Config(format!(
                "base_url '{base_url}' must use http or https"
            )));
        }

        let time_zone: Tz = time_zone
            .parse()
            .map_err(|e| PortalError::Config(format!("invalid time_zone '{time_zone}': {e}")))?;

        if district_name.trim().is_empty() {
            return Err(PortalError::Config("district_name must not be empty".to_string()));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            district_name: district_name.trim().to_string(),
            time_zone,
            request_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Portal login. The password never appears in `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
