use std::{fs, path::PathBuf, time::Duration};

use anyhow::{bail, Context};
use portal_client::{portal, Credentials, PortalConfig};
use serde::Deserialize;

pub const CONFIG_ENV: &str = "WATER_USAGE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "water-usage.toml";
/// Ten years of daily readings.
pub const MAX_DAYS_BACK: u32 = 3650;

#[derive(Clone, Deserialize)]
pub struct PortalSettings {
    pub username: String,
    pub password: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_district_name")]
    pub district_name: String,
    /// Used for the sensor name, unique id and statistic name.
    #[serde(default = "default_display_name")]
    pub display_name: String,
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for PortalSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalSettings")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("district_name", &self.district_name)
            .field("display_name", &self.display_name)
            .field("time_zone", &self.time_zone)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_days_back")]
    pub days_back: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            days_back: default_days_back(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Ndjson,
    Questdb,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_sink_kind")]
    pub kind: SinkKind,
    /// Output file for the `ndjson` sink.
    #[serde(default = "default_ndjson_path")]
    pub path: PathBuf,
    pub questdb_uri: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: default_sink_kind(),
            path: default_ndjson_path(),
            questdb_uri: None,
            max_connections: default_max_connections(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub portal: PortalSettings,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let contents = fs::read_to_string(&path).with_context(|| format!("failed to read config file {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("invalid config file {path}"))
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Required-field checks only; the portal decides whether credentials work.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.portal.username.trim().is_empty() {
            bail!("portal.username is required");
        }
        if self.portal.password.is_empty() {
            bail!("portal.password is required");
        }
        if self.poll.interval_secs == 0 {
            bail!("poll.interval_secs must be positive");
        }
        check_days_back(self.poll.days_back).context("poll.days_back")?;
        if self.sink.kind == SinkKind::Questdb && self.sink.questdb_uri.is_none() {
            bail!("sink.questdb_uri is required for the questdb sink");
        }
        Ok(())
    }

    pub fn portal_config(&self) -> anyhow::Result<PortalConfig> {
        let p = &self.portal;
        Ok(PortalConfig::new(
            &p.base_url,
            &p.district_name,
            &p.time_zone,
            Duration::from_secs(p.request_timeout_secs),
        )?)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.portal.username.trim(), self.portal.password.clone())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll.interval_secs)
    }
}

/// Accepts a lookback of 1 to [`MAX_DAYS_BACK`] days.
pub fn check_days_back(days_back: u32) -> anyhow::Result<u32> {
    if days_back == 0 || days_back > MAX_DAYS_BACK {
        bail!("days_back must be between 1 and {MAX_DAYS_BACK}, got {days_back}");
    }
    Ok(days_back)
}

fn default_base_url() -> String {
    portal::DEFAULT_BASE_URL.to_string()
}

fn default_district_name() -> String {
    portal::DEFAULT_DISTRICT_NAME.to_string()
}

fn default_display_name() -> String {
    "DSRSD".to_string()
}

fn default_time_zone() -> String {
    portal::DEFAULT_TIME_ZONE.name().to_string()
}

fn default_request_timeout_secs() -> u64 {
    portal::DEFAULT_REQUEST_TIMEOUT.as_secs()
}

// Every 3 hours.
fn default_interval_secs() -> u64 {
    3 * 60 * 60
}

fn default_days_back() -> u32 {
    7
}

fn default_sink_kind() -> SinkKind {
    SinkKind::Ndjson
}

fn default_ndjson_path() -> PathBuf {
    PathBuf::from("water-usage-statistics.ndjson")
}

fn default_max_connections() -> u32 {
    2
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}
