#[derive(thiserror::Error, Debug)]
pub enum PortalError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected HTTP status {status} from {endpoint}")]
    Status { endpoint: &'static str, status: u16 },
    #[error("malformed response from {endpoint}: {reason}")]
    Parse { endpoint: &'static str, reason: String },
    #[error("no data from {endpoint}: {reason}")]
    DataUnavailable { endpoint: &'static str, reason: String },
    #[error("invalid portal configuration: {0}")]
    Config(String),
}

/// Coarse classification, used for logging and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    Transport,
    Parse,
    DataUnavailable,
    Config,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Transport => "transport",
            Self::Parse => "parse",
            Self::DataUnavailable => "data_unavailable",
            Self::Config => "config",
        }
    }
}

impl PortalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Auth,
            Self::Transport { .. } | Self::Status { .. } => ErrorKind::Transport,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::DataUnavailable { .. } => ErrorKind::DataUnavailable,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

pub type PortalResult<T> = Result<T, PortalError>;
