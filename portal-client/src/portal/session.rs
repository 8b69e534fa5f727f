use reqwest::header::{HeaderMap, SET_COOKIE};

pub(crate) const SESSION_COOKIE: &str = "connect.sid";

/// Server-issued session bound to one login.
#[derive(Debug, Clone)]
pub(crate) struct Session {
    token: String,
    /// Set once the portal stops answering with usable JSON; data calls then
    /// fail fast, while logout still sends the token.
    stale: bool,
}

impl Session {
    pub(crate) fn new(token: String) -> Self {
        Self { token, stale: false }
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }

    pub(crate) fn is_stale(&self) -> bool {
        self.stale
    }

    pub(crate) fn mark_stale(&mut self) {
        self.stale = true;
    }

    pub(crate) fn cookie_header(&self) -> String {
        format!("{SESSION_COOKIE}={}", self.token)
    }
}

/// Finds a non-empty `connect.sid` among the response's `Set-Cookie` headers.
pub(crate) fn session_token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(parse_session_cookie)
}

fn parse_session_cookie(set_cookie: &str) -> Option<String> {
    let pair = set_cookie.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    if name.trim() != SESSION_COOKIE {
        return None;
    }
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
