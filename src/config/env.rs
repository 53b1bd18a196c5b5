use std::path::PathBuf;
use std::time::Duration;

pub const CONFIG_ENV: &str = "STRAVACLI_CONFIG";
pub const API_URL_ENV: &str = "STRAVACLI_API_URL";
pub const OAUTH_URL_ENV: &str = "STRAVACLI_OAUTH_URL";
pub const WEB_URL_ENV: &str = "STRAVACLI_WEB_URL";
pub const LOG_LEVEL_ENV: &str = "STRAVACLI_LOG_LEVEL";
pub const OAUTH_TIMEOUT_ENV: &str = "STRAVACLI_OAUTH_TIMEOUT_MS";
pub const ACCESS_TOKEN_ENV: &str = "ACCESS_TOKEN";

const DEFAULT_API_URL: &str = "https://www.strava.com/api/v3";
const DEFAULT_OAUTH_URL: &str = "https://www.strava.com/oauth";
const DEFAULT_WEB_URL: &str = "https://www.strava.com";

/// Base URLs of the three Strava surfaces the tools talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub api: String,
    pub oauth: String,
    pub web: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api: DEFAULT_API_URL.to_string(),
            oauth: DEFAULT_OAUTH_URL.to_string(),
            web: DEFAULT_WEB_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Defaults, overridden per surface by `STRAVACLI_*_URL`.
    pub fn from_env() -> Self {
        let pick = |var: &str, default: &str| {
            std::env::var(var)
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Self {
            api: pick(API_URL_ENV, DEFAULT_API_URL),
            oauth: pick(OAUTH_URL_ENV, DEFAULT_OAUTH_URL),
            web: pick(WEB_URL_ENV, DEFAULT_WEB_URL),
        }
        .normalized()
    }

    /// Point every surface at one server, as a mock server would serve them.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            api: format!("{base}/api/v3"),
            oauth: format!("{base}/oauth"),
            web: base.to_string(),
        }
    }

    fn normalized(self) -> Self {
        Self {
            api: self.api.trim_end_matches('/').to_string(),
            oauth: self.oauth.trim_end_matches('/').to_string(),
            web: self.web.trim_end_matches('/').to_string(),
        }
    }

    /// Public page of an activity, as printed to the user.
    pub fn activity_page(&self, activity_id: u64) -> String {
        format!("{}/activities/{activity_id}", self.web)
    }
}

/// Location of the credentials file.
///
/// Precedence:
/// 1. `STRAVACLI_CONFIG` env var
/// 2. `~/.stravacli`
pub fn credentials_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".stravacli")
}

/// Token from the `ACCESS_TOKEN` env var, when set and non-empty.
pub fn access_token_from_env() -> Option<String> {
    std::env::var(ACCESS_TOKEN_ENV).ok().filter(|v| !v.is_empty())
}

pub fn oauth_timeout(millis: Option<u64>) -> Option<Duration> {
    millis.filter(|ms| *ms > 0).map(Duration::from_millis)
}
