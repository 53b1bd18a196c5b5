use std::path::PathBuf;
use std::time::Duration;

pub const README_URL: &str = "https://github.com/dlenski/stravacli/blob/master/README.md";

#[derive(Debug, thiserror::Error)]
pub enum StravaError {
    #[error("Cannot bind callback listener on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("No free port for the callback listener in {first}..={last}")]
    ExhaustedPortRange { first: u16, last: u16 },

    #[error("No authorization code found in callback request")]
    MissingAuthCode,

    #[error(
        "You need to add your Strava web credentials (Web.EMAIL and Web.PASSWORD_B64) to {}.",
        path.display()
    )]
    MissingWebCredentials { path: PathBuf },

    #[error("Could not connect to Strava: {0}")]
    ConnectionFailed(Box<dyn std::error::Error + Send + Sync>),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Website credentials were not accepted ({0}). Check Web.EMAIL and Web.PASSWORD_B64.")]
    LoginFailed(String),

    #[error("{0}\nDetails at:\n    {url}", url = README_URL)]
    NotConfigured(String),

    #[error(
        "Your Strava API access_token was not accepted. Try generating a new one. See details at:\n    {url}",
        url = README_URL
    )]
    TokenRejected,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not allowed to access {0}")]
    Forbidden(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Strava returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Timeout after {}s waiting for {what}", duration.as_secs())]
    Timeout { what: String, duration: Duration },

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("OAuth error: {0}")]
    OAuthError(String),

    #[error("Error in credentials file {}: {detail}", path.display())]
    ConfigError { path: PathBuf, detail: String },

    #[error("{0}")]
    Usage(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StravaError {
    /// Stable identifier for logs.
    pub fn code(&self) -> &'static str {
        match self {
            StravaError::Bind { .. } => "bind_error",
            StravaError::ExhaustedPortRange { .. } => "exhausted_port_range",
            StravaError::MissingAuthCode => "missing_auth_code",
            StravaError::MissingWebCredentials { .. } => "missing_web_credentials",
            StravaError::ConnectionFailed(_) => "connection_failed",
            StravaError::Unauthorized(_) => "unauthorized",
            StravaError::LoginFailed(_) => "login_failed",
            StravaError::NotConfigured(_) => "not_configured",
            StravaError::TokenRejected => "token_rejected",
            StravaError::NotFound(_) => "not_found",
            StravaError::Forbidden(_) => "forbidden",
            StravaError::UploadFailed(_) => "upload_failed",
            StravaError::Api { .. } => "api_error",
            StravaError::Timeout { .. } => "timeout",
            StravaError::ProtocolError(_) => "parse_error",
            StravaError::OAuthError(_) => "oauth_error",
            StravaError::ConfigError { .. } => "config_error",
            StravaError::Usage(_) => "usage_error",
            StravaError::IoError(_) => "io_error",
        }
    }

    /// Process exit status: usage errors match clap's convention.
    pub fn exit_code(&self) -> i32 {
        match self {
            StravaError::Usage(_) => 2,
            _ => 1,
        }
    }

    pub(crate) fn from_send(err: reqwest::Error) -> Self {
        StravaError::ConnectionFailed(Box::new(err))
    }

    pub(crate) fn from_decode(err: reqwest::Error) -> Self {
        StravaError::ProtocolError(format!("Failed to decode response: {err}"))
    }
}
