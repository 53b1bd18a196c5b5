pub mod download;
pub mod output;
pub mod upload;

use crate::config::env::LOG_LEVEL_ENV;
use crate::error::StravaError;

/// Log to stderr, filtered by `STRAVACLI_LOG_LEVEL` (default `warn`).
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env(LOG_LEVEL_ENV)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Report `err` and exit. Usage errors go through clap so they look and
/// exit like argument errors.
pub fn exit_with(err: StravaError, mut command: clap::Command) -> ! {
    if let StravaError::Usage(msg) = &err {
        command
            .error(clap::error::ErrorKind::ValueValidation, msg)
            .exit()
    }
    tracing::debug!(code = err.code(), "exiting on error");
    eprintln!("Error: {err}");
    std::process::exit(err.exit_code())
}
