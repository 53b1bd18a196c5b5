pub mod activity;
pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod oauth;
pub mod session;
pub mod types;

pub use api::{StravaApi, StravaClient, WebClient};
pub use config::{CredentialStore, Credentials, Endpoints};
pub use error::StravaError;
pub use oauth::CallbackListener;
pub use session::{Session, SessionOptions};
pub use types::{Activity, ActivityFile, Athlete, DataFormat, UploadStatus};
