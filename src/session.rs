use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::api::{StravaClient, WebClient};
use crate::config::{credentials_path, env, CredentialStore, Credentials, Endpoints};
use crate::error::StravaError;
use crate::oauth::{Authorizer, BrowserLauncher, SystemBrowser};
use crate::types::Athlete;

/// How a tool wants to be authorized.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Use this token instead of the `API` section of the credentials file,
    /// which is then neither read nor written. When `need_web_client` is
    /// set the `Web` section is still read, since the website login has no
    /// other source.
    pub access_token: Option<String>,
    /// Also log in to the website (downloads need it).
    pub need_web_client: bool,
    pub credentials_path: PathBuf,
    pub endpoints: Endpoints,
    pub callback_timeout: Option<Duration>,
    pub callback_address: Option<SocketAddr>,
}

impl SessionOptions {
    /// Options from the process environment. With `use_env_token` the
    /// access token comes from `ACCESS_TOKEN`.
    pub fn from_env(use_env_token: bool, need_web_client: bool, oauth_timeout_ms: Option<u64>) -> Self {
        Self {
            access_token: if use_env_token {
                env::access_token_from_env()
            } else {
                None
            },
            need_web_client,
            credentials_path: credentials_path(),
            endpoints: Endpoints::from_env(),
            callback_timeout: env::oauth_timeout(oauth_timeout_ms),
            callback_address: None,
        }
    }
}

/// An authorized API client, plus a logged-in website client when asked for.
#[derive(Debug)]
pub struct Session {
    pub api: StravaClient,
    pub access_token: String,
    pub athlete: Athlete,
    web: Option<WebClient>,
    credentials_path: PathBuf,
}

impl Session {
    pub async fn connect(options: &SessionOptions) -> Result<Self, StravaError> {
        let api = StravaClient::new(&options.endpoints)?;
        let web = WebClient::new(&options.endpoints)?;
        Self::connect_with(options, api, web, &SystemBrowser).await
    }

    /// Authorize with the given clients and browser.
    ///
    /// Missing website credentials are reported before any request is made.
    /// Tokens obtained along the way are written back to the credentials
    /// file before the website login, unless an explicit token was given.
    pub async fn connect_with(
        options: &SessionOptions,
        api: StravaClient,
        web: WebClient,
        browser: &dyn BrowserLauncher,
    ) -> Result<Self, StravaError> {
        let path = &options.credentials_path;
        let explicit = options.access_token.is_some();

        let mut store = if explicit && !options.need_web_client {
            CredentialStore::default()
        } else {
            CredentialStore::load(path)?
        };
        let mut creds = match options.access_token.as_deref() {
            Some(token) => {
                let mut creds = Credentials::explicit(token);
                if options.need_web_client {
                    creds.read_web_section(&store, path)?;
                }
                creds
            }
            None => Credentials::from_store(&store, path)?,
        };

        let web_login = if options.need_web_client {
            let (email, password) = creds
                .web_login()
                .ok_or_else(|| StravaError::MissingWebCredentials { path: path.clone() })?;
            Some((email.to_string(), password.to_string()))
        } else {
            None
        };

        let athlete = Authorizer::new(&api, browser)
            .with_callback_timeout(options.callback_timeout)
            .with_callback_address(options.callback_address)
            .with_credentials_path(path.clone())
            .authorize(&mut creds)
            .await?;

        if !explicit && creds.write_api_section(&mut store) && store.persist_if_dirty(path)? {
            tracing::info!(path = %path.display(), "saved new tokens");
        }

        let web = match web_login {
            Some((email, password)) => {
                web.login(&email, &password).await?;
                Some(web)
            }
            None => None,
        };

        let access_token = creds.access_token.ok_or(StravaError::TokenRejected)?;
        Ok(Self {
            api,
            access_token,
            athlete,
            web,
            credentials_path: path.clone(),
        })
    }

    /// The website client; only present when the session was opened with
    /// `need_web_client`.
    pub fn web(&self) -> Result<&WebClient, StravaError> {
        self.web
            .as_ref()
            .ok_or_else(|| StravaError::MissingWebCredentials {
                path: self.credentials_path.clone(),
            })
    }

    pub fn endpoints(&self) -> &Endpoints {
        self.api.endpoints()
    }
}
