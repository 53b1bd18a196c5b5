use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::api::StravaApi;
use crate::config::Credentials;
use crate::error::StravaError;
use crate::oauth::callback::{CallbackListener, QueryParams};
use crate::oauth::token::TokenData;
use crate::types::Athlete;

pub const SCOPES: [&str; 2] = ["activity:read_all", "activity:write"];

pub const CALLBACK_RESPONSE: &str =
    "<title>Strava auth code received!</title>This window can be closed.";

/// Opens the authorization URL for the user.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str);
}

/// The desktop's default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) {
        if let Err(e) = webbrowser::open(url) {
            tracing::warn!("Could not open browser automatically: {e}");
            eprintln!("Please visit:\n    {url}");
        }
    }
}

#[derive(Debug, Default)]
struct Escalations {
    refreshed: bool,
    interactive: bool,
}

/// Turns whatever credentials are at hand into an access token the API
/// accepts.
///
/// A token is validated with `get_athlete`. Only an `Unauthorized` answer
/// escalates, first to a refresh-token exchange, then to the browser
/// authorization-code flow; each is tried at most once per run.
pub struct Authorizer<'a> {
    api: &'a dyn StravaApi,
    browser: &'a dyn BrowserLauncher,
    callback_timeout: Option<Duration>,
    callback_address: Option<SocketAddr>,
    credentials_path: PathBuf,
}

impl<'a> Authorizer<'a> {
    pub fn new(api: &'a dyn StravaApi, browser: &'a dyn BrowserLauncher) -> Self {
        Self {
            api,
            browser,
            callback_timeout: None,
            callback_address: None,
            credentials_path: PathBuf::from("~/.stravacli"),
        }
    }

    /// Give up on the browser redirect after `timeout`; `None` waits forever.
    pub fn with_callback_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Bind the callback listener here instead of scanning for a port.
    pub fn with_callback_address(mut self, address: Option<SocketAddr>) -> Self {
        self.callback_address = address;
        self
    }

    /// File named in configuration hints.
    pub fn with_credentials_path(mut self, path: PathBuf) -> Self {
        self.credentials_path = path;
        self
    }

    /// Validate or obtain an access token, updating `creds` with any new
    /// tokens. Returns the athlete the token belongs to.
    pub async fn authorize(&self, creds: &mut Credentials) -> Result<Athlete, StravaError> {
        let mut escalations = Escalations::default();

        loop {
            if let Some(token) = creds.access_token.as_deref() {
                match self.api.get_athlete(token).await {
                    Ok(athlete) => return Ok(athlete),
                    Err(StravaError::Unauthorized(detail)) => {
                        tracing::debug!(%detail, "access token rejected");
                    }
                    Err(e) => return Err(e),
                }
            }

            let Some((client_id, client_secret)) = creds
                .client_pair()
                .map(|(id, secret)| (id.to_string(), secret.to_string()))
            else {
                return Err(self.unconfigured(creds));
            };

            let token = self
                .escalate(creds, &client_id, &client_secret, &mut escalations)
                .await?;
            creds.access_token = Some(token.access_token);
            if let Some(refresh) = token.refresh_token {
                creds.refresh_token = Some(refresh);
            }
            eprintln!("Got access token and refresh token.");
        }
    }

    async fn escalate(
        &self,
        creds: &Credentials,
        client_id: &str,
        client_secret: &str,
        escalations: &mut Escalations,
    ) -> Result<TokenData, StravaError> {
        if !escalations.refreshed {
            if let Some(refresh) = creds.refresh_token.as_deref() {
                escalations.refreshed = true;
                eprintln!("Refreshing Strava API access_token for client_id={client_id}.");
                match self
                    .api
                    .refresh_access_token(client_id, client_secret, refresh)
                    .await
                {
                    Ok(token) => return Ok(token),
                    Err(StravaError::Unauthorized(detail)) => {
                        tracing::warn!("Refresh token was not accepted: {detail}");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        if !escalations.interactive {
            escalations.interactive = true;
            eprintln!(
                "Launching web browser to obtain Strava API access_token for client_id={client_id}."
            );
            return self.interactive(client_id, client_secret).await;
        }

        Err(StravaError::TokenRejected)
    }

    async fn interactive(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenData, StravaError> {
        let mut listener = CallbackListener::bind(CALLBACK_RESPONSE, self.callback_address).await?;
        let state = generate_state();
        let url = self
            .api
            .authorization_url(client_id, &listener.root_uri(), &SCOPES, &state);
        tracing::debug!(%url, "opening authorization URL");
        self.browser.open(&url);

        let params = listener.handle_request(self.callback_timeout).await?;
        let code = extract_code(params, &state)?;

        match self
            .api
            .exchange_code_for_token(client_id, client_secret, &code)
            .await
        {
            Err(StravaError::Unauthorized(detail)) => Err(StravaError::OAuthError(format!(
                "Authorization code was not accepted: {detail}"
            ))),
            other => other,
        }
    }

    fn unconfigured(&self, creds: &Credentials) -> StravaError {
        if creds.access_token.is_some() {
            StravaError::TokenRejected
        } else {
            StravaError::NotConfigured(format!(
                "You need to add either a Strava API access_token, or application client_id/client_secret\npair, to {}.",
                self.credentials_path.display()
            ))
        }
    }
}

fn generate_state() -> String {
    let mut buf = [0u8; 16];
    rand::Rng::fill_bytes(&mut rand::rng(), &mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

fn first<'p>(params: &'p QueryParams, key: &str) -> Option<&'p str> {
    params.get(key).and_then(|v| v.first()).map(String::as_str)
}

/// Pull the authorization code out of the provider redirect.
///
/// A `state` is only checked when the provider echoes one back.
pub(crate) fn extract_code(params: &QueryParams, expected_state: &str) -> Result<String, StravaError> {
    if let Some(error) = first(params, "error") {
        return Err(StravaError::OAuthError(format!(
            "Authorization was denied: {error}"
        )));
    }
    if let Some(state) = first(params, "state") {
        if state != expected_state {
            return Err(StravaError::OAuthError(
                "State parameter of the redirect does not match".into(),
            ));
        }
    }
    first(params, "code")
        .map(str::to_string)
        .ok_or(StravaError::MissingAuthCode)
}
