pub mod rest;
pub mod web;

use async_trait::async_trait;

use crate::error::StravaError;
use crate::oauth::token::TokenData;
use crate::types::Athlete;

pub use rest::StravaClient;
pub use web::WebClient;

impl std::fmt::Debug for dyn StravaApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StravaApi").finish()
    }
}

/// The slice of the Strava API the authorization flow depends on.
#[async_trait]
pub trait StravaApi: Send + Sync {
    /// Fetch the athlete owning `access_token`; `Unauthorized` if the token
    /// is not accepted.
    async fn get_athlete(&self, access_token: &str) -> Result<Athlete, StravaError>;

    /// Build the browser URL that starts the authorization-code flow.
    fn authorization_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scope: &[&str],
        state: &str,
    ) -> String;

    /// Trade an authorization code for tokens.
    async fn exchange_code_for_token(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
    ) -> Result<TokenData, StravaError>;

    /// Mint a new access token; `Unauthorized` if the refresh token is
    /// rejected.
    async fn refresh_access_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenData, StravaError>;
}
