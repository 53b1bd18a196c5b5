use serde::{Deserialize, Serialize};

use crate::error::StravaError;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TokenData {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Raw response of the Strava token endpoint. Expiry fields are ignored:
/// a stale token shows up as a rejected athlete lookup and is refreshed then.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

impl TokenResponse {
    fn into_token_data(self) -> TokenData {
        TokenData {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
        }
    }
}

/// Trade an authorization code for an access/refresh token pair.
pub async fn exchange_code(
    http: &reqwest::Client,
    token_endpoint: &str,
    client_id: &str,
    client_secret: &str,
    code: &str,
) -> Result<TokenData, StravaError> {
    post_token_form(
        http,
        token_endpoint,
        &[
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("code", code),
            ("grant_type", "authorization_code"),
        ],
        "Token exchange",
    )
    .await
}

/// Mint a new access token from a refresh token.
pub async fn refresh_token(
    http: &reqwest::Client,
    token_endpoint: &str,
    client_id: &str,
    client_secret: &str,
    refresh_tok: &str,
) -> Result<TokenData, StravaError> {
    post_token_form(
        http,
        token_endpoint,
        &[
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_tok),
            ("grant_type", "refresh_token"),
        ],
        "Token refresh",
    )
    .await
}

async fn post_token_form(
    http: &reqwest::Client,
    token_endpoint: &str,
    form: &[(&str, &str)],
    what: &str,
) -> Result<TokenData, StravaError> {
    let resp = http
        .post(token_endpoint)
        .form(form)
        .send()
        .await
        .map_err(StravaError::from_send)?;

    let status = resp.status();
    if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::UNAUTHORIZED {
        let body = resp.text().await.unwrap_or_default();
        return Err(StravaError::Unauthorized(format!(
            "{what} rejected with status {status}: {body}"
        )));
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(StravaError::OAuthError(format!(
            "{what} failed with status {status}: {body}"
        )));
    }

    let token_resp: TokenResponse = resp.json().await.map_err(|e| {
        StravaError::OAuthError(format!("Failed to parse {what} response: {e}"))
    })?;

    Ok(token_resp.into_token_data())
}
