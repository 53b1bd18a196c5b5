use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::api::StravaApi;
use crate::config::Endpoints;
use crate::error::StravaError;
use crate::oauth::token::{exchange_code, refresh_token, TokenData};
use crate::types::{Activity, Athlete, UploadRequest, UploadStatus};

pub const UPLOAD_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const UPLOAD_WAIT_LIMIT: Duration = Duration::from_secs(600);

/// Client for the Strava v3 REST API and its OAuth endpoints.
#[derive(Debug, Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl StravaClient {
    pub fn new(endpoints: &Endpoints) -> Result<Self, StravaError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("stravacli/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(StravaError::from_send)?;
        Ok(Self::with_http(endpoints, http))
    }

    pub fn with_http(endpoints: &Endpoints, http: reqwest::Client) -> Self {
        Self {
            http,
            endpoints: endpoints.clone(),
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub async fn get_activity(
        &self,
        access_token: &str,
        activity_id: u64,
    ) -> Result<Activity, StravaError> {
        let url = format!("{}/activities/{activity_id}", self.endpoints.api);
        self.get_json(access_token, &url, &format!("activity {activity_id}"))
            .await
    }

    /// Start an upload. The returned status usually still lacks an activity
    /// id; see [`StravaClient::wait_for_upload`].
    pub async fn upload_activity(
        &self,
        access_token: &str,
        upload: UploadRequest,
    ) -> Result<UploadStatus, StravaError> {
        let mut form = Form::new()
            .part(
                "file",
                Part::bytes(upload.data).file_name(upload.file_name.clone()),
            )
            .text("data_type", upload.data_type)
            .text("external_id", upload.file_name);
        if let Some(name) = upload.name {
            form = form.text("name", name);
        }
        if let Some(description) = upload.description {
            form = form.text("description", description);
        }
        if upload.private {
            form = form.text("private", "1");
        }
        if let Some(activity_type) = upload.activity_type {
            form = form.text("activity_type", activity_type);
        }

        let resp = self
            .http
            .post(format!("{}/uploads", self.endpoints.api))
            .bearer_auth(access_token)
            .multipart(form)
            .send()
            .await
            .map_err(StravaError::from_send)?;
        let resp = check_status(resp, "upload").await?;
        resp.json().await.map_err(StravaError::from_decode)
    }

    pub async fn get_upload(
        &self,
        access_token: &str,
        upload_id: u64,
    ) -> Result<UploadStatus, StravaError> {
        let url = format!("{}/uploads/{upload_id}", self.endpoints.api);
        self.get_json(access_token, &url, &format!("upload {upload_id}"))
            .await
    }

    /// Poll an upload until Strava assigns an activity id or reports an
    /// error. Returns the activity id.
    pub async fn wait_for_upload(
        &self,
        access_token: &str,
        mut status: UploadStatus,
        poll_interval: Duration,
        limit: Duration,
    ) -> Result<u64, StravaError> {
        let started = Instant::now();
        loop {
            if let Some(error) = status.error.as_deref().filter(|e| !e.is_empty()) {
                return Err(StravaError::UploadFailed(error.to_string()));
            }
            if let Some(activity_id) = status.activity_id {
                return Ok(activity_id);
            }
            if started.elapsed() >= limit {
                return Err(StravaError::Timeout {
                    what: format!("upload {} to be processed", status.id),
                    duration: limit,
                });
            }
            tracing::debug!(upload_id = status.id, status = ?status.status, "upload pending");
            tokio::time::sleep(poll_interval).await;
            status = self.get_upload(access_token, status.id).await?;
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        access_token: &str,
        url: &str,
        what: &str,
    ) -> Result<T, StravaError> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(StravaError::from_send)?;
        let resp = check_status(resp, what).await?;
        resp.json().await.map_err(StravaError::from_decode)
    }
}

/// Map API error statuses onto error kinds the callers branch on.
async fn check_status(resp: reqwest::Response, what: &str) -> Result<reqwest::Response, StravaError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED => StravaError::Unauthorized(body),
        StatusCode::NOT_FOUND => StravaError::NotFound(what.to_string()),
        StatusCode::FORBIDDEN => StravaError::Forbidden(what.to_string()),
        _ => StravaError::Api {
            status: status.as_u16(),
            body,
        },
    })
}

#[async_trait]
impl StravaApi for StravaClient {
    async fn get_athlete(&self, access_token: &str) -> Result<Athlete, StravaError> {
        let url = format!("{}/athlete", self.endpoints.api);
        self.get_json(access_token, &url, "athlete").await
    }

    fn authorization_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scope: &[&str],
        state: &str,
    ) -> String {
        let base = format!("{}/authorize", self.endpoints.oauth);
        let scope = scope.join(",");
        let params = [
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("approval_prompt", "auto"),
            ("scope", scope.as_str()),
            ("state", state),
        ];
        match url::Url::parse_with_params(&base, &params) {
            Ok(url) => url.into(),
            Err(e) => {
                tracing::warn!("invalid OAuth base URL {base}: {e}");
                let query: String = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(&params)
                    .finish();
                format!("{base}?{query}")
            }
        }
    }

    async fn exchange_code_for_token(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
    ) -> Result<TokenData, StravaError> {
        let endpoint = format!("{}/token", self.endpoints.oauth);
        exchange_code(&self.http, &endpoint, client_id, client_secret, code).await
    }

    async fn refresh_access_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_tok: &str,
    ) -> Result<TokenData, StravaError> {
        let endpoint = format!("{}/token", self.endpoints.oauth);
        refresh_token(&self.http, &endpoint, client_id, client_secret, refresh_tok).await
    }
}
