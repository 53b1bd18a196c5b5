use reqwest::header::{CONTENT_DISPOSITION, LOCATION};
use reqwest::redirect::Policy;
use reqwest::StatusCode;

use crate::activity::render::{render_activity, ActivityStreams, ScrapeMetadata};
use crate::config::Endpoints;
use crate::error::StravaError;
use crate::types::{ActivityFile, DataFormat};

const SCRAPED_STREAMS: &[&str] = &[
    "time",
    "latlng",
    "altitude",
    "distance",
    "heartrate",
    "cadence",
];

/// Cookie-session client for the Strava website.
///
/// Redirects are not followed: the export endpoints answer with a redirect
/// when the logged-in user may not download an activity, and the login
/// endpoint signals failure by redirecting back to the login page.
#[derive(Debug, Clone)]
pub struct WebClient {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl WebClient {
    pub fn new(endpoints: &Endpoints) -> Result<Self, StravaError> {
        let http = Self::builder()
            .build()
            .map_err(StravaError::from_send)?;
        Ok(Self::with_http(endpoints, http))
    }

    /// Builder with the cookie store and redirect policy the website needs.
    pub fn builder() -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .user_agent(concat!("stravacli/", env!("CARGO_PKG_VERSION")))
    }

    pub fn with_http(endpoints: &Endpoints, http: reqwest::Client) -> Self {
        Self {
            http,
            endpoints: endpoints.clone(),
        }
    }

    /// Log in with the website email and password.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), StravaError> {
        let login_url = format!("{}/login", self.endpoints.web);
        let resp = self
            .http
            .get(&login_url)
            .send()
            .await
            .map_err(StravaError::from_send)?;
        if !resp.status().is_success() {
            return Err(StravaError::Api {
                status: resp.status().as_u16(),
                body: format!("GET {login_url}"),
            });
        }
        let page = resp.text().await.map_err(StravaError::from_decode)?;
        let csrf = extract_csrf_token(&page).ok_or_else(|| {
            StravaError::ProtocolError("No CSRF token found on the login page".into())
        })?;

        let resp = self
            .http
            .post(format!("{}/session", self.endpoints.web))
            .form(&[
                ("utf8", "\u{2713}"),
                ("authenticity_token", csrf.as_str()),
                ("plain", ""),
                ("email", email),
                ("password", password),
                ("remember_me", "on"),
            ])
            .send()
            .await
            .map_err(StravaError::from_send)?;

        let status = resp.status();
        if status.is_redirection() {
            let location = resp
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if location.contains("/login") || location.contains("/session") {
                return Err(StravaError::LoginFailed(
                    "redirected back to the login page".into(),
                ));
            }
            tracing::debug!(location, "website login succeeded");
            return Ok(());
        }
        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            return Err(StravaError::LoginFailed(format!(
                "login form answered with status {status}"
            )));
        }
        Err(StravaError::Api {
            status: status.as_u16(),
            body: resp.text().await.unwrap_or_default(),
        })
    }

    /// Download an activity through the website export endpoint.
    ///
    /// `NotFound` for a 404, `Forbidden` when the website redirects instead
    /// of serving the file.
    pub async fn get_activity_data(
        &self,
        activity_id: u64,
        format: DataFormat,
    ) -> Result<ActivityFile, StravaError> {
        let url = format!(
            "{}/activities/{activity_id}/{}",
            self.endpoints.web,
            format.export_suffix()
        );
        let resp = self.get_checked(&url, activity_id).await?;

        let filename = resp
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| format!("{activity_id}{}", format.extension().unwrap_or("")));
        let content = resp.bytes().await.map_err(StravaError::from_decode)?.to_vec();

        Ok(ActivityFile { filename, content })
    }

    /// Rebuild an activity file from the streams shown on its web page.
    ///
    /// Works for any activity the logged-in user can view, not only their
    /// own. `Original` is rendered as TCX.
    pub async fn scrape_activity_data(
        &self,
        activity_id: u64,
        format: DataFormat,
        metadata: &ScrapeMetadata,
    ) -> Result<ActivityFile, StravaError> {
        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(SCRAPED_STREAMS.iter().map(|s| ("stream_types[]", *s)))
            .finish();
        let url = format!(
            "{}/activities/{activity_id}/streams?{query}",
            self.endpoints.web
        );
        let resp = self.get_checked(&url, activity_id).await?;
        let streams: ActivityStreams = resp.json().await.map_err(StravaError::from_decode)?;

        let format = format.for_scrape();
        let content = render_activity(activity_id, metadata, &streams, format)?;
        let stem = metadata
            .name
            .as_deref()
            .map(sanitize_file_stem)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| activity_id.to_string());

        Ok(ActivityFile {
            filename: format!("{stem}{}", format.extension().unwrap_or(".tcx")),
            content: content.into_bytes(),
        })
    }

    async fn get_checked(
        &self,
        url: &str,
        activity_id: u64,
    ) -> Result<reqwest::Response, StravaError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(StravaError::from_send)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let what = format!("activity {activity_id}");
        Err(match status {
            StatusCode::NOT_FOUND => StravaError::NotFound(what),
            s if s.is_redirection() => StravaError::Forbidden(what),
            StatusCode::UNAUTHORIZED => {
                StravaError::Unauthorized(resp.text().await.unwrap_or_default())
            }
            _ => StravaError::Api {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            },
        })
    }
}

/// Pull the CSRF token out of the login page, from either the
/// `csrf-token` meta tag or the `authenticity_token` form field.
fn extract_csrf_token(html: &str) -> Option<String> {
    for tag in html.split('<').skip(1) {
        let tag = tag.split('>').next().unwrap_or_default();
        let is_csrf = (tag.starts_with("meta") && attr(tag, "name") == Some("csrf-token"))
            || (tag.starts_with("input") && attr(tag, "name") == Some("authenticity_token"));
        if !is_csrf {
            continue;
        }
        let value = attr(tag, "content").or_else(|| attr(tag, "value"));
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            return Some(value.to_string());
        }
    }
    None
}

/// Value of a double-quoted attribute inside a tag body.
fn attr<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("{name}=\"");
    let start = tag
        .match_indices(&needle)
        .find(|(idx, _)| *idx == 0 || tag.as_bytes()[idx - 1].is_ascii_whitespace())?
        .0
        + needle.len();
    let end = tag[start..].find('"')? + start;
    Some(&tag[start..end])
}

fn filename_from_disposition(value: &str) -> Option<String> {
    value.split(';').map(str::trim).find_map(|part| {
        let raw = part.strip_prefix("filename=")?;
        let name = raw.trim_matches('"');
        let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
        (!name.is_empty() && name != "." && name != "..").then(|| name.to_string())
    })
}

fn sanitize_file_stem(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}
