pub mod http_mock;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use stravacli::oauth::BrowserLauncher;
use stravacli::{Endpoints, SessionOptions, StravaClient, WebClient};
use wiremock::MockServer;

/// `hunter2`, base64-encoded as the credentials file stores it.
#[allow(dead_code)]
pub const PASSWORD_B64: &str = "aHVudGVyMg==";

/// Write a credentials file into `dir` and return its path.
#[allow(dead_code)]
pub fn write_credentials(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("stravacli.ini");
    std::fs::write(&path, contents).unwrap();
    path
}

#[allow(dead_code)]
pub fn session_options(server: &MockServer, credentials_path: PathBuf) -> SessionOptions {
    SessionOptions {
        access_token: None,
        need_web_client: false,
        credentials_path,
        endpoints: Endpoints::with_base(&server.uri()),
        callback_timeout: None,
        callback_address: None,
    }
}

/// API and website clients that bypass any proxy settings of the host.
#[allow(dead_code)]
pub fn clients(server: &MockServer) -> (StravaClient, WebClient) {
    let endpoints = Endpoints::with_base(&server.uri());
    let api = StravaClient::with_http(
        &endpoints,
        reqwest::Client::builder().no_proxy().build().unwrap(),
    );
    let web = WebClient::with_http(&endpoints, WebClient::builder().no_proxy().build().unwrap());
    (api, web)
}

/// Records URLs instead of opening them.
#[derive(Default)]
pub struct RecordingBrowser {
    pub opened: Mutex<Vec<String>>,
}

impl BrowserLauncher for RecordingBrowser {
    fn open(&self, url: &str) {
        self.opened.lock().unwrap().push(url.to_string());
    }
}

#[allow(dead_code)]
impl RecordingBrowser {
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}
