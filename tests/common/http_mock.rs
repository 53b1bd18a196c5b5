use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const LOGIN_PAGE: &str = r#"<html><head>
<meta name="csrf-token" content="csrf-123" />
</head><body></body></html>"#;

/// Start a mock Strava that accepts `valid_token` on `GET /athlete` and
/// rejects every other token.
#[allow(dead_code)]
pub async fn start_mock_strava(valid_token: &str) -> MockServer {
    let server = MockServer::start().await;
    mount_athlete(&server, valid_token).await;
    server
}

#[allow(dead_code)]
pub async fn mount_athlete(server: &MockServer, valid_token: &str) {
    Mock::given(method("GET"))
        .and(path("/api/v3/athlete"))
        .and(header("authorization", format!("Bearer {valid_token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 42,
            "firstname": "Ada",
            "lastname": "Lovelace"
        })))
        .with_priority(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v3/athlete"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "message": "Authorization Error"
        })))
        .with_priority(5)
        .mount(server)
        .await;
}

/// Website login that accepts any email and password.
#[allow(dead_code)]
pub async fn mount_web_login(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", "/dashboard")
                .insert_header("set-cookie", "_strava4_session=abc; path=/"),
        )
        .mount(server)
        .await;
}

/// Website login that always bounces back to the login page.
#[allow(dead_code)]
pub async fn mount_failing_web_login(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/login"))
        .mount(server)
        .await;
}

#[allow(dead_code)]
pub async fn mount_export(server: &MockServer, activity_id: u64, suffix: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(format!("/activities/{activity_id}/{suffix}")))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Accept one upload on `POST /uploads` that is immediately ready as
/// `activity_id`.
#[allow(dead_code)]
pub async fn mount_ready_upload(server: &MockServer, activity_id: u64) {
    Mock::given(method("POST"))
        .and(path("/api/v3/uploads"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": 21, "error": null, "status": "Your activity is ready.",
            "activity_id": activity_id
        })))
        .expect(1)
        .mount(server)
        .await;
}

/// Named parts of a `multipart/form-data` request, in order. File parts
/// are decoded lossily; only the text fields are meant to be compared.
#[allow(dead_code)]
pub fn multipart_fields(request: &wiremock::Request) -> Vec<(String, String)> {
    let content_type = request
        .headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let boundary = content_type
        .split(';')
        .find_map(|p| p.trim().strip_prefix("boundary="))
        .expect("multipart boundary")
        .trim_matches('"');
    let body = String::from_utf8_lossy(&request.body);
    body.split(&format!("--{boundary}"))
        .filter_map(|part| {
            let (headers, value) = part.split_once("\r\n\r\n")?;
            let name = headers.split("name=\"").nth(1)?.split('"').next()?;
            let value = value.strip_suffix("\r\n").unwrap_or(value);
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

#[allow(dead_code)]
pub fn field<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}
