use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::StravaError;

/// Decoded query string: each key maps to its values in request order.
pub type QueryParams = HashMap<String, Vec<String>>;

pub const FIRST_PORT: u16 = 1024;
pub const LAST_PORT: u16 = 65535;

const MAX_REQUEST_HEAD: usize = 8192;

/// One-shot HTTP endpoint that captures the query string of the OAuth
/// redirect.
///
/// The socket is bound on construction and closed as soon as
/// [`CallbackListener::handle_request`] returns, whatever the outcome.
#[derive(Debug)]
pub struct CallbackListener {
    listener: Option<TcpListener>,
    addr: SocketAddr,
    response: String,
    received: Option<QueryParams>,
}

impl CallbackListener {
    /// Bind `address` exactly, or the first free loopback port in
    /// `1024..=65535` when `address` is `None`.
    pub async fn bind(
        response: impl Into<String>,
        address: Option<SocketAddr>,
    ) -> Result<Self, StravaError> {
        let listener = match address {
            Some(addr) => TcpListener::bind(addr)
                .await
                .map_err(|source| StravaError::Bind {
                    addr: addr.to_string(),
                    source,
                })?,
            None => scan_ports(FIRST_PORT..=LAST_PORT).await?,
        };
        let addr = listener.local_addr()?;
        tracing::debug!(%addr, "callback listener bound");

        Ok(Self {
            listener: Some(listener),
            addr,
            response: response.into(),
            received: None,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL to hand to the provider as the redirect target.
    pub fn root_uri(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Wait for one request, answer it with the fixed body and record its
    /// query parameters. With `timeout` of `None` this waits indefinitely.
    pub async fn handle_request(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<&QueryParams, StravaError> {
        let listener = self.listener.take().ok_or_else(|| {
            StravaError::OAuthError("Callback listener has already served its request".into())
        })?;

        let serve = serve_one(&listener, &self.response);
        let received = match timeout {
            Some(limit) => tokio::time::timeout(limit, serve).await.map_err(|_| {
                StravaError::Timeout {
                    what: "OAuth callback".into(),
                    duration: limit,
                }
            })??,
            None => serve.await?,
        };
        drop(listener);

        Ok(self.received.insert(received))
    }

    /// Query parameters of the served request; `None` until one arrived.
    pub fn received(&self) -> Option<&QueryParams> {
        self.received.as_ref()
    }
}

/// Bind the first port of `ports` that is not already in use.
///
/// "Address in use" moves on to the next port; any other bind error stops
/// the scan.
pub(crate) async fn scan_ports<I>(ports: I) -> Result<TcpListener, StravaError>
where
    I: IntoIterator<Item = u16>,
{
    let mut tried: Option<(u16, u16)> = None;

    for port in ports {
        tried = Some(match tried {
            Some((first, _)) => (first, port),
            None => (port, port),
        });

        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::trace!(port, "port in use");
            }
            Err(source) => {
                return Err(StravaError::Bind {
                    addr: addr.to_string(),
                    source,
                })
            }
        }
    }

    let (first, last) = tried.unwrap_or((FIRST_PORT, LAST_PORT));
    Err(StravaError::ExhaustedPortRange { first, last })
}

async fn serve_one(listener: &TcpListener, body: &str) -> Result<QueryParams, StravaError> {
    let (mut stream, peer) = listener.accept().await?;
    tracing::debug!(%peer, "callback request accepted");

    let received = match read_request_head(&mut stream).await {
        Ok(head) => parse_request_query(&head),
        Err(e) => {
            tracing::debug!("failed to read callback request: {e}");
            QueryParams::new()
        }
    };

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;

    Ok(received)
}

async fn read_request_head(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() >= MAX_REQUEST_HEAD
            || buf.windows(4).any(|w| w == b"\r\n\r\n")
            || buf.windows(2).any(|w| w == b"\n\n")
        {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Extract the query parameters from the request line of `request`.
///
/// Everything after the first `?` of the request target is the query.
/// Blank values are dropped.
pub(crate) fn parse_request_query(request: &str) -> QueryParams {
    let mut params = QueryParams::new();

    let Some(target) = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
    else {
        return params;
    };
    let Some((_, query)) = target.split_once('?') else {
        return params;
    };

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        params
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    params
}
