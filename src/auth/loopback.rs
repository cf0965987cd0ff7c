//! Loopback redirect collaborator for desktop use
//!
//! [`LoopbackAuthorizer`] implements both [`AuthorizationStep`] and
//! [`UserAgent`] for a CLI running on the user's machine:
//!
//! 1. Bind a TCP listener on the redirect URI's loopback host and port.
//! 2. Print the authorization URL and try to open the system browser.
//! 3. Accept connections until one hits the redirect path, answer it with a
//!    short HTML page and hand back `code` and `state`.
//!
//! The listener stays bound until the [`AuthorizationSession`] is released,
//! which happens after the code exchange.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use crate::auth::authorization::{
    AuthorizationError, AuthorizationRequest, AuthorizationResponse, AuthorizationSession,
    AuthorizationStep, UserAgent,
};
use crate::error::Result;

const SUCCESS_PAGE: &str = "<html><body><h1>Signed in</h1>\
    <p>You may close this tab and return to the terminal.</p></body></html>";
const FAILURE_PAGE: &str = "<html><body><h1>Sign-in failed</h1>\
    <p>Return to the terminal for details.</p></body></html>";

/// How long one connection may take to send its request head.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound on the request line plus headers.
const MAX_REQUEST_HEAD_BYTES: u64 = 16 * 1024;

/// Browser plus loopback listener.
#[derive(Debug, Clone)]
pub struct LoopbackAuthorizer {
    open_browser: bool,
}

impl LoopbackAuthorizer {
    /// Creates a loopback collaborator. With `open_browser` unset the URL is
    /// only printed.
    pub fn new(open_browser: bool) -> Self {
        Self { open_browser }
    }

    /// Attempts to open `url` in the user's default browser.
    ///
    /// Errors are ignored; the URL is always printed to stderr as well.
    fn try_open_browser(&self, url: &Url) {
        if !self.open_browser {
            return;
        }
        #[cfg(target_os = "macos")]
        {
            let _ = std::process::Command::new("open").arg(url.as_str()).spawn();
        }
        #[cfg(target_os = "linux")]
        {
            let _ = std::process::Command::new("xdg-open")
                .arg(url.as_str())
                .spawn();
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux")))]
        {
            let _ = url;
        }
    }
}

#[async_trait]
impl UserAgent for LoopbackAuthorizer {
    async fn present(&self, url: &Url) -> Result<()> {
        eprintln!("Open the following URL in your browser:\n{}", url);
        self.try_open_browser(url);
        Ok(())
    }
}

#[async_trait]
impl AuthorizationStep for LoopbackAuthorizer {
    async fn authorize(
        &self,
        request: &AuthorizationRequest,
        session: &AuthorizationSession,
    ) -> std::result::Result<AuthorizationResponse, AuthorizationError> {
        let bind_addr = loopback_bind_address(&request.redirect_uri)?;
        let listener = TcpListener::bind(bind_addr).await.map_err(|e| {
            AuthorizationError::new("listener_unavailable")
                .with_description(format!("failed to bind {bind_addr}: {e}"))
        })?;
        tracing::debug!("Waiting for authorization redirect on {}", bind_addr);

        self.present(&request.to_url())
            .await
            .map_err(|e| {
                AuthorizationError::new("user_agent_failed").with_description(e.to_string())
            })?;

        let params =
            accept_redirect(&listener, request.redirect_uri.path(), REQUEST_READ_TIMEOUT).await?;
        session.on_release(move || drop(listener));

        response_from_params(params)
    }
}

/// Socket address to listen on for `redirect_uri`.
///
/// Only plain `http` redirects to a loopback host are accepted.
fn loopback_bind_address(
    redirect_uri: &Url,
) -> std::result::Result<SocketAddr, AuthorizationError> {
    let unsupported = || {
        AuthorizationError::new("unsupported_redirect_uri").with_description(format!(
            "loopback authorization needs an http://127.0.0.1, [::1] or localhost redirect, got {redirect_uri}"
        ))
    };

    if redirect_uri.scheme() != "http" {
        return Err(unsupported());
    }

    let ip = match redirect_uri.host() {
        Some(url::Host::Domain("localhost")) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Some(url::Host::Ipv4(ip)) if ip.is_loopback() => IpAddr::V4(ip),
        Some(url::Host::Ipv6(ip)) if ip.is_loopback() => IpAddr::V6(ip),
        _ => return Err(unsupported()),
    };

    let port = redirect_uri.port_or_known_default().unwrap_or(80);
    Ok(SocketAddr::new(ip, port))
}

/// Accepts connections until a request for `redirect_path` arrives and
/// returns its query parameters. Other paths (such as `/favicon.ico`) get a
/// 404. A connection that sends no complete request head within
/// `read_timeout` is dropped, so idle browser preconnects cannot hold up the
/// redirect.
async fn accept_redirect(
    listener: &TcpListener,
    redirect_path: &str,
    read_timeout: Duration,
) -> std::result::Result<HashMap<String, String>, AuthorizationError> {
    loop {
        let (mut stream, peer) = listener.accept().await.map_err(|e| {
            AuthorizationError::new("callback_failed")
                .with_description(format!("failed to accept redirect connection: {e}"))
        })?;

        let read = tokio::time::timeout(read_timeout, read_request_target(&mut stream)).await;
        let target = match read {
            Ok(Ok(target)) => target,
            Ok(Err(e)) => {
                tracing::debug!("Ignoring unreadable request from {}: {}", peer, e);
                continue;
            }
            Err(_) => {
                tracing::debug!("Dropping idle connection from {}", peer);
                continue;
            }
        };

        let Ok(url) = Url::parse("http://127.0.0.1/").and_then(|base| base.join(&target)) else {
            let _ = write_response(&mut stream, "400 Bad Request", FAILURE_PAGE).await;
            continue;
        };

        if url.path() != redirect_path {
            let _ = write_response(&mut stream, "404 Not Found", "").await;
            continue;
        }

        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let page = if params.contains_key("error") {
            FAILURE_PAGE
        } else {
            SUCCESS_PAGE
        };
        if let Err(e) = write_response(&mut stream, "200 OK", page).await {
            tracing::debug!("Failed to answer redirect request: {}", e);
        }
        return Ok(params);
    }
}

/// Reads an HTTP request head and returns its request target, e.g.
/// `/callback?code=abc&state=xyz`. At most [`MAX_REQUEST_HEAD_BYTES`] are
/// read.
async fn read_request_target(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut reader = BufReader::new(stream).take(MAX_REQUEST_HEAD_BYTES);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    if !request_line.ends_with('\n') {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "request line too long or truncated",
        ));
    }

    // Drain headers up to the blank line.
    let mut header = String::new();
    loop {
        header.clear();
        let read = reader.read_line(&mut header).await?;
        if read == 0 || header.trim_end().is_empty() {
            break;
        }
    }

    request_line
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "empty request line"))
}

async fn write_response(stream: &mut TcpStream, status: &str, body: &str) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

fn response_from_params(
    mut params: HashMap<String, String>,
) -> std::result::Result<AuthorizationResponse, AuthorizationError> {
    if let Some(error) = params.remove("error") {
        let err = AuthorizationError::new(error);
        return Err(match params.remove("error_description") {
            Some(description) => err.with_description(description),
            None => err,
        });
    }

    let code = params.remove("code").ok_or_else(|| {
        AuthorizationError::new("invalid_request")
            .with_description("authorization code missing from redirect")
    })?;

    Ok(AuthorizationResponse {
        code,
        state: params.remove("state"),
    })
}
