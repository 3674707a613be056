//! Single-use loopback listener for the authorization-code redirect.
//!
//! The listener binds an ephemeral port, accepts exactly one connection,
//! exchanges the `code` it carries at the token endpoint and answers the
//! browser with the outcome. Whatever happens, the socket is released and the
//! listener cannot be used again.

use std::net::SocketAddr;
use std::time::Duration;

use loopauth_core::{AuthError, Result, TokenResponse};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use crate::token::TokenEndpoint;

/// Default time to wait for more request bytes before treating the request as complete.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Lifecycle of a [`RedirectListener`].
///
/// `Failed` is passed through on any error; both paths end in `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Bound and waiting for the browser.
    Listening,
    /// A request with a code arrived.
    CodeReceived,
    /// The code was exchanged for tokens.
    Exchanged,
    /// The exchange failed.
    Failed,
    /// Socket released; the listener is spent.
    Closed,
}

/// Local HTTP responder for one OIDC redirect.
pub struct RedirectListener {
    listener: Option<TcpListener>,
    addr: SocketAddr,
    url: String,
    endpoint: TokenEndpoint,
    state: ListenerState,
    read_timeout: Duration,
}

impl RedirectListener {
    /// Bind an ephemeral port on `host` and start listening.
    pub async fn bind(host: &str, endpoint: TokenEndpoint) -> Result<Self> {
        let listener = TcpListener::bind((host, 0)).await?;
        let addr = listener.local_addr()?;
        let url = format!("http://{addr}");
        tracing::debug!(url = %url, "Redirect listener bound");

        Ok(Self {
            listener: Some(listener),
            addr,
            url,
            endpoint,
            state: ListenerState::Listening,
            read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    /// Set the per-read timeout used while draining the request.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Redirect URI to register with the authorization request.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Bound socket address.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Check if the listener has been used up.
    pub fn is_closed(&self) -> bool {
        self.listener.is_none()
    }

    /// Wait for the redirect, exchange its code and return the token response.
    ///
    /// Accepts exactly one connection. Any second call fails with
    /// [`AuthError::AlreadyClosed`].
    pub async fn read_token(&mut self) -> Result<TokenResponse> {
        let listener = match (self.state, self.listener.take()) {
            (ListenerState::Listening, Some(listener)) => listener,
            _ => return Err(AuthError::AlreadyClosed),
        };

        let result = self.serve(listener).await;
        if let Err(e) = &result {
            self.state = ListenerState::Failed;
            tracing::warn!(error = %e, "Redirect listener failed");
        }
        self.state = ListenerState::Closed;
        result
    }

    async fn serve(&mut self, listener: TcpListener) -> Result<TokenResponse> {
        let (mut stream, peer) = listener.accept().await?;
        drop(listener);
        tracing::debug!(peer = %peer, "Accepted redirect connection");

        let request = read_request(&mut stream, self.read_timeout).await?;

        let Some(code) = parse_code(&request) else {
            let message = format!("Unable to find authorization code: {request}");
            respond(&mut stream, internal_error(&message)).await;
            return Err(AuthError::AuthorizationCodeMissing { request });
        };
        self.state = ListenerState::CodeReceived;

        match self.endpoint.exchange_code(&code, &self.url).await {
            Ok(tokens) => {
                self.state = ListenerState::Exchanged;
                respond(&mut stream, success_response()).await;
                Ok(tokens)
            }
            Err(e) => {
                let message = format!(
                    "Failed to obtain ID/Access tokens: {e}\n\nAuth Response: {request}\n\nAuth Code: {code}"
                );
                respond(&mut stream, internal_error(&message)).await;
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for RedirectListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedirectListener")
            .field("url", &self.url)
            .field("state", &self.state)
            .finish()
    }
}

/// Read until the header block ends, the peer stops sending, or a read times out.
async fn read_request(stream: &mut TcpStream, read_timeout: Duration) -> Result<String> {
    let mut data = Vec::new();
    let mut buffer = [0u8; 1024];

    loop {
        match tokio::time::timeout(read_timeout, stream.read(&mut buffer)).await {
            Err(_) => break,
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => data.extend_from_slice(&buffer[..n]),
            Ok(Err(e)) => return Err(e.into()),
        }
        if data.len() >= MAX_REQUEST_BYTES || data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    Ok(String::from_utf8_lossy(&data).into_owned())
}

/// Extract the `code` query parameter from the request line.
fn parse_code(request: &str) -> Option<String> {
    // GET /?code=xxx&session_state=yyy HTTP/1.1
    let target = request.lines().next()?.split_whitespace().nth(1)?;
    if !target.starts_with('/') {
        return None;
    }
    let url = Url::parse(&format!("http://localhost{target}")).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

async fn respond(stream: &mut TcpStream, response: String) {
    // The browser may already be gone; the exchange outcome stands either way.
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn success_response() -> String {
    let body = r#"<!DOCTYPE html>
<html>
<head><title>Logged in</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px;">
<h1>You are logged in!</h1>
<p>You may close this window and return to the terminal.</p>
</body>
</html>"#;
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

fn internal_error(message: &str) -> String {
    format!(
        "HTTP/1.1 500 Internal Server Error\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        message.len(),
        message
    )
}
