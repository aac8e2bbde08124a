//! Interactive OAuth authorization through the user's browser.
//!
//! [`InteractiveAuthorizer::start`] is the one-call entry point: it reuses a
//! saved credential when there is one, and otherwise runs the consent flow
//! and hands the resulting record to the [`TokenLifecycleManager`].
//!
//! The consent flow is split in two halves so callers can observe it:
//! [`InteractiveAuthorizer::begin`] binds the callback listener and returns
//! an [`AuthorizationSession`]; [`AuthorizationSession::wait`] serves the
//! callback endpoint until one callback ends the session.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use url::{Host, Url};

use crate::error::{AuthError, AuthResult};
use crate::lifecycle::TokenLifecycleManager;
use crate::oauth::{CALENDAR_SCOPE, GoogleOAuthClient, OAuthClient, PkceFlow};
use crate::secrets::ClientSecrets;

/// Path of the OAuth redirect endpoint.
pub const CALLBACK_PATH: &str = "/oauth2/callback";

const SUCCESS_BODY: &str = "Authentication successful! You can close this window.";
const FAILURE_BODY: &str = "Authentication failed. Please try again.";
const NOT_FOUND_BODY: &str = "Not found";

/// Time a connection gets to send its request head.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_HEADER_LINES: usize = 100;

/// Builds the OAuth client used for the consent URL and the code exchange.
pub type ClientBuilder =
    Arc<dyn Fn(ClientSecrets, &str) -> AuthResult<Arc<dyn OAuthClient>> + Send + Sync>;

/// Opens a URL for the user, usually in their browser.
pub type UrlOpener = Arc<dyn Fn(&str) -> std::io::Result<()> + Send + Sync>;

/// Returns the redirect URI for `host`, e.g. `http://localhost:3001/oauth2/callback`.
pub fn callback_url(host: &str) -> String {
    format!("{}{}", host.trim_end_matches('/'), CALLBACK_PATH)
}

/// A [`ClientBuilder`] producing [`GoogleOAuthClient`]s.
pub fn google_client_builder() -> ClientBuilder {
    Arc::new(
        |secrets: ClientSecrets, redirect_uri: &str| -> AuthResult<Arc<dyn OAuthClient>> {
            let client = GoogleOAuthClient::new(secrets, redirect_uri)?;
            Ok(Arc::new(client))
        },
    )
}

fn browser_opener() -> UrlOpener {
    Arc::new(|url: &str| open::that(url))
}

/// Settings for [`InteractiveAuthorizer`].
#[derive(Debug, Clone)]
pub struct AuthorizerConfig {
    /// Client identity file.
    pub secrets_path: PathBuf,
    /// Redirect URI registered with the provider.
    pub redirect_uri: String,
    /// Scopes requested on the consent screen.
    pub scopes: Vec<String>,
    /// Give up waiting for the callback after this long. `None` waits
    /// indefinitely.
    pub callback_timeout: Option<Duration>,
    /// Address to bind instead of the one derived from `redirect_uri`.
    pub listen_addr: Option<SocketAddr>,
}

impl AuthorizerConfig {
    /// Config for the calendar scope with the callback served under `host`.
    pub fn new(secrets_path: impl Into<PathBuf>, host: &str) -> Self {
        Self {
            secrets_path: secrets_path.into(),
            redirect_uri: callback_url(host),
            scopes: vec![CALENDAR_SCOPE.to_string()],
            callback_timeout: None,
            listen_addr: None,
        }
    }

    /// Sets the callback timeout.
    pub fn with_callback_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Overrides the bind address.
    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = Some(addr);
        self
    }

    /// Resolves the bind address and the path callbacks arrive on.
    ///
    /// `localhost` binds the IPv4 loopback (see [`Self::wants_ipv6_loopback`]);
    /// other host names bind every interface since the listener presumably
    /// sits behind a proxy.
    fn endpoint(&self) -> AuthResult<(SocketAddr, String)> {
        let url = Url::parse(&self.redirect_uri).map_err(|e| {
            AuthError::configuration(format!("invalid redirect URI '{}'", self.redirect_uri))
                .with_source(e)
        })?;
        let path = url.path().to_string();

        if let Some(addr) = self.listen_addr {
            return Ok((addr, path));
        }

        let port = url.port_or_known_default().ok_or_else(|| {
            AuthError::configuration(format!("redirect URI '{}' has no port", self.redirect_uri))
        })?;
        let ip = match url.host() {
            Some(Host::Ipv4(ip)) => IpAddr::V4(ip),
            Some(Host::Ipv6(ip)) => IpAddr::V6(ip),
            Some(Host::Domain("localhost")) => IpAddr::V4(Ipv4Addr::LOCALHOST),
            Some(Host::Domain(_)) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            None => {
                return Err(AuthError::configuration(format!(
                    "redirect URI '{}' has no host",
                    self.redirect_uri
                )));
            }
        };
        Ok((SocketAddr::new(ip, port), path))
    }

    /// Browsers may resolve `localhost` to `::1` first, so a `localhost`
    /// redirect is also served on the IPv6 loopback when one exists.
    fn wants_ipv6_loopback(&self) -> bool {
        self.listen_addr.is_none()
            && Url::parse(&self.redirect_uri)
                .is_ok_and(|url| url.host() == Some(Host::Domain("localhost")))
    }
}

/// Obtains a credential interactively and deposits it in the manager.
pub struct InteractiveAuthorizer {
    manager: TokenLifecycleManager,
    config: AuthorizerConfig,
    build_client: ClientBuilder,
    open_url: UrlOpener,
}

impl std::fmt::Debug for InteractiveAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractiveAuthorizer")
            .field("manager", &self.manager)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl InteractiveAuthorizer {
    /// Creates an authorizer talking to Google and opening the system browser.
    pub fn new(manager: TokenLifecycleManager, config: AuthorizerConfig) -> Self {
        Self {
            manager,
            config,
            build_client: google_client_builder(),
            open_url: browser_opener(),
        }
    }

    /// Replaces the OAuth client factory.
    pub fn with_client_builder(mut self, builder: ClientBuilder) -> Self {
        self.build_client = builder;
        self
    }

    /// Replaces how the consent URL is presented to the user.
    pub fn with_url_opener(mut self, opener: UrlOpener) -> Self {
        self.open_url = opener;
        self
    }

    /// Returns the redirect URI.
    pub fn redirect_uri(&self) -> &str {
        &self.config.redirect_uri
    }

    /// Ensures the manager holds a credential.
    ///
    /// Returns `true` immediately when a saved credential loads. Otherwise
    /// runs the consent flow; every failure is logged and reported as
    /// `false`.
    pub async fn start(&self) -> bool {
        if self.manager.load_saved().await {
            info!("using saved credentials");
            return true;
        }
        self.authorize().await
    }

    /// Runs the consent flow regardless of any saved credential.
    pub async fn authorize(&self) -> bool {
        let session = match self.begin().await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "failed to start authorization");
                return false;
            }
        };

        self.present(session.authorization_url());

        match session.wait().await {
            Ok(()) => {
                info!("authorization complete");
                true
            }
            Err(e) => {
                error!(error = %e, "authorization failed");
                false
            }
        }
    }

    /// Loads the client identity, builds the OAuth client and binds the
    /// callback listener.
    pub async fn begin(&self) -> AuthResult<AuthorizationSession> {
        let secrets = ClientSecrets::from_file(&self.config.secrets_path)?;
        secrets.validate()?;
        let (addr, callback_path) = self.config.endpoint()?;

        let client = (self.build_client)(secrets, &self.config.redirect_uri)?;
        let pkce = PkceFlow::new();
        let authorization_url = client.authorization_url(&self.config.scopes, &pkce);

        let listener = TcpListener::bind(addr).await.map_err(|e| {
            AuthError::authorization(format!("failed to bind callback listener on {addr}"))
                .with_source(e)
        })?;
        let ipv6_listener = if self.config.wants_ipv6_loopback() {
            bind_ipv6_loopback(&listener).await
        } else {
            None
        };
        info!(
            addr = %addr,
            ipv6 = ipv6_listener.is_some(),
            redirect_uri = %self.config.redirect_uri,
            "waiting for OAuth callback"
        );

        let (state, _) = watch::channel(SessionState::WaitingForCode);
        Ok(AuthorizationSession {
            listener,
            ipv6_listener,
            client,
            manager: self.manager.clone(),
            pkce,
            authorization_url,
            callback_path,
            timeout: self.config.callback_timeout,
            state,
        })
    }

    fn present(&self, url: &str) {
        debug!(url = %url, "authorization URL");
        if let Err(e) = (self.open_url)(url) {
            warn!(error = %e, "failed to open browser");
            eprintln!("\nPlease open this URL in your browser:\n\n{}\n", url);
        }
    }
}

/// Progress of an [`AuthorizationSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Listening for the provider redirect.
    WaitingForCode,
    /// Exchanging the code for tokens.
    Exchanging,
    /// Tokens saved.
    Done,
    /// The callback, exchange or save failed.
    Failed,
}

impl SessionState {
    /// True for `Done` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// A bound callback listener waiting for one authorization redirect.
pub struct AuthorizationSession {
    listener: TcpListener,
    ipv6_listener: Option<TcpListener>,
    client: Arc<dyn OAuthClient>,
    manager: TokenLifecycleManager,
    pkce: PkceFlow,
    authorization_url: String,
    callback_path: String,
    timeout: Option<Duration>,
    state: watch::Sender<SessionState>,
}

impl std::fmt::Debug for AuthorizationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationSession")
            .field("local_addr", &self.listener.local_addr().ok())
            .field("callback_path", &self.callback_path)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl AuthorizationSession {
    /// The consent URL to open.
    pub fn authorization_url(&self) -> &str {
        &self.authorization_url
    }

    /// Address the callback listener is bound to.
    pub fn local_addr(&self) -> AuthResult<SocketAddr> {
        self.listener.local_addr().map_err(|e| {
            AuthError::authorization("callback listener has no local address").with_source(e)
        })
    }

    /// The anti-CSRF value the callback must echo.
    pub fn csrf_state(&self) -> &str {
        &self.pkce.state
    }

    /// Current progress.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Subscribes to progress changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Serves the callback endpoint until a callback ends the session.
    pub async fn wait(self) -> AuthResult<()> {
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.serve())
                .await
                .unwrap_or_else(|_| {
                    Err(AuthError::authorization(format!(
                        "no OAuth callback received within {}s",
                        limit.as_secs()
                    )))
                }),
            None => self.serve().await,
        };

        self.state.send_replace(if result.is_ok() {
            SessionState::Done
        } else {
            SessionState::Failed
        });
        result
    }

    async fn serve(&self) -> AuthResult<()> {
        loop {
            let (stream, peer) = match self.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "failed to accept callback connection");
                    continue;
                }
            };
            debug!(peer = %peer, "callback connection");

            if let Some(result) = self.handle_connection(stream).await {
                return result;
            }
        }
    }

    async fn accept(&self) -> std::io::Result<(TcpStream, SocketAddr)> {
        match &self.ipv6_listener {
            Some(v6) => tokio::select! {
                conn = self.listener.accept() => conn,
                conn = v6.accept() => conn,
            },
            None => self.listener.accept().await,
        }
    }

    /// Answers one HTTP request. Returns `None` when the request was not
    /// the callback and the session should keep waiting.
    async fn handle_connection(&self, stream: TcpStream) -> Option<AuthResult<()>> {
        let mut reader = BufReader::new(stream);
        let request =
            match tokio::time::timeout(REQUEST_READ_TIMEOUT, read_request_head(&mut reader)).await {
                Ok(Some(request)) => request,
                _ => return None,
            };

        let (path, query) = request
            .target
            .split_once('?')
            .unwrap_or((request.target.as_str(), ""));
        if request.method != "GET" || path != self.callback_path {
            debug!(method = %request.method, path = %path, "not a callback request");
            respond(reader.get_mut(), "404 Not Found", NOT_FOUND_BODY).await;
            return None;
        }

        let result = self.complete(CallbackParams::parse(query)).await;
        match &result {
            Ok(()) => respond(reader.get_mut(), "200 OK", SUCCESS_BODY).await,
            Err(_) => respond(reader.get_mut(), "500 Internal Server Error", FAILURE_BODY).await,
        }
        Some(result)
    }

    async fn complete(&self, params: CallbackParams) -> AuthResult<()> {
        if let Some(error) = params.error {
            return Err(AuthError::authorization(format!(
                "authorization denied: {error}"
            )));
        }
        let code = params
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::authorization("no authorization code in callback"))?;
        if params.state.as_deref() != Some(self.pkce.state.as_str()) {
            return Err(AuthError::authorization(
                "OAuth state mismatch - possible CSRF attack",
            ));
        }

        self.state.send_replace(SessionState::Exchanging);
        info!("received authorization code, exchanging for tokens");

        let record = self.client.exchange_code(&code, &self.pkce.verifier).await?;
        self.manager.save(record).await
    }
}

/// Binds `[::1]` on the same port as `primary`. Hosts without IPv6 keep
/// the IPv4 listener only.
async fn bind_ipv6_loopback(primary: &TcpListener) -> Option<TcpListener> {
    let port = primary.local_addr().ok()?.port();
    let addr = SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), port);
    match TcpListener::bind(addr).await {
        Ok(listener) => Some(listener),
        Err(e) => {
            debug!(addr = %addr, error = %e, "IPv6 loopback unavailable");
            None
        }
    }
}

struct RequestHead {
    method: String,
    target: String,
}

/// Reads the request line and discards the headers.
async fn read_request_head(reader: &mut BufReader<TcpStream>) -> Option<RequestHead> {
    let mut line = String::new();
    reader.read_line(&mut line).await.ok()?;

    let mut parts = line.split_whitespace();
    let head = RequestHead {
        method: parts.next()?.to_string(),
        target: parts.next()?.to_string(),
    };

    for _ in 0..MAX_HEADER_LINES {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) if line.trim().is_empty() => break,
            Ok(_) => {}
        }
    }
    Some(head)
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!(error = %e, "failed to write callback response");
        return;
    }
    let _ = stream.shutdown().await;
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

impl CallbackParams {
    fn parse(query: &str) -> Self {
        let mut params = Self::default();
        for pair in query.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = urlencoding::decode(&value.replace('+', " "))
                .map(|v| v.into_owned())
                .unwrap_or_default();
            match key {
                "code" => params.code = Some(value),
                "state" => params.state = Some(value),
                "error" => params.error = Some(value),
                _ => {}
            }
        }
        params
    }
}
