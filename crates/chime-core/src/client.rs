//! Authenticated session client for the UniFi Protect API.
//!
//! [`UnifiClient`] owns the session credential and hides its renewal from
//! callers: a request that comes back `401 Unauthorized` invalidates the
//! credential, logs in once more and repeats the request exactly once. A
//! second `401` is terminal ([`AuthFailure::RejectedAfterRetry`]).
//!
//! Re-authentication is single-flight. The credential lives behind an async
//! mutex that is held for the whole login, so callers that observe a stale
//! credential while another caller is already logging in wait for that login
//! and reuse its result instead of starting a second one.
//!
//! # Example
//!
//! ```no_run
//! use chime_core::client::{ClientOptions, UnifiClient};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), chime_core::Error> {
//! let options = ClientOptions::for_host("192.168.1.1", 7443, "user", "secret");
//! let client = UnifiClient::new(options)?;
//!
//! client.authenticate().await?;
//! let doorbells = client.doorbells(&CancellationToken::new()).await?;
//! println!("{} doorbells", doorbells.len());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chime_types::{Bootstrap, Doorbell};

use crate::error::{AuthFailure, Error, Result};
use crate::traits::DoorbellSource;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Port the Protect API listens on.
pub const DEFAULT_PORT: u16 = 7443;

/// How many times a request is repeated after a `401`.
const MAX_AUTH_RETRIES: u32 = 1;

/// Message type the doorbell LCD expects for free text.
const CUSTOM_MESSAGE: &str = "CUSTOM_MESSAGE";

/// Connection settings for [`UnifiClient`].
#[derive(Clone)]
pub struct ClientOptions {
    /// API root, e.g. `https://192.168.1.1:7443/api`.
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Accept self-signed certificates (the appliance ships with one).
    pub accept_invalid_certs: bool,
    /// Timeout applied to each call that does not pass its own.
    pub request_timeout: Duration,
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ClientOptions {
    /// Options for an explicit API root.
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            accept_invalid_certs: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Options for the appliance at `host:port`.
    pub fn for_host(
        host: &str,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::new(format!("https://{}:{}/api", host, port), username, password)
    }

    /// Enable or disable certificate verification bypass.
    #[must_use]
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Set the default request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LcdMessageRequest<'a> {
    lcd_message: LcdMessage<'a>,
}

#[derive(Serialize)]
struct LcdMessage<'a> {
    duration: u64,
    text: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
}

/// Session-holding client for the Protect API.
pub struct UnifiClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    request_timeout: Duration,
    /// The authenticated header; `None` until the first login and after a 401.
    session: Mutex<Option<HeaderValue>>,
}

impl std::fmt::Debug for UnifiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl UnifiClient {
    /// Create a client. No network traffic happens until the first call.
    pub fn new(options: ClientOptions) -> Result<Self> {
        let base_url = options.base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::invalid_config(format!(
                "URL must start with http:// or https://, got: {}",
                base_url
            )));
        }

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()
            .map_err(|e| Error::Transport {
                url: base_url.clone(),
                source: e,
            })?;

        Ok(Self {
            http,
            base_url,
            username: options.username,
            password: options.password,
            request_timeout: options.request_timeout,
            session: Mutex::new(None),
        })
    }

    /// The API root.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The default per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Whether a credential is currently held.
    pub async fn is_authenticated(&self) -> bool {
        self.session.lock().await.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn transport_error(url: &str, operation: &str, timeout: Duration, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(operation, timeout)
        } else {
            Error::Transport {
                url: url.to_string(),
                source: e,
            }
        }
    }

    /// Log in with the configured credentials and store the session header.
    pub async fn authenticate(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        *session = None;
        *session = Some(self.login().await?);
        Ok(())
    }

    /// Perform the login call. Callers hold the session lock.
    async fn login(&self) -> Result<HeaderValue> {
        let url = self.url("/auth");
        let response = self
            .http
            .post(&url)
            .json(&Credentials {
                username: &self.username,
                password: &self.password,
            })
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| Self::transport_error(&url, "POST /auth", self.request_timeout, e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Auth(AuthFailure::Rejected {
                status: status.as_u16(),
            }));
        }
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                url,
                method: Method::POST.to_string(),
            });
        }

        let token = response
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .filter(|t| !t.is_empty())
            .ok_or(Error::Auth(AuthFailure::MissingToken))?;

        let mut header = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| Error::Auth(AuthFailure::MissingToken))?;
        header.set_sensitive(true);

        debug!("logged in to {}", self.base_url);
        Ok(header)
    }

    /// Return a usable credential.
    ///
    /// If the held credential is the `stale` one (or none is held), it is
    /// cleared and replaced by a fresh login. If another caller already
    /// replaced it, that newer credential is returned without logging in.
    async fn credential(&self, stale: Option<&HeaderValue>) -> Result<HeaderValue> {
        let mut session = self.session.lock().await;
        if let Some(current) = session.as_ref() {
            if stale != Some(current) {
                return Ok(current.clone());
            }
        }
        *session = None;
        let header = self.login().await?;
        *session = Some(header.clone());
        Ok(header)
    }

    /// Drop `header` if it is still the held credential.
    async fn invalidate(&self, header: &HeaderValue) {
        let mut session = self.session.lock().await;
        if session.as_ref() == Some(header) {
            *session = None;
        }
    }

    /// Issue an authenticated call.
    ///
    /// Returns the response for any 2xx status. A `401` triggers exactly one
    /// re-authentication and one repeat of the call; any other non-2xx status
    /// is returned as [`Error::Http`] without retry.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        let url = self.url(path);
        let operation = format!("{} {}", method, path);
        let mut stale: Option<HeaderValue> = None;
        let mut auth_retries = 0u32;

        loop {
            let header = self.credential(stale.as_ref()).await?;

            let mut builder = self
                .http
                .request(method.clone(), &url)
                .header(AUTHORIZATION, header.clone())
                .timeout(timeout);
            if let Some(body) = &body {
                builder = builder
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.clone());
            }

            let response = builder
                .send()
                .await
                .map_err(|e| Self::transport_error(&url, &operation, timeout, e))?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED {
                if auth_retries < MAX_AUTH_RETRIES {
                    auth_retries += 1;
                    info!("{} returned 401, re-authenticating", operation);
                    stale = Some(header);
                    continue;
                }
                self.invalidate(&header).await;
                return Err(Error::Auth(AuthFailure::RejectedAfterRetry { url }));
            }

            if !status.is_success() {
                let err = Error::Http {
                    status: status.as_u16(),
                    url,
                    method: method.to_string(),
                };
                warn!("{}", err);
                if let Ok(text) = response.text().await {
                    debug!("response body: {}", text);
                }
                return Err(err);
            }

            return Ok(response);
        }
    }

    /// Issue a call and read the whole body, giving up as soon as `cancel`
    /// fires. The in-flight request is dropped (and its connection released)
    /// when cancellation wins.
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        timeout: Duration,
    ) -> Result<Bytes> {
        let url = self.url(path);
        let operation = format!("{} {}", method, path);

        let call = async {
            let response = self.request(method, path, body, timeout).await?;
            response
                .bytes()
                .await
                .map_err(|e| Self::transport_error(&url, &operation, timeout, e))
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = call => result,
        }
    }

    /// Serialize `param` as the JSON body, issue the call and decode a 2xx
    /// body as `R`.
    pub async fn json_request<P, R>(
        &self,
        cancel: &CancellationToken,
        method: Method,
        path: &str,
        param: Option<&P>,
        timeout: Duration,
    ) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let body = self.encode(path, param)?;
        let bytes = self.fetch(cancel, method, path, body, timeout).await?;
        serde_json::from_slice(&bytes).map_err(|e| Error::Decode {
            url: self.url(path),
            source: e,
        })
    }

    fn encode<P: Serialize + ?Sized>(&self, path: &str, param: Option<&P>) -> Result<Option<Bytes>> {
        param
            .map(|p| {
                serde_json::to_vec(p).map(Bytes::from).map_err(|e| Error::Encode {
                    url: self.url(path),
                    source: e,
                })
            })
            .transpose()
    }

    /// Fetch the full device inventory.
    pub async fn bootstrap(&self, cancel: &CancellationToken) -> Result<Bootstrap> {
        self.json_request::<(), Bootstrap>(
            cancel,
            Method::GET,
            "/bootstrap",
            None,
            self.request_timeout,
        )
        .await
    }

    /// Fetch the managed doorbells from the inventory.
    pub async fn doorbells(&self, cancel: &CancellationToken) -> Result<Vec<Doorbell>> {
        Ok(self.bootstrap(cancel).await?.doorbells())
    }

    /// Show `text` on the doorbell's LCD for `duration`.
    pub async fn set_message(
        &self,
        cancel: &CancellationToken,
        doorbell_id: &str,
        text: &str,
        duration: Duration,
    ) -> Result<()> {
        let path = format!("/cameras/{}", doorbell_id);
        let param = LcdMessageRequest {
            lcd_message: LcdMessage {
                duration: duration.as_secs(),
                text,
                kind: CUSTOM_MESSAGE,
            },
        };
        let body = self.encode(&path, Some(&param))?;
        self.fetch(cancel, Method::PATCH, &path, body, self.request_timeout)
            .await?;

        debug!("set \"{}\" as message on {}", text, doorbell_id);
        Ok(())
    }

    /// Fetch a JPEG snapshot from the doorbell camera.
    pub async fn snapshot(&self, cancel: &CancellationToken, doorbell_id: &str) -> Result<Bytes> {
        let path = format!("/cameras/{}/snapshot", doorbell_id);
        self.fetch(cancel, Method::GET, &path, None, self.request_timeout)
            .await
    }
}

#[async_trait]
impl DoorbellSource for UnifiClient {
    async fn authenticate(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = UnifiClient::authenticate(self) => result,
        }
    }

    async fn doorbells(&self, cancel: &CancellationToken) -> Result<Vec<Doorbell>> {
        UnifiClient::doorbells(self, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    /// Hands out a new token on every login.
    struct TokenSequence {
        tokens: Vec<&'static str>,
        calls: AtomicUsize,
    }

    impl TokenSequence {
        fn new(tokens: &[&'static str]) -> Self {
            Self {
                tokens: tokens.to_vec(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Respond for TokenSequence {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let token = self.tokens[n.min(self.tokens.len() - 1)];
            ResponseTemplate::new(200).insert_header("Authorization", token)
        }
    }

    fn bootstrap_body() -> serde_json::Value {
        serde_json::json!({
            "authUserId": "u1",
            "cameras": [
                {"id": "d1", "name": "Front", "type": "UVC G4 Doorbell",
                 "isManaged": true, "lastRing": 100}
            ]
        })
    }

    async fn mount_login(server: &MockServer, tokens: &[&'static str]) {
        Mock::given(method("POST"))
            .and(path("/api/auth"))
            .and(body_json(serde_json::json!({"username": "user", "password": "pass"})))
            .respond_with(TokenSequence::new(tokens))
            .mount(server)
            .await;
    }

    async fn hits(server: &MockServer, route: &str) -> usize {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == route)
            .count()
    }

    fn client_for(server: &MockServer) -> UnifiClient {
        UnifiClient::new(ClientOptions::new(
            format!("{}/api", server.uri()),
            "user",
            "pass",
        ))
        .unwrap()
    }

    #[test]
    fn test_client_invalid_url() {
        let result = UnifiClient::new(ClientOptions::new("nvr.local:7443", "u", "p"));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_client_normalizes_url() {
        let client = UnifiClient::new(ClientOptions::new("http://nvr/api/", "u", "p")).unwrap();
        assert_eq!(client.base_url(), "http://nvr/api");

        let options = ClientOptions::for_host("192.168.1.1", DEFAULT_PORT, "u", "p");
        assert_eq!(options.base_url, "https://192.168.1.1:7443/api");
    }

    #[test]
    fn test_options_debug_redacts_password() {
        let options = ClientOptions::new("http://nvr/api", "user", "hunter2");
        let debug = format!("{:?}", options);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("redacted"));
    }

    #[tokio::test]
    async fn test_authenticate_stores_bearer_header() {
        let server = MockServer::start().await;
        mount_login(&server, &["abc"]).await;
        Mock::given(method("GET"))
            .and(path("/api/bootstrap"))
            .and(header("Authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(bootstrap_body()))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(!client.is_authenticated().await);
        client.authenticate().await.unwrap();
        assert!(client.is_authenticated().await);

        let doorbells = client.doorbells(&CancellationToken::new()).await.unwrap();
        assert_eq!(doorbells.len(), 1);
        assert_eq!(doorbells[0].name, "Front");
        assert_eq!(hits(&server, "/api/auth").await, 1);
    }

    #[tokio::test]
    async fn test_request_logs_in_when_no_session() {
        let server = MockServer::start().await;
        mount_login(&server, &["abc"]).await;
        Mock::given(method("GET"))
            .and(path("/api/bootstrap"))
            .and(header("Authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(bootstrap_body()))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.bootstrap(&CancellationToken::new()).await.unwrap();
        assert_eq!(hits(&server, "/api/auth").await, 1);
    }

    #[tokio::test]
    async fn test_unauthorized_then_ok_reauthenticates_once() {
        let server = MockServer::start().await;
        mount_login(&server, &["abc", "def"]).await;
        Mock::given(method("GET"))
            .and(path("/api/bootstrap"))
            .and(header("Authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/bootstrap"))
            .and(header("Authorization", "Bearer def"))
            .respond_with(ResponseTemplate::new(200).set_body_json(bootstrap_body()))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.authenticate().await.unwrap();

        let bootstrap = client.bootstrap(&CancellationToken::new()).await.unwrap();
        assert_eq!(bootstrap.auth_user_id, "u1");

        // one initial login plus exactly one re-authentication
        assert_eq!(hits(&server, "/api/auth").await, 2);
        assert_eq!(hits(&server, "/api/bootstrap").await, 2);
    }

    #[tokio::test]
    async fn test_unauthorized_twice_is_terminal() {
        let server = MockServer::start().await;
        mount_login(&server, &["abc", "def", "ghi"]).await;
        Mock::given(method("GET"))
            .and(path("/api/bootstrap"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.authenticate().await.unwrap();

        let err = client
            .bootstrap(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Auth(AuthFailure::RejectedAfterRetry { .. })
        ));
        assert_eq!(hits(&server, "/api/auth").await, 2);
        assert_eq!(hits(&server, "/api/bootstrap").await, 2);
        assert!(!client.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_concurrent_unauthorized_single_login() {
        let server = MockServer::start().await;
        mount_login(&server, &["abc", "def", "ghi"]).await;
        Mock::given(method("GET"))
            .and(path("/api/bootstrap"))
            .and(header("Authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/bootstrap"))
            .and(header("Authorization", "Bearer def"))
            .respond_with(ResponseTemplate::new(200).set_body_json(bootstrap_body()))
            .mount(&server)
            .await;

        let client = Arc::new(client_for(&server));
        client.authenticate().await.unwrap();

        let cancel = CancellationToken::new();
        let (a, b) = tokio::join!(client.bootstrap(&cancel), client.bootstrap(&cancel));
        assert!(a.is_ok());
        assert!(b.is_ok());

        assert_eq!(hits(&server, "/api/auth").await, 2);
    }

    #[tokio::test]
    async fn test_non_success_is_http_error_without_retry() {
        let server = MockServer::start().await;
        mount_login(&server, &["abc"]).await;
        Mock::given(method("GET"))
            .and(path("/api/cameras/missing/snapshot"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such camera"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .snapshot(&CancellationToken::new(), "missing")
            .await
            .unwrap_err();

        match err {
            Error::Http {
                status,
                url,
                method,
            } => {
                assert_eq!(status, 404);
                assert!(url.ends_with("/api/cameras/missing/snapshot"));
                assert_eq!(method, "GET");
            }
            other => panic!("expected Http error, got {:?}", other),
        }
        assert_eq!(hits(&server, "/api/cameras/missing/snapshot").await, 1);
        assert_eq!(hits(&server, "/api/auth").await, 1);
    }

    #[tokio::test]
    async fn test_snapshot_returns_bytes() {
        let server = MockServer::start().await;
        mount_login(&server, &["abc"]).await;
        Mock::given(method("GET"))
            .and(path("/api/cameras/d1/snapshot"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "image/jpeg")
                    .set_body_bytes(vec![0xFF, 0xD8, 0xFF]),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let bytes = client
            .snapshot(&CancellationToken::new(), "d1")
            .await
            .unwrap();
        assert_eq!(&bytes[..], &[0xFF, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn test_set_message_body() {
        let server = MockServer::start().await;
        mount_login(&server, &["abc"]).await;
        Mock::given(method("PATCH"))
            .and(path("/api/cameras/d1"))
            .and(body_json(serde_json::json!({
                "lcdMessage": {"duration": 30, "text": "On my way", "type": "CUSTOM_MESSAGE"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client
            .set_message(
                &CancellationToken::new(),
                "d1",
                "On my way",
                Duration::from_secs(30),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.authenticate().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Auth(AuthFailure::Rejected { status: 401 })
        ));
        assert!(!client.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_login_without_token_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.authenticate().await.unwrap_err();
        assert!(matches!(err, Error::Auth(AuthFailure::MissingToken)));
    }

    #[tokio::test]
    async fn test_decode_error() {
        let server = MockServer::start().await;
        mount_login(&server, &["abc"]).await;
        Mock::given(method("GET"))
            .and(path("/api/bootstrap"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .bootstrap(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[tokio::test]
    async fn test_cancel_wins_over_slow_response() {
        let server = MockServer::start().await;
        mount_login(&server, &["abc"]).await;
        Mock::given(method("GET"))
            .and(path("/api/bootstrap"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(bootstrap_body())
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.authenticate().await.unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = client.bootstrap(&cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancel_wins_over_slow_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Authorization", "abc")
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = DoorbellSource::authenticate(&client, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!client.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let server = MockServer::start().await;
        mount_login(&server, &["abc"]).await;
        Mock::given(method("GET"))
            .and(path("/api/bootstrap"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let client = UnifiClient::new(
            ClientOptions::new(format!("{}/api", server.uri()), "user", "pass")
                .request_timeout(Duration::from_millis(100)),
        )
        .unwrap();

        let err = client
            .bootstrap(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_transport_error() {
        // Nothing listens on the discard port
        let client = UnifiClient::new(ClientOptions::new("http://127.0.0.1:9/api", "u", "p")).unwrap();
        let err = client.authenticate().await.unwrap_err();
        assert!(matches!(err, Error::Transport { .. } | Error::Timeout { .. }));
        assert!(err.is_transient());
    }
}
