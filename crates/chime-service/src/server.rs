//! HTTP servers as supervised services.

use std::convert::Infallible;
use std::net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener};

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::{Extension, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use chime_core::{Result, Service};

/// Pick a concrete port: `0` becomes a currently free local port.
///
/// The port is only probed, not held, so another process could take it
/// before the server binds. Startup then fails with the bind error.
pub fn resolve_port(port: u16) -> std::io::Result<u16> {
    if port != 0 {
        return Ok(port);
    }
    let probe = StdTcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    Ok(probe.local_addr()?.port())
}

/// Cancellation token of the serving run, for handlers that call out.
///
/// [`HttpService`] installs it on every request, so in-flight calls stop
/// when the service is told to stop. Outside a service run it is a token
/// that never fires.
#[derive(Debug, Clone, Default)]
pub struct ServeToken(pub CancellationToken);

impl<S: Send + Sync> FromRequestParts<S> for ServeToken {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<ServeToken>().cloned().unwrap_or_default())
    }
}

/// Serves a router on a fixed address until cancelled.
///
/// Every `start` binds afresh, so the service can be restarted.
pub struct HttpService {
    name: String,
    addr: SocketAddr,
    router: Router,
}

impl std::fmt::Debug for HttpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpService")
            .field("name", &self.name)
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

impl HttpService {
    pub fn new(name: impl Into<String>, addr: SocketAddr, router: Router) -> Self {
        Self {
            name: name.into(),
            addr,
            router,
        }
    }

    /// A service listening on `127.0.0.1:port`.
    pub fn local(name: impl Into<String>, port: u16, router: Router) -> Self {
        Self::new(name, SocketAddr::from((Ipv4Addr::LOCALHOST, port)), router)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl Service for HttpService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("start {} server. {}", self.name, listener.local_addr()?);

        let router = self
            .router
            .clone()
            .layer(Extension(ServeToken(cancel.clone())));

        axum::serve(listener, router)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await?;

        info!("{} server stopped", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::routing::get;

    #[test]
    fn test_resolve_port() {
        assert_eq!(resolve_port(8080).unwrap(), 8080);
        assert_ne!(resolve_port(0).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_serves_until_cancelled() {
        let port = resolve_port(0).unwrap();
        let router = Router::new().route("/ping", get(|| async { "pong" }));
        let service = std::sync::Arc::new(HttpService::local("test", port, router));

        let cancel = CancellationToken::new();
        let task = {
            let service = service.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { service.start(cancel).await })
        };

        // wait for the listener
        let mut connected = false;
        for _ in 0..50 {
            if tokio::net::TcpStream::connect(service.addr()).await.is_ok() {
                connected = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(connected);

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_stop_reaches_in_flight_handlers() {
        let port = resolve_port(0).unwrap();
        let router = Router::new().route(
            "/wait",
            get(|ServeToken(stop): ServeToken| async move {
                stop.cancelled().await;
                "stopped"
            }),
        );
        let service = std::sync::Arc::new(HttpService::local("test", port, router));

        let cancel = CancellationToken::new();
        let task = {
            let service = service.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { service.start(cancel).await })
        };

        let request = tokio::spawn(async move {
            let client = reqwest::Client::new();
            let url = format!("http://127.0.0.1:{}/wait", port);
            for _ in 0..50 {
                if let Ok(response) = client.get(&url).send().await {
                    return response.text().await.unwrap();
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            panic!("server never came up");
        });

        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();

        let body = tokio::time::timeout(Duration::from_secs(2), request)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(body, "stopped");
        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_bind_failure_is_io_error() {
        let taken = StdTcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = taken.local_addr().unwrap().port();

        let service = HttpService::local("test", port, Router::new());
        let err = service.start(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, chime_core::Error::Io(_)));
    }
}
