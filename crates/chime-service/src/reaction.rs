//! What the chime does when a doorbell rings.
//!
//! [`ChimeReaction`] opens the frontend's ringing page and posts a desktop
//! notification. Both side effects sit behind one-method traits and run on
//! the blocking pool, since the platform calls underneath may block.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use chime_core::{Error, Result, RingReaction};
use chime_types::Doorbell;

/// Opens a URL, usually in the default browser.
pub trait UrlLauncher: Send + Sync + 'static {
    fn open(&self, url: &str) -> io::Result<()>;
}

/// Posts a desktop notification.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, summary: &str, body: &str) -> io::Result<()>;
}

/// Opens URLs with the system browser.
#[cfg(feature = "browser")]
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserLauncher;

#[cfg(feature = "browser")]
impl UrlLauncher for BrowserLauncher {
    fn open(&self, url: &str) -> io::Result<()> {
        webbrowser::open(url)
    }
}

/// Posts notifications through the platform notification service.
#[cfg(feature = "notifications")]
#[derive(Debug, Clone, Copy, Default)]
pub struct DesktopNotifier;

#[cfg(feature = "notifications")]
impl Notifier for DesktopNotifier {
    fn notify(&self, summary: &str, body: &str) -> io::Result<()> {
        notify_rust::Notification::new()
            .summary(summary)
            .body(body)
            .appname("Doorbell Chime")
            .show()
            .map(|_| ())
            .map_err(io::Error::other)
    }
}

/// Ring reaction wired to the frontend server.
pub struct ChimeReaction {
    web_port: u16,
    launcher: Option<Arc<dyn UrlLauncher>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl std::fmt::Debug for ChimeReaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChimeReaction")
            .field("web_port", &self.web_port)
            .field("launcher", &self.launcher.is_some())
            .field("notifier", &self.notifier.is_some())
            .finish()
    }
}

impl ChimeReaction {
    /// A reaction with no side effects besides logging.
    pub fn new(web_port: u16) -> Self {
        Self {
            web_port,
            launcher: None,
            notifier: None,
        }
    }

    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn UrlLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// The frontend page for a ringing doorbell.
    pub fn ringing_url(&self, doorbell: &Doorbell) -> String {
        format!("http://127.0.0.1:{}/ringing/{}", self.web_port, doorbell.id)
    }
}

async fn blocking<F>(f: F) -> io::Result<()>
where
    F: FnOnce() -> io::Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .unwrap_or_else(|e| Err(io::Error::other(e)))
}

#[async_trait]
impl RingReaction for ChimeReaction {
    async fn on_ring(&self, doorbell: &Doorbell) -> Result<()> {
        if doorbell.mac.is_empty() {
            info!("{} is rung!", doorbell.name);
        } else {
            info!("{} ({}) is rung!", doorbell.name, doorbell.mac);
        }

        let mut failure: Option<io::Error> = None;

        if let Some(launcher) = &self.launcher {
            let launcher = Arc::clone(launcher);
            let url = self.ringing_url(doorbell);
            match blocking(move || launcher.open(&url)).await {
                Ok(()) => debug!("opened ringing page for {}", doorbell.id),
                Err(e) => failure = Some(e),
            }
        }

        if let Some(notifier) = &self.notifier {
            let notifier = Arc::clone(notifier);
            let body = format!("{} is ringing", doorbell.name);
            match blocking(move || notifier.notify("Doorbell", &body)).await {
                Ok(()) => debug!("notified ring of {}", doorbell.id),
                Err(e) => failure = failure.or(Some(e)),
            }
        }

        match failure {
            Some(e) => Err(Error::Io(e)),
            None => Ok(()),
        }
    }
}
