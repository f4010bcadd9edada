//! Service supervisor.
//!
//! [`Supervisor::run`] starts every [`Service`] on its own task under a child
//! of the caller's cancellation token and waits for the first of:
//!
//! - the caller's token firing (clean shutdown, returns `Ok(())`)
//! - a service failing (returns that failure, naming the service)
//!
//! Either way the child token is then cancelled and the remaining services
//! get a bounded grace period to return. Services still running after the
//! grace period are detached, not aborted, and the supervisor returns
//! without them.
//!
//! Only the first failure is returned. Failures reported while the others
//! shut down are logged.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::error::{Error, Result};
use crate::traits::Service;

/// Default time services get to stop after cancellation.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Runs a fixed set of services as one unit.
pub struct Supervisor {
    services: Vec<Arc<dyn Service>>,
    grace: Duration,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("services", &self.service_names())
            .field("grace", &self.grace)
            .finish()
    }
}

impl Supervisor {
    /// Create a supervisor with the default grace period.
    pub fn new(services: Vec<Arc<dyn Service>>) -> Self {
        Self {
            services,
            grace: DEFAULT_GRACE_PERIOD,
        }
    }

    /// Set the shutdown grace period.
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// The shutdown grace period.
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Names of the supervised services, in start order.
    pub fn service_names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name()).collect()
    }

    /// Run all services until `parent` is cancelled or one of them fails.
    ///
    /// May be called again after it returns; every call starts the services
    /// afresh under a new child token.
    pub async fn run(&self, parent: &CancellationToken) -> Result<()> {
        if self.services.is_empty() {
            debug!("No services to supervise");
            return Ok(());
        }

        let child = parent.child_token();
        // every service reports at most once, so sends never wait
        let (failures_tx, mut failures_rx) = mpsc::channel::<Error>(self.services.len());
        let mut tasks = JoinSet::new();
        let mut running: HashMap<Id, String> = HashMap::with_capacity(self.services.len());

        info!("Starting {} service(s)", self.services.len());

        for service in &self.services {
            let service = Arc::clone(service);
            let token = child.clone();
            let failures_tx = failures_tx.clone();
            let name = service.name().to_string();
            let span = info_span!("service", name = %name);

            let handle = tasks.spawn(
                async move {
                    let result = service.start(token.clone()).await;
                    let name = service.name();

                    let failure = match result {
                        Ok(()) | Err(Error::Cancelled) if token.is_cancelled() => None,
                        Err(e) if e.is_cancelled() && token.is_cancelled() => None,
                        Ok(()) | Err(Error::Cancelled) => Some(Error::ServiceExited {
                            service: name.to_string(),
                        }),
                        Err(e) => Some(Error::service_failed(name, e)),
                    };

                    match failure {
                        None => debug!("{} stopped", name),
                        Some(err) => {
                            let _ = failures_tx.try_send(err);
                            token.cancel();
                        }
                    }
                }
                .instrument(span),
            );
            running.insert(handle.id(), name);
        }
        drop(failures_tx);

        let cause = loop {
            tokio::select! {
                _ = parent.cancelled() => {
                    info!("Shutdown requested, stopping services");
                    break None;
                }
                Some(err) = failures_rx.recv() => {
                    error!("{}", err);
                    break Some(err);
                }
                Some(joined) = tasks.join_next_with_id() => {
                    match joined {
                        Ok((id, ())) => {
                            running.remove(&id);
                        }
                        Err(e) => {
                            let service = running.remove(&e.id()).unwrap_or_default();
                            if e.is_panic() {
                                error!("{} panicked", service);
                                break Some(Error::ServicePanicked { service });
                            }
                        }
                    }
                }
            }
        };

        child.cancel();
        self.wait_with_grace(&mut tasks, &mut running).await;

        while let Ok(err) = failures_rx.try_recv() {
            if cause.is_some() {
                warn!("Also failed during shutdown: {}", err);
            } else {
                warn!("Failed during shutdown: {}", err);
            }
        }

        match cause {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Wait up to the grace period for every task to return.
    async fn wait_with_grace(&self, tasks: &mut JoinSet<()>, running: &mut HashMap<Id, String>) {
        let done = async {
            while let Some(joined) = tasks.join_next_with_id().await {
                match joined {
                    Ok((id, ())) => {
                        running.remove(&id);
                    }
                    Err(e) => {
                        let service = running.remove(&e.id()).unwrap_or_default();
                        if e.is_panic() {
                            warn!("{} panicked during shutdown", service);
                        }
                    }
                }
            }
        };

        if tokio::time::timeout(self.grace, done).await.is_ok() {
            debug!("All services stopped");
            return;
        }

        let mut stuck: Vec<&str> = running.values().map(String::as_str).collect();
        stuck.sort_unstable();
        warn!(
            "{} did not stop within {:?}, leaving running",
            stuck.join(", "),
            self.grace
        );
        tasks.detach_all();
    }
}
