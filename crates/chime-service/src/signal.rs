//! Shutdown signals.
//!
//! On Unix, SIGINT, SIGTERM and SIGQUIT all request shutdown. Elsewhere only
//! Ctrl-C does.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Cancel `token` on the first shutdown signal.
///
/// If the handlers cannot be installed the failure is logged and `token` is
/// left alone; the process then only stops on a service failure.
pub fn cancel_on_signal(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(cancel_when(wait_for_shutdown_signal(), token))
}

async fn cancel_when<F>(signal: F, token: CancellationToken)
where
    F: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        result = signal => match result {
            Ok(()) => {
                info!("shutdown signal received");
                token.cancel();
            }
            Err(e) => error!("failed to listen for shutdown signals: {}", e),
        },
        _ = token.cancelled() => {}
    }
}
