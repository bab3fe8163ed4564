//! Process-wide stop signal.
//!
//! Every long-running task holds a `watch::Receiver<bool>` and stops once it
//! reads `true`. A dropped sender also counts as stop, so the sender must
//! live for as long as the process runs.

use std::future::Future;

use tokio::sync::watch;
use tracing::{info, warn};

/// Set the stop signal once `signal` resolves.
///
/// If the signal handler cannot be installed (`signal` resolves to an error)
/// the process keeps running and this future never completes, holding the
/// sender so receivers do not see a close.
pub async fn forward_signal<F>(signal: F, shutdown_tx: watch::Sender<bool>)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal");
    shutdown_tx.send_replace(true);
}
