//! Auto-sync scheduler: a fixed-interval timer that keeps trying.
//!
//! Failures are logged and swallowed; the timer is never cancelled by a
//! failed attempt. Consecutive failures double the delay up to a configured
//! ceiling; a success (or a benign in-flight skip) resets it to the base
//! interval. The task ends only through the cancellation token.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use treelink_core::config::SyncSettings;
use treelink_core::SyncError;
use treelink_remote::store::RemoteStore;

use crate::orchestrator::SyncOrchestrator;

pub(crate) fn spawn_auto_sync<R: RemoteStore + 'static>(
    orchestrator: SyncOrchestrator<R>,
    settings: SyncSettings,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let base = Duration::from_millis(settings.auto_sync_interval_ms.max(1));
        let ceiling =
            Duration::from_millis(settings.max_auto_sync_backoff_ms.max(settings.auto_sync_interval_ms));
        let mut delay = base;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("auto-sync scheduler stopped");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match orchestrator.sync(false).await {
                Ok(report) => {
                    delay = base;
                    if !report.is_clean() {
                        debug!(
                            synced = report.synced.len(),
                            conflicts = report.conflicts.len(),
                            errors = report.errors.len(),
                            "auto-sync pass finished"
                        );
                    }
                }
                Err(SyncError::SyncInFlight) => {
                    debug!("a sync is already in flight, tick skipped");
                    delay = base;
                }
                Err(e) => {
                    warn!(error = %e, delay_ms = delay.as_millis() as u64, "auto-sync failed");
                    delay = (delay * 2).min(ceiling);
                }
            }
        }
    })
}
