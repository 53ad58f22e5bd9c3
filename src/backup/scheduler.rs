use std::time::Duration as StdDuration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::backup::{self, CheckOutcome};
use crate::web::AppState;

const CHECK_INTERVAL_SECS: u64 = 60;

/// Spawn the periodic auto-backup check. Returns a token that stops the
/// task when cancelled. The check itself decides whether a backup is due,
/// so the loop cadence only bounds how stale the schedule can get.
pub fn spawn(state: AppState) -> CancellationToken {
    let token = CancellationToken::new();
    let task_token = token.clone();

    tokio::spawn(async move {
        let interval = StdDuration::from_secs(CHECK_INTERVAL_SECS);
        info!(interval_secs = CHECK_INTERVAL_SECS, "auto-backup scheduler started");
        loop {
            tokio::select! {
                _ = task_token.cancelled() => break,
                _ = sleep(interval) => {}
            }

            let outcome = backup::run_check(
                state.pool_ref(),
                state.snapshots(),
                state.backup_config_path(),
            )
            .await;

            match outcome {
                CheckOutcome::Completed { backup, .. } => {
                    info!(file = %backup.name, size = backup.size, "automatic snapshot created");
                }
                CheckOutcome::Failed { error } => {
                    error!(%error, "automatic snapshot failed");
                }
                CheckOutcome::Disabled | CheckOutcome::NotDue { .. } => {}
            }
        }
        info!("auto-backup scheduler stopped");
    });

    token
}
