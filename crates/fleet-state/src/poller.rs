//! Recurring per-client location freshness task.
//!
//! One task per connected client. The [`tokio_util::sync::CancellationToken`]
//! held in the manager's poller map is the single source of truth for whether
//! the task is still current: the canceller cancels it, and the task itself
//! re-checks it at fire time so a tick that raced a cancellation takes no
//! action.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::manager::FleetManager;

pub(crate) struct PollHandle {
    token: CancellationToken,
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Spawn the recurring task; the first tick fires one full interval after
/// start.
pub(crate) fn spawn(manager: Arc<FleetManager>, client_id: String, interval: Duration) -> PollHandle {
    let token = CancellationToken::new();
    let task_token = token.clone();
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        loop {
            tokio::select! {
                _ = task_token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if task_token.is_cancelled() {
                break;
            }
            manager.poll_tick(&client_id, &task_token).await;
        }
        debug!(client_id = %client_id, "location poller stopped");
    });
    PollHandle { token }
}
