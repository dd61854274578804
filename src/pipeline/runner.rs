//! Poll runner — periodic fetch-and-drain loop.
//!
//! An external trigger drives the pipeline; this runner is the built-in
//! one: every tick it fetches unread mail for all active email accounts,
//! then drains pending messages. The orchestrator's shutdown flag stops
//! the loop between cycles — an in-flight message completes first.

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::pipeline::orchestrator::AutoReplyOrchestrator;

/// Spawn the background poll loop. Returns its join handle; stop it by
/// setting the orchestrator's shutdown flag.
pub fn spawn_poll_loop(
    orchestrator: std::sync::Arc<AutoReplyOrchestrator>,
    interval: Duration,
) -> JoinHandle<()> {
    let shutdown = orchestrator.shutdown_flag();

    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Poll loop started");
        let mut tick = tokio::time::interval(interval);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Poll loop shutting down");
                return;
            }

            let fetched = orchestrator.fetch_new_mail().await;
            let replied = orchestrator.process_pending().await;
            if fetched > 0 || replied > 0 {
                info!(fetched, replied, "Poll cycle complete");
            } else {
                debug!("Poll cycle complete (idle)");
            }
        }
    })
}
