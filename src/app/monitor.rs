//! Periodic status reporting for the render callback.
//!
//! The callback only bumps counters; this task turns them into log lines.

use crate::audio::{PipelineStatus, StatusSnapshot, TrajectoryPhase};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    PhaseEntered(TrajectoryPhase),
    Xruns { new: u64, total: u64 },
    LockMisses { new: u64 },
}

/// Events since `last`, which is updated to the current counters.
pub fn poll_status(status: &PipelineStatus, last: &mut StatusSnapshot) -> Vec<StatusEvent> {
    let mut events = Vec::new();
    if let Some(phase) = status.take_entered_phase() {
        events.push(StatusEvent::PhaseEntered(phase));
    }

    let now = status.snapshot();
    if now.xruns > last.xruns {
        events.push(StatusEvent::Xruns {
            new: now.xruns - last.xruns,
            total: now.xruns,
        });
    }
    if now.lock_misses > last.lock_misses {
        events.push(StatusEvent::LockMisses {
            new: now.lock_misses - last.lock_misses,
        });
    }
    *last = now;
    events
}

fn log_event(event: StatusEvent) {
    match event {
        StatusEvent::PhaseEntered(phase) => {
            info!("Currently doing {} plane trajectory", phase)
        }
        StatusEvent::Xruns { new, total } => {
            warn!("Stream over/underflow detected ({} new, {} total)", new, total)
        }
        StatusEvent::LockMisses { new } => {
            debug!("{} buffer(s) rendered as silence while reconfiguring", new)
        }
    }
}

/// Background task polling [`PipelineStatus`].
pub struct StatusMonitor {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StatusMonitor {
    pub fn spawn(status: Arc<PipelineStatus>, period: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            let mut last = status.snapshot();

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        for event in poll_status(&status, &mut last) {
                            log_event(event);
                        }
                    }
                    _ = &mut shutdown_rx => {
                        for event in poll_status(&status, &mut last) {
                            log_event(event);
                        }
                        break;
                    }
                }
            }

            let totals = status.snapshot();
            debug!(
                "Status monitor stopped after {} callbacks ({} over/underflows)",
                totals.callbacks, totals.xruns
            );
        });

        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Stop the task after a final report.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for StatusMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
