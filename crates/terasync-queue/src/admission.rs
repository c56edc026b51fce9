//! Admission loop: promotes Queued requests and announces activations.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};

use terasync_core::traits::ReadyNotifier;

use crate::queue::RequestQueue;

/// Runs promotion whenever the queue changes, and on a fallback interval.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    queue: RequestQueue,
    notifier: Arc<dyn ReadyNotifier>,
    interval: Duration,
}

impl AdmissionController {
    pub fn new(queue: RequestQueue, notifier: Arc<dyn ReadyNotifier>, interval: Duration) -> Self {
        Self {
            queue,
            notifier,
            interval,
        }
    }

    /// Run until the shutdown channel flips to `true`.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        let limits = self.queue.limits();
        info!(
            max_active = limits.max_active,
            priority_lane = limits.priority_lane,
            interval_ms = self.interval.as_millis() as u64,
            "Admission controller started"
        );

        loop {
            self.tick();
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
                _ = self.queue.changed() => {}
                _ = time::sleep(self.interval) => {}
            }
        }

        info!("Admission controller stopped");
    }

    /// Promote what fits and fire one ready notification per activation.
    /// Notifications run on their own tasks so a slow receiver never holds
    /// up admission.
    pub fn tick(&self) -> usize {
        let activated = self.queue.promote();
        for (owner, request_id) in &activated {
            debug!(%owner, %request_id, "Request activated");
            let notifier = Arc::clone(&self.notifier);
            let owner = owner.clone();
            let request_id = *request_id;
            tokio::spawn(async move {
                if let Err(e) = notifier.notify_ready(&owner, request_id).await {
                    warn!(%owner, %request_id, error = %e, "Ready notification failed");
                }
            });
        }
        activated.len()
    }
}
