//! Background loops of the hub: system info refresh, presence sweeping,
//! and the shard bus listener. Each loop stops when the shutdown channel
//! flips to `true`.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use terasync_core::result::AppResult;

use crate::bridge::ShardEnvelope;
use crate::message::OutboundMessage;
use crate::server::RealtimeEngine;

/// Outcome of one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub purged: u64,
    pub refreshed: usize,
    pub reaped: usize,
}

impl RealtimeEngine {
    /// Subscribe to this shard's bus channel and spawn every loop.
    pub async fn start_background(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> AppResult<Vec<JoinHandle<()>>> {
        let inbox = self.bus.subscribe(&self.config.shard_name).await?;
        info!(shard = %self.config.shard_name, bus = self.bus.provider_type(), "Subscribed to shard bus");

        let mut handles = Vec::with_capacity(3);

        let engine = self.clone();
        let cancel = shutdown.clone();
        handles.push(tokio::spawn(async move {
            engine.run_bus_listener(inbox, cancel).await;
        }));

        let engine = self.clone();
        let cancel = shutdown.clone();
        handles.push(tokio::spawn(async move {
            engine.run_system_info(cancel).await;
        }));

        let engine = self.clone();
        handles.push(tokio::spawn(async move {
            engine.run_sweeper(shutdown).await;
        }));

        Ok(handles)
    }

    async fn run_bus_listener(
        &self,
        mut inbox: mpsc::Receiver<ShardEnvelope>,
        mut cancel: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
                envelope = inbox.recv() => match envelope {
                    Some(envelope) => self.receive_envelope(envelope).await,
                    None => {
                        warn!(shard = %self.config.shard_name, "Shard bus subscription ended");
                        break;
                    }
                },
            }
        }
        debug!("Bus listener stopped");
    }

    async fn run_system_info(&self, mut cancel: watch::Receiver<bool>) {
        let mut ticker = time::interval(Duration::from_secs(
            self.config.system_info_interval_seconds.max(1),
        ));
        loop {
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let online = self.refresh_online_count().await;
                    if self.config.broadcast_system_info {
                        self.broadcast_system_info();
                    }
                    debug!(online, "System info refreshed");
                }
            }
        }
        debug!("System info loop stopped");
    }

    async fn run_sweeper(&self, mut cancel: watch::Receiver<bool>) {
        let mut ticker = time::interval(self.sweep_interval);
        loop {
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let report = self.sweep().await;
                    if report.reaped > 0 || report.purged > 0 {
                        info!(purged = report.purged, reaped = report.reaped, "Presence sweep");
                    }
                }
            }
        }
        debug!("Presence sweeper stopped");
    }

    /// One sweep: drop expired rows, refresh the rows of live local
    /// connections, and close connections silent past the client timeout.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        match self.registry.purge_expired().await {
            Ok(purged) => report.purged = purged,
            Err(e) => warn!(error = %e, "Presence purge failed"),
        }

        let timeout = Duration::from_secs(self.config.client_timeout_seconds);
        for handle in self.connections.all() {
            if handle.idle_for().await > timeout {
                handle.send(OutboundMessage::warning("Connection timed out"));
                self.disconnect(&handle).await;
                report.reaped += 1;
            } else if self.registry.heartbeat(&handle.session).await {
                report.refreshed += 1;
            }
        }
        report
    }
}
