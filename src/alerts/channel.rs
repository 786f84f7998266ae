//! In-process alert queue.
//!
//! `ChannelAlertEmitter` is the cheap, cloneable handle the pipeline holds.
//! `AlertDispatcher` owns the receiving end and forwards every alert to a
//! downstream emitter until the token is cancelled or every handle is
//! dropped. On cancellation, alerts already queued are still delivered.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{dispatch, AlertEmitter, AlertError};
use crate::types::AlertRequest;

/// Create a bounded alert channel.
pub fn alert_channel(capacity: usize) -> (ChannelAlertEmitter, mpsc::Receiver<AlertRequest>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChannelAlertEmitter { tx }, rx)
}

/// Sending half of the alert queue
#[derive(Clone)]
pub struct ChannelAlertEmitter {
    tx: mpsc::Sender<AlertRequest>,
}

#[async_trait]
impl AlertEmitter for ChannelAlertEmitter {
    async fn emit(&self, alert: AlertRequest) -> Result<(), AlertError> {
        self.tx
            .send(alert)
            .await
            .map_err(|_| AlertError::ChannelClosed)
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

/// Counters returned when the dispatcher stops
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub failed: u64,
}

/// Drains the alert queue into a downstream emitter.
pub struct AlertDispatcher {
    rx: mpsc::Receiver<AlertRequest>,
    downstream: Arc<dyn AlertEmitter>,
    cancel_token: CancellationToken,
    stats: DispatchStats,
}

impl AlertDispatcher {
    pub fn new(
        rx: mpsc::Receiver<AlertRequest>,
        downstream: Arc<dyn AlertEmitter>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            rx,
            downstream,
            cancel_token,
            stats: DispatchStats::default(),
        }
    }

    /// Run on a new task.
    pub fn spawn(self) -> JoinHandle<DispatchStats> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> DispatchStats {
        info!(downstream = self.downstream.name(), "Alert dispatcher started");
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    self.rx.close();
                    while let Some(alert) = self.rx.recv().await {
                        self.deliver(alert).await;
                    }
                    info!("Alert dispatcher shutdown signal received");
                    break;
                }
                next = self.rx.recv() => match next {
                    Some(alert) => self.deliver(alert).await,
                    None => {
                        debug!("All alert senders dropped");
                        break;
                    }
                }
            }
        }
        info!(
            delivered = self.stats.delivered,
            failed = self.stats.failed,
            "Alert dispatcher stopped"
        );
        self.stats
    }

    async fn deliver(&mut self, alert: AlertRequest) {
        if dispatch(self.downstream.as_ref(), alert).await {
            self.stats.delivered += 1;
        } else {
            self.stats.failed += 1;
        }
    }
}
