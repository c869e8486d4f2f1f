//! Event stream watcher.
//!
//! Owns the wallet's single live `Trade` subscription. The subscription
//! runs as its own task that forwards batches to the buy pipeline over a
//! channel, so tearing it down never interrupts a buy already being
//! evaluated. Restarting always tears the previous task down (and waits
//! for it) before subscribing again.

use anyhow::Result;
use futures::stream::{BoxStream, StreamExt};
use std::mem;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::session::WalletSession;
use crate::types::TradeEvent;

/// How batches reach the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleMode {
    /// Forward every batch as it arrives.
    Immediate,
    /// Coalesce everything received within a window into one batch.
    Windowed(Duration),
}

pub struct EventWatcher {
    session: Arc<WalletSession>,
    sink: mpsc::Sender<Vec<TradeEvent>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventWatcher {
    pub fn new(session: Arc<WalletSession>, sink: mpsc::Sender<Vec<TradeEvent>>) -> Self {
        Self {
            session,
            sink,
            task: Mutex::new(None),
        }
    }

    /// (Re)subscribe. Any previous subscription is torn down first and the
    /// nonce baseline is refreshed before the new one opens.
    pub async fn start(&self) -> Result<()> {
        let mut task = self.task.lock().await;
        if let Some(previous) = task.take() {
            previous.abort();
            let _ = previous.await;
            debug!("Previous trade subscription torn down");
        }

        self.session.refresh_nonce().await;

        let stream = self.session.platforms.feed.subscribe().await?;
        let mode = self.session.settings.throttle;
        *task = Some(tokio::spawn(forward(stream, mode, self.sink.clone())));
        info!(?mode, "Trade watcher started");
        Ok(())
    }

    /// Tear the subscription down. Returns whether one was running.
    pub async fn stop(&self) -> bool {
        let Some(handle) = self.task.lock().await.take() else {
            return false;
        };
        let was_running = !handle.is_finished();
        handle.abort();
        let _ = handle.await;
        debug!(was_running, "Trade watcher stopped");
        was_running
    }

    pub async fn is_active(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

async fn forward(
    mut stream: BoxStream<'static, Vec<TradeEvent>>,
    mode: ThrottleMode,
    sink: mpsc::Sender<Vec<TradeEvent>>,
) {
    match mode {
        ThrottleMode::Immediate => {
            while let Some(batch) = stream.next().await {
                if !deliver(&sink, batch) {
                    return;
                }
            }
        }
        ThrottleMode::Windowed(window) => {
            let mut ticker = tokio::time::interval(window);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut pending: Vec<TradeEvent> = Vec::new();
            loop {
                tokio::select! {
                    next = stream.next() => match next {
                        Some(batch) => pending.extend(batch),
                        None => {
                            if !pending.is_empty() {
                                deliver(&sink, pending);
                            }
                            break;
                        }
                    },
                    _ = ticker.tick() => {
                        if !pending.is_empty() && !deliver(&sink, mem::take(&mut pending)) {
                            return;
                        }
                    }
                }
            }
        }
    }
    warn!("Trade subscription ended");
}

/// Hand a batch to the pipeline. A full queue drops the batch; a closed
/// one ends forwarding.
fn deliver(sink: &mpsc::Sender<Vec<TradeEvent>>, batch: Vec<TradeEvent>) -> bool {
    if batch.is_empty() {
        return true;
    }
    match sink.try_send(batch) {
        Ok(()) => true,
        Err(TrySendError::Full(batch)) => {
            debug!(events = batch.len(), "Pipeline busy, batch dropped");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}
