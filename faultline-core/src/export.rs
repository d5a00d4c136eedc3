//! Best-effort export of report batches to external sinks
//!
//! Sinks stand in for error-tracking, analytics, and metrics backends. Their
//! absence or failure never affects the caller's error-handling outcome; the
//! registry drops work beyond a bounded retry buffer rather than blocking.

use crate::error::FaultlineResult;
use crate::registry::{ErrorRegistry, ErrorReport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Destination for flushed report batches
#[async_trait]
pub trait ReportSink: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver a batch. An error re-queues a bounded prefix of the batch.
    async fn send(&self, batch: &[Arc<ErrorReport>]) -> FaultlineResult<()>;
}

/// Sink that discards every batch. Stands in for a real backend when none is
/// configured, so the export path stays exercised end to end.
pub struct NoopSink;

#[async_trait]
impl ReportSink for NoopSink {
    fn name(&self) -> &str {
        "noop"
    }

    async fn send(&self, batch: &[Arc<ErrorReport>]) -> FaultlineResult<()> {
        debug!(count = batch.len(), "noop sink discarded batch");
        Ok(())
    }
}

/// In-memory sink that records every delivered batch. Lets the export path be
/// verified without network access.
#[derive(Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<Vec<Arc<ErrorReport>>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All delivered batches, in delivery order
    pub fn delivered(&self) -> Vec<Vec<Arc<ErrorReport>>> {
        self.batches.lock().clone()
    }

    /// Total reports delivered across all batches
    pub fn delivered_count(&self) -> usize {
        self.batches.lock().iter().map(|b| b.len()).sum()
    }
}

#[async_trait]
impl ReportSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, batch: &[Arc<ErrorReport>]) -> FaultlineResult<()> {
        self.batches.lock().push(batch.to_vec());
        Ok(())
    }
}

/// Handle to the periodic flush task
pub struct FlushHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl FlushHandle {
    /// Stop the flush task and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

impl ErrorRegistry {
    /// Spawn the periodic flush task. Runs independently of any request's
    /// lifecycle; request-handling code never awaits it.
    pub fn start_flush_timer(self: &Arc<Self>) -> FlushHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let registry = Arc::clone(self);
        let period = self.config().flush_interval;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick fires immediately; skip it.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("flush timer shutting down");
                        registry.flush().await;
                        break;
                    }
                    _ = interval.tick() => {
                        registry.flush().await;
                    }
                }
            }
        });

        FlushHandle { shutdown_tx, task }
    }
}
