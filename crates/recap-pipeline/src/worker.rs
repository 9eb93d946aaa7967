//! Background processing queue.
//!
//! Callers submit turns fire-and-forget relative to their own success
//! path; the worker task drains the queue and runs the pipeline. Failures
//! never propagate to the submitter, but they stay observable: the
//! pipeline logs an `error` event and the worker emits a `tracing`
//! warning. Dropping every queue handle stops the worker after it drains
//! what was already accepted; in-flight work that has not reached the
//! save step is simply abandoned, never half-persisted.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::pipeline::{Pipeline, ProcessOutcome, ProcessRequest};

/// Handle for submitting turns to the background worker.
#[derive(Clone)]
pub struct TurnQueue {
    tx: mpsc::Sender<ProcessRequest>,
}

impl TurnQueue {
    /// Spawn a worker task over the given pipeline.
    ///
    /// `capacity` bounds the number of queued turns; submissions beyond
    /// it are rejected rather than buffered without limit.
    pub fn spawn(pipeline: Arc<Pipeline>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<ProcessRequest>(capacity);

        let handle = tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                match pipeline.process_turn(&request).await {
                    Ok(ProcessOutcome::Updated(summary)) => {
                        info!(
                            thread_id = %request.thread_id,
                            version = summary.version,
                            "Background turn processed"
                        );
                    }
                    Ok(ProcessOutcome::Unchanged(_)) => {
                        debug!(
                            thread_id = %request.thread_id,
                            "Background turn was already processed"
                        );
                    }
                    Err(e) => {
                        warn!(
                            thread_id = %request.thread_id,
                            error = %e,
                            "Background turn processing failed"
                        );
                    }
                }
            }
            debug!("Turn queue closed, worker stopping");
        });

        (Self { tx }, handle)
    }

    /// Submit a turn, waiting for queue space if necessary.
    ///
    /// Returns the request back if the worker has stopped.
    pub async fn submit(&self, request: ProcessRequest) -> Result<(), ProcessRequest> {
        self.tx.send(request).await.map_err(|e| e.0)
    }

    /// Submit a turn without waiting. Returns the request back if the
    /// queue is full or the worker has stopped.
    pub fn try_submit(&self, request: ProcessRequest) -> Result<(), ProcessRequest> {
        self.tx.try_send(request).map_err(|e| e.into_inner())
    }
}
