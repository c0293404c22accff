#![forbid(unsafe_code)]

//! Runs a batch off the async runtime and streams [`ProgressEvent`]s back.

use crate::engine::{MediaEngine, Pacing};
use crate::model::BatchResult;
use crate::orchestrator::{BatchOrchestrator, BatchRequest};
use crate::progress::{ChannelSink, ProgressEvent};
use crate::resolver::Platform;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const EVENT_BUFFER: usize = 64;

/// Everything the worker needs, owned so it can move to another thread.
#[derive(Clone)]
pub struct BatchJob {
    pub engine: Arc<dyn MediaEngine>,
    pub platform: Platform,
    pub pacing: Pacing,
    pub request: BatchRequest,
}

pub struct BatchHandle {
    events: mpsc::Receiver<ProgressEvent>,
    cancel: CancellationToken,
    worker: JoinHandle<BatchResult>,
}

impl BatchHandle {
    /// `None` once the worker has sent `Done` and exited.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drains any remaining events and waits for the worker.
    pub async fn join(mut self) -> Result<BatchResult> {
        while self.events.recv().await.is_some() {}
        self.worker.await.context("batch worker panicked")
    }
}

/// Starts the batch on a blocking worker. The event stream always ends with
/// exactly one [`ProgressEvent::Done`].
pub fn spawn_batch(job: BatchJob) -> BatchHandle {
    spawn_batch_with_token(job, CancellationToken::new())
}

/// Like [`spawn_batch`], but observes a caller-owned token, e.g. a child of
/// an application-wide shutdown token.
pub fn spawn_batch_with_token(job: BatchJob, cancel: CancellationToken) -> BatchHandle {
    let (tx, events) = mpsc::channel(EVENT_BUFFER);
    let token = cancel.clone();

    let worker = tokio::task::spawn_blocking(move || {
        let BatchJob {
            engine,
            platform,
            pacing,
            request,
        } = job;
        let mut sink = ChannelSink::new(tx);
        let result = BatchOrchestrator::new(engine.as_ref(), platform)
            .with_pacing(pacing)
            .with_cancellation(token)
            .run_batch(&request, &mut sink);
        sink.send_blocking(done_event(&result));
        result
    });

    BatchHandle {
        events,
        cancel,
        worker,
    }
}

/// Code 0 only for a clean run; diagnostics-only runs report their first
/// diagnostic as the message.
pub fn done_event(result: &BatchResult) -> ProgressEvent {
    if result.exit_code() == 0 {
        return ProgressEvent::Done {
            code: 0,
            message: format!("Downloaded {} items successfully", result.succeeded_count),
        };
    }
    let message = match (&result.aborted, result.attempted(), result.errors.first()) {
        (None, 0, Some(first)) => first.clone(),
        (Some(aborted), _, _) => format!(
            "Downloaded {}/{} items ({aborted})",
            result.succeeded_count,
            result.attempted()
        ),
        _ => format!(
            "Downloaded {}/{} items",
            result.succeeded_count,
            result.attempted()
        ),
    };
    ProgressEvent::Done { code: 1, message }
}
