#![forbid(unsafe_code)]

//! Progress reporting: the event type shared with front ends, the sink the
//! orchestrator calls, and a JSON file writer for external pollers.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ProgressEvent {
    Downloading {
        bytes_done: u64,
        bytes_total: Option<u64>,
    },
    ItemProgress {
        index: usize,
        total: usize,
        label: String,
    },
    Done {
        code: i32,
        message: String,
    },
}

impl ProgressEvent {
    /// Rough completion percentage and a one-line description, as stored in
    /// the progress file.
    pub fn summary(&self) -> Option<(u8, String)> {
        match self {
            ProgressEvent::Downloading {
                bytes_done,
                bytes_total: Some(total),
            } if *total > 0 => {
                let percent = (bytes_done.saturating_mul(100) / total).min(100) as u8;
                Some((percent, format!("Downloading: {percent}%")))
            }
            ProgressEvent::Downloading { .. } => None,
            ProgressEvent::ItemProgress {
                index,
                total,
                label,
            } => {
                let percent = if *total == 0 {
                    0
                } else {
                    (index.saturating_sub(1) * 100 / total).min(100) as u8
                };
                Some((percent, format!("[{index}/{total}] Downloading: {label}")))
            }
            ProgressEvent::Done { message, .. } => Some((100, message.clone())),
        }
    }
}

/// Receives per-item notifications from the orchestrator, in item order, on
/// the orchestrator's own thread.
pub trait ProgressSink {
    fn item_started(&mut self, index: usize, total: usize, label: &str);

    fn bytes(&mut self, _done: u64, _total: Option<u64>) {}
}

impl<F> ProgressSink for F
where
    F: FnMut(usize, usize, &str),
{
    fn item_started(&mut self, index: usize, total: usize, label: &str) {
        self(index, total, label)
    }
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn item_started(&mut self, _index: usize, _total: usize, _label: &str) {}
}

/// Forwards events into a bounded channel. Item events wait for room so none
/// are lost; byte updates are dropped when the receiver falls behind.
pub struct ChannelSink {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }

    /// Must be called from a blocking context, never from inside the runtime.
    pub fn send_blocking(&self, event: ProgressEvent) {
        if self.tx.blocking_send(event).is_err() {
            warn!("progress receiver dropped");
        }
    }
}

impl ProgressSink for ChannelSink {
    fn item_started(&mut self, index: usize, total: usize, label: &str) {
        self.send_blocking(ProgressEvent::ItemProgress {
            index,
            total,
            label: label.to_string(),
        });
    }

    fn bytes(&mut self, done: u64, total: Option<u64>) {
        let _ = self.tx.try_send(ProgressEvent::Downloading {
            bytes_done: done,
            bytes_total: total,
        });
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressReport<'a> {
    progress: u8,
    message: &'a str,
}

/// Keeps `{ "progress": n, "message": "..." }` up to date on disk. Writes go
/// through a temp file and a rename so readers never see partial JSON.
#[derive(Debug, Clone)]
pub struct ProgressWriter {
    path: PathBuf,
}

impl ProgressWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn write(&self, progress: u8, message: &str) {
        let report = ProgressReport {
            progress: progress.min(100),
            message,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(err) = fs::create_dir_all(parent)
        {
            warn!(path = %parent.display(), "could not create progress dir: {err}");
            return;
        }

        let tmp_path = self.path.with_extension("tmp");
        match serde_json::to_vec(&report) {
            Ok(payload) => {
                if let Err(err) = fs::write(&tmp_path, payload) {
                    warn!(path = %tmp_path.display(), "could not write progress file: {err}");
                    return;
                }
                if let Err(err) = fs::rename(&tmp_path, &self.path) {
                    warn!(path = %self.path.display(), "could not finalize progress file: {err}");
                }
            }
            Err(err) => warn!("could not serialize progress report: {err}"),
        }
    }

    pub fn record(&self, event: &ProgressEvent) {
        if let Some((percent, message)) = event.summary() {
            self.write(percent, &message);
        }
    }
}
