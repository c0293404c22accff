#![forbid(unsafe_code)]

//! Boundary to the external extraction/download engine.
//!
//! The orchestrator only ever sees [`MediaEngine`]: a URL plus an output
//! directory goes in, a tri-state status comes out. Format selection,
//! retries and merge behaviour belong to the concrete engine.

pub mod ytdlp;

#[cfg(test)]
pub(crate) mod scripted;

use crate::error::EngineError;
use crate::model::DownloadStatus;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub use ytdlp::YtDlpEngine;

/// Name of the optional post-processing tool used to merge separate video
/// and audio streams.
pub const MERGE_TOOL: &str = "ffmpeg";

/// Tools available to the engine, probed once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineCapabilities {
    pub merge_tool: bool,
}

impl EngineCapabilities {
    pub fn detect() -> Self {
        Self {
            merge_tool: which::which(MERGE_TOOL).is_ok(),
        }
    }
}

/// Requested delay between engine requests. The engine applies it; nothing
/// in this crate sleeps on its behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub min_delay: Duration,
    pub max_jitter: Duration,
}

impl Pacing {
    pub fn max_delay(&self) -> Duration {
        self.min_delay + self.max_jitter
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(1),
            max_jitter: Duration::from_secs(4),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub output_dir: &'a Path,
    pub credentials: Option<&'a Path>,
}

/// What the engine reports for one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    pub status: DownloadStatus,
    pub error_detail: Option<String>,
}

impl FetchReport {
    pub fn succeeded() -> Self {
        Self {
            status: DownloadStatus::Succeeded,
            error_detail: None,
        }
    }

    pub fn transient(detail: impl Into<String>) -> Self {
        Self::failed(DownloadStatus::FailedTransient, detail)
    }

    pub fn fatal(detail: impl Into<String>) -> Self {
        Self::failed(DownloadStatus::FailedFatal, detail)
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::failed(DownloadStatus::EngineUnavailable, detail)
    }

    fn failed(status: DownloadStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            error_detail: Some(detail.into()),
        }
    }
}

/// One entry of a metadata-only listing. Everything is optional because the
/// engine omits fields freely.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEntry {
    pub url: Option<String>,
    pub webpage_url: Option<String>,
    pub original_url: Option<String>,
    pub id: Option<String>,
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub channel: Option<String>,
    pub upload_date: Option<String>,
    pub timestamp: Option<i64>,
    pub duration: Option<f64>,
    pub view_count: Option<u64>,
}

/// Receives `(bytes_done, bytes_total)` while a fetch is running.
pub type ByteSink<'a> = dyn FnMut(u64, Option<u64>) + 'a;

pub trait MediaEngine: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Downloads exactly one URL into `request.output_dir`.
    fn fetch(&self, request: &FetchRequest<'_>, on_bytes: &mut ByteSink<'_>) -> FetchReport;

    /// Lists at most `max_items` entries of a collection without fetching
    /// any media bytes.
    fn enumerate_metadata(
        &self,
        collection_url: &str,
        max_items: usize,
        pacing: &Pacing,
        credentials: Option<&Path>,
    ) -> Result<Vec<RawEntry>, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pacing_spans_one_to_five_seconds() {
        let pacing = Pacing::default();
        assert_eq!(pacing.min_delay, Duration::from_secs(1));
        assert_eq!(pacing.max_delay(), Duration::from_secs(5));
    }

    #[test]
    fn fetch_report_constructors_set_status() {
        assert_eq!(FetchReport::succeeded().status, DownloadStatus::Succeeded);
        assert_eq!(FetchReport::succeeded().error_detail, None);
        let fatal = FetchReport::fatal("bad url");
        assert_eq!(fatal.status, DownloadStatus::FailedFatal);
        assert_eq!(fatal.error_detail.as_deref(), Some("bad url"));
        assert_eq!(
            FetchReport::unavailable("gone").status,
            DownloadStatus::EngineUnavailable
        );
        assert_eq!(
            FetchReport::transient("timeout").status,
            DownloadStatus::FailedTransient
        );
    }

    #[test]
    fn raw_entry_tolerates_partial_payloads() {
        let entry: RawEntry =
            serde_json::from_str(r#"{"url":"https://x.example/1","extra":true}"#).unwrap();
        assert_eq!(entry.url.as_deref(), Some("https://x.example/1"));
        assert!(entry.title.is_none());
        assert!(entry.duration.is_none());
    }
}
