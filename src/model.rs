#![forbid(unsafe_code)]

//! Records exchanged between the resolver, the enumerator, the path planner
//! and the batch orchestrator. None of them are persisted.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;
use url::Url;

/// Canonical identity of a profile, e.g. `alice` for
/// `https://www.instagram.com/@alice/`. Case is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionHandle {
    name: String,
}

impl CollectionHandle {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for CollectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name)
    }
}

/// Upload date as reported by the engine. The month is always known, the day
/// only sometimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct UploadDate {
    year: i32,
    month: u32,
    day: Option<u32>,
}

impl UploadDate {
    pub fn new(year: i32, month: u32, day: Option<u32>) -> Option<Self> {
        if !(1..=12).contains(&month) {
            return None;
        }
        if let Some(day) = day {
            NaiveDate::from_ymd_opt(year, month, day)?;
        }
        Some(Self { year, month, day })
    }

    /// Parses the engine's compact `YYYYMMDD` form. A bare `YYYYMM` prefix is
    /// accepted and yields a month-only date.
    pub fn from_compact(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.len() < 6 || !value.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let year = value[0..4].parse().ok()?;
        let month = value[4..6].parse().ok()?;
        if value.len() >= 8
            && let Some(date) = value[6..8]
                .parse()
                .ok()
                .and_then(|day| Self::new(year, month, Some(day)))
        {
            return Some(date);
        }
        Self::new(year, month, None)
    }

    /// Converts epoch seconds into a day-precise date (UTC).
    pub fn from_timestamp(timestamp: i64) -> Option<Self> {
        let datetime = DateTime::<Utc>::from_timestamp(timestamp, 0)?;
        Self::new(datetime.year(), datetime.month(), Some(datetime.day()))
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> Option<u32> {
        self.day
    }

    /// `YYYY-MM`, the bucket name used for output directories.
    pub fn year_month(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

/// One discoverable media unit prior to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDescriptor {
    source_url: String,
    pub title: String,
    pub uploader: String,
    pub upload_date: Option<UploadDate>,
    pub duration_seconds: u64,
    pub popularity_count: u64,
}

impl ItemDescriptor {
    /// Returns `None` unless `source_url` parses as an absolute URL.
    pub fn new(source_url: &str) -> Option<Self> {
        let trimmed = source_url.trim();
        if trimmed.is_empty() || Url::parse(trimmed).is_err() {
            return None;
        }
        Some(Self {
            source_url: trimmed.to_string(),
            title: String::new(),
            uploader: String::new(),
            upload_date: None,
            duration_seconds: 0,
            popularity_count: 0,
        })
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_upload_date(mut self, date: Option<UploadDate>) -> Self {
        self.upload_date = date;
        self
    }
}

/// What the orchestrator hands to the fetch primitive: either an enumerated
/// descriptor or a raw URL from a list/single-URL source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadTarget {
    Item(ItemDescriptor),
    Url(String),
}

impl DownloadTarget {
    pub fn url(&self) -> &str {
        match self {
            DownloadTarget::Item(item) => item.source_url(),
            DownloadTarget::Url(url) => url,
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            DownloadTarget::Item(item) => Some(item.title.trim()).filter(|t| !t.is_empty()),
            DownloadTarget::Url(_) => None,
        }
    }

    /// Title when present, otherwise `Video {index}` (1-based).
    pub fn label(&self, index: usize) -> String {
        self.title()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("Video {index}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DownloadStatus {
    Succeeded,
    FailedTransient,
    FailedFatal,
    /// Terminal for the whole batch.
    EngineUnavailable,
}

impl DownloadStatus {
    pub fn is_item_failure(self) -> bool {
        matches!(
            self,
            DownloadStatus::FailedTransient | DownloadStatus::FailedFatal
        )
    }
}

/// Result of one fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub status: DownloadStatus,
    pub item: DownloadTarget,
    pub error_detail: Option<String>,
}

/// Why a batch stopped before its last item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "camelCase")]
pub enum BatchAbort {
    EngineUnavailable(String),
    Cancelled,
}

impl fmt::Display for BatchAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchAbort::EngineUnavailable(detail) => write!(f, "engine unavailable: {detail}"),
            BatchAbort::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Aggregate of a batch run. `succeeded_count + failed_count` always equals
/// the number of attempted items; `errors` keeps attempt order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub succeeded_count: usize,
    pub failed_count: usize,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<BatchAbort>,
}

impl BatchResult {
    /// Zero counts with diagnostic lines only (resolution failure, fallback).
    pub fn diagnostic<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            errors: messages.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn attempted(&self) -> usize {
        self.succeeded_count + self.failed_count
    }

    /// Accounts for one completed attempt. `EngineUnavailable` is not an
    /// attempt and leaves the counters untouched.
    pub fn record(&mut self, outcome: &DownloadOutcome, label: &str) {
        match outcome.status {
            DownloadStatus::Succeeded => self.succeeded_count += 1,
            DownloadStatus::FailedTransient | DownloadStatus::FailedFatal => {
                self.failed_count += 1;
                self.errors
                    .push(failure_line(label, outcome.item.url(), outcome.error_detail.as_deref()));
            }
            DownloadStatus::EngineUnavailable => {}
        }
    }

    /// 0 when everything attempted succeeded, 2 when the engine went missing,
    /// 1 for failed items, cancellation, or a run that produced only
    /// diagnostics.
    pub fn exit_code(&self) -> i32 {
        match &self.aborted {
            Some(BatchAbort::EngineUnavailable(_)) => 2,
            Some(BatchAbort::Cancelled) => 1,
            None if self.failed_count > 0 => 1,
            None if self.attempted() == 0 && !self.errors.is_empty() => 1,
            None => 0,
        }
    }
}

fn failure_line(label: &str, url: &str, detail: Option<&str>) -> String {
    let detail = detail
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or("unknown error");
    format!("Failed to download {label} ({url}): {detail}")
}
