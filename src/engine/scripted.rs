//! In-memory [`MediaEngine`] for unit tests.

use super::{ByteSink, FetchReport, FetchRequest, MediaEngine, Pacing, RawEntry};
use crate::error::EngineError;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub(crate) enum Listing {
    Entries(Vec<RawEntry>),
    Fail(String),
    Unavailable,
}

pub(crate) struct ScriptedEngine {
    listing: Listing,
    reports: Mutex<VecDeque<FetchReport>>,
    fetches: Mutex<Vec<(String, PathBuf)>>,
    listings: Mutex<Vec<(String, usize, Option<PathBuf>)>>,
}

impl ScriptedEngine {
    pub(crate) fn new() -> Self {
        Self::with_listing(Listing::Entries(Vec::new()))
    }

    pub(crate) fn with_listing(listing: Listing) -> Self {
        Self {
            listing,
            reports: Mutex::new(VecDeque::new()),
            fetches: Mutex::new(Vec::new()),
            listings: Mutex::new(Vec::new()),
        }
    }

    /// Queues fetch results in call order; once drained every fetch succeeds.
    pub(crate) fn with_reports(self, reports: impl IntoIterator<Item = FetchReport>) -> Self {
        self.reports.lock().unwrap().extend(reports);
        self
    }

    pub(crate) fn fetched_urls(&self) -> Vec<String> {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub(crate) fn fetched_dirs(&self) -> Vec<PathBuf> {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .map(|(_, dir)| dir.clone())
            .collect()
    }

    pub(crate) fn listings(&self) -> Vec<(String, usize, Option<PathBuf>)> {
        self.listings.lock().unwrap().clone()
    }
}

impl MediaEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fetch(&self, request: &FetchRequest<'_>, on_bytes: &mut ByteSink<'_>) -> FetchReport {
        self.fetches
            .lock()
            .unwrap()
            .push((request.url.to_string(), request.output_dir.to_path_buf()));
        let report = self
            .reports
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(FetchReport::succeeded);
        if report.status == crate::model::DownloadStatus::Succeeded {
            on_bytes(50, Some(100));
        }
        report
    }

    fn enumerate_metadata(
        &self,
        collection_url: &str,
        max_items: usize,
        _pacing: &Pacing,
        credentials: Option<&Path>,
    ) -> Result<Vec<RawEntry>, EngineError> {
        self.listings.lock().unwrap().push((
            collection_url.to_string(),
            max_items,
            credentials.map(Path::to_path_buf),
        ));
        match &self.listing {
            Listing::Entries(entries) => Ok(entries.clone()),
            Listing::Fail(detail) => Err(EngineError::Failed {
                operation: "metadata enumeration",
                detail: detail.clone(),
            }),
            Listing::Unavailable => Err(EngineError::Unavailable {
                binary: "scripted".into(),
                reason: "not installed".into(),
            }),
        }
    }
}

pub(crate) fn entry(url: &str, title: &str, upload_date: Option<&str>) -> RawEntry {
    RawEntry {
        url: Some(url.to_string()),
        title: Some(title.to_string()),
        upload_date: upload_date.map(str::to_string),
        ..RawEntry::default()
    }
}
