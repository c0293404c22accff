#![forbid(unsafe_code)]

//! Drives a whole batch: resolve and enumerate, then plan and fetch every
//! item in order, one at a time.

use crate::engine::{FetchRequest, MediaEngine, Pacing};
use crate::enumerator::CollectionEnumerator;
use crate::error::EngineError;
use crate::fallback::{EmptyReason, fallback};
use crate::model::{
    BatchAbort, BatchResult, CollectionHandle, DownloadOutcome, DownloadStatus, DownloadTarget,
};
use crate::planner::OutputPlanner;
use crate::progress::ProgressSink;
use crate::resolver::{Platform, resolve};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Where the batch gets its items from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchSource {
    /// A profile URL; items are enumerated and bucketed per upload month.
    Collection(String),
    /// Pre-supplied URLs, fetched in order straight into the base directory.
    Urls(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub source: BatchSource,
    pub base_dir: PathBuf,
    pub credentials: Option<PathBuf>,
    /// Only used for [`BatchSource::Collection`].
    pub max_items: usize,
}

pub struct BatchOrchestrator<'a> {
    engine: &'a dyn MediaEngine,
    platform: Platform,
    pacing: Pacing,
    cancel: Option<CancellationToken>,
}

/// Where fetched files land.
enum Layout {
    Flat(PathBuf),
    Bucketed {
        planner: OutputPlanner,
        handle: CollectionHandle,
    },
}

impl Layout {
    /// Creates the directory as a side effect in bucketed mode.
    fn output_dir(&self, target: &DownloadTarget) -> PathBuf {
        match (self, target) {
            (Layout::Flat(dir), _) => dir.clone(),
            (Layout::Bucketed { planner, handle }, DownloadTarget::Item(item)) => {
                planner.plan(handle, item)
            }
            (Layout::Bucketed { planner, .. }, DownloadTarget::Url(_)) => {
                planner.base_dir().to_path_buf()
            }
        }
    }
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(engine: &'a dyn MediaEngine, platform: Platform) -> Self {
        Self {
            engine,
            platform,
            pacing: Pacing::default(),
            cancel: None,
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// The token is checked between items only; a running fetch is never
    /// interrupted.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn run_batch<P>(&self, request: &BatchRequest, progress: &mut P) -> BatchResult
    where
        P: ProgressSink + ?Sized,
    {
        let (targets, layout): (Vec<DownloadTarget>, Layout) = match &request.source {
            BatchSource::Urls(urls) => (
                urls.iter().cloned().map(DownloadTarget::Url).collect(),
                Layout::Flat(request.base_dir.clone()),
            ),
            BatchSource::Collection(url) => match self.collection_items(url, request) {
                Ok(listed) => listed,
                Err(result) => return result,
            },
        };

        self.fetch_all(targets, &layout, request.credentials.as_deref(), progress)
    }

    /// Resolution and enumeration for profile mode. `Err` carries the final
    /// result when there is nothing to download.
    fn collection_items(
        &self,
        url: &str,
        request: &BatchRequest,
    ) -> Result<(Vec<DownloadTarget>, Layout), BatchResult> {
        let handle = resolve(url, &self.platform).map_err(|err| {
            warn!(url, "{err}");
            BatchResult::diagnostic([err.to_string()])
        })?;

        info!(profile = %handle, max_items = request.max_items, "enumerating profile");
        let enumeration = CollectionEnumerator::new(self.engine, self.pacing).enumerate_detailed(
            url,
            request.max_items,
            request.credentials.as_deref(),
        );

        if enumeration.items.is_empty() {
            let reason =
                EmptyReason::classify(enumeration.issue.as_ref(), request.credentials.is_some());
            info!(profile = %handle, ?reason, "no items listed, using fallback");
            let mut result = fallback(&handle, &reason);
            if let Some(err @ EngineError::Unavailable { .. }) = &enumeration.issue {
                result.aborted = Some(BatchAbort::EngineUnavailable(err.detail()));
            }
            return Err(result);
        }

        info!(profile = %handle, items = enumeration.items.len(), "profile listed");
        let targets = enumeration
            .items
            .into_iter()
            .map(DownloadTarget::Item)
            .collect();
        let layout = Layout::Bucketed {
            planner: OutputPlanner::starting_now(&request.base_dir),
            handle,
        };
        Ok((targets, layout))
    }

    fn fetch_all<P>(
        &self,
        targets: Vec<DownloadTarget>,
        layout: &Layout,
        credentials: Option<&Path>,
        progress: &mut P,
    ) -> BatchResult
    where
        P: ProgressSink + ?Sized,
    {
        let total = targets.len();
        let mut result = BatchResult::default();
        info!(engine = self.engine.name(), total, "starting batch");

        for (offset, target) in targets.into_iter().enumerate() {
            if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                info!(attempted = result.attempted(), total, "batch cancelled");
                result.aborted = Some(BatchAbort::Cancelled);
                break;
            }

            let index = offset + 1;
            let output_dir = layout.output_dir(&target);
            let label = target.label(index);
            progress.item_started(index, total, &label);

            let report = self.engine.fetch(
                &FetchRequest {
                    url: target.url(),
                    output_dir: &output_dir,
                    credentials,
                },
                &mut |done, bytes_total| progress.bytes(done, bytes_total),
            );
            let outcome = DownloadOutcome {
                status: report.status,
                item: target,
                error_detail: report.error_detail,
            };

            match outcome.status {
                DownloadStatus::Succeeded => {}
                DownloadStatus::FailedTransient | DownloadStatus::FailedFatal => {
                    warn!(
                        url = outcome.item.url(),
                        status = ?outcome.status,
                        detail = outcome.error_detail.as_deref().unwrap_or_default(),
                        "item failed"
                    );
                }
                DownloadStatus::EngineUnavailable => {
                    let detail = outcome.error_detail.clone().unwrap_or_default();
                    error!(index, total, "engine unavailable, aborting batch: {detail}");
                    result.aborted = Some(BatchAbort::EngineUnavailable(detail));
                    break;
                }
            }
            result.record(&outcome, &label);
        }

        info!(
            succeeded = result.succeeded_count,
            failed = result.failed_count,
            total,
            "batch finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FetchReport;
    use crate::engine::scripted::{Listing, ScriptedEngine, entry};
    use tempfile::tempdir;

    fn platform() -> Platform {
        Platform::new("platform.example")
    }

    fn collection(base: &Path, url: &str, max_items: usize) -> BatchRequest {
        BatchRequest {
            source: BatchSource::Collection(url.to_string()),
            base_dir: base.to_path_buf(),
            credentials: None,
            max_items,
        }
    }

    fn listing(count: usize) -> Listing {
        Listing::Entries(
            (1..=count)
                .map(|n| {
                    entry(
                        &format!("https://platform.example/p/{n}"),
                        &format!("clip {n}"),
                        Some("20240310"),
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn foreign_host_yields_single_resolution_error() {
        let dir = tempdir().unwrap();
        let engine = ScriptedEngine::with_listing(listing(3));
        let orchestrator = BatchOrchestrator::new(&engine, platform());
        let result = orchestrator.run_batch(
            &collection(dir.path(), "https://other.example/alice", 10),
            &mut crate::progress::NoProgress,
        );
        assert_eq!(result.succeeded_count, 0);
        assert_eq!(result.failed_count, 0);
        assert_eq!(result.errors.len(), 1);
        assert!(engine.listings().is_empty());
        assert!(engine.fetched_urls().is_empty());
    }

    #[test]
    fn profile_with_three_items_all_succeed() {
        let dir = tempdir().unwrap();
        let engine = ScriptedEngine::with_listing(listing(3));
        let orchestrator = BatchOrchestrator::new(&engine, platform());
        let mut seen = Vec::new();
        let result = orchestrator.run_batch(
            &collection(dir.path(), "https://platform.example/alice", 10),
            &mut |index: usize, total: usize, label: &str| {
                seen.push((index, total, label.to_string()))
            },
        );

        assert_eq!(
            result,
            BatchResult {
                succeeded_count: 3,
                failed_count: 0,
                errors: vec![],
                aborted: None,
            }
        );
        assert_eq!(seen.len(), 3);
        assert_eq!(engine.listings()[0].1, 10);
        let expected_dir = dir.path().join("alice").join("2024-03");
        assert!(engine.fetched_dirs().iter().all(|d| d == &expected_dir));
        assert!(expected_dir.is_dir());
    }

    #[test]
    fn failures_keep_order_and_batch_continues() {
        let dir = tempdir().unwrap();
        let engine = ScriptedEngine::with_listing(Listing::Entries(vec![
            entry("https://platform.example/p/a", "A", None),
            entry("https://platform.example/p/b", "B", None),
            entry("https://platform.example/p/c", "C", None),
        ]))
        .with_reports([
            FetchReport::succeeded(),
            FetchReport::transient("HTTP Error 503"),
            FetchReport::succeeded(),
        ]);
        let orchestrator = BatchOrchestrator::new(&engine, platform());
        let mut seen = Vec::new();
        let result = orchestrator.run_batch(
            &collection(dir.path(), "https://platform.example/alice", 10),
            &mut |index: usize, total: usize, label: &str| {
                seen.push((index, total, label.to_string()))
            },
        );

        assert_eq!(result.succeeded_count, 2);
        assert_eq!(result.failed_count, 1);
        assert_eq!(
            result.errors,
            vec!["Failed to download B (https://platform.example/p/b): HTTP Error 503".to_string()]
        );
        assert_eq!(
            seen,
            vec![
                (1, 3, "A".to_string()),
                (2, 3, "B".to_string()),
                (3, 3, "C".to_string()),
            ]
        );
    }

    #[test]
    fn empty_listing_uses_fallback_without_fetching() {
        let dir = tempdir().unwrap();
        let engine = ScriptedEngine::new();
        let orchestrator = BatchOrchestrator::new(&engine, platform());
        let result = orchestrator.run_batch(
            &collection(dir.path(), "https://platform.example/alice", 10),
            &mut crate::progress::NoProgress,
        );
        assert_eq!(result.succeeded_count, 0);
        assert_eq!(result.failed_count, 0);
        assert!(!result.errors.is_empty());
        assert!(result.aborted.is_none());
        assert!(engine.fetched_urls().is_empty());
    }

    #[test]
    fn missing_engine_during_listing_aborts() {
        let dir = tempdir().unwrap();
        let engine = ScriptedEngine::with_listing(Listing::Unavailable);
        let result = BatchOrchestrator::new(&engine, platform()).run_batch(
            &collection(dir.path(), "https://platform.example/alice", 10),
            &mut crate::progress::NoProgress,
        );
        assert!(matches!(result.aborted, Some(BatchAbort::EngineUnavailable(_))));
        assert_eq!(result.exit_code(), 2);
        assert!(engine.fetched_urls().is_empty());
    }

    #[test]
    fn engine_unavailable_mid_batch_keeps_partial_result() {
        let dir = tempdir().unwrap();
        let engine = ScriptedEngine::with_listing(listing(5)).with_reports([
            FetchReport::succeeded(),
            FetchReport::succeeded(),
            FetchReport::unavailable("yt-dlp is not installed"),
        ]);
        let orchestrator = BatchOrchestrator::new(&engine, platform());
        let mut calls = 0;
        let result = orchestrator.run_batch(
            &collection(dir.path(), "https://platform.example/alice", 10),
            &mut |_: usize, _: usize, _: &str| calls += 1,
        );

        assert_eq!(result.succeeded_count, 2);
        assert_eq!(result.failed_count, 0);
        assert!(result.errors.is_empty());
        assert_eq!(
            result.aborted,
            Some(BatchAbort::EngineUnavailable("yt-dlp is not installed".into()))
        );
        assert_eq!(engine.fetched_urls().len(), 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn directories_are_only_created_for_attempted_items() {
        let dir = tempdir().unwrap();
        let engine = ScriptedEngine::with_listing(Listing::Entries(vec![
            entry("https://platform.example/p/1", "one", Some("20240105")),
            entry("https://platform.example/p/2", "two", Some("20230511")),
            entry("https://platform.example/p/3", "three", Some("20220720")),
        ]))
        .with_reports([FetchReport::unavailable("gone")]);
        let result = BatchOrchestrator::new(&engine, platform()).run_batch(
            &collection(dir.path(), "https://platform.example/alice", 10),
            &mut crate::progress::NoProgress,
        );

        assert_eq!(result.attempted(), 0);
        assert_eq!(engine.fetched_urls().len(), 1);
        let profile_dir = dir.path().join("alice");
        assert!(profile_dir.join("2024-01").is_dir());
        assert!(!profile_dir.join("2023-05").exists());
        assert!(!profile_dir.join("2022-07").exists());
    }

    #[test]
    fn cancelled_batch_plans_nothing() {
        let dir = tempdir().unwrap();
        let engine = ScriptedEngine::with_listing(listing(2));
        let token = CancellationToken::new();
        token.cancel();
        let result = BatchOrchestrator::new(&engine, platform())
            .with_cancellation(token)
            .run_batch(
                &collection(dir.path(), "https://platform.example/alice", 10),
                &mut crate::progress::NoProgress,
            );
        assert_eq!(result.aborted, Some(BatchAbort::Cancelled));
        assert!(engine.fetched_urls().is_empty());
        assert!(!dir.path().join("alice").exists());
    }

    #[test]
    fn url_mode_fetches_into_base_dir_and_ignores_bound() {
        let dir = tempdir().unwrap();
        let engine = ScriptedEngine::new();
        let urls = vec![
            "https://elsewhere.example/v/1".to_string(),
            "https://elsewhere.example/v/2".to_string(),
        ];
        let request = BatchRequest {
            source: BatchSource::Urls(urls.clone()),
            base_dir: dir.path().to_path_buf(),
            credentials: None,
            max_items: 1,
        };
        let mut labels = Vec::new();
        let result = BatchOrchestrator::new(&engine, platform()).run_batch(
            &request,
            &mut |_: usize, _: usize, label: &str| labels.push(label.to_string()),
        );
        assert_eq!(result.succeeded_count, 2);
        assert_eq!(engine.fetched_urls(), urls);
        assert!(engine.fetched_dirs().iter().all(|d| d == dir.path()));
        assert_eq!(labels, vec!["Video 1", "Video 2"]);
        assert!(engine.listings().is_empty());
    }

    #[test]
    fn cancellation_stops_before_next_item() {
        let dir = tempdir().unwrap();
        let engine = ScriptedEngine::new();
        let token = CancellationToken::new();
        let orchestrator =
            BatchOrchestrator::new(&engine, platform()).with_cancellation(token.clone());
        let request = BatchRequest {
            source: BatchSource::Urls(vec![
                "https://x.example/1".into(),
                "https://x.example/2".into(),
                "https://x.example/3".into(),
            ]),
            base_dir: dir.path().to_path_buf(),
            credentials: None,
            max_items: 10,
        };
        let result = orchestrator.run_batch(&request, &mut |index: usize, _: usize, _: &str| {
            if index == 2 {
                token.cancel();
            }
        });
        assert_eq!(result.succeeded_count, 2);
        assert_eq!(result.aborted, Some(BatchAbort::Cancelled));
        assert_eq!(engine.fetched_urls().len(), 2);
    }

    #[test]
    fn credentials_reach_the_listing() {
        let dir = tempdir().unwrap();
        let engine = ScriptedEngine::with_listing(listing(1));
        let cookies = dir.path().join("cookies.txt");
        let mut request = collection(dir.path(), "https://platform.example/@alice", 4);
        request.credentials = Some(cookies.clone());
        let result = BatchOrchestrator::new(&engine, platform())
            .run_batch(&request, &mut crate::progress::NoProgress);
        assert_eq!(result.succeeded_count, 1);
        assert_eq!(engine.listings()[0].2, Some(cookies));
    }
}
