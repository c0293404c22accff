#![forbid(unsafe_code)]

//! Metadata-only listing of a profile.
//!
//! Engine errors never escape from here: they are logged and turned into an
//! empty [`Enumeration`], which the orchestrator routes to the fallback.

use crate::engine::{MediaEngine, Pacing, RawEntry};
use crate::error::EngineError;
use crate::model::{ItemDescriptor, UploadDate};
use std::path::Path;
use tracing::{debug, warn};

/// Items in engine order plus the error that was swallowed, if any.
#[derive(Debug, Default)]
pub struct Enumeration {
    pub items: Vec<ItemDescriptor>,
    pub issue: Option<EngineError>,
}

pub struct CollectionEnumerator<'a> {
    engine: &'a dyn MediaEngine,
    pacing: Pacing,
}

impl<'a> CollectionEnumerator<'a> {
    pub fn new(engine: &'a dyn MediaEngine, pacing: Pacing) -> Self {
        Self { engine, pacing }
    }

    pub fn enumerate(
        &self,
        collection_url: &str,
        max_items: usize,
        credentials: Option<&Path>,
    ) -> Vec<ItemDescriptor> {
        self.enumerate_detailed(collection_url, max_items, credentials)
            .items
    }

    pub fn enumerate_detailed(
        &self,
        collection_url: &str,
        max_items: usize,
        credentials: Option<&Path>,
    ) -> Enumeration {
        let max_items = max_items.max(1);
        let entries = match self.engine.enumerate_metadata(
            collection_url,
            max_items,
            &self.pacing,
            credentials,
        ) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(engine = self.engine.name(), url = collection_url, "listing failed: {err}");
                return Enumeration {
                    items: Vec::new(),
                    issue: Some(err),
                };
            }
        };

        let total = entries.len();
        let items: Vec<ItemDescriptor> = entries
            .iter()
            .filter_map(descriptor_from_entry)
            .take(max_items)
            .collect();
        if items.len() < total.min(max_items) {
            debug!(
                url = collection_url,
                kept = items.len(),
                listed = total,
                "dropped entries without a usable URL"
            );
        }
        Enumeration { items, issue: None }
    }
}

/// Builds a descriptor from one listing entry, or `None` when no candidate
/// URL parses.
pub fn descriptor_from_entry(entry: &RawEntry) -> Option<ItemDescriptor> {
    let mut item = [&entry.url, &entry.webpage_url, &entry.original_url]
        .into_iter()
        .flatten()
        .find_map(|candidate| ItemDescriptor::new(candidate))?;

    item.title = entry.title.clone().unwrap_or_default();
    item.uploader = entry
        .uploader
        .clone()
        .or_else(|| entry.channel.clone())
        .unwrap_or_default();
    item.upload_date = entry
        .upload_date
        .as_deref()
        .and_then(UploadDate::from_compact)
        .or_else(|| entry.timestamp.and_then(UploadDate::from_timestamp));
    item.duration_seconds = entry
        .duration
        .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
        .map(|seconds| seconds.round() as u64)
        .unwrap_or(0);
    item.popularity_count = entry.view_count.unwrap_or(0);
    Some(item)
}
