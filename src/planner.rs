#![forbid(unsafe_code)]

//! Output layout for profile downloads: `{base}/{handle}/{YYYY-MM}/`.

use crate::model::{CollectionHandle, ItemDescriptor};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct OutputPlanner {
    base_dir: PathBuf,
    fallback_bucket: String,
}

impl OutputPlanner {
    /// `started_at` supplies the bucket for items without a known upload
    /// month. It is captured once so every item of a batch agrees on it.
    pub fn new(base_dir: impl Into<PathBuf>, started_at: DateTime<Local>) -> Self {
        Self {
            base_dir: base_dir.into(),
            fallback_bucket: started_at.format("%Y-%m").to_string(),
        }
    }

    pub fn starting_now(base_dir: impl Into<PathBuf>) -> Self {
        Self::new(base_dir, Local::now())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn bucket_for(&self, item: &ItemDescriptor) -> String {
        item.upload_date
            .map(|date| date.year_month())
            .unwrap_or_else(|| self.fallback_bucket.clone())
    }

    /// Computes and creates the item's directory. Never fails: when the
    /// handle is not a plain directory name, or the directory cannot be
    /// created, the base directory is returned instead.
    pub fn plan(&self, handle: &CollectionHandle, item: &ItemDescriptor) -> PathBuf {
        if !is_single_component(handle.name()) {
            warn!(handle = handle.name(), "handle is not a plain directory name");
            return self.base_dir.clone();
        }

        let dir = self
            .base_dir
            .join(handle.name())
            .join(self.bucket_for(item));
        match fs::create_dir_all(&dir) {
            Ok(()) => dir,
            Err(err) => {
                warn!(dir = %dir.display(), "could not create output directory: {err}");
                self.base_dir.clone()
            }
        }
    }
}

fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
