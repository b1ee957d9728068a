//! Per-tab record loading.
//!
//! Each [`SourceKind`] maps to one enumeration: a store query for the Journal,
//! a directory walk for the Files tab, one walk per mount for External and a
//! hidden-file-friendly walk over the home-list entries for Read Only.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::BrowserConfig;
use crate::models::{ImageRecord, JournalStore, Sorting, SourceKind, StoreQuery};
use crate::scanner::exclusions::{ExclusionList, ExclusionScope};
use crate::scanner::file_scanner::{FileScanner, ScanBudget, ScanReport, ScanRules};
use crate::scanner::mounts::MountInfo;

pub struct SourceLoader {
    config: BrowserConfig,
    home_list: ExclusionList,
    media_list: ExclusionList,
    mounts: Vec<MountInfo>,
}

impl SourceLoader {
    /// Reads both exclusion lists. `mounts` must be enumerated on the main
    /// thread beforehand.
    pub fn new(config: BrowserConfig, mounts: Vec<MountInfo>) -> Self {
        let home_list = ExclusionList::load(&config.home_list);
        let media_list = ExclusionList::load(&config.media_list);
        if home_list.is_empty() {
            debug!("No home directories excluded, Read Only tab will be empty");
        }
        Self {
            config,
            home_list,
            media_list,
            mounts,
        }
    }

    /// Tab kinds in display order. External only appears when something is
    /// mounted.
    pub fn tabs(mounts: &[MountInfo]) -> Vec<SourceKind> {
        let mut tabs = vec![SourceKind::Journal, SourceKind::Files];
        if !mounts.is_empty() {
            tabs.push(SourceKind::External);
        }
        tabs.push(SourceKind::ReadOnly);
        tabs
    }

    pub fn tab_kinds(&self) -> Vec<SourceKind> {
        Self::tabs(&self.mounts)
    }

    pub fn load(&self, kind: SourceKind) -> Result<Vec<ImageRecord>> {
        let records = match self.scan_plan(kind) {
            None => self.load_journal()?,
            Some((roots, rules)) => {
                let mut budget = ScanBudget::new(self.config.max_files);
                finish(FileScanner::scan(&roots, &rules, &mut budget))
            }
        };
        info!(tab = kind.label(), count = records.len(), "Loaded tab");
        Ok(records)
    }

    /// Loads a tab on the blocking pool.
    pub async fn load_async(self: Arc<Self>, kind: SourceKind) -> Result<Vec<ImageRecord>> {
        let records = match self.scan_plan(kind) {
            None => tokio::task::spawn_blocking(move || self.load_journal())
                .await
                .context("Journal loader task failed")??,
            Some((roots, rules)) => {
                finish(FileScanner::scan_async(roots, rules, self.config.max_files).await?)
            }
        };
        info!(tab = kind.label(), count = records.len(), "Loaded tab");
        Ok(records)
    }

    fn load_journal(&self) -> Result<Vec<ImageRecord>> {
        let store = JournalStore::open(&self.config.journal_dir)
            .with_context(|| format!("Failed to open journal at {:?}", self.config.journal_dir))?;
        let (objects, total) = store
            .find(&StoreQuery::images(), Sorting::NewestFirst)
            .context("Journal query failed")?;
        debug!(total, "Journal query complete");
        Ok(objects.into_iter().map(ImageRecord::from_store).collect())
    }

    /// Roots and walk rules of a filesystem tab; `None` for the Journal.
    fn scan_plan(&self, kind: SourceKind) -> Option<(Vec<PathBuf>, ScanRules)> {
        let (roots, exclusions, scope) = match kind {
            SourceKind::Journal => return None,
            // Read Only only covers home/<entry>, so deeper names stay here
            SourceKind::Files => (
                vec![self.config.home_dir.clone()],
                self.home_list.clone(),
                ExclusionScope::RootRelative,
            ),
            SourceKind::External => (
                self.mounts.iter().map(|m| m.mount_path.clone()).collect(),
                self.media_list.clone(),
                ExclusionScope::AnyDepth,
            ),
            SourceKind::ReadOnly => (
                self.read_only_roots(),
                self.media_list.clone(),
                ExclusionScope::AnyDepth,
            ),
        };
        let rules = ScanRules {
            allow_hidden: kind.allows_hidden(),
            exclusions,
            scope,
        };
        Some((roots, rules))
    }

    /// Home sub-directories hidden from the Files tab.
    pub fn read_only_roots(&self) -> Vec<PathBuf> {
        self.home_list
            .entries()
            .iter()
            .map(|entry| self.config.home_dir.join(entry))
            .collect()
    }
}

fn finish(mut report: ScanReport) -> Vec<ImageRecord> {
    report.sort_newest_first();
    report.records
}
