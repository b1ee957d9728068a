//! Directory walker that turns image files into file-backed records.
//!
//! Walk rules:
//! - directories are walked top-down without following symlinks, and
//!   directories matching the exclusion list in the rules' scope are pruned
//! - files below a hidden component are skipped unless hidden files are
//!   allowed or the path mentions `Cache`
//! - symlinked files are skipped
//! - only files whose sniffed mime type is `image/*` are kept
//! - scanning stops once the shared budget is spent

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::{debug, info, trace, warn};
use walkdir::{DirEntry, WalkDir};

use crate::models::{FileEntry, ImageRecord};
use crate::scanner::exclusions::{ExclusionList, ExclusionScope};
use crate::scanner::mime;

/// Path fragment that re-admits hidden files.
const CACHE_MARKER: &str = "Cache";

/// Per-root walking rules.
#[derive(Debug, Clone, Default)]
pub struct ScanRules {
    pub allow_hidden: bool,
    pub exclusions: ExclusionList,
    pub scope: ExclusionScope,
}

/// Image cap shared by every root scanned for one tab.
#[derive(Debug, Clone, Copy)]
pub struct ScanBudget {
    max: usize,
    used: usize,
}

impl ScanBudget {
    pub fn new(max: usize) -> Self {
        Self { max, used: 0 }
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.max
    }

    pub fn used(&self) -> usize {
        self.used
    }

    fn take(&mut self) -> bool {
        if self.is_exhausted() {
            return false;
        }
        self.used += 1;
        true
    }
}

/// Outcome of scanning one or more roots.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub records: Vec<ImageRecord>,
    /// Files or directories that could not be read.
    pub errors: usize,
    /// Whether the budget cut the scan short.
    pub capped: bool,
}

impl ScanReport {
    /// Orders records newest first, ties broken by path.
    pub fn sort_newest_first(&mut self) {
        self.records.sort_by(|a, b| {
            b.timestamp()
                .cmp(&a.timestamp())
                .then_with(|| a.file_path().cmp(&b.file_path()))
        });
    }
}

pub struct FileScanner;

impl FileScanner {
    /// Scans every root in order against one budget.
    pub fn scan(roots: &[PathBuf], rules: &ScanRules, budget: &mut ScanBudget) -> ScanReport {
        let mut report = ScanReport::default();
        for root in roots {
            if budget.is_exhausted() {
                report.capped = true;
                break;
            }
            Self::scan_root(root, rules, budget, &mut report);
        }
        info!(
            roots = roots.len(),
            found = report.records.len(),
            errors = report.errors,
            capped = report.capped,
            "Scan complete"
        );
        report
    }

    /// Runs [`FileScanner::scan`] on the blocking pool.
    pub async fn scan_async(roots: Vec<PathBuf>, rules: ScanRules, max_files: usize) -> anyhow::Result<ScanReport> {
        tokio::task::spawn_blocking(move || {
            let mut budget = ScanBudget::new(max_files);
            Self::scan(&roots, &rules, &mut budget)
        })
        .await
        .map_err(|e| anyhow::anyhow!("Scan task failed: {}", e))
    }

    /// Walks a single root, appending to `report`.
    pub fn scan_root(root: &Path, rules: &ScanRules, budget: &mut ScanBudget, report: &mut ScanReport) {
        debug!(?root, allow_hidden = rules.allow_hidden, "Scanning root");

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !Self::is_excluded_dir(root, entry, rules));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(?root, error = %e, "Failed to read directory entry");
                    report.errors += 1;
                    continue;
                }
            };

            if entry.path_is_symlink() || !entry.file_type().is_file() {
                continue;
            }

            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            if !rules.allow_hidden && is_hidden(rel) && !mentions_cache(rel) {
                trace!(path = ?entry.path(), "Skipping hidden file");
                continue;
            }

            if budget.is_exhausted() {
                report.capped = true;
                debug!(?root, used = budget.used(), "Scan cap reached");
                return;
            }

            match Self::record_for(&entry) {
                Ok(Some(record)) => {
                    budget.take();
                    report.records.push(record);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(path = ?entry.path(), error = %e, "No mimetype, skipping");
                    report.errors += 1;
                }
            }
        }
    }

    fn is_excluded_dir(root: &Path, entry: &DirEntry, rules: &ScanRules) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let excluded = rules.exclusions.matches(&name, rel, rules.scope);
        if excluded {
            debug!(path = ?entry.path(), "Pruning excluded directory");
        }
        excluded
    }

    fn record_for(entry: &DirEntry) -> anyhow::Result<Option<ImageRecord>> {
        let path = entry.path();
        let Some(mime_type) = mime::sniff(path)? else {
            return Ok(None);
        };
        if !mime::is_image_mime(&mime_type) {
            return Ok(None);
        }

        let mtime = entry
            .metadata()?
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Ok(Some(ImageRecord::from_file(FileEntry::new(
            path.to_path_buf(),
            mime_type,
            mtime,
        ))))
    }
}

fn is_hidden(rel: &Path) -> bool {
    rel.components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

fn mentions_cache(rel: &Path) -> bool {
    rel.to_string_lossy().contains(CACHE_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::{Cursor, Write};
    use tempfile::tempdir;

    fn create_test_image(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let img = image::RgbaImage::from_pixel(4, 3, image::Rgba([200, 10, 10, 255]));
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        let mut file = File::create(path).unwrap();
        file.write_all(bytes.get_ref()).unwrap();
    }

    fn titles(report: &ScanReport) -> Vec<String> {
        let mut titles: Vec<String> = report
            .records
            .iter()
            .map(|r| r.title().unwrap().to_string())
            .collect();
        titles.sort();
        titles
    }

    #[test]
    fn test_scan_keeps_only_images() {
        let dir = tempdir().unwrap();
        create_test_image(&dir.path().join("a.png"));
        create_test_image(&dir.path().join("nested/b.png"));
        fs::write(dir.path().join("notes.txt"), b"hello").unwrap();

        let mut budget = ScanBudget::new(100);
        let report = FileScanner::scan(&[dir.path().to_path_buf()], &ScanRules::default(), &mut budget);

        assert_eq!(titles(&report), vec!["a.png", "b.png"]);
        assert!(report.records.iter().all(|r| r.mime_type() == "image/png"));
        assert!(!report.capped);
        assert_eq!(budget.used(), 2);
    }

    #[test]
    fn test_hidden_files_skipped_unless_allowed() {
        let dir = tempdir().unwrap();
        create_test_image(&dir.path().join(".secret.png"));
        create_test_image(&dir.path().join(".config/icon.png"));
        create_test_image(&dir.path().join("visible.png"));

        let roots = [dir.path().to_path_buf()];
        let report = FileScanner::scan(&roots, &ScanRules::default(), &mut ScanBudget::new(100));
        assert_eq!(titles(&report), vec!["visible.png"]);

        let rules = ScanRules {
            allow_hidden: true,
            ..Default::default()
        };
        let report = FileScanner::scan(&roots, &rules, &mut ScanBudget::new(100));
        assert_eq!(titles(&report), vec![".secret.png", "icon.png", "visible.png"]);
    }

    #[test]
    fn test_cache_paths_readmit_hidden_files() {
        let dir = tempdir().unwrap();
        create_test_image(&dir.path().join(".browser/Cache/thumb.png"));
        create_test_image(&dir.path().join(".browser/other/thumb2.png"));

        let report = FileScanner::scan(
            &[dir.path().to_path_buf()],
            &ScanRules::default(),
            &mut ScanBudget::new(100),
        );
        assert_eq!(titles(&report), vec!["thumb.png"]);
    }

    #[test]
    fn test_excluded_directories_are_pruned() {
        let dir = tempdir().unwrap();
        create_test_image(&dir.path().join("Activities/icon.png"));
        create_test_image(&dir.path().join("Pictures/Activities/deep.png"));
        create_test_image(&dir.path().join("Pictures/keep.png"));

        let mut rules = ScanRules {
            allow_hidden: false,
            exclusions: ExclusionList::parse("Activities\n"),
            scope: ExclusionScope::AnyDepth,
        };
        let roots = [dir.path().to_path_buf()];
        let report = FileScanner::scan(&roots, &rules, &mut ScanBudget::new(100));
        assert_eq!(titles(&report), vec!["keep.png"]);

        rules.scope = ExclusionScope::RootRelative;
        let report = FileScanner::scan(&roots, &rules, &mut ScanBudget::new(100));
        assert_eq!(titles(&report), vec!["deep.png", "keep.png"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_skipped() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("real.png");
        create_test_image(&target);
        std::os::unix::fs::symlink(&target, dir.path().join("link.png")).unwrap();

        let other = tempdir().unwrap();
        create_test_image(&other.path().join("elsewhere.png"));
        std::os::unix::fs::symlink(other.path(), dir.path().join("linked_dir")).unwrap();

        let report = FileScanner::scan(
            &[dir.path().to_path_buf()],
            &ScanRules::default(),
            &mut ScanBudget::new(100),
        );
        assert_eq!(titles(&report), vec!["real.png"]);
    }

    #[test]
    fn test_budget_is_shared_across_roots() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        for i in 0..3 {
            create_test_image(&first.path().join(format!("first_{}.png", i)));
            create_test_image(&second.path().join(format!("second_{}.png", i)));
        }

        let mut budget = ScanBudget::new(4);
        let report = FileScanner::scan(
            &[first.path().to_path_buf(), second.path().to_path_buf()],
            &ScanRules::default(),
            &mut budget,
        );
        assert_eq!(report.records.len(), 4);
        assert!(report.capped);
        assert!(budget.is_exhausted());
    }

    #[tokio::test]
    async fn test_scan_async() {
        let dir = tempdir().unwrap();
        create_test_image(&dir.path().join("one.png"));
        create_test_image(&dir.path().join("two.png"));
        create_test_image(&dir.path().join("three.png"));

        let report = FileScanner::scan_async(vec![dir.path().to_path_buf()], ScanRules::default(), 2)
            .await
            .unwrap();
        assert_eq!(report.records.len(), 2);
        assert!(report.capped);
    }

    #[test]
    fn test_missing_root_counts_error() {
        let report = FileScanner::scan(
            &[PathBuf::from("/nonexistent/imgthumb/root")],
            &ScanRules::default(),
            &mut ScanBudget::new(10),
        );
        assert!(report.records.is_empty());
        assert_eq!(report.errors, 1);
    }

    #[test]
    fn test_sort_newest_first() {
        let mut report = ScanReport::default();
        for (name, ts) in [("old.png", 10), ("new.png", 30), ("mid.png", 20)] {
            report.records.push(ImageRecord::from_file(FileEntry::new(
                PathBuf::from(format!("/x/{}", name)),
                "image/png".to_string(),
                ts,
            )));
        }
        report.sort_newest_first();
        let order: Vec<_> = report.records.iter().map(|r| r.timestamp()).collect();
        assert_eq!(order, vec![30, 20, 10]);
    }

    #[test]
    fn test_hidden_helpers() {
        assert!(is_hidden(Path::new(".x/a.png")));
        assert!(is_hidden(Path::new("a/.b.png")));
        assert!(!is_hidden(Path::new("a/b.png")));
        assert!(mentions_cache(Path::new(".mozilla/Cache/x.png")));
        assert!(!mentions_cache(Path::new(".mozilla/cache/x.png")));
    }
}
