//! `imgthumb --import FILE...`: copies images into the journal.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::models::{JournalStore, StoreMetadata};
use crate::scanner::mime;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: Vec<String>,
    pub skipped: usize,
    pub failed: usize,
}

/// Imports every path, logging and skipping the ones that fail.
pub fn import_files(store: &JournalStore, paths: &[PathBuf]) -> ImportSummary {
    let mut summary = ImportSummary::default();
    for path in paths {
        match import_file(store, path) {
            Ok(Some(uid)) => {
                info!(?path, %uid, "Imported into journal");
                summary.imported.push(uid);
            }
            Ok(None) => {
                warn!(?path, "Not an image, skipping");
                summary.skipped += 1;
            }
            Err(e) => {
                warn!(?path, error = ?e, "Import failed");
                summary.failed += 1;
            }
        }
    }
    summary
}

fn import_file(store: &JournalStore, path: &Path) -> Result<Option<String>> {
    let Some(mime_type) = mime::sniff(path)? else {
        return Ok(None);
    };
    if !mime::is_image_mime(&mime_type) {
        return Ok(None);
    }

    let metadata = StoreMetadata {
        title: path.file_name().map(|n| n.to_string_lossy().into_owned()),
        mime_type,
        timestamp: JournalStore::now(),
        description: Some(path.display().to_string()),
        preview: None,
    };
    let uid = store
        .create(&metadata, Some(path))
        .with_context(|| format!("Failed to store {:?}", path))?;
    Ok(Some(uid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Sorting, StoreQuery};
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn test_import_images_only() {
        let dir = tempdir().unwrap();
        let store = JournalStore::open(&dir.path().join("journal")).unwrap();

        let photo = dir.path().join("holiday.png");
        let img = RgbaImage::from_pixel(2, 2, Rgba([5, 5, 5, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        std::fs::write(&photo, out.into_inner()).unwrap();

        let notes = dir.path().join("notes.txt");
        std::fs::write(&notes, b"plain text").unwrap();

        let summary = import_files(
            &store,
            &[photo.clone(), notes, dir.path().join("missing.png")],
        );
        assert_eq!(summary.imported.len(), 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);

        let (objects, total) = store.find(&StoreQuery::images(), Sorting::NewestFirst).unwrap();
        assert_eq!(total, 1);
        let object = &objects[0];
        assert_eq!(object.metadata.title.as_deref(), Some("holiday.png"));
        assert_eq!(object.metadata.mime_type, "image/png");
        let stored = object.file_path.as_ref().unwrap();
        assert_eq!(std::fs::read(stored).unwrap(), std::fs::read(&photo).unwrap());
    }
}
