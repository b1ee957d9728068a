//! Deleting a record from whichever backing holds it.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::models::{ImageRecord, JournalStore};

/// Deletes the journal entry or unlinks the file behind `record`.
///
/// Store-backed records open the journal at `journal_dir`; plain files never
/// touch it. On error nothing was removed and the record should be kept.
pub fn delete_record(record: &ImageRecord, journal_dir: &Path) -> Result<()> {
    let result = match record {
        ImageRecord::Store(object) => JournalStore::open(journal_dir)
            .and_then(|store| {
                let freed = store.file_size(object);
                store.delete(&object.uid).map(|()| freed)
            })
            .map(|freed| info!(uid = %object.uid, freed, "Deleted journal entry"))
            .with_context(|| format!("Cannot delete journal entry {}", object.uid)),
        ImageRecord::File(entry) => remove_file(&entry.path),
    };

    if let Err(e) = &result {
        warn!("{:#}", e);
    }
    result
}

fn remove_file(path: &Path) -> Result<()> {
    if path.is_dir() {
        bail!("Cannot delete {}: is a directory", path.display());
    }
    std::fs::remove_file(path).with_context(|| format!("Cannot delete {}", path.display()))?;
    info!("Deleted {}", path.display());
    Ok(())
}
