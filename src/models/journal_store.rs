//! SQLite-backed journal: the managed object store behind the Journal tab.
//!
//! Every object is a metadata row plus an optional backing file owned by the
//! store under `<root>/objects/<uid>`. Objects are queried by mime type prefix
//! and sorted by timestamp, fetched and deleted by uid.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{StoreMetadata, StoreObject};

const DB_FILE: &str = "store.sqlite";
const OBJECTS_DIR: &str = "objects";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("journal database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("journal file error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("journal object not found: {0}")]
    NotFound(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Ordering applied to `find` results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sorting {
    /// `-timestamp`: newest first.
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Property filter for `find`.
#[derive(Debug, Clone, Default)]
pub struct StoreQuery {
    /// Keep objects whose mime type starts with any of these prefixes.
    /// An empty list keeps everything.
    pub mime_prefixes: Vec<String>,
    pub limit: Option<usize>,
}

impl StoreQuery {
    pub fn images() -> Self {
        Self {
            mime_prefixes: vec![crate::models::IMAGE_MIME_PREFIX.to_string()],
            limit: None,
        }
    }

    /// `WHERE` clause binding one parameter per prefix; empty when the query
    /// keeps everything.
    fn where_clause(&self) -> String {
        if self.mime_prefixes.is_empty() {
            return String::new();
        }
        let clauses: Vec<String> = (1..=self.mime_prefixes.len())
            .map(|i| format!("substr(mime_type, 1, length(?{i})) = ?{i}"))
            .collect();
        format!("WHERE {}", clauses.join(" OR "))
    }
}

pub struct JournalStore {
    conn: Connection,
    objects_dir: PathBuf,
}

impl JournalStore {
    /// Opens or creates the journal rooted at `root`.
    pub fn open(root: &Path) -> StoreResult<Self> {
        let objects_dir = root.join(OBJECTS_DIR);
        std::fs::create_dir_all(&objects_dir).map_err(|source| StoreError::Io {
            path: objects_dir.clone(),
            source,
        })?;

        let db_path = root.join(DB_FILE);
        let conn = Connection::open(&db_path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        let store = Self { conn, objects_dir };
        store.create_tables()?;

        info!("Opened journal store at {:?}", db_path);
        Ok(store)
    }

    fn create_tables(&self) -> StoreResult<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS objects (
                uid TEXT PRIMARY KEY NOT NULL,
                title TEXT,
                mime_type TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                description TEXT,
                preview BLOB,
                has_file INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_objects_timestamp ON objects(timestamp);
            ",
        )?;
        debug!("Journal tables created/verified");
        Ok(())
    }

    /// Adds an object, copying `source_file` into the store when given.
    ///
    /// Returns the new object's uid.
    pub fn create(&self, metadata: &StoreMetadata, source_file: Option<&Path>) -> StoreResult<String> {
        let uid = Uuid::new_v4().to_string();

        if let Some(src) = source_file {
            let dst = self.object_path(&uid);
            std::fs::copy(src, &dst).map_err(|source| StoreError::Io {
                path: src.to_path_buf(),
                source,
            })?;
        }

        let inserted = self.conn.execute(
            "
            INSERT INTO objects (uid, title, mime_type, timestamp, description, preview, has_file)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                uid,
                metadata.title,
                metadata.mime_type,
                metadata.timestamp,
                metadata.description,
                metadata.preview,
                source_file.is_some(),
            ],
        );
        if let Err(e) = inserted {
            if source_file.is_some() {
                let dst = self.object_path(&uid);
                if let Err(cleanup) = std::fs::remove_file(&dst) {
                    warn!(path = ?dst, error = %cleanup, "Failed to remove orphaned journal file");
                }
            }
            return Err(e.into());
        }

        debug!(%uid, mime = %metadata.mime_type, "Created journal object");
        Ok(uid)
    }

    /// Returns the matching objects and how many matched before `limit`.
    pub fn find(&self, query: &StoreQuery, sorting: Sorting) -> StoreResult<(Vec<StoreObject>, usize)> {
        let filter = query.where_clause();
        let order = match sorting {
            Sorting::NewestFirst => "DESC",
            Sorting::OldestFirst => "ASC",
        };
        // SQLite treats a negative LIMIT as unbounded
        let limit = query.limit.map_or(-1, |limit| limit as i64);

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM objects {filter}"),
            params_from_iter(query.mime_prefixes.iter()),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT uid, title, mime_type, timestamp, description, preview, has_file
             FROM objects {filter} ORDER BY timestamp {order}, uid LIMIT {limit}"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let objects = stmt
            .query_map(params_from_iter(query.mime_prefixes.iter()), |row| {
                self.object_from_row(row)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((objects, total as usize))
    }

    pub fn get(&self, uid: &str) -> StoreResult<Option<StoreObject>> {
        let object = self
            .conn
            .query_row(
                "SELECT uid, title, mime_type, timestamp, description, preview, has_file
                 FROM objects WHERE uid = ?1",
                params![uid],
                |row| self.object_from_row(row),
            )
            .optional()?;
        Ok(object)
    }

    /// Deletes the object and its backing file. The row survives when the
    /// file cannot be removed.
    pub fn delete(&self, uid: &str) -> StoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let rows = tx.execute("DELETE FROM objects WHERE uid = ?1", params![uid])?;
        if rows == 0 {
            return Err(StoreError::NotFound(uid.to_string()));
        }

        let path = self.object_path(uid);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(?path, error = %e, "Failed to remove journal object file");
                return Err(StoreError::Io { path, source: e });
            }
        }

        tx.commit()?;
        info!(%uid, "Deleted journal object");
        Ok(())
    }

    /// Size in bytes of the object's backing file, 0 when it has none.
    pub fn file_size(&self, object: &StoreObject) -> u64 {
        debug!(uid = %object.uid, "Reading journal object file size");
        object
            .file_path
            .as_deref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0)
    }

    pub fn count(&self) -> StoreResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM objects", [], |row| row.get(0))?;
        Ok(count)
    }

    fn object_path(&self, uid: &str) -> PathBuf {
        self.objects_dir.join(uid)
    }

    fn object_from_row(&self, row: &Row<'_>) -> rusqlite::Result<StoreObject> {
        let uid: String = row.get(0)?;
        let has_file: bool = row.get(6)?;
        let file_path = has_file.then(|| self.object_path(&uid));
        Ok(StoreObject {
            metadata: StoreMetadata {
                title: row.get(1)?,
                mime_type: row.get(2)?,
                timestamp: row.get(3)?,
                description: row.get(4)?,
                preview: row.get(5)?,
            },
            uid,
            file_path,
        })
    }

    /// Returns the current Unix timestamp.
    pub fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn metadata(title: &str, mime: &str, timestamp: i64) -> StoreMetadata {
        StoreMetadata {
            title: Some(title.to_string()),
            mime_type: mime.to_string(),
            timestamp,
            description: Some(format!("{} description", title)),
            preview: None,
        }
    }

    #[test]
    fn test_open_and_create() {
        let dir = tempdir().unwrap();
        let store = JournalStore::open(dir.path()).unwrap();
        assert!(dir.path().join("store.sqlite").exists());
        assert!(dir.path().join("objects").is_dir());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_create_copies_backing_file() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("drawing.png");
        std::fs::write(&src, b"pixels").unwrap();

        let store = JournalStore::open(&dir.path().join("journal")).unwrap();
        let uid = store
            .create(&metadata("Drawing", "image/png", 10), Some(&src))
            .unwrap();

        let object = store.get(&uid).unwrap().unwrap();
        let path = object.file_path.clone().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"pixels");
        assert_eq!(store.file_size(&object), 6);
        assert_eq!(object.metadata.title.as_deref(), Some("Drawing"));
    }

    #[test]
    fn test_find_filters_and_sorts() {
        let dir = tempdir().unwrap();
        let store = JournalStore::open(dir.path()).unwrap();
        store.create(&metadata("old", "image/png", 100), None).unwrap();
        store.create(&metadata("essay", "text/plain", 300), None).unwrap();
        store.create(&metadata("new", "image/jpeg", 200), None).unwrap();

        let (objects, total) = store.find(&StoreQuery::images(), Sorting::NewestFirst).unwrap();
        assert_eq!(total, 2);
        let titles: Vec<_> = objects
            .iter()
            .map(|o| o.metadata.title.as_deref().unwrap())
            .collect();
        assert_eq!(titles, vec!["new", "old"]);

        let (objects, _) = store.find(&StoreQuery::images(), Sorting::OldestFirst).unwrap();
        assert_eq!(objects[0].metadata.title.as_deref(), Some("old"));

        let (all, total) = store.find(&StoreQuery::default(), Sorting::NewestFirst).unwrap();
        assert_eq!(total, 3);
        assert_eq!(all[0].metadata.title.as_deref(), Some("essay"));
    }

    #[test]
    fn test_find_limit_keeps_total() {
        let dir = tempdir().unwrap();
        let store = JournalStore::open(dir.path()).unwrap();
        for i in 0..5 {
            store.create(&metadata("pic", "image/png", i), None).unwrap();
        }
        let query = StoreQuery {
            limit: Some(2),
            ..StoreQuery::images()
        };
        let (objects, total) = store.find(&query, Sorting::NewestFirst).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(total, 5);
    }

    #[test]
    fn test_delete_removes_row_and_file() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("photo.jpg");
        std::fs::write(&src, b"jpeg").unwrap();
        let store = JournalStore::open(&dir.path().join("journal")).unwrap();
        let uid = store
            .create(&metadata("Photo", "image/jpeg", 5), Some(&src))
            .unwrap();
        let path = store.get(&uid).unwrap().unwrap().file_path.unwrap();

        store.delete(&uid).unwrap();
        assert!(store.get(&uid).unwrap().is_none());
        assert!(!path.exists());
        assert!(src.exists());

        assert!(matches!(store.delete(&uid), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_failed_file_removal_keeps_row() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("photo.jpg");
        std::fs::write(&src, b"jpeg").unwrap();
        let store = JournalStore::open(&dir.path().join("journal")).unwrap();
        let uid = store
            .create(&metadata("Photo", "image/jpeg", 5), Some(&src))
            .unwrap();

        // A directory in place of the backing file cannot be unlinked
        let path = store.get(&uid).unwrap().unwrap().file_path.unwrap();
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(matches!(store.delete(&uid), Err(StoreError::Io { .. })));
        assert!(store.get(&uid).unwrap().is_some());
        assert_eq!(store.count().unwrap(), 1);

        std::fs::remove_dir(&path).unwrap();
        store.delete(&uid).unwrap();
        assert!(store.get(&uid).unwrap().is_none());
    }

    #[test]
    fn test_failed_insert_leaves_no_orphan_file() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("photo.jpg");
        std::fs::write(&src, b"jpeg").unwrap();
        let root = dir.path().join("journal");
        let store = JournalStore::open(&root).unwrap();

        Connection::open(root.join(DB_FILE))
            .unwrap()
            .execute_batch("DROP TABLE objects")
            .unwrap();

        let result = store.create(&metadata("Photo", "image/jpeg", 5), Some(&src));
        assert!(matches!(result, Err(StoreError::Sqlite(_))));
        assert_eq!(std::fs::read_dir(root.join(OBJECTS_DIR)).unwrap().count(), 0);
    }

    #[test]
    fn test_find_matches_prefixes_exactly() {
        let dir = tempdir().unwrap();
        let store = JournalStore::open(dir.path()).unwrap();
        store.create(&metadata("png", "image/png", 1), None).unwrap();
        store.create(&metadata("upper", "IMAGE/PNG", 2), None).unwrap();
        store.create(&metadata("note", "text/plain", 3), None).unwrap();
        store.create(&metadata("clip", "video/ogg", 4), None).unwrap();

        let query = StoreQuery {
            mime_prefixes: vec!["image/".to_string(), "text/".to_string()],
            limit: None,
        };
        let (objects, total) = store.find(&query, Sorting::OldestFirst).unwrap();
        assert_eq!(total, 2);
        let titles: Vec<_> = objects
            .iter()
            .map(|o| o.metadata.title.as_deref().unwrap())
            .collect();
        assert_eq!(titles, vec!["png", "note"]);
    }

    #[test]
    fn test_preview_round_trips_as_blob() {
        let dir = tempdir().unwrap();
        let store = JournalStore::open(dir.path()).unwrap();
        let mut meta = metadata("With preview", "image/png", 1);
        meta.preview = Some(vec![0x89, b'P', b'N', b'G', 0, 1, 2]);
        let uid = store.create(&meta, None).unwrap();
        let object = store.get(&uid).unwrap().unwrap();
        assert_eq!(object.metadata.preview, meta.preview);
        assert!(object.file_path.is_none());
    }
}
