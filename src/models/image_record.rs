use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Mime type prefix shared by every record the browser displays.
pub const IMAGE_MIME_PREFIX: &str = "image/";

/// The tab a record was enumerated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Journal,
    Files,
    External,
    ReadOnly,
}

impl SourceKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Journal => "Journal",
            Self::Files => "Files",
            Self::External => "External",
            Self::ReadOnly => "Read Only",
        }
    }

    /// Entries in every tab except Read Only can be deleted.
    pub fn allows_delete(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }

    /// Hidden files are only listed in the Read Only tab.
    pub fn allows_hidden(self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}

/// Metadata of a journal object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreMetadata {
    pub title: Option<String>,
    pub mime_type: String,
    pub timestamp: i64,
    pub description: Option<String>,
    /// Raw preview bytes: either a PNG or base64 text.
    pub preview: Option<Vec<u8>>,
}

/// An object held by the journal store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreObject {
    pub uid: String,
    pub metadata: StoreMetadata,
    pub file_path: Option<PathBuf>,
}

/// A plain file found while walking a directory.
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub object_id: String,
    pub title: String,
    pub mime_type: String,
    pub timestamp: i64,
    pub description: String,
}

impl FileEntry {
    /// Synthesizes the record fields from the file's attributes.
    pub fn new(path: PathBuf, mime_type: String, mtime: i64) -> Self {
        let full = path.to_string_lossy().into_owned();
        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| full.clone());
        Self {
            object_id: full.clone(),
            description: full,
            title,
            mime_type,
            timestamp: mtime,
            path,
        }
    }
}

/// One browsable image, backed either by the journal or by the filesystem.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageRecord {
    Store(StoreObject),
    File(FileEntry),
}

impl ImageRecord {
    pub fn from_store(object: StoreObject) -> Self {
        Self::Store(object)
    }

    pub fn from_file(entry: FileEntry) -> Self {
        Self::File(entry)
    }

    pub fn is_store_backed(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            Self::Store(obj) => obj.metadata.title.as_deref(),
            Self::File(entry) => Some(&entry.title),
        }
    }

    pub fn mime_type(&self) -> &str {
        match self {
            Self::Store(obj) => &obj.metadata.mime_type,
            Self::File(entry) => &entry.mime_type,
        }
    }

    /// Seconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Store(obj) => obj.metadata.timestamp,
            Self::File(entry) => entry.timestamp,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Store(obj) => obj.metadata.description.as_deref(),
            Self::File(entry) => Some(&entry.description),
        }
    }

    pub fn file_path(&self) -> Option<&Path> {
        match self {
            Self::Store(obj) => obj.file_path.as_deref(),
            Self::File(entry) => Some(&entry.path),
        }
    }

    pub fn object_id(&self) -> &str {
        match self {
            Self::Store(obj) => &obj.uid,
            Self::File(entry) => &entry.object_id,
        }
    }

    /// Store preview bytes; filesystem entries never carry one.
    pub fn preview(&self) -> Option<&[u8]> {
        match self {
            Self::Store(obj) => obj.metadata.preview.as_deref(),
            Self::File(_) => None,
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type().starts_with(IMAGE_MIME_PREFIX)
    }

    /// Flat dictionary view shared by both origins.
    pub fn metadata(&self) -> BTreeMap<&'static str, String> {
        let mut map = BTreeMap::new();
        map.insert("uid", self.object_id().to_string());
        map.insert("title", self.title().unwrap_or_default().to_string());
        map.insert("timestamp", self.timestamp().to_string());
        map.insert("mime_type", self.mime_type().to_string());
        map.insert(
            "description",
            self.description().unwrap_or_default().to_string(),
        );
        map
    }
}
