//! Plain-text directory exclusion lists (one entry per line).

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, warn};

/// Where an entry may match during a walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExclusionScope {
    /// A directory name at any depth, or a path relative to the scan root.
    #[default]
    AnyDepth,
    /// Only a path relative to the scan root.
    RootRelative,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionList {
    /// Entries in file order, used to enumerate Read Only roots.
    entries: Vec<String>,
    lookup: HashSet<String>,
}

impl ExclusionList {
    /// Loads a list from disk. A missing or unreadable file yields an empty list.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let list = Self::parse(&text);
                debug!(?path, entries = list.len(), "Loaded exclusion list");
                list
            }
            Err(e) => {
                warn!(?path, error = %e, "Exclusion list unavailable, excluding nothing");
                Self::default()
            }
        }
    }

    pub fn parse(text: &str) -> Self {
        let mut list = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let entry = line.trim_end_matches('/').to_string();
            if list.lookup.insert(entry.clone()) {
                list.entries.push(entry);
            }
        }
        list
    }

    /// True when a directory should be pruned, given its name and its path
    /// relative to the scan root.
    pub fn matches(&self, dir_name: &str, rel_path: &Path, scope: ExclusionScope) -> bool {
        let by_name = scope == ExclusionScope::AnyDepth && self.lookup.contains(dir_name);
        by_name
            || rel_path
                .to_str()
                .is_some_and(|rel| self.lookup.contains(rel))
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
