use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::PathEntry;

pub mod dirs;
pub mod history;
pub mod start_menu;

pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "exe", "lnk", "bat", "cmd", "com", "url", "desktop", "sh", "appimage",
];

#[derive(Debug, Error)]
#[error("cannot open {root:?}: {source}")]
pub struct SourceError {
    pub root: PathBuf,
    #[source]
    pub source: walkdir::Error,
}

pub trait Source {
    fn name(&self) -> String;
    fn scan(&self, extensions: &Extensions) -> Result<Vec<PathEntry>, SourceError>;
}

/// Case-insensitive extension allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extensions(HashSet<String>);

impl Extensions {
    pub fn new<I, S>(exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            exts.into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
        )
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.0.contains(&ext.to_ascii_lowercase()))
    }
}

impl Default for Extensions {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS)
    }
}

/// Keeps the first entry for every normalized path.
pub fn dedup(entries: &mut Vec<PathEntry>) {
    let mut seen = HashSet::new();
    entries.retain(|entry| seen.insert(entry.path.clone()));
}
