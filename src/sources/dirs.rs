use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::model::PathEntry;
use crate::sources::{Extensions, Source, SourceError};

/// A directory scanned for launchable files. `depth` counts the directory
/// levels below `root` that are entered; zero lists `root` only.
#[derive(Debug, Clone)]
pub struct DirSource {
    pub label: &'static str,
    pub root: PathBuf,
    pub depth: usize,
    pub accept_executables: bool,
}

impl DirSource {
    pub fn flat(label: &'static str, root: impl Into<PathBuf>) -> Self {
        Self {
            label,
            root: root.into(),
            depth: 0,
            accept_executables: true,
        }
    }

    fn is_launchable(&self, path: &Path, extensions: &Extensions) -> bool {
        extensions.matches(path) || (self.accept_executables && is_executable(path))
    }
}

impl Source for DirSource {
    fn name(&self) -> String {
        format!("{} {:?}", self.label, self.root)
    }

    fn scan(&self, extensions: &Extensions) -> Result<Vec<PathEntry>, SourceError> {
        debug!("Scanning {}", self.name());
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(self.depth + 1)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_hidden(entry.file_name()));

        let mut entries = Vec::new();
        for item in walker {
            let item = match item {
                Ok(item) => item,
                Err(e) if e.depth() == 0 => {
                    return Err(SourceError {
                        root: self.root.clone(),
                        source: e,
                    });
                }
                Err(e) => {
                    debug!("Skipping unreadable item under {:?}: {}", self.root, e);
                    continue;
                }
            };
            if item.file_type().is_dir() {
                continue;
            }
            if self.is_launchable(item.path(), extensions) {
                entries.push(PathEntry::new(item.path()));
            }
        }

        info!("{}: found {} entries", self.name(), entries.len());
        Ok(entries)
    }
}

/// One flat source per `PATH` directory.
pub fn path_sources() -> Vec<DirSource> {
    match env::var_os("PATH") {
        Some(paths) => env::split_paths(&paths)
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(|dir| DirSource::flat("PATH", dir))
            .collect(),
        None => {
            warn!("PATH is not set, nothing to index from it");
            Vec::new()
        }
    }
}

pub fn custom_sources(dirs: &[PathBuf]) -> Vec<DirSource> {
    dirs.iter()
        .map(|dir| DirSource::flat("custom", dir.clone()))
        .collect()
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}
