use std::collections::HashMap;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use log::debug;
use thiserror::Error;

use crate::model::normalize_path;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("history file {path:?} is corrupt at byte {offset}: {reason}")]
    Corrupt {
        path: PathBuf,
        offset: usize,
        reason: &'static str,
    },
    #[error("history path too long to store ({len} bytes): {path:?}")]
    PathTooLong { path: PathBuf, len: usize },
}

/// Launch counts keyed by normalized path.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct History {
    scores: HashMap<PathBuf, u32>,
}

pub fn default_history_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "wrun", "wrun").map(|dirs| dirs.data_dir().join("history.bin"))
}

impl History {
    pub fn score(&self, path: &Path) -> u32 {
        self.scores.get(&normalize_path(path)).copied().unwrap_or(0)
    }

    pub fn increment(&mut self, path: &Path) -> u32 {
        let count = self.scores.entry(normalize_path(path)).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    #[cfg(test)]
    pub fn set(&mut self, path: &Path, score: u32) {
        self.scores.insert(normalize_path(path), score);
    }

    pub fn remove(&mut self, path: &Path) -> bool {
        self.scores.remove(&normalize_path(path)).is_some()
    }

    /// Entries that would survive a save.
    pub fn len(&self) -> usize {
        self.scores.values().filter(|&&score| score > 0).count()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads the store. A missing file is an empty history; anything that does
    /// not decode cleanly up to end-of-file is an error.
    pub fn load(path: &Path) -> Result<Self, HistoryError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No history at {:?}, starting empty", path);
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(HistoryError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let history = decode(&bytes).map_err(|(offset, reason)| HistoryError::Corrupt {
            path: path.to_path_buf(),
            offset,
            reason,
        })?;
        debug!("Loaded {} history records from {:?}", history.scores.len(), path);
        Ok(history)
    }

    /// Rewrites the store from scratch. Zero scores are never written.
    pub fn save(&self, path: &Path) -> Result<(), HistoryError> {
        let io_err = |source| HistoryError::Io {
            path: path.to_path_buf(),
            source,
        };

        let bytes = self.encode()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut file = fs::File::create(path).map_err(io_err)?;
        file.write_all(&bytes).map_err(io_err)?;
        debug!("Saved {} history records to {:?}", self.len(), path);
        Ok(())
    }

    fn encode(&self) -> Result<Vec<u8>, HistoryError> {
        let mut records: Vec<(&PathBuf, u32)> = self
            .scores
            .iter()
            .filter(|&(_, &score)| score > 0)
            .map(|(path, &score)| (path, score))
            .collect();
        records.sort();

        let mut out = Vec::new();
        for (path, score) in records {
            let raw = path_bytes(path);
            let len = u16::try_from(raw.len()).map_err(|_| HistoryError::PathTooLong {
                path: path.clone(),
                len: raw.len(),
            })?;
            out.extend_from_slice(&score.to_le_bytes());
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(&raw);
        }
        Ok(out)
    }
}

// score:u32 | len:u16 | path bytes, repeated to EOF
fn decode(bytes: &[u8]) -> Result<History, (usize, &'static str)> {
    let mut history = History::default();
    let mut pos = 0;

    while pos < bytes.len() {
        let record = pos;
        let score = take::<4>(bytes, &mut pos).ok_or((record, "truncated score"))?;
        let len = take::<2>(bytes, &mut pos).ok_or((record, "truncated path length"))?;
        let len = u16::from_le_bytes(len) as usize;
        if len == 0 {
            return Err((record, "empty path"));
        }
        let raw = bytes
            .get(pos..pos + len)
            .ok_or((record, "truncated path"))?;
        pos += len;

        history
            .scores
            .insert(normalize_path(&path_from_bytes(raw)), u32::from_le_bytes(score));
    }
    Ok(history)
}

fn take<const N: usize>(bytes: &[u8], pos: &mut usize) -> Option<[u8; N]> {
    let chunk = bytes.get(*pos..*pos + N)?;
    *pos += N;
    chunk.try_into().ok()
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Vec<u8> {
    path.to_string_lossy().as_bytes().to_vec()
}

#[cfg(unix)]
fn path_from_bytes(raw: &[u8]) -> PathBuf {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(OsStr::from_bytes(raw))
}

#[cfg(not(unix))]
fn path_from_bytes(raw: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(raw).into_owned())
}
