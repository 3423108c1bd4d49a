use std::cmp::Reverse;
use std::path::{Component, Path, PathBuf};

use crate::sources::history::History;

/// Prefix that marks an entry as a meta-command rather than a launchable file.
pub const ACTION_PREFIX: &str = "> ";

/// One item in the ranked menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Path(PathEntry),
    Action(ActionEntry),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub title: String,
    pub path: PathBuf, // normalized, the history key
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionEntry {
    pub title: String,
    pub action: Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    OpenDirectory,
    RemoveFromHistory,
    ReloadIndex,
    StopDaemon,
}

impl Action {
    pub fn label(self) -> &'static str {
        match self {
            Action::OpenDirectory => "Open containing directory",
            Action::RemoveFromHistory => "Remove from history",
            Action::ReloadIndex => "Reload index",
            Action::StopDaemon => "Stop daemon",
        }
    }
}

impl PathEntry {
    /// Builds an entry from a discovered file. The path is normalized here so
    /// every later lookup uses the same key.
    pub fn new(path: &Path) -> Self {
        let path = normalize_path(path);
        let title = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self { title, path }
    }
}

impl ActionEntry {
    pub fn new(action: Action) -> Self {
        Self {
            title: format!("{}{}", ACTION_PREFIX, action.label()),
            action,
        }
    }
}

impl Entry {
    pub fn title(&self) -> &str {
        match self {
            Entry::Path(entry) => &entry.title,
            Entry::Action(entry) => &entry.title,
        }
    }

    pub fn is_action(&self) -> bool {
        matches!(self, Entry::Action(_))
    }

    /// Launch count, read live from the history store. Actions have none.
    pub fn score(&self, history: &History) -> u32 {
        match self {
            Entry::Path(entry) => history.score(&entry.path),
            Entry::Action(_) => 0,
        }
    }

    /// Actions last, then highest score, then title.
    pub fn rank_key<'a>(&'a self, history: &History) -> (bool, Reverse<u32>, &'a str) {
        (self.is_action(), Reverse(self.score(history)), self.title())
    }
}

/// Stable sort by [`Entry::rank_key`].
pub fn rank(entries: &mut [Entry], history: &History) {
    entries.sort_by(|a, b| a.rank_key(history).cmp(&b.rank_key(history)));
}

/// Lexical normalization: drops `.` components, folds `..` into its parent
/// where one exists and rebuilds the path with native separators. The
/// filesystem is never consulted.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }

    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}
