use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::config::Options;
use crate::executor::Opener;
use crate::index;
use crate::menu::{self, MenuError, PendingSelector, Selection};
use crate::model::{self, Action, Entry, PathEntry};
use crate::sources::history::{History, HistoryError};

/// What a handled selection did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Nothing,
    Launched(PathBuf),
    OpenedDirectory(PathBuf),
    Forgot(PathBuf),
    Reindexed,
    Stop,
}

/// Owns the ranked entry list and the history store for one process.
pub struct Session {
    options: Arc<Options>,
    entries: Vec<Entry>,
    history: History,
    opener: Box<dyn Opener>,
}

impl Session {
    /// Loads history (when enabled) and builds the first index.
    pub fn new(options: Arc<Options>, opener: Box<dyn Opener>) -> Result<Self, HistoryError> {
        let history = if options.use_history {
            History::load(&options.history_path)?
        } else {
            History::default()
        };
        Ok(Self::with_history(options, history, opener))
    }

    pub fn with_history(options: Arc<Options>, history: History, opener: Box<dyn Opener>) -> Self {
        let entries = index::build_index(&options, &history);
        Self {
            options,
            entries,
            history,
            opener,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Re-runs source enumeration from scratch.
    pub fn reindex(&mut self) {
        self.entries = index::build_index(&self.options, &self.history);
    }

    /// Re-sorts the current entries against the current history.
    pub fn rank(&mut self) {
        model::rank(&mut self.entries, &self.history);
    }

    pub fn save_history(&self) -> Result<(), HistoryError> {
        if !self.options.use_history {
            return Ok(());
        }
        self.history.save(&self.options.history_path)
    }

    /// Starts a menu preloaded with the current entries.
    pub fn launch(&self) -> Result<PendingSelector, MenuError> {
        menu::launch(&self.options.menu, self.entries.iter().map(Entry::title))
    }

    /// Shows a pending menu and executes whatever was picked.
    pub fn show(&mut self, pending: PendingSelector) -> Result<Outcome, MenuError> {
        debug!("Showing menu with {} entries", pending.entries());
        match pending.show()? {
            Selection::Chosen(index) => match self.entries.get(index).cloned() {
                Some(entry) => self.execute(&entry),
                None => {
                    warn!("choice out of range: {}", index);
                    Ok(Outcome::Nothing)
                }
            },
            Selection::OutOfRange(index) => {
                warn!("choice out of range: {}", index);
                Ok(Outcome::Nothing)
            }
            Selection::NoChoice => {
                info!("no choice");
                Ok(Outcome::Nothing)
            }
        }
    }

    /// One full single-shot cycle: launch, show, handle.
    pub fn run_once(&mut self) -> Result<Outcome, MenuError> {
        let pending = self.launch()?;
        self.show(pending)
    }

    pub fn execute(&mut self, entry: &Entry) -> Result<Outcome, MenuError> {
        match entry {
            Entry::Path(entry) => Ok(self.launch_path(entry)),
            Entry::Action(action) => self.run_action(action.action),
        }
    }

    fn launch_path(&mut self, entry: &PathEntry) -> Outcome {
        if let Err(e) = self.opener.open(&entry.path) {
            error!("{:#}", e);
            return Outcome::Nothing;
        }
        let score = self.history.increment(&entry.path);
        info!("Launched {:?} (score {})", entry.path, score);
        Outcome::Launched(entry.path.clone())
    }

    fn run_action(&mut self, action: Action) -> Result<Outcome, MenuError> {
        info!("Running action: {}", action.label());
        match action {
            Action::OpenDirectory => {
                let candidates: Vec<&PathEntry> = self.path_entries().collect();
                let Some(chosen) = self.pick(&candidates)? else {
                    return Ok(Outcome::Nothing);
                };
                let Some(dir) = chosen.path.parent().map(|dir| dir.to_path_buf()) else {
                    return Ok(Outcome::Nothing);
                };
                if let Err(e) = self.opener.open(&dir) {
                    error!("{:#}", e);
                    return Ok(Outcome::Nothing);
                }
                Ok(Outcome::OpenedDirectory(dir))
            }
            Action::RemoveFromHistory => {
                let candidates: Vec<&PathEntry> = self
                    .path_entries()
                    .filter(|entry| self.history.score(&entry.path) > 0)
                    .collect();
                let Some(path) = self.pick(&candidates)?.map(|entry| entry.path.clone()) else {
                    return Ok(Outcome::Nothing);
                };
                self.history.remove(&path);
                self.rank();
                info!("Removed {:?} from history", path);
                Ok(Outcome::Forgot(path))
            }
            Action::ReloadIndex => {
                self.reindex();
                Ok(Outcome::Reindexed)
            }
            Action::StopDaemon => Ok(Outcome::Stop),
        }
    }

    fn path_entries(&self) -> impl Iterator<Item = &PathEntry> {
        self.entries.iter().filter_map(|entry| match entry {
            Entry::Path(entry) => Some(entry),
            Entry::Action(_) => None,
        })
    }

    /// Nested menu over full paths; `None` when nothing usable was chosen.
    fn pick<'a>(&self, candidates: &[&'a PathEntry]) -> Result<Option<&'a PathEntry>, MenuError> {
        if candidates.is_empty() {
            info!("Nothing to choose from");
            return Ok(None);
        }
        let titles = candidates.iter().map(|entry| entry.path.to_string_lossy());
        let selection = menu::launch(&self.options.menu, titles)?.show()?;
        Ok(match selection {
            Selection::Chosen(index) => candidates.get(index).copied(),
            Selection::OutOfRange(index) => {
                warn!("choice out of range: {}", index);
                None
            }
            Selection::NoChoice => {
                info!("no choice");
                None
            }
        })
    }
}
