use log::{info, warn};

use crate::config::Options;
use crate::model::{self, Action, ActionEntry, Entry};
use crate::sources::dirs::{DirSource, custom_sources, path_sources};
use crate::sources::history::History;
use crate::sources::start_menu::start_menu_sources;
use crate::sources::{self, Source};

/// Sources enabled by `options`, in indexing order.
pub fn enabled_sources(options: &Options) -> Vec<DirSource> {
    let mut enabled = Vec::new();
    if options.index_start_menu {
        enabled.extend(start_menu_sources());
    }
    if options.index_path {
        enabled.extend(path_sources());
    }
    enabled.extend(custom_sources(&options.custom_dirs));
    enabled
}

/// Action entries offered for this configuration, in menu order.
pub fn actions(options: &Options) -> Vec<Action> {
    if !options.actions {
        return Vec::new();
    }
    let mut actions = vec![Action::OpenDirectory];
    if options.use_history {
        actions.push(Action::RemoveFromHistory);
    }
    if options.daemon {
        actions.push(Action::ReloadIndex);
        actions.push(Action::StopDaemon);
    }
    actions
}

/// Enumerates every enabled source and returns the ranked entry list.
pub fn build_index(options: &Options, history: &History) -> Vec<Entry> {
    let mut found = Vec::new();
    for source in enabled_sources(options) {
        match source.scan(&options.extensions) {
            Ok(mut entries) => found.append(&mut entries),
            Err(e) => warn!("Skipping {}: {}", source.name(), e),
        }
    }

    sources::dedup(&mut found);
    found.retain(|entry| !options.is_excluded(&entry.title, &entry.path));

    let mut entries: Vec<Entry> = found.into_iter().map(Entry::Path).collect();
    entries.extend(
        actions(options)
            .into_iter()
            .map(|action| Entry::Action(ActionEntry::new(action))),
    );
    model::rank(&mut entries, history);

    info!("Indexed {} entries", entries.len());
    entries
}
