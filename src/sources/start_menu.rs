use std::path::PathBuf;

use directories::BaseDirs;

use crate::sources::dirs::DirSource;

/// Levels of subdirectories entered below each application directory.
pub const START_MENU_DEPTH: usize = 3;

/// The XDG application directories, the desktop's equivalent of a start menu.
pub fn start_menu_sources() -> Vec<DirSource> {
    let mut roots = Vec::new();
    if let Some(base_dirs) = BaseDirs::new() {
        roots.push(base_dirs.data_dir().join("applications"));
    }
    roots.push(PathBuf::from("/usr/share/applications"));
    roots.push(PathBuf::from("/usr/local/share/applications"));

    roots
        .into_iter()
        .map(|root| DirSource {
            label: "start menu",
            root,
            depth: START_MENU_DEPTH,
            accept_executables: false,
        })
        .collect()
}
