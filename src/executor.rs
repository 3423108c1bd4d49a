use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use log::debug;

/// The "open this file" primitive.
pub trait Opener: Send {
    fn open(&self, path: &Path) -> Result<()>;
}

/// Runs executables directly and hands everything else to an opener command
/// such as `xdg-open`. Children are detached from our stdio and never waited on.
pub struct SystemOpener {
    command: Vec<String>,
}

impl SystemOpener {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl Opener for SystemOpener {
    fn open(&self, path: &Path) -> Result<()> {
        let mut command = if runs_directly(path) {
            Command::new(path)
        } else {
            let Some((program, args)) = self.command.split_first() else {
                bail!("no opener command configured");
            };
            let mut command = Command::new(program);
            command.args(args).arg(path);
            command
        };

        if let Some(dir) = path.parent().filter(|dir| dir.is_dir()) {
            command.current_dir(dir);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        debug!("Opening {:?} with {:?}", path, command);
        command
            .spawn()
            .with_context(|| format!("failed to open {:?}", path))?;
        Ok(())
    }
}

#[cfg(unix)]
fn runs_directly(path: &Path) -> bool {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("desktop")) {
        return false;
    }
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn runs_directly(_path: &Path) -> bool {
    false
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    /// Records every path it is asked to open.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingOpener {
        pub opened: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl RecordingOpener {
        pub fn opened(&self) -> Vec<PathBuf> {
            self.opened.lock().unwrap().clone()
        }
    }

    impl Opener for RecordingOpener {
        fn open(&self, path: &Path) -> Result<()> {
            self.opened.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    #[test]
    fn missing_opener_program_is_an_error() {
        let opener = SystemOpener::new(vec!["/nonexistent/wrun-opener".to_string()]);
        assert!(opener.open(Path::new("/tmp/some-document.txt")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn desktop_files_never_run_directly() {
        use crate::sources::history::tests::scratch_dir;
        use std::os::unix::fs::PermissionsExt;
        let dir = scratch_dir("executor-desktop");
        let file = dir.join("app.desktop");
        fs::write(&file, "[Desktop Entry]\n").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(!runs_directly(&file));

        let script = dir.join("run");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(runs_directly(&script));
    }
}
