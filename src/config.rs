use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::cli::Args;
use crate::sources::history::default_history_path;
use crate::sources::{DEFAULT_EXTENSIONS, Extensions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid exclude pattern {pattern:?}: {source}")]
    Exclude {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("opener command is empty")]
    EmptyOpener,
    #[error("no location for the history file, pass --history-file")]
    NoHistoryPath,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub sources: SourceConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GeneralConfig {
    #[serde(default)]
    pub menu: Option<String>,
    #[serde(default = "default_true")]
    pub history: bool,
    #[serde(default)]
    pub history_file: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub actions: bool,
    #[serde(default = "default_opener")]
    pub opener: Vec<String>,
}

fn default_true() -> bool { true }
fn default_opener() -> Vec<String> { vec!["xdg-open".to_string()] }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            menu: None,
            history: true,
            history_file: None,
            actions: true,
            opener: default_opener(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_true")]
    pub start_menu: bool,
    #[serde(default = "default_true")]
    pub path: bool,
    #[serde(default)]
    pub custom: Vec<PathBuf>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            start_menu: true,
            path: true,
            custom: Vec::new(),
            extensions: default_extensions(),
            exclude: Vec::new(),
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "wrun", "wrun").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Reads `path`, or the default location when `None`. A missing default file
/// means defaults; a missing explicit file is an error.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let (config_path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => match default_config_path() {
            Some(path) => (path, false),
            None => return Ok(Config::default()),
        },
    };

    if !explicit && !config_path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
        path: config_path.clone(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: config_path,
        source,
    })
}

/// Everything one process run needs, fixed at startup.
#[derive(Debug, Clone)]
pub struct Options {
    pub menu: Vec<String>,
    pub use_history: bool,
    pub history_path: PathBuf,
    pub actions: bool,
    pub daemon: bool,
    pub index_start_menu: bool,
    pub index_path: bool,
    pub custom_dirs: Vec<PathBuf>,
    pub extensions: Extensions,
    pub exclude: Vec<Regex>,
    pub opener: Vec<String>,
}

impl Options {
    /// Merges the config file with command-line flags; flags win. An empty
    /// `menu` is left for the caller to report as a usage error.
    pub fn resolve(config: Config, args: &Args) -> Result<Self, ConfigError> {
        let menu = args
            .menu
            .as_deref()
            .or(config.general.menu.as_deref())
            .map(split_command)
            .unwrap_or_default();

        let history_path = match args.history_file.clone().or(config.general.history_file) {
            Some(path) => path,
            None => default_history_path().ok_or(ConfigError::NoHistoryPath)?,
        };

        let exclude = config
            .sources
            .exclude
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::Exclude {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if config.general.opener.is_empty() {
            return Err(ConfigError::EmptyOpener);
        }

        let mut custom_dirs = config.sources.custom;
        custom_dirs.extend(args.index.iter().cloned());

        Ok(Self {
            menu,
            use_history: config.general.history && !args.no_history,
            history_path,
            actions: config.general.actions && !args.no_actions,
            daemon: args.daemon,
            index_start_menu: config.sources.start_menu && !args.no_start,
            index_path: config.sources.path && !args.no_path,
            custom_dirs,
            extensions: Extensions::new(&config.sources.extensions),
            exclude,
            opener: config.general.opener,
        })
    }

    pub fn is_excluded(&self, title: &str, path: &Path) -> bool {
        let path = path.to_string_lossy();
        self.exclude
            .iter()
            .any(|re| re.is_match(title) || re.is_match(&path))
    }
}

/// Whitespace-split command line, program first.
pub fn split_command(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::history::tests::scratch_dir;

    fn args() -> Args {
        Args {
            history_file: Some(PathBuf::from("/tmp/wrun-test-history.bin")),
            ..Args::default()
        }
    }

    #[test]
    fn flags_override_file() {
        let config: Config = toml::from_str(
            r#"
            [general]
            menu = "rofi -dmenu -format i"
            [sources]
            custom = ["/opt/tools"]
            exclude = ["^uninstall"]
            "#,
        )
        .unwrap();

        let mut args = args();
        args.menu = Some("my-menu --index".to_string());
        args.no_path = true;
        args.index = vec![PathBuf::from("/extra")];

        let options = Options::resolve(config, &args).unwrap();
        assert_eq!(options.menu, vec!["my-menu", "--index"]);
        assert!(!options.index_path);
        assert!(options.index_start_menu);
        assert!(options.use_history);
        assert_eq!(options.custom_dirs, vec![PathBuf::from("/opt/tools"), PathBuf::from("/extra")]);
        assert!(options.is_excluded("uninstall.exe", Path::new("/x/uninstall.exe")));
        assert!(!options.is_excluded("setup.exe", Path::new("/x/setup.exe")));
    }

    #[test]
    fn menu_falls_back_to_file_then_empty() {
        let config: Config = toml::from_str("[general]\nmenu = \"rofi -dmenu\"\n").unwrap();
        let options = Options::resolve(config, &args()).unwrap();
        assert_eq!(options.menu, vec!["rofi", "-dmenu"]);

        let options = Options::resolve(Config::default(), &args()).unwrap();
        assert!(options.menu.is_empty());
    }

    #[test]
    fn bad_exclude_pattern_is_rejected() {
        let config: Config = toml::from_str("[sources]\nexclude = [\"(\"]\n").unwrap();
        assert!(matches!(
            Options::resolve(config, &args()),
            Err(ConfigError::Exclude { .. })
        ));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = scratch_dir("config-missing");
        assert!(matches!(
            load_config(Some(&dir.join("config.toml"))),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn explicit_file_is_read() {
        let dir = scratch_dir("config-read");
        let file = dir.join("config.toml");
        fs::write(&file, "[general]\nhistory = false\nopener = [\"open\"]\n").unwrap();
        let config = load_config(Some(&file)).unwrap();
        assert!(!config.general.history);
        assert_eq!(config.general.opener, vec!["open"]);
        assert!(config.sources.path);
    }
}
