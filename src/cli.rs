use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Index launchable files and pick one through an external menu", long_about = None)]
pub struct Args {
    /// Menu command to invoke; reads titles on stdin, prints the chosen index
    #[arg(short, long, value_name = "CMD")]
    pub menu: Option<String>,

    /// Don't load or save history
    #[arg(long)]
    pub no_history: bool,

    /// Don't index the start menu (application directories)
    #[arg(long)]
    pub no_start: bool,

    /// Don't index PATH
    #[arg(long)]
    pub no_path: bool,

    /// Don't add action entries to the menu
    #[arg(long)]
    pub no_actions: bool,

    /// Index a custom directory (repeatable)
    #[arg(long = "index", value_name = "DIR")]
    pub index: Vec<PathBuf>,

    /// Stay in the background and show the menu on every trigger
    #[arg(short, long)]
    pub daemon: bool,

    /// Ask a running daemon to show its menu
    #[arg(long, conflicts_with_all = ["daemon", "stop"])]
    pub trigger: bool,

    /// Ask a running daemon to exit
    #[arg(long, conflicts_with = "daemon")]
    pub stop: bool,

    /// Config file to read instead of the default location
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// History file to use instead of the default location
    #[arg(long, value_name = "FILE")]
    pub history_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_repeated_index_dirs() {
        let args = Args::try_parse_from([
            "wrun", "--menu", "rofi -dmenu -format i", "--index", "/a", "--index", "/b", "--no-path",
        ])
        .unwrap();
        assert_eq!(args.menu.as_deref(), Some("rofi -dmenu -format i"));
        assert_eq!(args.index, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert!(args.no_path);
        assert!(!args.no_start);
    }

    #[test]
    fn trigger_conflicts_with_daemon() {
        assert!(Args::try_parse_from(["wrun", "--daemon", "--trigger"]).is_err());
    }
}
