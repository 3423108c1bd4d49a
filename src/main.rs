mod cli;
mod config;
mod daemon;
mod executor;
mod index;
mod menu;
mod model;
mod sources;
mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use log::info;
use nix::sys::signal::Signal;

use crate::cli::Args;
use crate::config::{Options, load_config};
use crate::executor::SystemOpener;
use crate::state::Session;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    if args.trigger {
        return daemon::signal_daemon(Signal::SIGUSR1);
    }
    if args.stop {
        return daemon::signal_daemon(Signal::SIGTERM);
    }

    // 1. Load Config
    let config = load_config(args.config.as_deref())?;
    let options = Options::resolve(config, &args)?;
    if options.menu.is_empty() {
        Args::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "a menu command is required: pass --menu <CMD> or set general.menu",
            )
            .exit();
    }

    // 2. Load history and index
    let opener = Box::new(SystemOpener::new(options.opener.clone()));
    let options = Arc::new(options);
    let mut session = Session::new(options.clone(), opener).context("failed to load history")?;

    // 3. Run
    if options.daemon {
        return daemon::run(session);
    }

    let outcome = session.run_once()?;
    info!("Finished: {:?}", outcome);
    session.save_history().context("failed to save history")?;
    Ok(())
}
