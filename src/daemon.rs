//! Background mode: keep a menu pre-spawned and show it on `SIGUSR1`.
//!
//! The controller owns the session and the waiting menu while idle. A trigger
//! moves both into a worker thread, which shows the menu, handles the choice,
//! persists history and launches the next menu before handing everything back
//! over a channel. While the worker holds them the controller is busy and
//! further triggers are dropped.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use calloop::channel::{self, Sender};
use calloop::signals::{Signal, Signals};
use calloop::EventLoop;
use directories::ProjectDirs;
use log::{debug, error, info, warn};
use nix::sys::signal;
use nix::unistd::Pid;

use crate::menu::{MenuError, PendingSelector};
use crate::state::{Outcome, Session};

/// A session together with the menu it has already fed.
pub struct Cycle {
    session: Session,
    pending: PendingSelector,
}

enum DaemonState {
    Idle(Box<Cycle>),
    Busy,
}

/// Sent back by a worker when its cycle is over.
pub struct CycleReport {
    session: Session,
    outcome: Outcome,
    next: Result<Option<PendingSelector>>,
}

/// How long an exiting daemon waits for an in-flight cycle to come back.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Started,
    Discarded,
}

pub struct Daemon {
    state: DaemonState,
    reports: Sender<CycleReport>,
    cycles: usize,
    showing: Option<Pid>, // menu held by the running cycle
    pub should_exit: bool,
    pub fatal: Option<anyhow::Error>,
}

impl Daemon {
    /// Launches the first menu eagerly so the first trigger only has to show it.
    pub fn new(session: Session, reports: Sender<CycleReport>) -> Result<Self, MenuError> {
        let pending = session.launch()?;
        Ok(Self {
            state: DaemonState::Idle(Box::new(Cycle { session, pending })),
            reports,
            cycles: 0,
            showing: None,
            should_exit: false,
            fatal: None,
        })
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, DaemonState::Idle(_))
    }

    /// Cycles started so far.
    pub fn cycles(&self) -> usize {
        self.cycles
    }

    pub fn trigger(&mut self) -> Trigger {
        if self.should_exit {
            info!("Daemon is exiting, discarding trigger");
            return Trigger::Discarded;
        }
        let cycle = match std::mem::replace(&mut self.state, DaemonState::Busy) {
            DaemonState::Idle(cycle) => cycle,
            DaemonState::Busy => {
                info!("Menu already open, discarding trigger");
                return Trigger::Discarded;
            }
        };

        self.cycles += 1;
        self.showing = cycle
            .pending
            .id()
            .and_then(|id| i32::try_from(id).ok())
            .map(Pid::from_raw);
        let reports = self.reports.clone();
        let spawned = thread::Builder::new()
            .name(format!("menu-cycle-{}", self.cycles))
            .spawn(move || {
                let report = run_cycle(*cycle);
                if reports.send(report).is_err() {
                    warn!("Daemon loop is gone, dropping cycle report");
                }
            });

        if let Err(e) = spawned {
            self.fail(anyhow!(e).context("failed to start menu cycle"));
        }
        Trigger::Started
    }

    pub fn finish(&mut self, report: CycleReport) {
        debug!("Cycle {} finished: {:?}", self.cycles, report.outcome);
        self.showing = None;
        match report.next {
            Ok(Some(pending)) => {
                self.state = DaemonState::Idle(Box::new(Cycle {
                    session: report.session,
                    pending,
                }));
            }
            Ok(None) => {
                info!("Stopping daemon");
                self.should_exit = true;
            }
            Err(e) => self.fail(e),
        }
    }

    /// Called once the loop has stopped. A cycle still in flight owns a menu
    /// that would outlive us, so kill it and give the worker a moment to hand
    /// everything back; anything returned is dropped, and with it any re-armed
    /// menu.
    pub fn wind_down(&mut self, event_loop: &mut EventLoop<'_, Daemon>) {
        let Some(pid) = self.showing else {
            return;
        };
        debug!("Killing menu {} of the running cycle", pid);
        if let Err(e) = signal::kill(pid, signal::Signal::SIGTERM) {
            debug!("Menu {} already gone: {}", pid, e);
        }

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        while self.showing.is_some() && Instant::now() < deadline {
            if let Err(e) = event_loop.dispatch(Some(Duration::from_millis(50)), self) {
                warn!("Event loop failed while winding down: {}", e);
                break;
            }
        }
        if self.showing.is_some() {
            warn!("Menu cycle did not finish within {:?}", SHUTDOWN_GRACE);
        }
        self.state = DaemonState::Busy;
    }

    fn fail(&mut self, e: anyhow::Error) {
        error!("{:#}", e);
        self.fatal = Some(e);
        self.should_exit = true;
    }
}

/// Show, handle, persist, re-rank, re-launch. `next` is `None` when the
/// daemon was asked to stop.
fn run_cycle(cycle: Cycle) -> CycleReport {
    let Cycle {
        mut session,
        pending,
    } = cycle;

    let outcome = match session.show(pending) {
        Ok(outcome) => outcome,
        Err(e) => {
            return CycleReport {
                session,
                outcome: Outcome::Nothing,
                next: Err(e.into()),
            };
        }
    };
    if outcome == Outcome::Stop {
        return CycleReport {
            session,
            outcome,
            next: Ok(None),
        };
    }

    if session.options().use_history {
        if let Err(e) = session.save_history() {
            return CycleReport {
                session,
                outcome,
                next: Err(e.into()),
            };
        }
        session.rank();
    }

    let next = session
        .launch()
        .map(Some)
        .context("failed to re-launch menu");
    CycleReport {
        session,
        outcome,
        next,
    }
}

/// Runs the daemon until it is stopped by an action or a terminating signal.
pub fn run(session: Session) -> Result<()> {
    let mut event_loop: EventLoop<Daemon> = EventLoop::try_new()?;

    // Blocks the signals on this thread; must happen before any worker exists.
    let signals = Signals::new(&[Signal::SIGUSR1, Signal::SIGTERM, Signal::SIGINT])?;
    let (tx_reports, rx_reports) = channel::channel::<CycleReport>();

    let handle = event_loop.handle();
    handle
        .insert_source(signals, |event, _, daemon: &mut Daemon| match event.signal() {
            Signal::SIGUSR1 => {
                daemon.trigger();
            }
            other => {
                info!("Received {:?}, exiting", other);
                daemon.should_exit = true;
            }
        })
        .map_err(|e| anyhow!("failed to watch signals: {}", e.error))?;
    handle
        .insert_source(rx_reports, |event, _, daemon: &mut Daemon| {
            if let channel::Event::Msg(report) = event {
                daemon.finish(report);
            }
        })
        .map_err(|e| anyhow!("failed to watch menu cycles: {}", e.error))?;

    let _pid_file = PidFile::create(&pid_path()?)?;
    let entries = session.entries().len();
    let mut daemon = Daemon::new(session, tx_reports)?;
    info!("Daemon ready with {} entries, pid {}", entries, std::process::id());

    loop {
        if daemon.should_exit {
            break;
        }
        event_loop.dispatch(None, &mut daemon)?;
    }
    daemon.wind_down(&mut event_loop);

    match daemon.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

pub fn pid_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("org", "wrun", "wrun")
        .context("no home directory to keep the daemon pid file in")?;
    let dir = dirs.runtime_dir().unwrap_or_else(|| dirs.data_local_dir());
    Ok(dir.join("wrun.pid"))
}

/// Removes the pid file when dropped.
struct PidFile {
    path: PathBuf,
}

impl PidFile {
    fn create(path: &Path) -> Result<Self> {
        if let Some(pid) = read_pid(path)? {
            if signal::kill(pid, None).is_ok() {
                bail!("daemon already running with pid {}", pid);
            }
            debug!("Replacing stale pid file {:?}", path);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {:?}", parent))?;
        }
        fs::write(path, std::process::id().to_string())
            .with_context(|| format!("failed to write {:?}", path))?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn read_pid(path: &Path) -> Result<Option<Pid>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("failed to read {:?}", path)),
    };
    let pid: i32 = content
        .trim()
        .parse()
        .with_context(|| format!("malformed pid file {:?}", path))?;
    Ok(Some(Pid::from_raw(pid)))
}

/// Delivers `sig` to the running daemon.
pub fn signal_daemon(sig: signal::Signal) -> Result<()> {
    let path = pid_path()?;
    let pid = read_pid(&path)?.context("no daemon is running")?;
    signal::kill(pid, sig).with_context(|| format!("failed to signal daemon pid {}", pid))?;
    debug!("Sent {:?} to pid {}", sig, pid);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::tests::RecordingOpener;
    use crate::index::tests::test_options;
    use crate::sources::history::History;
    use crate::sources::history::tests::scratch_dir;
    use std::sync::Arc;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    fn daemon_with_menu(tag: &str, script: impl Fn(&Path) -> String) -> (EventLoop<'static, Daemon>, Daemon, PathBuf) {
        let dir = scratch_dir(tag);
        let apps = dir.join("apps");
        fs::create_dir_all(&apps).unwrap();
        fs::write(apps.join("a.exe"), b"").unwrap();

        let mut options = test_options(vec![apps]);
        options.daemon = true;
        options.actions = true;
        options.menu = sh(&script(&dir));
        let session = Session::new(Arc::new(options), Box::new(RecordingOpener::default())).unwrap();

        let event_loop: EventLoop<Daemon> = EventLoop::try_new().unwrap();
        let (tx, rx) = channel::channel();
        event_loop
            .handle()
            .insert_source(rx, |event, _, daemon: &mut Daemon| {
                if let channel::Event::Msg(report) = event {
                    daemon.finish(report);
                }
            })
            .unwrap();
        let daemon = Daemon::new(session, tx).unwrap();
        (event_loop, daemon, dir)
    }

    fn dispatch_until(event_loop: &mut EventLoop<Daemon>, daemon: &mut Daemon, done: impl Fn(&Daemon) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !done(daemon) {
            assert!(Instant::now() < deadline, "daemon did not settle");
            event_loop
                .dispatch(Some(Duration::from_millis(20)), daemon)
                .unwrap();
        }
    }

    fn line_count(path: &Path) -> usize {
        fs::read_to_string(path).map(|s| s.lines().count()).unwrap_or(0)
    }

    #[test]
    fn trigger_while_busy_is_discarded() {
        let (mut event_loop, mut daemon, dir) = daemon_with_menu("daemon-gate", |dir| {
            format!(
                "echo spawned >> '{}'; cat > /dev/null; sleep 0.3; echo 99",
                dir.join("spawns").display()
            )
        });
        let spawns = dir.join("spawns");

        assert_eq!(daemon.trigger(), Trigger::Started);
        assert!(!daemon.is_idle());
        assert_eq!(daemon.trigger(), Trigger::Discarded);

        dispatch_until(&mut event_loop, &mut daemon, Daemon::is_idle);
        assert_eq!(daemon.cycles(), 1);
        assert!(daemon.fatal.is_none());

        // The initial menu plus the one re-armed after the cycle, nothing more.
        let deadline = Instant::now() + Duration::from_secs(5);
        while line_count(&spawns) < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        thread::sleep(Duration::from_millis(200));
        assert_eq!(line_count(&spawns), 2);
    }

    #[test]
    fn rearms_and_records_history_after_each_cycle() {
        let (mut event_loop, mut daemon, _) =
            daemon_with_menu("daemon-rearm", |_| "cat > /dev/null; echo 0".to_string());

        for round in 1..=2 {
            assert_eq!(daemon.trigger(), Trigger::Started);
            dispatch_until(&mut event_loop, &mut daemon, Daemon::is_idle);
            assert_eq!(daemon.cycles(), round);
        }

        let DaemonState::Idle(cycle) = &daemon.state else {
            panic!("daemon should be idle");
        };
        let options = cycle.session.options();
        let saved = History::load(&options.history_path).unwrap();
        assert_eq!(saved.score(&options.custom_dirs[0].join("a.exe")), 2);
    }

    #[test]
    fn stop_action_ends_the_loop() {
        // a.exe, then the four actions sorted by title; "> Stop daemon" is last.
        let (mut event_loop, mut daemon, _) =
            daemon_with_menu("daemon-stop", |_| "cat > /dev/null; echo 4".to_string());

        assert_eq!(daemon.trigger(), Trigger::Started);
        dispatch_until(&mut event_loop, &mut daemon, |d| d.should_exit);
        assert!(daemon.fatal.is_none());
        assert!(!daemon.is_idle());
    }

    #[test]
    fn no_choice_rearms_without_history() {
        let (mut event_loop, mut daemon, _) =
            daemon_with_menu("daemon-nochoice", |_| "cat > /dev/null".to_string());

        daemon.trigger();
        dispatch_until(&mut event_loop, &mut daemon, Daemon::is_idle);
        let DaemonState::Idle(cycle) = &daemon.state else {
            panic!("daemon should be idle");
        };
        assert!(cycle.session.history().is_empty());
    }

    #[test]
    fn exit_while_busy_kills_the_open_menu() {
        let (mut event_loop, mut daemon, _) =
            daemon_with_menu("daemon-winddown", |_| "cat > /dev/null; exec sleep 30".to_string());

        assert_eq!(daemon.trigger(), Trigger::Started);
        let pid = daemon.showing.expect("running cycle owns a menu");
        daemon.should_exit = true;
        assert_eq!(daemon.trigger(), Trigger::Discarded);

        let started = Instant::now();
        daemon.wind_down(&mut event_loop);
        assert!(started.elapsed() < SHUTDOWN_GRACE + Duration::from_secs(1));
        assert!(daemon.showing.is_none());
        assert!(daemon.fatal.is_none());
        assert!(!daemon.is_idle());
        // Once reaped the pid no longer names a process.
        let deadline = Instant::now() + Duration::from_secs(2);
        while signal::kill(pid, None).is_ok() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(signal::kill(pid, None).is_err());
    }

    #[test]
    fn stale_pid_file_is_replaced() {
        let dir = scratch_dir("daemon-pid");
        let path = dir.join("wrun.pid");
        // Pid numbers this large are never handed out.
        fs::write(&path, "2147483646").unwrap();
        {
            let _pid = PidFile::create(&path).unwrap();
            let pid = read_pid(&path).unwrap().unwrap();
            assert_eq!(pid.as_raw() as u32, std::process::id());
        }
        assert!(!path.exists());
    }

    #[test]
    fn live_pid_file_blocks_a_second_daemon() {
        let dir = scratch_dir("daemon-live");
        let path = dir.join("wrun.pid");
        fs::write(&path, std::process::id().to_string()).unwrap();
        assert!(PidFile::create(&path).is_err());
    }
}
