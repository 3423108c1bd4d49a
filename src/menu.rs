//! Pipe protocol with the external menu process.
//!
//! The menu reads newline-terminated titles on stdin until it sees end of
//! input, then writes the chosen 0-based index (decimal or `0x` hex) on stdout.
//! Writing the list and reading the answer are split into [`launch`] and
//! [`PendingSelector::show`] so a menu can be spawned and fed ahead of time.

use std::io::{self, ErrorKind, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread;

use log::{debug, warn};
use thiserror::Error;

/// Upper bound on the answer read back from the menu.
pub const SELECTION_BUF: usize = 32;

#[derive(Debug, Error)]
pub enum MenuError {
    #[error("menu command is empty")]
    EmptyCommand,
    #[error("failed to start menu {program:?}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("menu pipe: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Chosen(usize),
    NoChoice,
    OutOfRange(u64),
}

/// A running menu that already has its list. Must be consumed by exactly one
/// [`show`](Self::show); if it is dropped instead, the child is killed and
/// reaped.
#[derive(Debug)]
pub struct PendingSelector {
    child: Option<Child>, // taken by `show`
    input: Option<ChildStdin>,
    output: Option<ChildStdout>,
    entries: usize,
}

/// Spawns `command` and streams every title to it, leaving its input open.
pub fn launch<I, S>(command: &[String], titles: I) -> Result<PendingSelector, MenuError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let (program, args) = command.split_first().ok_or(MenuError::EmptyCommand)?;
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|source| MenuError::Spawn {
            program: program.clone(),
            source,
        })?;

    let input = child.stdin.take();
    let output = child.stdout.take();
    let mut pending = PendingSelector {
        child: Some(child),
        input,
        output,
        entries: 0,
    };

    let mut written = 0;
    if let Some(input) = pending.input.as_mut() {
        let mut buf = Vec::new();
        for title in titles {
            buf.clear();
            buf.extend_from_slice(title.as_ref().as_bytes());
            buf.push(b'\n');
            if let Err(e) = input.write_all(&buf) {
                if e.kind() == ErrorKind::BrokenPipe {
                    warn!("Menu closed its input after {} entries", written);
                } else {
                    warn!("Failed writing to menu after {} entries: {}", written, e);
                }
                break;
            }
            written += 1;
        }
        let _ = input.flush();
    }
    pending.entries = written;
    debug!("Menu {:?} launched with {} entries", program, written);
    Ok(pending)
}

impl PendingSelector {
    /// Number of titles the menu received.
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Process id of the menu, until it has been shown.
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Closes the menu's input and reads its answer. The answer is returned as
    /// soon as the menu closes its output; a menu still running by then is
    /// reaped in the background.
    pub fn show(mut self) -> Result<Selection, MenuError> {
        drop(self.input.take());

        let mut buf = [0u8; SELECTION_BUF];
        let read = match self.output.take() {
            Some(mut output) => read_up_to(&mut output, &mut buf)?,
            None => 0,
        };

        if let Some(child) = self.child.take() {
            reap(child);
        }
        Ok(parse_selection(&buf[..read], self.entries))
    }
}

impl Drop for PendingSelector {
    fn drop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        self.input.take();
        self.output.take();
        let _ = child.kill();
        let _ = child.wait();
    }
}

fn reap(mut child: Child) {
    match child.try_wait() {
        Ok(Some(status)) => log_exit(status),
        Ok(None) => {
            debug!("Menu {} still running, reaping in the background", child.id());
            let spawned = thread::Builder::new()
                .name("menu-reaper".to_string())
                .spawn(move || match child.wait() {
                    Ok(status) => log_exit(status),
                    Err(e) => warn!("Failed to reap menu: {}", e),
                });
            if let Err(e) = spawned {
                warn!("Failed to start menu reaper: {}", e);
            }
        }
        Err(e) => warn!("Failed to check menu status: {}", e),
    }
}

fn log_exit(status: std::process::ExitStatus) {
    if !status.success() {
        warn!("Menu exited with {}", status);
    }
}

fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Interprets the menu's answer against a list of `entries` titles.
pub fn parse_selection(raw: &[u8], entries: usize) -> Selection {
    let Ok(text) = std::str::from_utf8(raw) else {
        return Selection::NoChoice;
    };
    match parse_index(text) {
        Some(index) if index < entries as u64 => Selection::Chosen(index as usize),
        Some(index) => Selection::OutOfRange(index),
        None => Selection::NoChoice,
    }
}

/// Decimal or `0x`-prefixed hex. Negative or malformed input yields `None`.
pub fn parse_index(text: &str) -> Option<u64> {
    let text = text.trim();
    let text = text.strip_prefix('+').unwrap_or(text);
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        return u64::from_str_radix(hex, 16).ok();
    }
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
