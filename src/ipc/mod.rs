//! Control socket.
//!
//! The daemon listens on a Unix socket for newline-delimited JSON
//! [`Command`]s.  Hyprland binds, scripts and the `glasspane ctl` client all
//! talk to it through [`send_command`].

pub mod listener;

pub use listener::{UnixSocketError, UnixSocketListener};

use crate::command::Command;
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::Path;

/// Whether a daemon is accepting connections at `path`.
pub fn daemon_running(path: &Path) -> bool {
    UnixStream::connect(path).is_ok()
}

/// Send one command to the daemon listening at `path`.
pub fn send_command(path: &Path, cmd: &Command) -> Result<(), UnixSocketError> {
    let mut line = serde_json::to_string(cmd)?;
    line.push('\n');
    let mut stream = UnixStream::connect(path)?;
    stream.write_all(line.as_bytes())?;
    stream.flush()?;
    Ok(())
}
