//! The daemon's control socket.
//!
//! [`UnixSocketListener`] owns `$XDG_RUNTIME_DIR/glasspane.sock` (or the
//! configured path) and turns every line a client writes into a
//! [`Command`] for the engine's message loop.  Hyprland binds reach it
//! through `glasspane fire <id>`; scripts use `glasspane ctl`.
//!
//! One line, one command:
//!
//! ```json
//! {"Fire":7}
//! {"Switch":"3"}
//! {"AddRule":{"process_name":"foot","slot":2}}
//! "Shutdown"
//! ```
//!
//! Blank lines are skipped and a line that is not a command is logged and
//! dropped; the connection stays open.

use crate::command::Command;
use crate::traits::CommandSource;
use log::{debug, info, warn};
use std::io::{BufRead, BufReader};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

/// Control-socket [`CommandSource`].
///
/// Clients are served one after another; each may send any number of
/// commands before closing.
pub struct UnixSocketListener {
    path: PathBuf,
}

/// Errors produced by the control socket and its client.
#[derive(Debug, thiserror::Error)]
pub enum UnixSocketError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("another daemon is already listening on {}", .0.display())]
    InUse(PathBuf),
}

/// Whether the message loop still takes commands.
enum Sink {
    Open,
    Closed,
}

impl UnixSocketListener {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bind the socket, replacing a file left behind by a dead daemon.
    fn bind(&self) -> Result<UnixListener, UnixSocketError> {
        if super::daemon_running(&self.path) {
            return Err(UnixSocketError::InUse(self.path.clone()));
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("removed stale socket {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(UnixListener::bind(&self.path)?)
    }
}

/// Decode one line.  `None` for blank lines.
fn parse_line(line: &str) -> Option<Result<Command, serde_json::Error>> {
    let line = line.trim();
    (!line.is_empty()).then(|| serde_json::from_str(line))
}

/// Forward every command one client sends.
fn serve_client(stream: UnixStream, sink: &mpsc::Sender<Command>) -> Sink {
    for line in BufReader::new(stream).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("control client read failed: {}", e);
                break;
            }
        };
        match parse_line(&line) {
            None => {}
            Some(Ok(cmd)) => {
                debug!("control socket: {:?}", cmd);
                if sink.send(cmd).is_err() {
                    return Sink::Closed;
                }
            }
            Some(Err(e)) => warn!("ignoring {:?}: {}", line, e),
        }
    }
    Sink::Open
}

impl CommandSource for UnixSocketListener {
    type Error = UnixSocketError;

    /// Serve clients until the message loop goes away.  Blocks; run it on
    /// its own thread.
    fn run(&mut self, sink: mpsc::Sender<Command>) -> Result<(), Self::Error> {
        let listener = self.bind()?;
        info!("control socket at {}", self.path.display());

        for stream in listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("control socket accept failed: {}", e);
                    continue;
                }
            };
            if let Sink::Closed = serve_client(stream, &sink) {
                info!("message loop gone, closing control socket");
                break;
            }
        }
        Ok(())
    }
}

//  Tests 
