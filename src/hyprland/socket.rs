//! Direct Hyprland IPC helpers.
//!
//! Talks to Hyprland through its command socket at
//! `$XDG_RUNTIME_DIR/hypr/$HYPRLAND_INSTANCE_SIGNATURE/.socket.sock`.  Each
//! request opens a short-lived connection; no child processes are spawned.

use crate::command::WindowHandle;
use serde::de::DeserializeOwned;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

/// Errors that can occur when talking to Hyprland.
#[derive(Debug, thiserror::Error)]
#[error("hyprland IPC error: {0}")]
pub struct HyprlandError(pub(crate) String);

/// Resolve the Hyprland command socket path.
///
/// Hyprland ≥ 0.40 stores its sockets at
/// `$XDG_RUNTIME_DIR/hypr/$HYPRLAND_INSTANCE_SIGNATURE/.socket.sock`.
fn socket_path() -> Result<PathBuf, HyprlandError> {
    let runtime_dir =
        std::env::var("XDG_RUNTIME_DIR").map_err(|_| HyprlandError("XDG_RUNTIME_DIR not set".into()))?;
    let his = std::env::var("HYPRLAND_INSTANCE_SIGNATURE")
        .map_err(|_| HyprlandError("HYPRLAND_INSTANCE_SIGNATURE not set".into()))?;
    Ok(PathBuf::from(format!("{}/hypr/{}/.socket.sock", runtime_dir, his)))
}

/// Send a raw request to the command socket and return the response.
pub(crate) fn ipc_request(request: &str) -> Result<String, HyprlandError> {
    let path = socket_path()?;
    let mut stream = UnixStream::connect(&path)
        .map_err(|e| HyprlandError(format!("connect to {}: {}", path.display(), e)))?;

    stream
        .write_all(request.as_bytes())
        .map_err(|e| HyprlandError(format!("write: {}", e)))?;

    let mut response = Vec::new();
    stream
        .read_to_end(&mut response)
        .map_err(|e| HyprlandError(format!("read: {}", e)))?;

    String::from_utf8(response).map_err(|e| HyprlandError(format!("utf-8: {}", e)))
}

/// Run a JSON data query (`j/<query>`) and decode the answer.
pub(crate) fn ipc_json<T: DeserializeOwned>(query: &str) -> Result<T, HyprlandError> {
    let json = ipc_request(&format!("j/{}", query))?;
    serde_json::from_str(&json).map_err(|e| HyprlandError(format!("parse {}: {}", query, e)))
}

/// Send a dispatch and check for `"ok"`.
pub(crate) fn ipc_dispatch(args: &str) -> Result<(), HyprlandError> {
    expect_ok("dispatch", ipc_request(&format!("/dispatch {}", args))?)
}

/// Set a keyword (`bind`, `unbind`, …) at runtime and check for `"ok"`.
pub(crate) fn ipc_keyword(args: &str) -> Result<(), HyprlandError> {
    expect_ok("keyword", ipc_request(&format!("/keyword {}", args))?)
}

fn expect_ok(what: &str, response: String) -> Result<(), HyprlandError> {
    if response.trim() == "ok" {
        Ok(())
    } else {
        Err(HyprlandError(format!("{} error: {}", what, response.trim())))
    }
}

/// Parse a client address such as `0x55d4c0a1b2c0`.
pub(crate) fn parse_address(address: &str) -> Option<WindowHandle> {
    let hex = address.strip_prefix("0x").unwrap_or(address);
    u64::from_str_radix(hex, 16).ok().map(WindowHandle)
}

/// Format a handle the way dispatchers expect it (`address:0x…`).
pub(crate) fn address_selector(handle: WindowHandle) -> String {
    format!("address:0x{:x}", handle.0)
}
