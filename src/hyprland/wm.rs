//! [`WindowSystem`] and [`DesktopDriver`] implementations backed by
//! Hyprland IPC.
//!
//! Desktops map onto numbered workspaces: slot `n` lives on workspace `n`.
//! Hyprland creates workspaces on demand, so "creating" one only raises the
//! count this driver reports.

use super::socket::{address_selector, ipc_dispatch, ipc_json, parse_address, HyprlandError};
use crate::command::{ForegroundWindow, ProcessWindow, WindowHandle};
use crate::traits::{DesktopDriver, ProcessInspector, WindowSystem};
use log::debug;
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How long a workspace count stays valid before it is queried again.
pub const WORKSPACE_COUNT_TTL: Duration = Duration::from_secs(5);

/// Hyprland-backed window system and desktop driver.
///
/// No connection is opened eagerly; each call opens a short-lived IPC
/// request.
pub struct HyprlandWm<P> {
    processes: Arc<P>,
    count_cache: Mutex<Option<(Instant, usize)>>,
}

impl<P: ProcessInspector> HyprlandWm<P> {
    /// `processes` resolves client pids when matching windows by process
    /// name.
    pub fn new(processes: Arc<P>) -> Self {
        Self {
            processes,
            count_cache: Mutex::new(None),
        }
    }

    fn clients(&self) -> Result<Vec<ClientJson>, HyprlandError> {
        ipc_json("clients")
    }

    fn client(&self, handle: WindowHandle) -> Result<Option<ClientJson>, HyprlandError> {
        Ok(self
            .clients()?
            .into_iter()
            .find(|c| parse_address(&c.address) == Some(handle)))
    }

    fn require_client(&self, handle: WindowHandle) -> Result<ClientJson, HyprlandError> {
        self.client(handle)?
            .ok_or_else(|| HyprlandError(format!("no window {}", handle)))
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, Option<(Instant, usize)>> {
        self.count_cache.lock().unwrap_or_else(|p| p.into_inner())
    }
}

//  Minimal serde structs for the JSON we care about

/// Subset of a `j/clients` entry.  `j/activewindow` returns the same shape,
/// or `{}` when nothing is focused.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ClientJson {
    address: String,
    title: String,
    class: String,
    pid: i64,
    mapped: bool,
    hidden: bool,
    workspace: WorkspaceRef,
    #[serde(deserialize_with = "deserialize_fullscreen")]
    fullscreen: u8,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WorkspaceRef {
    id: i64,
}

/// Subset of a `j/workspaces` entry.
#[derive(Debug, Deserialize)]
struct WorkspaceJson {
    id: i64,
}

impl ClientJson {
    fn handle(&self) -> Option<WindowHandle> {
        parse_address(&self.address)
    }

    /// Hidden clients and clients parked on a special workspace count as
    /// minimized.
    fn is_minimized(&self) -> bool {
        self.hidden || self.workspace.id < 0
    }

    fn is_visible(&self) -> bool {
        self.mapped && !self.is_minimized()
    }
}

/// Older Hyprland reports `fullscreen` as a bool, newer releases as a mode
/// number (`1` maximized, `2` fullscreen).
fn deserialize_fullscreen<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    struct FullscreenVisitor;

    impl<'de> Visitor<'de> for FullscreenVisitor {
        type Value = u8;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a bool or a fullscreen mode number")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<u8, E> {
            Ok(u8::from(v))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u8, E> {
            u8::try_from(v).map_err(|_| E::custom(format!("fullscreen mode out of range: {}", v)))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u8, E> {
            u8::try_from(v).map_err(|_| E::custom(format!("fullscreen mode out of range: {}", v)))
        }
    }

    deserializer.deserialize_any(FullscreenVisitor)
}

fn to_foreground(client: ClientJson) -> Option<ForegroundWindow> {
    let handle = client.handle()?;
    Some(ForegroundWindow {
        handle,
        title: client.title,
        pid: u32::try_from(client.pid).unwrap_or(0),
    })
}

/// Fails unless `active` is the window `handle`.
fn require_active(active: &ClientJson, handle: WindowHandle) -> Result<(), HyprlandError> {
    match active.handle() {
        Some(focused) if focused == handle => Ok(()),
        Some(focused) => Err(HyprlandError(format!(
            "window {} is not focused ({} is)",
            handle, focused
        ))),
        None => Err(HyprlandError(format!("window {} is not focused", handle))),
    }
}

/// Visible clients whose class or process name matches `process_name`.
fn matching_windows(
    clients: Vec<ClientJson>,
    process_name: &str,
    name_of: impl Fn(u32) -> String,
) -> Vec<ProcessWindow> {
    clients
        .into_iter()
        .filter(|c| c.is_visible())
        .filter(|c| {
            c.class.eq_ignore_ascii_case(process_name)
                || u32::try_from(c.pid)
                    .map(|pid| name_of(pid).eq_ignore_ascii_case(process_name))
                    .unwrap_or(false)
        })
        .filter_map(|c| {
            Some(ProcessWindow {
                handle: c.handle()?,
                title: c.title,
            })
        })
        .collect()
}

/// Highest numbered regular workspace.  Special workspaces have negative
/// ids and are ignored.
fn highest_workspace(workspaces: &[WorkspaceJson]) -> usize {
    workspaces
        .iter()
        .filter_map(|w| usize::try_from(w.id).ok())
        .max()
        .unwrap_or(0)
}

//  WindowSystem implementation

impl<P: ProcessInspector> WindowSystem for HyprlandWm<P> {
    type Error = HyprlandError;

    fn foreground_window(&self) -> Result<Option<ForegroundWindow>, Self::Error> {
        let active: ClientJson = ipc_json("activewindow")?;
        Ok(to_foreground(active))
    }

    fn is_visible(&self, handle: WindowHandle) -> Result<bool, Self::Error> {
        Ok(self.client(handle)?.map(|c| c.mapped).unwrap_or(false))
    }

    fn is_minimized(&self, handle: WindowHandle) -> Result<bool, Self::Error> {
        Ok(self.require_client(handle)?.is_minimized())
    }

    fn is_maximized(&self, handle: WindowHandle) -> Result<bool, Self::Error> {
        Ok(self.require_client(handle)?.fullscreen != 0)
    }

    fn focus(&self, handle: WindowHandle) -> Result<bool, Self::Error> {
        match ipc_dispatch(&format!("focuswindow {}", address_selector(handle))) {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!("focuswindow refused: {}", e);
                Ok(false)
            }
        }
    }

    fn restore(&self, handle: WindowHandle) -> Result<(), Self::Error> {
        let active: WorkspaceJson = ipc_json("activeworkspace")?;
        ipc_dispatch(&format!(
            "movetoworkspacesilent {},{}",
            active.id,
            address_selector(handle)
        ))
    }

    fn maximize(&self, handle: WindowHandle) -> Result<(), Self::Error> {
        // `fullscreen 1` toggles whatever has focus.
        let active: ClientJson = ipc_json("activewindow")?;
        require_active(&active, handle)?;
        ipc_dispatch("fullscreen 1")
    }

    fn windows_of_process(&self, process_name: &str) -> Result<Vec<ProcessWindow>, Self::Error> {
        Ok(matching_windows(self.clients()?, process_name, |pid| {
            self.processes.name_of(pid)
        }))
    }
}

//  DesktopDriver implementation

impl<P: ProcessInspector> DesktopDriver for HyprlandWm<P> {
    type Error = HyprlandError;

    fn count(&self) -> Result<usize, Self::Error> {
        if let Some((at, count)) = *self.cache() {
            if at.elapsed() < WORKSPACE_COUNT_TTL {
                return Ok(count);
            }
        }
        let workspaces: Vec<WorkspaceJson> = ipc_json("workspaces")?;
        let count = highest_workspace(&workspaces);
        *self.cache() = Some((Instant::now(), count));
        Ok(count)
    }

    fn create_one(&self) -> Result<(), Self::Error> {
        let count = self.count()?;
        *self.cache() = Some((Instant::now(), count + 1));
        debug!("workspace {} will be created on first use", count + 1);
        Ok(())
    }

    fn switch_to(&self, index: usize) -> Result<(), Self::Error> {
        ipc_dispatch(&format!("workspace {}", index + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENTS: &str = r#"[
        {"address":"0x1a","mapped":true,"hidden":false,"workspace":{"id":1,"name":"1"},
         "class":"foot","title":"shell","pid":100,"fullscreen":0},
        {"address":"0x2b","mapped":true,"hidden":true,"workspace":{"id":2,"name":"2"},
         "class":"foot","title":"hidden shell","pid":101,"fullscreen":false},
        {"address":"0x3c","mapped":true,"hidden":false,"workspace":{"id":3,"name":"3"},
         "class":"org.mozilla.firefox","title":"Mozilla Firefox","pid":200,"fullscreen":1},
        {"address":"0x4d","mapped":true,"hidden":false,"workspace":{"id":-98,"name":"special:magic"},
         "class":"foot","title":"scratch","pid":102,"fullscreen":true}
    ]"#;

    fn clients() -> Vec<ClientJson> {
        serde_json::from_str(CLIENTS).unwrap()
    }

    #[test]
    fn fullscreen_accepts_bool_and_number() {
        let c = clients();
        assert_eq!(c[0].fullscreen, 0);
        assert_eq!(c[1].fullscreen, 0);
        assert_eq!(c[2].fullscreen, 1);
        assert_eq!(c[3].fullscreen, 1);
    }

    #[test]
    fn hidden_and_special_clients_are_minimized() {
        let c = clients();
        assert!(!c[0].is_minimized());
        assert!(c[1].is_minimized());
        assert!(c[3].is_minimized());
        assert!(!c[3].is_visible());
    }

    #[test]
    fn matches_by_class_or_process_name() {
        let by_class = matching_windows(clients(), "FOOT", |_| "other".into());
        assert_eq!(by_class.len(), 1);
        assert_eq!(by_class[0].handle, WindowHandle(0x1a));

        let by_pid = matching_windows(clients(), "firefox", |pid| {
            if pid == 200 { "firefox".into() } else { "other".into() }
        });
        assert_eq!(by_pid.len(), 1);
        assert_eq!(by_pid[0].title, "Mozilla Firefox");
    }

    #[test]
    fn empty_active_window_is_none() {
        let empty: ClientJson = serde_json::from_str("{}").unwrap();
        assert!(to_foreground(empty).is_none());

        let active: ClientJson = serde_json::from_str(
            r#"{"address":"0x1a","title":"shell","pid":100,"class":"foot"}"#,
        )
        .unwrap();
        let fg = to_foreground(active).unwrap();
        assert_eq!(fg.handle, WindowHandle(0x1a));
        assert_eq!(fg.pid, 100);
    }

    #[test]
    fn maximize_requires_the_window_to_be_focused() {
        let active: ClientJson = serde_json::from_str(r#"{"address":"0x3c","title":"Mozilla Firefox"}"#).unwrap();
        assert!(require_active(&active, WindowHandle(0x3c)).is_ok());

        let err = require_active(&active, WindowHandle(0x1a)).unwrap_err();
        assert!(err.to_string().contains("not focused"));

        let nothing: ClientJson = serde_json::from_str("{}").unwrap();
        assert!(require_active(&nothing, WindowHandle(0x1a)).is_err());
    }

    #[test]
    fn workspace_count_ignores_special_workspaces() {
        let ws: Vec<WorkspaceJson> =
            serde_json::from_str(r#"[{"id":1},{"id":4},{"id":-98},{"id":2}]"#).unwrap();
        assert_eq!(highest_workspace(&ws), 4);
        assert_eq!(highest_workspace(&[]), 0);
    }
}
