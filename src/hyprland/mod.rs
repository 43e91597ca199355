//! Hyprland-specific implementations.
//!
//! This module provides concrete backends for the
//! [`WindowSystem`](crate::traits::WindowSystem),
//! [`DesktopDriver`](crate::traits::DesktopDriver),
//! [`ProcessInspector`](crate::traits::ProcessInspector) and
//! [`HotkeyInputSource`](crate::traits::HotkeyInputSource) traits, powered by
//! Hyprland's IPC socket and `sysinfo`.
//!
//! Nothing outside this module should reference Hyprland directly.

pub mod binds;
pub mod process;
mod socket;
pub mod wm;

pub use binds::HyprlandBinds;
pub use process::SysProcesses;
pub use socket::HyprlandError;
pub use wm::HyprlandWm;
