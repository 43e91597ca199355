//! **glasspane**: assign windows to numbered desktops and jump back to
//! them with a keystroke.
//!
//! Nine desktop slots each get two system-wide hotkeys: one assigns the
//! focused window to the slot, the other switches to the slot's desktop and
//! brings its window back to the front, maximized.  Processes can also be
//! pinned to a slot with a persistent rule that is replayed on startup.
//!
//! # Architecture
//!
//! The crate is organised around the collaborator traits in [`traits`]:
//!
//! * [`traits::WindowSystem`], [`traits::DesktopDriver`] and
//!   [`traits::ProcessInspector`] abstract the operating system so the
//!   assignment logic is not coupled to any specific compositor.
//! * [`traits::HotkeyInputSource`] abstracts system-wide hotkey
//!   registration.
//! * [`traits::ConfigStore`] abstracts where the keybinds and rules live.
//! * [`traits::CommandSource`] abstracts the transport that delivers
//!   [`command::Command`]s to the main loop.
//!
//! [`engine::Engine`] owns the [`store::AssignmentStore`], the
//! [`hotkey::HotkeyRegistry`], the [`orchestrator::DesktopOrchestrator`] and
//! the [`tracker::PersistentAppTracker`].  Concrete backends live in
//! [`hyprland`] (Hyprland IPC and `sysinfo`), [`persist`] (the JSON keybinds
//! file) and [`ipc`] (Unix-socket command listener).

pub mod command;
pub mod config;
pub mod engine;
pub mod hotkey;
pub mod hyprland;
pub mod ipc;
pub mod keybind;
pub mod orchestrator;
pub mod persist;
pub mod store;
pub mod tracker;
pub mod traits;

#[cfg(test)]
pub(crate) mod mock;
