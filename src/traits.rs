//! Core traits that decouple glasspane from any specific operating system,
//! persistence format, or transport mechanism.
//!
//! Every concrete backend (Hyprland, a JSON file, a Unix-socket listener, a
//! test harness, …) implements one of these traits.  The
//! [`DesktopOrchestrator`](crate::orchestrator::DesktopOrchestrator),
//! [`HotkeyRegistry`](crate::hotkey::HotkeyRegistry) and
//! [`PersistentAppTracker`](crate::tracker::PersistentAppTracker) only depend
//! on these abstractions.
//!
//! All collaborators take `&self` and must be `Send + Sync`: the engine calls
//! them from the message-loop thread, from background switch threads and
//! from the reconciliation thread.

use crate::command::{ActionKind, Command, DesktopSlot, ForegroundWindow, ProcessWindow, WindowHandle};
use crate::keybind::{KeybindConfiguration, Keybinding};
use crate::store::WindowAssignment;
use std::sync::mpsc;

/// Process-name sentinel returned when a pid cannot be resolved.
pub const UNKNOWN_PROCESS: &str = "Unknown Process";

/// Abstraction over the window system: focus, show state and enumeration.
pub trait WindowSystem: Send + Sync {
    /// The error type produced by this window system.
    type Error: std::error::Error + Send + 'static;

    /// The window that currently has keyboard focus, or `None`.
    fn foreground_window(&self) -> Result<Option<ForegroundWindow>, Self::Error>;

    /// Whether `handle` names a live, visible window.
    ///
    /// Returns `false` for handles whose window has been closed.
    fn is_visible(&self, handle: WindowHandle) -> Result<bool, Self::Error>;

    /// Whether the window is minimized (hidden).
    fn is_minimized(&self, handle: WindowHandle) -> Result<bool, Self::Error>;

    /// Whether the window is maximized.
    fn is_maximized(&self, handle: WindowHandle) -> Result<bool, Self::Error>;

    /// Bring the window to the foreground.  Returns whether focus moved.
    fn focus(&self, handle: WindowHandle) -> Result<bool, Self::Error>;

    /// Restore a minimized window.
    fn restore(&self, handle: WindowHandle) -> Result<(), Self::Error>;

    /// Maximize the window.
    fn maximize(&self, handle: WindowHandle) -> Result<(), Self::Error>;

    /// Visible top-level windows whose process name matches `process_name`
    /// (case-insensitive).
    fn windows_of_process(&self, process_name: &str) -> Result<Vec<ProcessWindow>, Self::Error>;
}

/// Resolves process ids to names and lists running processes.
///
/// Neither method fails: lookups that go wrong yield [`UNKNOWN_PROCESS`] or
/// an empty list.
pub trait ProcessInspector: Send + Sync {
    /// The executable name of `pid`, or [`UNKNOWN_PROCESS`].
    fn name_of(&self, pid: u32) -> String;

    /// Names of every running process.  May contain duplicates.
    fn running_process_names(&self) -> Vec<String>;
}

/// Abstraction over the OS virtual-desktop feature.
///
/// Mutating calls may be slow (they can spawn external commands) and may
/// silently do nothing when the OS refuses.
pub trait DesktopDriver: Send + Sync {
    /// The error type produced by this driver.
    type Error: std::error::Error + Send + 'static;

    /// Number of desktops that currently exist.  May be a few seconds stale.
    fn count(&self) -> Result<usize, Self::Error>;

    /// Create one more desktop at the end of the list.
    fn create_one(&self) -> Result<(), Self::Error>;

    /// Switch to the desktop at the 0-based `index`.
    fn switch_to(&self, index: usize) -> Result<(), Self::Error>;
}

/// Loads and saves the [`KeybindConfiguration`].
pub trait ConfigStore: Send + Sync {
    /// The error type produced when saving.
    type Error: std::error::Error + Send + 'static;

    /// Load the saved configuration.
    ///
    /// Never fails: missing or unreadable data yields a complete default.
    /// The result always has both keybind tables covering every slot.
    fn load(&self) -> KeybindConfiguration;

    /// Persist `config`.
    fn save(&self, config: &KeybindConfiguration) -> Result<(), Self::Error>;

    /// Throw away the saved configuration so the next load yields defaults.
    fn reset(&self) -> Result<(), Self::Error> {
        self.save(&KeybindConfiguration::default())
    }
}

/// System-wide hotkey registration.
///
/// Ids are chosen by the caller (the
/// [`HotkeyRegistry`](crate::hotkey::HotkeyRegistry)); fired ids come back
/// to the message loop as [`Command::Fire`].
pub trait HotkeyInputSource: Send + Sync {
    /// The error type produced by this source.
    type Error: std::error::Error + Send + 'static;

    /// Register `binding` under `id`.
    ///
    /// Fails when the combination is already taken system-wide.
    fn register(&self, id: u32, binding: &Keybinding) -> Result<(), Self::Error>;

    /// Release the registration for `id`.
    fn unregister(&self, id: u32) -> Result<(), Self::Error>;
}

/// Receives the [`ActionKind`] bound to a fired hotkey.
pub trait ActionHandler {
    fn handle_action(&self, action: ActionKind);
}

//  Events

/// Notifications sent upward from the engine over an
/// [`mpsc`](std::sync::mpsc) channel.
///
/// The engine never calls into a UI.  Whoever owns the receiver (the daemon
/// main loop, a tray icon, a test) decides what to do with each event.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A window was assigned to a slot.
    Assigned(WindowAssignment),

    /// The assigned process has no persistent rule yet.  The receiver may
    /// answer by adding one.
    PersistOffered {
        process_name: String,
        slot: DesktopSlot,
    },

    /// A background switch failed after it was accepted.
    SwitchFailed { slot: DesktopSlot, reason: String },

    /// A persistent rule was saved.
    RuleAdded {
        process_name: String,
        slot: DesktopSlot,
    },

    /// A persistent rule was deleted.
    RuleRemoved { process_name: String },
}

//  Command Source

/// A source of [`Command`]s.
///
/// Implementations listen on some transport (a Unix socket, an in-memory
/// channel, …) and forward parsed commands into the provided
/// [`mpsc::Sender`].
///
/// # Contract
///
/// * [`run`](CommandSource::run) **blocks** until the source is exhausted or
///   an unrecoverable error occurs.
/// * Each received command must be sent through `sink` exactly once.
/// * Implementations must be [`Send`] so they can run on a dedicated thread.
pub trait CommandSource: Send {
    /// The error type produced by this source.
    type Error: std::error::Error + Send + 'static;

    /// Start listening and forward every incoming [`Command`] into `sink`.
    ///
    /// This method blocks the calling thread.
    fn run(&mut self, sink: mpsc::Sender<Command>) -> Result<(), Self::Error>;
}
