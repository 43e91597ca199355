//! Commands and types used throughout glasspane.
//!
//! This module defines the vocabulary that all components share:
//! [`DesktopSlot`] names one of the nine logical desktops, [`ActionKind`]
//! describes what a hotkey does, [`Command`] is everything the daemon can be
//! asked to do over its control socket, and [`WindowHandle`] /
//! [`ForegroundWindow`] / [`ProcessWindow`] describe windows reported by the
//! window system.
//!
//! Slots are accepted on the wire either as numbers (`3`) or as numeric
//! strings (`"3"`), so shell helpers do not have to care about quoting.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One of the nine logical desktops, numbered `1..=9`.
///
/// The only way to obtain a slot is through [`DesktopSlot::new`] or
/// [`TryFrom<u8>`], so every value in circulation is in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DesktopSlot(u8);

impl DesktopSlot {
    /// Lowest valid slot number.
    pub const MIN: u8 = 1;
    /// Highest valid slot number.
    pub const MAX: u8 = 9;

    /// Build a slot, returning `None` outside `1..=9`.
    pub fn new(n: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&n).then_some(Self(n))
    }

    /// The 1-based slot number.
    pub fn get(self) -> u8 {
        self.0
    }

    /// The 0-based index of the desktop this slot maps to.
    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }

    /// Every slot in ascending order.
    pub fn all() -> impl Iterator<Item = DesktopSlot> {
        (Self::MIN..=Self::MAX).map(DesktopSlot)
    }
}

/// Error returned when converting an out-of-range number into a slot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("desktop slot must be between 1 and 9, got {0}")]
pub struct InvalidSlot(pub u64);

impl TryFrom<u8> for DesktopSlot {
    type Error = InvalidSlot;

    fn try_from(n: u8) -> Result<Self, InvalidSlot> {
        DesktopSlot::new(n).ok_or(InvalidSlot(u64::from(n)))
    }
}

impl fmt::Display for DesktopSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for DesktopSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

impl<'de> Deserialize<'de> for DesktopSlot {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Visitor;
        struct V;
        impl<'de> Visitor<'de> for V {
            type Value = DesktopSlot;
            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "desktop number 1-9 as integer or string")
            }
            fn visit_u64<E>(self, n: u64) -> Result<DesktopSlot, E>
            where
                E: DeError,
            {
                u8::try_from(n)
                    .ok()
                    .and_then(DesktopSlot::new)
                    .ok_or_else(|| DeError::custom(InvalidSlot(n)))
            }
            fn visit_i64<E>(self, n: i64) -> Result<DesktopSlot, E>
            where
                E: DeError,
            {
                let n = u64::try_from(n)
                    .map_err(|_| DeError::custom(format!("desktop slot must be positive, got {}", n)))?;
                self.visit_u64(n)
            }
            fn visit_str<E>(self, s: &str) -> Result<DesktopSlot, E>
            where
                E: DeError,
            {
                let n: u64 = s
                    .trim()
                    .parse()
                    .map_err(|_| DeError::custom(format!("invalid desktop slot: {:?}", s)))?;
                self.visit_u64(n)
            }
        }
        // Map keys in JSON are always strings; deserialize_any lets the same
        // impl serve `{"3": ...}` keys and plain `3` values.
        deserializer.deserialize_any(V)
    }
}

/// What a registered hotkey does when it fires.
///
/// Stored next to each hotkey id in the dispatch table so the table can be
/// inspected and tested without invoking anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Assign the foreground window to the slot.
    AssignActiveWindow(DesktopSlot),
    /// Switch to the slot's desktop and refocus its window.
    SwitchToSlot(DesktopSlot),
}

impl ActionKind {
    /// The slot this action targets.
    pub fn slot(self) -> DesktopSlot {
        match self {
            ActionKind::AssignActiveWindow(slot) | ActionKind::SwitchToSlot(slot) => slot,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::AssignActiveWindow(slot) => write!(f, "assign to desktop {}", slot),
            ActionKind::SwitchToSlot(slot) => write!(f, "switch to desktop {}", slot),
        }
    }
}

/// Opaque window identifier handed out by the window system.
///
/// The engine never owns the window behind it; the handle may go stale at
/// any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowHandle(pub u64);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// The window that currently has keyboard focus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundWindow {
    pub handle: WindowHandle,
    pub title: String,
    pub pid: u32,
}

/// A visible top-level window belonging to some process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessWindow {
    pub handle: WindowHandle,
    pub title: String,
}

/// Arguments for [`Command::AddRule`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub process_name: String,
    pub slot: DesktopSlot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Every request the daemon accepts on its message loop.
///
/// Commands are produced by [`CommandSource`](crate::traits::CommandSource)
/// implementations and consumed by the [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// A registered hotkey fired; the payload is its hotkey id.
    Fire(u32),

    /// Assign the foreground window to the slot.
    Assign(DesktopSlot),

    /// Switch to the slot's desktop and refocus its window.
    Switch(DesktopSlot),

    /// Forget the slot's assignment.
    Remove(DesktopSlot),

    /// Forget every assignment.
    Clear,

    /// Replay persistent rules against the running processes.
    Reconcile,

    /// Re-read `keybinds.json` and rebuild the hotkey registrations.
    Reload,

    /// Save a persistent process → slot rule.
    AddRule(RuleSpec),

    /// Delete the persistent rule for a process name.
    RemoveRule(String),

    /// Delete the saved keybinds file and reload the defaults.
    ResetDefaults,

    /// Release every hotkey and stop the message loop.
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(n: u8) -> DesktopSlot {
        DesktopSlot::new(n).unwrap()
    }

    #[test]
    fn slot_range_is_enforced() {
        assert!(DesktopSlot::new(0).is_none());
        assert!(DesktopSlot::new(10).is_none());
        assert_eq!(DesktopSlot::try_from(9).unwrap().get(), 9);
        assert_eq!(DesktopSlot::try_from(12), Err(InvalidSlot(12)));
        assert_eq!(DesktopSlot::all().count(), 9);
    }

    #[test]
    fn slot_index_is_zero_based() {
        assert_eq!(slot(1).index(), 0);
        assert_eq!(slot(9).index(), 8);
    }

    #[test]
    fn parse_slot_from_number_or_string() {
        let a: Command = serde_json::from_str(r#"{"Switch":3}"#).unwrap();
        let b: Command = serde_json::from_str(r#"{"Switch":" 3 "}"#).unwrap();
        assert_eq!(a, Command::Switch(slot(3)));
        assert_eq!(a, b);
    }

    #[test]
    fn out_of_range_slot_is_rejected() {
        assert!(serde_json::from_str::<Command>(r#"{"Assign":0}"#).is_err());
        assert!(serde_json::from_str::<Command>(r#"{"Assign":"10"}"#).is_err());
        assert!(serde_json::from_str::<Command>(r#"{"Assign":-1}"#).is_err());
    }

    #[test]
    fn parse_unit_and_struct_commands() {
        let clear: Command = serde_json::from_str(r#""Clear""#).unwrap();
        assert_eq!(clear, Command::Clear);

        let add: Command =
            serde_json::from_str(r#"{"AddRule":{"process_name":"foot","slot":2}}"#).unwrap();
        assert_eq!(
            add,
            Command::AddRule(RuleSpec {
                process_name: "foot".into(),
                slot: slot(2),
                description: None,
            })
        );

        let fire: Command = serde_json::from_str(r#"{"Fire":7}"#).unwrap();
        assert_eq!(fire, Command::Fire(7));
    }

    #[test]
    fn action_kind_reports_slot() {
        assert_eq!(ActionKind::SwitchToSlot(slot(4)).slot(), slot(4));
        assert_eq!(
            ActionKind::AssignActiveWindow(slot(2)).to_string(),
            "assign to desktop 2"
        );
    }

    #[test]
    fn window_handle_displays_as_hex() {
        assert_eq!(WindowHandle(0xbeef).to_string(), "0xbeef");
    }
}
