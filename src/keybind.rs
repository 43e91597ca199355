//! Keybindings and the persisted keybind configuration.
//!
//! A [`KeybindConfiguration`] holds two slot-keyed tables of [`Keybinding`]s
//! (one for *assign*, one for *switch*) plus the ordered list of
//! [`PersistentAppRule`]s.  It serializes to the `keybinds.json` shape:
//!
//! ```json
//! {
//!   "assignmentKeybinds": { "1": { "modifiers": 2, "key": 49, "description": "Assign to Desktop 1" } },
//!   "switchKeybinds":     { "1": { "modifiers": 1, "key": 49, "description": "Switch to Desktop 1" } },
//!   "persistentAppAssignments": [
//!     { "processName": "foot", "desktopNumber": 2, "description": "foot → Desktop 2",
//!       "createdAt": "2026-01-01T00:00:00Z" }
//!   ]
//! }
//! ```
//!
//! Missing slots are filled in by
//! [`ensure_all_keybinds_exist`](KeybindConfiguration::ensure_all_keybinds_exist).

use crate::command::{ActionKind, DesktopSlot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

bitflags::bitflags! {
    /// Modifier keys held together with a hotkey.
    ///
    /// The bit values are the ones stored in `keybinds.json`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModifierSet: u8 {
        const ALT = 1;
        const CONTROL = 2;
        const SHIFT = 4;
        const WINDOWS = 8;
    }
}

impl Serialize for ModifierSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.bits())
    }
}

impl<'de> Deserialize<'de> for ModifierSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Unknown bits are dropped rather than rejected so a file written by a
        // newer build still loads.
        u8::deserialize(deserializer).map(ModifierSet::from_bits_truncate)
    }
}

/// A virtual-key code.
///
/// Codes follow the classic virtual-key numbering (`0x30` is the `0` key,
/// `0x41` is `A`, `0x70` is `F1`, …) so saved files stay portable between
/// backends.  Backends translate to their own key names with
/// [`name`](KeyCode::name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyCode(pub u32);

/// Named keys outside the digit/letter/function ranges.
const NAMED_KEYS: &[(u32, &str)] = &[
    (0x09, "Tab"),
    (0x0D, "Enter"),
    (0x1B, "Escape"),
    (0x20, "Space"),
    (0x21, "PageUp"),
    (0x22, "PageDown"),
    (0x23, "End"),
    (0x24, "Home"),
    (0x2D, "Insert"),
    (0x2E, "Delete"),
];

const DIGITS: &[&str] = &["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];

const LETTERS: &[&str] = &[
    "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q", "R",
    "S", "T", "U", "V", "W", "X", "Y", "Z",
];

const FUNCTION_KEYS: &[&str] = &[
    "F1", "F2", "F3", "F4", "F5", "F6", "F7", "F8", "F9", "F10", "F11", "F12",
];

impl KeyCode {
    /// The digit key for `n` (`0..=9`).
    pub fn digit(n: u8) -> Self {
        KeyCode(0x30 + u32::from(n.min(9)))
    }

    /// Human-readable key name, or `None` for codes outside the supported set.
    pub fn name(self) -> Option<&'static str> {
        let code = self.0;
        match code {
            0x30..=0x39 => DIGITS.get((code - 0x30) as usize).copied(),
            0x41..=0x5A => LETTERS.get((code - 0x41) as usize).copied(),
            0x70..=0x7B => FUNCTION_KEYS.get((code - 0x70) as usize).copied(),
            _ => NAMED_KEYS
                .iter()
                .find(|(c, _)| *c == code)
                .map(|(_, name)| *name),
        }
    }

    /// Reverse of [`name`](KeyCode::name), case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        let lookup = |table: &[&str], base: u32| {
            table
                .iter()
                .position(|k| k.eq_ignore_ascii_case(name))
                .map(|i| KeyCode(base + i as u32))
        };
        lookup(DIGITS, 0x30)
            .or_else(|| lookup(LETTERS, 0x41))
            .or_else(|| lookup(FUNCTION_KEYS, 0x70))
            .or_else(|| {
                NAMED_KEYS
                    .iter()
                    .find(|(_, n)| n.eq_ignore_ascii_case(name))
                    .map(|(c, _)| KeyCode(*c))
            })
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:02X}", self.0),
        }
    }
}

/// A modifier + key combination with a description for display.
///
/// Two keybindings *conflict* when their [`combo`](Keybinding::combo)s are
/// equal, whatever their descriptions say.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keybinding {
    pub modifiers: ModifierSet,
    pub key: KeyCode,
    #[serde(default)]
    pub description: String,
}

impl Keybinding {
    /// The identity of this binding as far as the OS is concerned.
    pub fn combo(&self) -> (ModifierSet, KeyCode) {
        (self.modifiers, self.key)
    }

    /// Whether both bindings use the same modifier + key combination.
    pub fn conflicts_with(&self, other: &Keybinding) -> bool {
        self.combo() == other.combo()
    }

    /// Default *assign* binding: `Ctrl+<digit>`.
    pub fn default_assign(slot: DesktopSlot) -> Self {
        Self {
            modifiers: ModifierSet::CONTROL,
            key: KeyCode::digit(slot.get()),
            description: format!("Assign to Desktop {}", slot),
        }
    }

    /// Default *switch* binding: `Alt+<digit>`.
    pub fn default_switch(slot: DesktopSlot) -> Self {
        Self {
            modifiers: ModifierSet::ALT,
            key: KeyCode::digit(slot.get()),
            description: format!("Switch to Desktop {}", slot),
        }
    }
}

impl fmt::Display for Keybinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels = [
            (ModifierSet::CONTROL, "Ctrl"),
            (ModifierSet::ALT, "Alt"),
            (ModifierSet::SHIFT, "Shift"),
            (ModifierSet::WINDOWS, "Win"),
        ];
        for (flag, label) in labels {
            if self.modifiers.contains(flag) {
                write!(f, "{}+", label)?;
            }
        }
        write!(f, "{}", self.key)
    }
}

/// A saved "this process always lives on that desktop" rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentAppRule {
    pub process_name: String,
    #[serde(rename = "desktopNumber")]
    pub slot: DesktopSlot,
    #[serde(default)]
    pub description: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl PersistentAppRule {
    /// Build a rule stamped with the current time.
    ///
    /// Without a description, one is derived from the process and slot.
    pub fn new(process_name: impl Into<String>, slot: DesktopSlot, description: Option<String>) -> Self {
        let process_name = process_name.into();
        let description = description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("{} → Desktop {}", process_name, slot));
        Self {
            process_name,
            slot,
            description,
            created_at: Utc::now(),
        }
    }

    /// Case-insensitive process name match.
    pub fn matches(&self, process_name: &str) -> bool {
        self.process_name.eq_ignore_ascii_case(process_name)
    }
}

/// Everything glasspane persists: both keybind tables and the app rules.
///
/// Constructed via [`Default`], every slot has both bindings.  Data read
/// from disk may be incomplete until
/// [`ensure_all_keybinds_exist`](Self::ensure_all_keybinds_exist) runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeybindConfiguration {
    #[serde(default)]
    pub assignment_keybinds: BTreeMap<DesktopSlot, Keybinding>,
    #[serde(default)]
    pub switch_keybinds: BTreeMap<DesktopSlot, Keybinding>,
    #[serde(default)]
    pub persistent_app_assignments: Vec<PersistentAppRule>,
}

impl Default for KeybindConfiguration {
    fn default() -> Self {
        let mut config = Self::empty();
        config.ensure_all_keybinds_exist();
        config
    }
}

impl KeybindConfiguration {
    /// A configuration with no bindings and no rules.
    pub fn empty() -> Self {
        Self {
            assignment_keybinds: BTreeMap::new(),
            switch_keybinds: BTreeMap::new(),
            persistent_app_assignments: Vec::new(),
        }
    }

    /// Fill in the default binding for every slot missing from either table.
    ///
    /// Present entries are left untouched.  Returns the number of bindings
    /// added.
    pub fn ensure_all_keybinds_exist(&mut self) -> usize {
        let mut added = 0;
        for slot in DesktopSlot::all() {
            if !self.assignment_keybinds.contains_key(&slot) {
                self.assignment_keybinds.insert(slot, Keybinding::default_assign(slot));
                added += 1;
            }
            if !self.switch_keybinds.contains_key(&slot) {
                self.switch_keybinds.insert(slot, Keybinding::default_switch(slot));
                added += 1;
            }
        }
        added
    }

    /// Every `(action, binding)` pair, assign table first, each in slot order.
    pub fn bindings(&self) -> impl Iterator<Item = (ActionKind, &Keybinding)> {
        let assign = self
            .assignment_keybinds
            .iter()
            .map(|(slot, kb)| (ActionKind::AssignActiveWindow(*slot), kb));
        let switch = self
            .switch_keybinds
            .iter()
            .map(|(slot, kb)| (ActionKind::SwitchToSlot(*slot), kb));
        assign.chain(switch)
    }

    /// The rule for `process_name`, compared case-insensitively.
    pub fn rule(&self, process_name: &str) -> Option<&PersistentAppRule> {
        self.persistent_app_assignments
            .iter()
            .find(|r| r.matches(process_name))
    }

    /// Replace any rule for the same process with `rule`, appending it.
    pub fn upsert_rule(&mut self, rule: PersistentAppRule) {
        self.persistent_app_assignments
            .retain(|r| !r.matches(&rule.process_name));
        self.persistent_app_assignments.push(rule);
    }

    /// Drop the rule for `process_name`; returns whether one was removed.
    pub fn remove_rule(&mut self, process_name: &str) -> bool {
        let before = self.persistent_app_assignments.len();
        self.persistent_app_assignments
            .retain(|r| !r.matches(process_name));
        self.persistent_app_assignments.len() != before
    }
}
