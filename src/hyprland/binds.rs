//! [`HotkeyInputSource`] backed by Hyprland runtime keybinds.
//!
//! Each registration becomes
//! `keyword bind MODS,KEY,exec,<glasspane> fire <id>`: when the combo is
//! pressed, Hyprland runs the client mode of this binary, which forwards
//! `{"Fire":<id>}` to the daemon's control socket.

use super::socket::{ipc_json, ipc_keyword, HyprlandError};
use crate::keybind::{KeyCode, Keybinding, ModifierSet};
use crate::traits::HotkeyInputSource;
use log::{debug, info};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

// Hyprland modmask bits.
const MOD_SHIFT: u32 = 1;
const MOD_CTRL: u32 = 4;
const MOD_ALT: u32 = 8;
const MOD_SUPER: u32 = 64;

/// Registers glasspane hotkeys as Hyprland binds.
pub struct HyprlandBinds {
    exe: PathBuf,
    socket: Option<PathBuf>,
    live: Mutex<HashMap<u32, BindSpec>>,
}

/// A bind in Hyprland's own vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BindSpec {
    mods: String,
    modmask: u32,
    key: String,
}

/// Subset of a `j/binds` entry.
#[derive(Debug, Deserialize)]
struct BindJson {
    modmask: u32,
    key: String,
    #[serde(default)]
    submap: String,
    #[serde(default)]
    dispatcher: String,
    #[serde(default)]
    arg: String,
}

/// What stands in the way of a new bind.
#[derive(Debug, PartialEq, Eq)]
enum Occupant {
    Free,
    /// Left behind by an earlier glasspane process that did not unbind.
    Stale,
    Foreign,
}

impl HyprlandBinds {
    /// `exe` is the glasspane binary Hyprland runs when a bind fires.
    /// `socket` is passed along to it when the daemon listens somewhere
    /// other than the default path.
    pub fn new(exe: PathBuf, socket: Option<PathBuf>) -> Self {
        Self {
            exe,
            socket,
            live: Mutex::new(HashMap::new()),
        }
    }

    fn live(&self) -> std::sync::MutexGuard<'_, HashMap<u32, BindSpec>> {
        self.live.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Whether `bind` runs some glasspane binary's `fire` mode.
    fn is_glasspane_bind(&self, bind: &BindJson) -> bool {
        if bind.dispatcher != "exec" {
            return false;
        }
        let mut words = bind.arg.split_whitespace();
        let Some(program) = words.next() else {
            return false;
        };
        Path::new(program).file_name() == self.exe.file_name() && words.any(|w| w == "fire")
    }

    fn occupant(&self, spec: &BindSpec, existing: &[BindJson], live: &HashMap<u32, BindSpec>) -> Occupant {
        let mut found = Occupant::Free;
        for bind in existing.iter().filter(|b| spec.taken_by(b)) {
            // A combo this process bound itself is a real duplicate.
            if self.is_glasspane_bind(bind) && !live.values().any(|l| l == spec) {
                found = Occupant::Stale;
            } else {
                return Occupant::Foreign;
            }
        }
        found
    }

    fn fire_command(&self, id: u32) -> String {
        match &self.socket {
            Some(socket) => format!("{} --socket {} fire {}", self.exe.display(), socket.display(), id),
            None => format!("{} fire {}", self.exe.display(), id),
        }
    }
}

impl BindSpec {
    fn from_binding(binding: &Keybinding) -> Result<Self, HyprlandError> {
        let key = xkb_key_name(binding.key)
            .ok_or_else(|| HyprlandError(format!("no Hyprland key name for {}", binding.key)))?;
        Ok(Self {
            mods: mod_names(binding.modifiers),
            modmask: modmask(binding.modifiers),
            key,
        })
    }

    fn taken_by(&self, existing: &BindJson) -> bool {
        existing.submap.is_empty() && existing.modmask == self.modmask && existing.key.eq_ignore_ascii_case(&self.key)
    }
}

fn modmask(mods: ModifierSet) -> u32 {
    let mut mask = 0;
    if mods.contains(ModifierSet::SHIFT) {
        mask |= MOD_SHIFT;
    }
    if mods.contains(ModifierSet::CONTROL) {
        mask |= MOD_CTRL;
    }
    if mods.contains(ModifierSet::ALT) {
        mask |= MOD_ALT;
    }
    if mods.contains(ModifierSet::WINDOWS) {
        mask |= MOD_SUPER;
    }
    mask
}

fn mod_names(mods: ModifierSet) -> String {
    let mut names = Vec::new();
    if mods.contains(ModifierSet::CONTROL) {
        names.push("CTRL");
    }
    if mods.contains(ModifierSet::ALT) {
        names.push("ALT");
    }
    if mods.contains(ModifierSet::SHIFT) {
        names.push("SHIFT");
    }
    if mods.contains(ModifierSet::WINDOWS) {
        names.push("SUPER");
    }
    names.join(" ")
}

/// The xkb keysym name Hyprland expects for `key`.
fn xkb_key_name(key: KeyCode) -> Option<String> {
    let name = key.name()?;
    let xkb = match name {
        "Enter" => "Return",
        "Space" => "space",
        "PageUp" => "Prior",
        "PageDown" => "Next",
        other if other.len() == 1 => return Some(other.to_ascii_lowercase()),
        other => other,
    };
    Some(xkb.to_string())
}

impl HotkeyInputSource for HyprlandBinds {
    type Error = HyprlandError;

    fn register(&self, id: u32, binding: &Keybinding) -> Result<(), HyprlandError> {
        let spec = BindSpec::from_binding(binding)?;
        let existing: Vec<BindJson> = ipc_json("binds")?;
        let occupant = self.occupant(&spec, &existing, &self.live());
        match occupant {
            Occupant::Free => {}
            Occupant::Stale => {
                info!("replacing leftover glasspane bind for {}", binding);
                ipc_keyword(&format!("unbind {},{}", spec.mods, spec.key))?;
            }
            Occupant::Foreign => return Err(HyprlandError(format!("{} is already bound", binding))),
        }
        ipc_keyword(&format!(
            "bind {},{},exec,{}",
            spec.mods,
            spec.key,
            self.fire_command(id)
        ))?;
        debug!("bound {} as hotkey {}", binding, id);
        self.live().insert(id, spec);
        Ok(())
    }

    fn unregister(&self, id: u32) -> Result<(), HyprlandError> {
        let Some(spec) = self.live().remove(&id) else {
            return Ok(());
        };
        ipc_keyword(&format!("unbind {},{}", spec.mods, spec.key))?;
        debug!("unbound hotkey {}", id);
        Ok(())
    }
}
