//! Hotkey registration and dispatch.
//!
//! [`HotkeyRegistry`] turns a [`KeybindConfiguration`] into live
//! registrations with a [`HotkeyInputSource`] and maps fired hotkey ids back
//! to the [`ActionKind`] they were registered for.
//!
//! # Ids
//!
//! Ids come from a counter that starts at 1 and only moves forward for the
//! lifetime of the registry.  An id is consumed only when the source accepts
//! the registration, so a combo that is already taken does not burn one.
//!
//! # Reload
//!
//! The dispatch table lives behind an [`ArcSwap`] and is replaced whole.
//! During [`reload`](HotkeyRegistry::reload) the old table keeps serving
//! fired ids until the new one is complete; after `reload` returns, ids that
//! only existed in the old table are dropped.

use crate::command::ActionKind;
use crate::keybind::{KeybindConfiguration, Keybinding};
use crate::traits::{ActionHandler, HotkeyInputSource};
use arc_swap::ArcSwap;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Process-unique hotkey identifier.
pub type HotkeyId = u32;

/// One live registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyRegistration {
    pub id: HotkeyId,
    pub binding: Keybinding,
    pub action: ActionKind,
}

/// A binding the input source refused.
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("cannot register {binding} for {action}: {reason}")]
    RegistrationFailed {
        binding: String,
        action: ActionKind,
        reason: String,
    },
}

type DispatchTable = HashMap<HotkeyId, HotkeyRegistration>;

/// Owns every hotkey registration made for the current configuration.
pub struct HotkeyRegistry<H: HotkeyInputSource> {
    source: H,
    table: ArcSwap<DispatchTable>,
    /// Next id to hand out.  The lock also serializes load/unload/reload.
    next_id: Mutex<HotkeyId>,
}

impl<H: HotkeyInputSource> HotkeyRegistry<H> {
    pub fn new(source: H) -> Self {
        Self {
            source,
            table: ArcSwap::from_pointee(DispatchTable::new()),
            next_id: Mutex::new(1),
        }
    }

    /// The underlying input source.
    pub fn source(&self) -> &H {
        &self.source
    }

    /// Register every binding in `config` on top of whatever is live.
    ///
    /// Bindings the source refuses are skipped with a warning.  Returns the
    /// refusals so callers can report them.
    pub fn load(&self, config: &KeybindConfiguration) -> Vec<HotkeyError> {
        let mut next_id = self.next_id.lock().unwrap_or_else(|p| p.into_inner());
        let mut table = DispatchTable::clone(&self.table.load());
        let failures = self.register_all(config, &mut next_id, &mut table);
        self.table.store(Arc::new(table));
        failures
    }

    /// Unregister every live hotkey and clear the dispatch table.
    ///
    /// Safe to call repeatedly or with nothing registered.
    pub fn unload(&self) {
        let _guard = self.next_id.lock().unwrap_or_else(|p| p.into_inner());
        self.unregister_all(&self.table.load());
        self.table.store(Arc::new(DispatchTable::new()));
    }

    /// Replace all registrations with those of `config`.
    ///
    /// The old table stays visible to [`dispatch`](Self::dispatch) until the
    /// new one is complete, then both are swapped in one store.
    pub fn reload(&self, config: &KeybindConfiguration) -> Vec<HotkeyError> {
        let mut next_id = self.next_id.lock().unwrap_or_else(|p| p.into_inner());
        let old = self.table.load_full();
        // The source refuses duplicate combos, so the old registrations have
        // to go before the new ones can take the same keys.
        self.unregister_all(&old);
        let mut table = DispatchTable::new();
        let failures = self.register_all(config, &mut next_id, &mut table);
        self.table.store(Arc::new(table));
        info!(
            "hotkeys reloaded: {} retired, {} active",
            old.len(),
            self.table.load().len()
        );
        failures
    }

    /// Look up a fired id and hand its action to `handler`.
    ///
    /// Unknown ids (for instance one that fired just before a reload) are
    /// dropped.  Returns whether a handler was invoked.
    pub fn dispatch(&self, id: HotkeyId, handler: &dyn ActionHandler) -> bool {
        match self.resolve(id) {
            Some(action) => {
                debug!("hotkey {} → {}", id, action);
                handler.handle_action(action);
                true
            }
            None => {
                debug!("dropping unknown hotkey id {}", id);
                false
            }
        }
    }

    /// The action bound to `id`, if it is live.
    pub fn resolve(&self, id: HotkeyId) -> Option<ActionKind> {
        self.table.load().get(&id).map(|r| r.action)
    }

    /// Every live id, ascending.
    pub fn active_ids(&self) -> Vec<HotkeyId> {
        let mut ids: Vec<HotkeyId> = self.table.load().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Snapshot of the dispatch table, ordered by id.
    pub fn registrations(&self) -> Vec<HotkeyRegistration> {
        let mut regs: Vec<HotkeyRegistration> = self.table.load().values().cloned().collect();
        regs.sort_unstable_by_key(|r| r.id);
        regs
    }

    fn register_all(
        &self,
        config: &KeybindConfiguration,
        next_id: &mut HotkeyId,
        table: &mut DispatchTable,
    ) -> Vec<HotkeyError> {
        let mut failures = Vec::new();
        for (action, binding) in config.bindings() {
            let id = *next_id;
            match self.source.register(id, binding) {
                Ok(()) => {
                    *next_id += 1;
                    table.insert(
                        id,
                        HotkeyRegistration {
                            id,
                            binding: binding.clone(),
                            action,
                        },
                    );
                }
                Err(e) => {
                    let err = HotkeyError::RegistrationFailed {
                        binding: binding.to_string(),
                        action,
                        reason: e.to_string(),
                    };
                    warn!("{}", err);
                    failures.push(err);
                }
            }
        }
        failures
    }

    fn unregister_all(&self, table: &DispatchTable) {
        for id in table.keys() {
            if let Err(e) = self.source.unregister(*id) {
                warn!("failed to unregister hotkey {}: {}", id, e);
            }
        }
    }
}
