//! The explicitly owned context that ties every component together.
//!
//! [`Engine`] owns the [`AssignmentStore`], the shared [`RuleBook`], the
//! [`HotkeyRegistry`], the [`DesktopOrchestrator`] and the
//! [`PersistentAppTracker`].  The surrounding application builds one,
//! shares it (usually in an `Arc`) and feeds it [`Command`]s from the
//! message loop.
//!
//! Events produced by the components arrive on the receiver returned from
//! [`Engine::new`]; passing them back through [`Engine::on_event`] applies
//! the engine's own policy (auto-persisting rules) before the caller does
//! anything else with them.

use crate::command::{ActionKind, Command};
use crate::config::Settings;
use crate::hotkey::{HotkeyError, HotkeyRegistry};
use crate::orchestrator::{DesktopOrchestrator, OrchestratorError};
use crate::store::{AssignmentStore, WindowAssignment};
use crate::traits::{
    ActionHandler, ConfigStore, DesktopDriver, EngineEvent, HotkeyInputSource, ProcessInspector,
    WindowSystem,
};
use crate::tracker::{PersistentAppTracker, RuleBook, TrackerError};
use log::{error, info, warn};
use std::sync::{mpsc, Arc};

/// Errors surfaced to whoever issued a [`Command`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error("config store error: {0}")]
    ConfigStore(String),

    #[error("failed to start background work: {0}")]
    Spawn(#[from] std::io::Error),
}

/// The OS and storage backends an [`Engine`] runs against.
pub struct Collaborators<W, P, D, C, H> {
    pub windows: Arc<W>,
    pub processes: Arc<P>,
    pub desktops: Arc<D>,
    pub config_store: Arc<C>,
    pub hotkeys: H,
}

/// Assignment and hotkey engine.
pub struct Engine<W, P, D, C, H: HotkeyInputSource> {
    store: Arc<AssignmentStore>,
    rules: Arc<RuleBook>,
    config_store: Arc<C>,
    orchestrator: DesktopOrchestrator<W, P, D>,
    tracker: Arc<PersistentAppTracker<W, P, D, C>>,
    hotkeys: HotkeyRegistry<H>,
    settings: Settings,
}

impl<W, P, D, C, H> Engine<W, P, D, C, H>
where
    W: WindowSystem + 'static,
    P: ProcessInspector + 'static,
    D: DesktopDriver + 'static,
    C: ConfigStore + 'static,
    H: HotkeyInputSource,
{
    /// Build an engine.  The keybind configuration is loaded from
    /// `collaborators.config_store` right away; hotkeys are registered only
    /// once [`start`](Self::start) is called.
    pub fn new(collaborators: Collaborators<W, P, D, C, H>, settings: Settings) -> (Self, mpsc::Receiver<EngineEvent>) {
        let Collaborators {
            windows,
            processes,
            desktops,
            config_store,
            hotkeys,
        } = collaborators;

        let store = Arc::new(AssignmentStore::new());
        let rules = Arc::new(RuleBook::new(config_store.load()));
        let (events_tx, events_rx) = mpsc::channel();

        let orchestrator = DesktopOrchestrator::new(windows, processes, desktops, Arc::clone(&store), Arc::clone(&rules))
            .with_settle_delay(settings.timing.settle_delay());
        orchestrator.set_event_sink(events_tx.clone());

        let tracker = PersistentAppTracker::new(orchestrator.clone(), Arc::clone(&config_store), Arc::clone(&rules))
            .with_pacing(settings.timing.reconcile_pacing());
        tracker.set_event_sink(events_tx);

        let engine = Self {
            store,
            rules,
            config_store,
            orchestrator,
            tracker: Arc::new(tracker),
            hotkeys: HotkeyRegistry::new(hotkeys),
            settings,
        };
        (engine, events_rx)
    }

    pub fn store(&self) -> &Arc<AssignmentStore> {
        &self.store
    }

    pub fn rules(&self) -> &Arc<RuleBook> {
        &self.rules
    }

    pub fn orchestrator(&self) -> &DesktopOrchestrator<W, P, D> {
        &self.orchestrator
    }

    pub fn tracker(&self) -> &Arc<PersistentAppTracker<W, P, D, C>> {
        &self.tracker
    }

    pub fn hotkeys(&self) -> &HotkeyRegistry<H> {
        &self.hotkeys
    }

    /// Every current assignment, ordered by slot.
    pub fn assignments(&self) -> Vec<WindowAssignment> {
        self.store.get_all()
    }

    /// Register hotkeys and, if configured, start a reconciliation pass in
    /// the background.
    pub fn start(&self) -> Vec<HotkeyError> {
        let failures = self.hotkeys.load(&self.rules.snapshot());
        info!(
            "{} hotkey(s) registered, {} unavailable",
            self.hotkeys.active_ids().len(),
            failures.len()
        );
        if self.settings.behaviour.reconcile_on_startup {
            if let Err(e) = self.tracker.reconcile_in_background() {
                warn!("could not start startup reconciliation: {}", e);
            }
        }
        failures
    }

    /// Release every hotkey.
    pub fn shutdown(&self) {
        self.hotkeys.unload();
        info!("hotkeys released");
    }

    /// Re-read the keybind configuration and rebuild the hotkeys from it.
    pub fn reload_configuration(&self) -> Vec<HotkeyError> {
        let config = self.tracker.reload();
        self.hotkeys.reload(&config)
    }

    /// Run the message loop until a [`Command::Shutdown`] arrives or every
    /// sender is gone, then release the hotkeys.
    pub fn run(&self, commands: mpsc::Receiver<Command>) {
        for cmd in commands {
            if cmd == Command::Shutdown {
                info!("shutdown requested");
                break;
            }
            if let Err(e) = self.handle(cmd) {
                error!("command error: {}", e);
            }
        }
        self.shutdown();
    }

    /// Execute one command from the message loop.
    ///
    /// Switches are started in the background and return as soon as the
    /// empty-slot check passes.
    pub fn handle(&self, cmd: Command) -> Result<(), EngineError> {
        match cmd {
            Command::Fire(id) => {
                self.hotkeys.dispatch(id, self);
            }

            Command::Assign(slot) => {
                self.orchestrator.assign_active_window(slot)?;
            }

            Command::Switch(slot) => {
                self.orchestrator.switch_to_slot_async(slot)?;
            }

            Command::Remove(slot) => {
                match self.store.remove(slot) {
                    Some(removed) => info!("removed {}", removed),
                    None => info!("desktop {} had no assignment", slot),
                }
            }

            Command::Clear => {
                self.store.clear();
                info!("cleared all assignments");
            }

            Command::Reconcile => {
                self.tracker.reconcile_in_background()?;
            }

            Command::Reload => {
                self.reload_configuration();
            }

            Command::AddRule(spec) => {
                self.tracker.add_rule(&spec.process_name, spec.slot, spec.description)?;
            }

            Command::RemoveRule(process_name) => {
                self.tracker.remove_rule(&process_name)?;
            }

            Command::ResetDefaults => {
                self.config_store
                    .reset()
                    .map_err(|e| EngineError::ConfigStore(e.to_string()))?;
                info!("keybinds reset to defaults");
                self.reload_configuration();
            }

            Command::Shutdown => self.shutdown(),
        }
        Ok(())
    }

    /// Apply the engine's policy to an event it produced.
    pub fn on_event(&self, event: &EngineEvent) {
        match event {
            EngineEvent::PersistOffered { process_name, slot } => {
                if self.settings.behaviour.auto_persist {
                    if let Err(e) = self.tracker.add_rule(process_name, *slot, None) {
                        error!("could not persist {} → desktop {}: {}", process_name, slot, e);
                    }
                } else {
                    info!(
                        "{} has no persistent rule; send {{\"AddRule\":{{\"process_name\":\"{}\",\"slot\":{}}}}} to keep it on desktop {}",
                        process_name, process_name, slot, slot
                    );
                }
            }
            EngineEvent::SwitchFailed { slot, reason } => {
                error!("switch to desktop {} failed: {}", slot, reason);
            }
            EngineEvent::Assigned(_) | EngineEvent::RuleAdded { .. } | EngineEvent::RuleRemoved { .. } => {}
        }
    }
}

impl<W, P, D, C, H> ActionHandler for Engine<W, P, D, C, H>
where
    W: WindowSystem + 'static,
    P: ProcessInspector + 'static,
    D: DesktopDriver + 'static,
    C: ConfigStore + 'static,
    H: HotkeyInputSource,
{
    fn handle_action(&self, action: ActionKind) {
        let result = match action {
            ActionKind::AssignActiveWindow(slot) => self.orchestrator.assign_active_window(slot).map(|_| ()),
            ActionKind::SwitchToSlot(slot) => self.orchestrator.switch_to_slot_async(slot).map(|_| ()),
        };
        if let Err(e) = result {
            warn!("{} failed: {}", action, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{DesktopSlot, RuleSpec, WindowHandle};
    use crate::config::{BehaviourConfig, TimingConfig};
    use crate::keybind::{KeyCode, KeybindConfiguration, Keybinding, ModifierSet, PersistentAppRule};
    use crate::mock::{Call, CallLog, MemoryConfigStore, MockDesktops, MockHotkeys, MockProcesses, MockWindow, MockWindows};
    use std::time::Duration;

    type TestEngine = Engine<MockWindows, MockProcesses, MockDesktops, MemoryConfigStore, MockHotkeys>;

    struct Fixture {
        log: CallLog,
        windows: Arc<MockWindows>,
        processes: Arc<MockProcesses>,
        config_store: Arc<MemoryConfigStore>,
        engine: TestEngine,
        events: mpsc::Receiver<EngineEvent>,
    }

    fn settings(auto_persist: bool) -> Settings {
        Settings {
            timing: TimingConfig {
                settle_delay_ms: 0,
                reconcile_pacing_ms: 0,
            },
            behaviour: BehaviourConfig {
                reconcile_on_startup: false,
                auto_persist,
            },
            socket_path: None,
        }
    }

    fn fixture_with(initial: Option<KeybindConfiguration>, auto_persist: bool) -> Fixture {
        let log = CallLog::default();
        let windows = Arc::new(MockWindows::new(log.clone()));
        let processes = Arc::new(MockProcesses::with(42, "notepad.exe"));
        let config_store = Arc::new(MemoryConfigStore::new(initial));
        let (engine, events) = Engine::new(
            Collaborators {
                windows: windows.clone(),
                processes: processes.clone(),
                desktops: Arc::new(MockDesktops::new(log.clone(), 9)),
                config_store: config_store.clone(),
                hotkeys: MockHotkeys::default(),
            },
            settings(auto_persist),
        );
        Fixture {
            log,
            windows,
            processes,
            config_store,
            engine,
            events,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(None, false)
    }

    fn slot(n: u8) -> DesktopSlot {
        DesktopSlot::new(n).unwrap()
    }

    fn id_for(engine: &TestEngine, action: ActionKind) -> u32 {
        engine
            .hotkeys()
            .registrations()
            .into_iter()
            .find(|r| r.action == action)
            .map(|r| r.id)
            .unwrap()
    }

    #[test]
    fn fired_assign_hotkey_assigns_the_foreground_window() {
        let f = fixture();
        assert!(f.engine.start().is_empty());
        f.windows.set_foreground(0x10, "Notepad", 42);

        let id = id_for(&f.engine, ActionKind::AssignActiveWindow(slot(3)));
        f.engine.handle(Command::Fire(id)).unwrap();

        let all = f.engine.assignments();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].slot, slot(3));
        assert_eq!(all[0].title, "Notepad");
        assert_eq!(all[0].process_name, "notepad.exe");
    }

    #[test]
    fn switch_after_assign_moves_to_the_slot_desktop() {
        let f = fixture();
        f.engine.start();
        f.windows.add(0x10, MockWindow::new("Notepad", "notepad.exe"));
        f.windows.set_foreground(0x10, "Notepad", 42);
        f.engine.handle(Command::Assign(slot(2))).unwrap();
        f.log.lock().unwrap().clear();

        let task = f.engine.orchestrator().switch_to_slot_async(slot(2)).unwrap();
        task.join().unwrap();
        assert_eq!(f.log.lock().unwrap()[0], Call::SwitchTo(1));
    }

    #[test]
    fn switch_command_on_empty_slot_is_reported() {
        let f = fixture();
        let err = f.engine.handle(Command::Switch(slot(5))).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Orchestrator(OrchestratorError::NoAssignment(_))
        ));
        assert!(f.log.lock().unwrap().is_empty());
    }

    #[test]
    fn remove_and_clear_commands_edit_the_store() {
        let f = fixture();
        f.windows.set_foreground(0x10, "Notepad", 42);
        f.engine.handle(Command::Assign(slot(1))).unwrap();
        f.engine.handle(Command::Assign(slot(2))).unwrap();

        f.engine.handle(Command::Remove(slot(1))).unwrap();
        assert_eq!(f.engine.assignments().len(), 1);
        f.engine.handle(Command::Remove(slot(1))).unwrap();

        f.engine.handle(Command::Clear).unwrap();
        assert!(f.engine.assignments().is_empty());
    }

    #[test]
    fn reload_drops_hotkeys_from_the_old_configuration() {
        let f = fixture();
        f.engine.start();
        f.windows.set_foreground(0x10, "Notepad", 42);
        let old_ids = f.engine.hotkeys().active_ids();

        let mut cfg = KeybindConfiguration::default();
        cfg.assignment_keybinds.insert(
            slot(1),
            Keybinding {
                modifiers: ModifierSet::WINDOWS | ModifierSet::SHIFT,
                key: KeyCode(0x31),
                description: "custom".into(),
            },
        );
        *f.config_store.saved.lock().unwrap() = Some(cfg);
        f.engine.handle(Command::Reload).unwrap();

        for id in old_ids {
            f.engine.handle(Command::Fire(id)).unwrap();
        }
        assert!(f.engine.assignments().is_empty());
        assert_eq!(f.engine.hotkeys().active_ids().len(), 18);
        assert_eq!(f.engine.hotkeys().source().live.lock().unwrap().len(), 18);
    }

    #[test]
    fn add_and_remove_rule_commands_persist() {
        let f = fixture();
        f.engine
            .handle(Command::AddRule(RuleSpec {
                process_name: "notepad.exe".into(),
                slot: slot(3),
                description: None,
            }))
            .unwrap();
        assert!(f.engine.tracker().has_rule("notepad.exe"));
        assert_eq!(f.config_store.save_count(), 1);

        f.engine.handle(Command::RemoveRule("notepad.exe".into())).unwrap();
        assert!(!f.engine.tracker().has_rule("notepad.exe"));
        assert_eq!(f.config_store.save_count(), 2);
    }

    #[test]
    fn save_failure_is_surfaced() {
        let f = fixture();
        *f.config_store.fail_save.lock().unwrap() = true;
        let err = f
            .engine
            .handle(Command::AddRule(RuleSpec {
                process_name: "foot".into(),
                slot: slot(1),
                description: None,
            }))
            .unwrap_err();
        assert!(matches!(err, EngineError::Tracker(TrackerError::ConfigSave(_))));
    }

    #[test]
    fn auto_persist_accepts_offers() {
        let f = fixture_with(None, true);
        f.windows.set_foreground(0x10, "Notepad", 42);
        f.engine.handle(Command::Assign(slot(3))).unwrap();

        for event in f.events.try_iter() {
            f.engine.on_event(&event);
        }
        assert_eq!(f.engine.tracker().get_rule("notepad.exe").unwrap().slot, slot(3));
    }

    #[test]
    fn offers_are_left_alone_without_auto_persist() {
        let f = fixture();
        f.windows.set_foreground(0x10, "Notepad", 42);
        f.engine.handle(Command::Assign(slot(3))).unwrap();
        let events: Vec<EngineEvent> = f.events.try_iter().collect();
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::PersistOffered { .. })));
        for event in &events {
            f.engine.on_event(event);
        }
        assert!(!f.engine.tracker().has_rule("notepad.exe"));
    }

    #[test]
    fn reconcile_command_runs_in_the_background() {
        let mut cfg = KeybindConfiguration::default();
        cfg.upsert_rule(PersistentAppRule::new("foot", slot(4), None));
        let f = fixture_with(Some(cfg), false);
        f.processes.set_running(&["foot"]);
        f.windows.add(0x30, MockWindow::new("shell", "foot"));

        f.engine.handle(Command::Reconcile).unwrap();
        let mut waited = Duration::ZERO;
        while f.engine.store().get(slot(4)).is_none() && waited < Duration::from_secs(2) {
            std::thread::sleep(Duration::from_millis(10));
            waited += Duration::from_millis(10);
        }
        assert_eq!(f.engine.store().get(slot(4)).unwrap().handle, WindowHandle(0x30));
    }

    #[test]
    fn reset_defaults_reloads_default_bindings() {
        let mut cfg = KeybindConfiguration::default();
        cfg.upsert_rule(PersistentAppRule::new("foot", slot(4), None));
        let f = fixture_with(Some(cfg), false);
        f.engine.start();
        assert!(f.engine.tracker().has_rule("foot"));

        f.engine.handle(Command::ResetDefaults).unwrap();
        assert!(!f.engine.tracker().has_rule("foot"));
        assert_eq!(f.engine.hotkeys().active_ids().len(), 18);
    }

    #[test]
    fn run_stops_on_shutdown_while_senders_remain() {
        let f = fixture();
        f.engine.start();
        f.windows.set_foreground(0x10, "Notepad", 42);
        let id = id_for(&f.engine, ActionKind::AssignActiveWindow(slot(4)));

        let (tx, rx) = mpsc::channel();
        tx.send(Command::Fire(id)).unwrap();
        tx.send(Command::Shutdown).unwrap();
        tx.send(Command::Clear).unwrap();
        // `tx` stays alive, as a listener thread would keep it.
        f.engine.run(rx);

        assert_eq!(f.engine.assignments().len(), 1);
        assert!(f.engine.hotkeys().active_ids().is_empty());
        assert!(f.engine.hotkeys().source().live.lock().unwrap().is_empty());
        drop(tx);
    }

    #[test]
    fn run_releases_hotkeys_when_sources_close() {
        let f = fixture();
        f.engine.start();
        let (tx, rx) = mpsc::channel();
        tx.send(Command::Clear).unwrap();
        drop(tx);
        f.engine.run(rx);
        assert!(f.engine.hotkeys().active_ids().is_empty());
    }

    #[test]
    fn shutdown_releases_every_hotkey() {
        let f = fixture();
        f.engine.start();
        f.engine.shutdown();
        assert!(f.engine.hotkeys().active_ids().is_empty());
        assert!(f.engine.hotkeys().source().live.lock().unwrap().is_empty());
    }
}
