//! Persistent process → desktop rules.
//!
//! [`RuleBook`] is the in-memory copy of the [`KeybindConfiguration`] shared
//! by the engine's components.  [`PersistentAppTracker`] edits its rules
//! (saving through a [`ConfigStore`]) and replays them against the running
//! processes with [`reconcile_all`](PersistentAppTracker::reconcile_all).

use crate::command::DesktopSlot;
use crate::keybind::{KeybindConfiguration, PersistentAppRule};
use crate::orchestrator::DesktopOrchestrator;
use crate::traits::{ConfigStore, DesktopDriver, EngineEvent, ProcessInspector, WindowSystem};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::{mpsc, Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

/// Default pause between two assignments made by one reconciliation pass.
pub const DEFAULT_RECONCILE_PACING: Duration = Duration::from_millis(100);

/// Shared, lock-protected configuration snapshot.
///
/// Readers get clones; no lock guard ever leaves a method.
#[derive(Debug)]
pub struct RuleBook {
    config: RwLock<KeybindConfiguration>,
}

impl RuleBook {
    pub fn new(config: KeybindConfiguration) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    /// A copy of the whole configuration.
    pub fn snapshot(&self) -> KeybindConfiguration {
        self.config.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Swap in a new configuration wholesale.
    pub fn replace(&self, config: KeybindConfiguration) {
        *self.config.write().unwrap_or_else(|p| p.into_inner()) = config;
    }

    /// Mutate the configuration under the write lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut KeybindConfiguration) -> R) -> R {
        f(&mut self.config.write().unwrap_or_else(|p| p.into_inner()))
    }

    pub fn has_rule(&self, process_name: &str) -> bool {
        self.rule(process_name).is_some()
    }

    pub fn rule(&self, process_name: &str) -> Option<PersistentAppRule> {
        self.config
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .rule(process_name)
            .cloned()
    }

    pub fn rules(&self) -> Vec<PersistentAppRule> {
        self.config
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .persistent_app_assignments
            .clone()
    }
}

/// Errors from rule editing.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// The updated configuration could not be saved.  The in-memory copy
    /// keeps the change so the save can be retried.
    #[error("failed to save configuration: {0}")]
    ConfigSave(String),
}

/// Outcome of one [`reconcile_all`](PersistentAppTracker::reconcile_all) pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Rules whose process was running.
    pub matched_rules: usize,
    /// Windows newly assigned.
    pub assigned: usize,
    /// Windows or processes that failed and were skipped.
    pub failed: usize,
}

/// Keeps persistent rules and replays them.
pub struct PersistentAppTracker<W, P, D, C> {
    orchestrator: DesktopOrchestrator<W, P, D>,
    config_store: Arc<C>,
    rules: Arc<RuleBook>,
    pacing: Duration,
    events: Mutex<Option<mpsc::Sender<EngineEvent>>>,
}

impl<W, P, D, C> PersistentAppTracker<W, P, D, C>
where
    W: WindowSystem + 'static,
    P: ProcessInspector + 'static,
    D: DesktopDriver + 'static,
    C: ConfigStore + 'static,
{
    /// Create a tracker sharing `rules` with the orchestrator.
    pub fn new(orchestrator: DesktopOrchestrator<W, P, D>, config_store: Arc<C>, rules: Arc<RuleBook>) -> Self {
        Self {
            orchestrator,
            config_store,
            rules,
            pacing: DEFAULT_RECONCILE_PACING,
            events: Mutex::new(None),
        }
    }

    /// Set the pause between successive reconciliation assignments.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Send [`EngineEvent::RuleAdded`] / [`EngineEvent::RuleRemoved`] here.
    pub fn set_event_sink(&self, tx: mpsc::Sender<EngineEvent>) {
        *self.events.lock().unwrap_or_else(|p| p.into_inner()) = Some(tx);
    }

    /// Assign every running, not-yet-assigned window of every ruled process
    /// to its rule's slot.
    ///
    /// Failures for one process or window are logged and counted; they do
    /// not stop the pass.
    pub fn reconcile_all(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let rules = self.rules.rules();
        if rules.is_empty() {
            return report;
        }

        let running: HashSet<String> = self
            .orchestrator
            .processes()
            .running_process_names()
            .into_iter()
            .map(|n| n.to_lowercase())
            .collect();
        debug!("reconciling {} rule(s) against {} process name(s)", rules.len(), running.len());

        let mut first = true;
        for rule in &rules {
            if !running.contains(&rule.process_name.to_lowercase()) {
                continue;
            }
            report.matched_rules += 1;

            let windows = match self.orchestrator.windows().windows_of_process(&rule.process_name) {
                Ok(windows) => windows,
                Err(e) => {
                    warn!("cannot list windows of {}: {}", rule.process_name, e);
                    report.failed += 1;
                    continue;
                }
            };

            for window in windows {
                if window.title.trim().is_empty() {
                    continue;
                }
                if self.orchestrator.store().contains_window(window.handle) {
                    continue;
                }
                if !first && !self.pacing.is_zero() {
                    std::thread::sleep(self.pacing);
                }
                first = false;
                match self.orchestrator.assign_window(rule.slot, &window, &rule.process_name) {
                    Ok(_) => report.assigned += 1,
                    Err(e) => {
                        warn!("failed to auto-assign {} ({}): {}", rule.process_name, window.handle, e);
                        report.failed += 1;
                    }
                }
            }
        }
        info!(
            "reconciled persistent apps: {} running, {} assigned, {} failed",
            report.matched_rules, report.assigned, report.failed
        );
        report
    }

    /// Save a rule for `process_name`, replacing any existing one.
    ///
    /// On a save failure the rule stays in memory and the error is returned.
    pub fn add_rule(
        &self,
        process_name: &str,
        slot: DesktopSlot,
        description: Option<String>,
    ) -> Result<PersistentAppRule, TrackerError> {
        let rule = PersistentAppRule::new(process_name, slot, description);
        let snapshot = self.rules.update(|c| {
            c.upsert_rule(rule.clone());
            c.clone()
        });
        self.save(&snapshot)?;
        info!("saved persistent rule: {}", rule.description);
        self.emit(EngineEvent::RuleAdded {
            process_name: rule.process_name.clone(),
            slot,
        });
        Ok(rule)
    }

    /// Delete the rule for `process_name`.
    ///
    /// Returns `Ok(false)` without saving if there was no such rule.
    pub fn remove_rule(&self, process_name: &str) -> Result<bool, TrackerError> {
        let snapshot = self
            .rules
            .update(|c| c.remove_rule(process_name).then(|| c.clone()));
        let Some(snapshot) = snapshot else {
            debug!("no persistent rule for {}", process_name);
            return Ok(false);
        };
        self.save(&snapshot)?;
        info!("removed persistent rule for {}", process_name);
        self.emit(EngineEvent::RuleRemoved {
            process_name: process_name.to_string(),
        });
        Ok(true)
    }

    pub fn has_rule(&self, process_name: &str) -> bool {
        self.rules.has_rule(process_name)
    }

    pub fn get_rule(&self, process_name: &str) -> Option<PersistentAppRule> {
        self.rules.rule(process_name)
    }

    pub fn get_all_rules(&self) -> Vec<PersistentAppRule> {
        self.rules.rules()
    }

    /// Discard the in-memory configuration and re-read it from the store.
    pub fn reload(&self) -> KeybindConfiguration {
        let config = self.config_store.load();
        self.rules.replace(config.clone());
        debug!("reloaded {} persistent rule(s)", config.persistent_app_assignments.len());
        config
    }

    /// Run [`reconcile_all`](Self::reconcile_all) on a background thread.
    pub fn reconcile_in_background(self: &Arc<Self>) -> std::io::Result<JoinHandle<ReconcileReport>> {
        let this = Arc::clone(self);
        std::thread::Builder::new()
            .name("glasspane-reconcile".into())
            .spawn(move || this.reconcile_all())
    }

    fn save(&self, config: &KeybindConfiguration) -> Result<(), TrackerError> {
        self.config_store
            .save(config)
            .map_err(|e| TrackerError::ConfigSave(e.to_string()))
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(ref tx) = *self.events.lock().unwrap_or_else(|p| p.into_inner()) {
            let _ = tx.send(event);
        }
    }
}
