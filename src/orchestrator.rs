//! The two user-facing actions: *assign the active window to a slot* and
//! *switch to a slot*.
//!
//! [`DesktopOrchestrator`] sequences calls to the [`WindowSystem`],
//! [`ProcessInspector`] and [`DesktopDriver`] collaborators and records
//! results in the shared [`AssignmentStore`].
//!
//! Assigning runs inline on the caller's thread.  Switching comes in two
//! flavours that share one sequence: [`switch_to_slot`] blocks until the
//! window has been refocused, [`switch_to_slot_async`] does the same work on
//! a background thread so the message loop stays responsive while the
//! desktop driver is busy.
//!
//! [`switch_to_slot`]: DesktopOrchestrator::switch_to_slot
//! [`switch_to_slot_async`]: DesktopOrchestrator::switch_to_slot_async

use crate::command::{DesktopSlot, ProcessWindow, WindowHandle};
use crate::store::{AssignmentStore, WindowAssignment};
use crate::traits::{DesktopDriver, EngineEvent, ProcessInspector, WindowSystem, UNKNOWN_PROCESS};
use crate::tracker::RuleBook;
use log::{debug, info, warn};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Default pause between the desktop switch and the refocus.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(50);

/// Possible errors from the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Nothing has keyboard focus.
    #[error("no foreground window")]
    NoForegroundWindow,

    /// The slot has no window assigned.
    #[error("no window assigned to desktop {0}")]
    NoAssignment(DesktopSlot),

    /// The desktop driver returned an error.
    #[error("desktop driver error: {0}")]
    DesktopDriver(String),

    /// The window system returned an error.
    #[error("window system error: {0}")]
    WindowSystem(String),

    /// A background switch could not be started or did not finish.
    #[error("switch worker failed: {0}")]
    Worker(String),
}

/// Handle to a switch running on a background thread.
///
/// Dropping it detaches the thread; a failure is still reported through the
/// orchestrator's event sink as [`EngineEvent::SwitchFailed`].
pub struct SwitchTask {
    slot: DesktopSlot,
    handle: JoinHandle<Result<(), OrchestratorError>>,
}

impl SwitchTask {
    pub fn slot(&self) -> DesktopSlot {
        self.slot
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the switch to finish.
    pub fn join(self) -> Result<(), OrchestratorError> {
        self.handle
            .join()
            .unwrap_or_else(|_| Err(OrchestratorError::Worker("switch thread panicked".into())))
    }
}

/// Executes assign and switch against the OS collaborators.
///
/// Cheap to clone: every clone shares the same collaborators, store and
/// event sink.
pub struct DesktopOrchestrator<W, P, D> {
    windows: Arc<W>,
    processes: Arc<P>,
    desktops: Arc<D>,
    store: Arc<AssignmentStore>,
    rules: Arc<RuleBook>,
    settle_delay: Duration,
    events: Arc<Mutex<Option<mpsc::Sender<EngineEvent>>>>,
}

impl<W, P, D> Clone for DesktopOrchestrator<W, P, D> {
    fn clone(&self) -> Self {
        Self {
            windows: Arc::clone(&self.windows),
            processes: Arc::clone(&self.processes),
            desktops: Arc::clone(&self.desktops),
            store: Arc::clone(&self.store),
            rules: Arc::clone(&self.rules),
            settle_delay: self.settle_delay,
            events: Arc::clone(&self.events),
        }
    }
}

impl<W, P, D> DesktopOrchestrator<W, P, D>
where
    W: WindowSystem + 'static,
    P: ProcessInspector + 'static,
    D: DesktopDriver + 'static,
{
    /// Create an orchestrator over the given collaborators.
    ///
    /// `rules` is consulted after each assignment to decide whether to offer
    /// persisting it.
    pub fn new(
        windows: Arc<W>,
        processes: Arc<P>,
        desktops: Arc<D>,
        store: Arc<AssignmentStore>,
        rules: Arc<RuleBook>,
    ) -> Self {
        Self {
            windows,
            processes,
            desktops,
            store,
            rules,
            settle_delay: DEFAULT_SETTLE_DELAY,
            events: Arc::new(Mutex::new(None)),
        }
    }

    /// Set the pause between the desktop switch and the refocus.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Attach an event channel.
    ///
    /// The orchestrator will send [`EngineEvent::Assigned`] after every
    /// assignment, [`EngineEvent::PersistOffered`] when the assigned process
    /// has no persistent rule, and [`EngineEvent::SwitchFailed`] when a
    /// background switch fails.
    pub fn set_event_sink(&self, tx: mpsc::Sender<EngineEvent>) {
        *self.events.lock().unwrap_or_else(|p| p.into_inner()) = Some(tx);
    }

    pub fn windows(&self) -> &W {
        &self.windows
    }

    pub fn processes(&self) -> &P {
        &self.processes
    }

    pub fn store(&self) -> &Arc<AssignmentStore> {
        &self.store
    }

    /// Assign the foreground window to `slot`.
    ///
    /// Fails with [`OrchestratorError::NoForegroundWindow`] if nothing is
    /// focused.  Nothing is stored unless every step before the store
    /// succeeds.
    pub fn assign_active_window(&self, slot: DesktopSlot) -> Result<WindowAssignment, OrchestratorError> {
        let fg = self
            .windows
            .foreground_window()
            .map_err(|e| OrchestratorError::WindowSystem(e.to_string()))?
            .ok_or(OrchestratorError::NoForegroundWindow)?;
        let process_name = self.processes.name_of(fg.pid);
        let window = ProcessWindow {
            handle: fg.handle,
            title: fg.title,
        };
        self.assign_window(slot, &window, &process_name)
    }

    /// Assign a specific window to `slot`.
    ///
    /// Makes sure the OS has at least `slot` desktops, stores the
    /// assignment (replacing any previous one for the slot) and offers to
    /// persist the process → slot mapping if no rule exists yet.
    pub fn assign_window(
        &self,
        slot: DesktopSlot,
        window: &ProcessWindow,
        process_name: &str,
    ) -> Result<WindowAssignment, OrchestratorError> {
        self.ensure_desktop_exists(slot)?;

        let assignment = WindowAssignment::new(slot, window.handle, window.title.clone(), process_name);
        if let Some(previous) = self.store.upsert(slot, assignment.clone()) {
            debug!("desktop {} replaced {}", slot, previous);
        }
        info!("assigned {}", assignment);
        self.emit(EngineEvent::Assigned(assignment.clone()));

        // A rule for the placeholder name could never match a process.
        if process_name != UNKNOWN_PROCESS && !self.rules.has_rule(process_name) {
            self.emit(EngineEvent::PersistOffered {
                process_name: process_name.to_string(),
                slot,
            });
        }
        Ok(assignment)
    }

    /// Switch to `slot`'s desktop and refocus its window, blocking until
    /// done.
    ///
    /// Fails with [`OrchestratorError::NoAssignment`] (without touching the
    /// desktop driver) if the slot is empty.
    pub fn switch_to_slot(&self, slot: DesktopSlot) -> Result<(), OrchestratorError> {
        let assignment = self
            .store
            .get(slot)
            .ok_or(OrchestratorError::NoAssignment(slot))?;
        self.run_switch(&assignment)
    }

    /// Like [`switch_to_slot`](Self::switch_to_slot), but the driver calls
    /// and the refocus run on a background thread.
    ///
    /// The empty-slot check happens before this returns.
    pub fn switch_to_slot_async(&self, slot: DesktopSlot) -> Result<SwitchTask, OrchestratorError> {
        let assignment = self
            .store
            .get(slot)
            .ok_or(OrchestratorError::NoAssignment(slot))?;
        let this = self.clone();
        let handle = std::thread::Builder::new()
            .name(format!("glasspane-switch-{}", slot))
            .spawn(move || {
                let result = this.run_switch(&assignment);
                if let Err(ref e) = result {
                    warn!("switch to desktop {} failed: {}", slot, e);
                    this.emit(EngineEvent::SwitchFailed {
                        slot,
                        reason: e.to_string(),
                    });
                }
                result
            })
            .map_err(|e| OrchestratorError::Worker(e.to_string()))?;
        Ok(SwitchTask { slot, handle })
    }

    /// Create desktops until there are at least `slot` of them.
    fn ensure_desktop_exists(&self, slot: DesktopSlot) -> Result<(), OrchestratorError> {
        let wanted = usize::from(slot.get());
        let mut count = self
            .desktops
            .count()
            .map_err(|e| OrchestratorError::DesktopDriver(e.to_string()))?;
        while count < wanted {
            debug!("creating desktop {} (have {})", count + 1, count);
            self.desktops
                .create_one()
                .map_err(|e| OrchestratorError::DesktopDriver(e.to_string()))?;
            count += 1;
        }
        Ok(())
    }

    /// The shared switch sequence: desktop first, then the window.
    fn run_switch(&self, assignment: &WindowAssignment) -> Result<(), OrchestratorError> {
        info!("switch to {}", assignment.desktop_name());
        self.desktops
            .switch_to(assignment.slot.index())
            .map_err(|e| OrchestratorError::DesktopDriver(e.to_string()))?;
        if !self.settle_delay.is_zero() {
            std::thread::sleep(self.settle_delay);
        }
        // The desktop switch already happened; a window that went away
        // must not turn that into a failure.
        if let Err(e) = self.refocus(assignment.handle) {
            warn!("could not refocus {}: {}", assignment.handle, e);
        }
        Ok(())
    }

    /// Focus, restore and maximize `handle`.  A closed window is skipped.
    fn refocus(&self, handle: WindowHandle) -> Result<(), W::Error> {
        if !self.windows.is_visible(handle)? {
            debug!("window {} is gone, skipping refocus", handle);
            return Ok(());
        }
        if !self.windows.focus(handle)? {
            debug!("focus request for {} was refused", handle);
        }
        if self.windows.is_minimized(handle)? {
            self.windows.restore(handle)?;
        }
        if !self.windows.is_maximized(handle)? {
            self.windows.maximize(handle)?;
        }
        Ok(())
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(ref tx) = *self.events.lock().unwrap_or_else(|p| p.into_inner()) {
            let _ = tx.send(event);
        }
    }
}
