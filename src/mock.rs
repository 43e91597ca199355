//! Recording test doubles for the collaborator traits.
//!
//! The window system and desktop driver share one call log so tests can
//! assert the order of operations across both.

use crate::command::{ForegroundWindow, ProcessWindow, WindowHandle};
use crate::keybind::{KeybindConfiguration, Keybinding};
use crate::traits::{
    ConfigStore, DesktopDriver, HotkeyInputSource, ProcessInspector, WindowSystem, UNKNOWN_PROCESS,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One observed collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Count,
    CreateOne,
    SwitchTo(usize),
    Focus(u64),
    Restore(u64),
    Maximize(u64),
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

#[derive(Debug, thiserror::Error)]
#[error("mock failure: {0}")]
pub struct MockError(pub &'static str);

/// Show state of one mock window.
#[derive(Debug, Clone)]
pub struct MockWindow {
    pub title: String,
    pub process: String,
    pub visible: bool,
    pub minimized: bool,
    pub maximized: bool,
}

impl MockWindow {
    pub fn new(title: &str, process: &str) -> Self {
        Self {
            title: title.into(),
            process: process.into(),
            visible: true,
            minimized: false,
            maximized: false,
        }
    }
}

pub struct MockWindows {
    pub log: CallLog,
    pub foreground: Mutex<Option<ForegroundWindow>>,
    pub windows: Mutex<HashMap<u64, MockWindow>>,
    /// Process names whose enumeration fails.
    pub failing_processes: Mutex<Vec<String>>,
}

impl MockWindows {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            foreground: Mutex::new(None),
            windows: Mutex::new(HashMap::new()),
            failing_processes: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, handle: u64, window: MockWindow) {
        self.windows.lock().unwrap().insert(handle, window);
    }

    pub fn set_foreground(&self, handle: u64, title: &str, pid: u32) {
        *self.foreground.lock().unwrap() = Some(ForegroundWindow {
            handle: WindowHandle(handle),
            title: title.into(),
            pid,
        });
    }

    pub fn close(&self, handle: u64) {
        self.windows.lock().unwrap().remove(&handle);
    }

    fn with<T>(&self, handle: WindowHandle, f: impl FnOnce(&mut MockWindow) -> T) -> Option<T> {
        self.windows.lock().unwrap().get_mut(&handle.0).map(f)
    }
}

impl WindowSystem for MockWindows {
    type Error = MockError;

    fn foreground_window(&self) -> Result<Option<ForegroundWindow>, MockError> {
        Ok(self.foreground.lock().unwrap().clone())
    }

    fn is_visible(&self, handle: WindowHandle) -> Result<bool, MockError> {
        Ok(self.with(handle, |w| w.visible).unwrap_or(false))
    }

    fn is_minimized(&self, handle: WindowHandle) -> Result<bool, MockError> {
        self.with(handle, |w| w.minimized).ok_or(MockError("no such window"))
    }

    fn is_maximized(&self, handle: WindowHandle) -> Result<bool, MockError> {
        self.with(handle, |w| w.maximized).ok_or(MockError("no such window"))
    }

    fn focus(&self, handle: WindowHandle) -> Result<bool, MockError> {
        self.log.lock().unwrap().push(Call::Focus(handle.0));
        Ok(self.with(handle, |_| ()).is_some())
    }

    fn restore(&self, handle: WindowHandle) -> Result<(), MockError> {
        self.log.lock().unwrap().push(Call::Restore(handle.0));
        self.with(handle, |w| w.minimized = false);
        Ok(())
    }

    fn maximize(&self, handle: WindowHandle) -> Result<(), MockError> {
        self.log.lock().unwrap().push(Call::Maximize(handle.0));
        self.with(handle, |w| w.maximized = true);
        Ok(())
    }

    fn windows_of_process(&self, process_name: &str) -> Result<Vec<ProcessWindow>, MockError> {
        if self
            .failing_processes
            .lock()
            .unwrap()
            .iter()
            .any(|p| p.eq_ignore_ascii_case(process_name))
        {
            return Err(MockError("enumeration failed"));
        }
        let mut out: Vec<ProcessWindow> = self
            .windows
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, w)| w.visible && w.process.eq_ignore_ascii_case(process_name))
            .map(|(h, w)| ProcessWindow {
                handle: WindowHandle(*h),
                title: w.title.clone(),
            })
            .collect();
        out.sort_by_key(|w| w.handle.0);
        Ok(out)
    }
}

#[derive(Default)]
pub struct MockProcesses {
    pub names: Mutex<HashMap<u32, String>>,
    pub running: Mutex<Vec<String>>,
}

impl MockProcesses {
    pub fn with(pid: u32, name: &str) -> Self {
        let p = Self::default();
        p.names.lock().unwrap().insert(pid, name.into());
        p
    }

    pub fn set_running(&self, names: &[&str]) {
        *self.running.lock().unwrap() = names.iter().map(|n| n.to_string()).collect();
    }
}

impl ProcessInspector for MockProcesses {
    fn name_of(&self, pid: u32) -> String {
        self.names
            .lock()
            .unwrap()
            .get(&pid)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_PROCESS.to_string())
    }

    fn running_process_names(&self) -> Vec<String> {
        self.running.lock().unwrap().clone()
    }
}

pub struct MockDesktops {
    pub log: CallLog,
    pub count: Mutex<usize>,
    pub fail_count: Mutex<bool>,
    pub fail_switch: Mutex<bool>,
}

impl MockDesktops {
    pub fn new(log: CallLog, count: usize) -> Self {
        Self {
            log,
            count: Mutex::new(count),
            fail_count: Mutex::new(false),
            fail_switch: Mutex::new(false),
        }
    }
}

impl DesktopDriver for MockDesktops {
    type Error = MockError;

    fn count(&self) -> Result<usize, MockError> {
        self.log.lock().unwrap().push(Call::Count);
        if *self.fail_count.lock().unwrap() {
            return Err(MockError("count failed"));
        }
        Ok(*self.count.lock().unwrap())
    }

    fn create_one(&self) -> Result<(), MockError> {
        self.log.lock().unwrap().push(Call::CreateOne);
        *self.count.lock().unwrap() += 1;
        Ok(())
    }

    fn switch_to(&self, index: usize) -> Result<(), MockError> {
        self.log.lock().unwrap().push(Call::SwitchTo(index));
        if *self.fail_switch.lock().unwrap() {
            return Err(MockError("switch failed"));
        }
        Ok(())
    }
}

/// In-memory config store that counts saves.
pub struct MemoryConfigStore {
    pub saved: Mutex<Option<KeybindConfiguration>>,
    pub saves: Mutex<usize>,
    pub fail_save: Mutex<bool>,
}

impl MemoryConfigStore {
    pub fn new(initial: Option<KeybindConfiguration>) -> Self {
        Self {
            saved: Mutex::new(initial),
            saves: Mutex::new(0),
            fail_save: Mutex::new(false),
        }
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

impl ConfigStore for MemoryConfigStore {
    type Error = MockError;

    fn load(&self) -> KeybindConfiguration {
        let mut config = self.saved.lock().unwrap().clone().unwrap_or_default();
        config.ensure_all_keybinds_exist();
        config
    }

    fn save(&self, config: &KeybindConfiguration) -> Result<(), MockError> {
        if *self.fail_save.lock().unwrap() {
            return Err(MockError("disk full"));
        }
        *self.saves.lock().unwrap() += 1;
        *self.saved.lock().unwrap() = Some(config.clone());
        Ok(())
    }
}

/// Hotkey source that accepts everything and remembers what is live.
#[derive(Default)]
pub struct MockHotkeys {
    pub live: Mutex<HashMap<u32, Keybinding>>,
}

impl HotkeyInputSource for MockHotkeys {
    type Error = MockError;

    fn register(&self, id: u32, binding: &Keybinding) -> Result<(), MockError> {
        let mut live = self.live.lock().unwrap();
        if live.values().any(|b| b.conflicts_with(binding)) {
            return Err(MockError("combo taken"));
        }
        live.insert(id, binding.clone());
        Ok(())
    }

    fn unregister(&self, id: u32) -> Result<(), MockError> {
        self.live.lock().unwrap().remove(&id);
        Ok(())
    }
}
