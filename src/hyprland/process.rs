//! [`ProcessInspector`] backed by `sysinfo`.

use crate::traits::{ProcessInspector, UNKNOWN_PROCESS};
use log::debug;
use std::sync::Mutex;
use sysinfo::{Pid, System};

/// Reads the process table through `sysinfo`.
///
/// The table is refreshed on every call; lookups are rare (one per hotkey
/// or reconciliation pass).
pub struct SysProcesses {
    system: Mutex<System>,
}

impl Default for SysProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl SysProcesses {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn with_refreshed<T>(&self, f: impl FnOnce(&System) -> T) -> T {
        let mut system = self.system.lock().unwrap_or_else(|p| p.into_inner());
        system.refresh_processes();
        f(&system)
    }
}

impl ProcessInspector for SysProcesses {
    fn name_of(&self, pid: u32) -> String {
        self.with_refreshed(|system| match system.process(Pid::from_u32(pid)) {
            Some(process) => process.name().to_string(),
            None => {
                debug!("no process with pid {}", pid);
                UNKNOWN_PROCESS.to_string()
            }
        })
    }

    fn running_process_names(&self) -> Vec<String> {
        self.with_refreshed(|system| {
            system
                .processes()
                .values()
                .map(|p| p.name().to_string())
                .collect()
        })
    }
}
