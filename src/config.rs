//! Daemon settings.
//!
//! Settings are loaded from `$XDG_CONFIG_HOME/glasspane/config.json`.  They
//! hold timing tunables and behaviour switches; the keybinds and persistent
//! rules live separately in `keybinds.json` (see
//! [`JsonConfigStore`](crate::persist::JsonConfigStore)).
//!
//! # Example
//!
//! ```json
//! {
//!   "timing": { "settle_delay_ms": 50, "reconcile_pacing_ms": 100 },
//!   "behaviour": { "reconcile_on_startup": true, "auto_persist": false },
//!   "socket_path": "/run/user/1000/glasspane.sock"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level settings.
///
/// Every field is optional; a minimal `{}` file is valid and all sections
/// fall back to their compiled-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Delays between OS calls.
    #[serde(default)]
    pub timing: TimingConfig,

    /// What the daemon does on its own.
    #[serde(default)]
    pub behaviour: BehaviourConfig,

    /// Control socket path.  Defaults to `$XDG_RUNTIME_DIR/glasspane.sock`.
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
}

/// Delays between OS calls, in **milliseconds**.
///
/// These are pacing knobs; `0` disables the pause.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Pause between switching desktops and refocusing the window.
    pub settle_delay_ms: u64,
    /// Pause between two assignments made by one reconciliation pass.
    pub reconcile_pacing_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 50,
            reconcile_pacing_ms: 100,
        }
    }
}

impl TimingConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn reconcile_pacing(&self) -> Duration {
        Duration::from_millis(self.reconcile_pacing_ms)
    }
}

/// Behaviour switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviourConfig {
    /// Replay persistent rules once at startup.
    pub reconcile_on_startup: bool,
    /// Save a persistent rule for every newly assigned process without
    /// asking.
    pub auto_persist: bool,
}

impl Default for BehaviourConfig {
    fn default() -> Self {
        Self {
            reconcile_on_startup: true,
            auto_persist: false,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError(format!("failed to read {}: {}", path.display(), e)))?;
        let settings: Self = serde_json::from_str(&contents)
            .map_err(|e| ConfigError(format!("failed to parse {}: {}", path.display(), e)))?;
        Ok(settings)
    }
}

/// Error from loading or parsing a settings file.
#[derive(Debug, thiserror::Error)]
#[error("config error: {0}")]
pub struct ConfigError(String);

/// Resolve the config directory (`$XDG_CONFIG_HOME/glasspane`).
pub fn config_dir() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        format!("{}/.config", home)
    });
    PathBuf::from(base).join("glasspane")
}

/// Default control socket path.
pub fn default_socket_path() -> PathBuf {
    let runtime = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(runtime).join("glasspane.sock")
}
