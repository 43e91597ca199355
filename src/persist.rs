//! `keybinds.json` on disk.
//!
//! [`JsonConfigStore`] is the [`ConfigStore`] used by the daemon.  Loading
//! never fails: a missing or unreadable file yields the default
//! configuration, and whatever is loaded is normalized so every slot has
//! both bindings.  Saving writes pretty-printed JSON and reports errors.

use crate::keybind::KeybindConfiguration;
use crate::traits::ConfigStore;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// Errors produced when saving or resetting the keybinds file.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json encode error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A [`ConfigStore`] backed by one JSON file.
#[derive(Debug, Clone)]
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The store at `$XDG_CONFIG_HOME/glasspane/keybinds.json`.
    pub fn in_config_dir() -> Self {
        Self::new(crate::config::config_dir().join("keybinds.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the saved file so the next load returns defaults.
    pub fn reset_to_defaults(&self) -> Result<(), PersistError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("removed {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PersistError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn read(&self) -> Result<KeybindConfiguration, String> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| e.to_string())?;
        serde_json::from_str(&contents).map_err(|e| e.to_string())
    }
}

impl ConfigStore for JsonConfigStore {
    type Error = PersistError;

    fn load(&self) -> KeybindConfiguration {
        let mut config = if self.path.exists() {
            match self.read() {
                Ok(config) => {
                    debug!("loaded keybinds from {}", self.path.display());
                    config
                }
                Err(e) => {
                    warn!("unreadable {} ({}), using defaults", self.path.display(), e);
                    KeybindConfiguration::default()
                }
            }
        } else {
            info!("no keybinds file at {}, using defaults", self.path.display());
            KeybindConfiguration::default()
        };
        let added = config.ensure_all_keybinds_exist();
        if added > 0 {
            debug!("filled in {} default keybind(s)", added);
        }
        config
    }

    fn save(&self, config: &KeybindConfiguration) -> Result<(), PersistError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| PersistError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.path, json).map_err(|source| PersistError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!("saved keybinds to {}", self.path.display());
        Ok(())
    }

    fn reset(&self) -> Result<(), PersistError> {
        self.reset_to_defaults()
    }
}
