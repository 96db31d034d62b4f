//! Settings persistence for the admin API.
//!
//! Settings are the wire form of the rule set (a JSON-encoded rule array)
//! plus the enabled flag, kept in memory and optionally mirrored to a JSON
//! file so they survive restarts. With no path configured the store is
//! memory-only, which is what the tests use.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use dolilink_core::rules::RuleSet;

/// Settings persistence errors.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Reading or writing the settings file failed.
    #[error("settings io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing the settings failed.
    #[error("settings serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The persisted settings payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSettings {
    /// JSON-encoded rule array, as it travels over the wire.
    pub rules: String,
    /// Whether link patching is enabled.
    pub enabled: bool,
}

impl Default for StoredSettings {
    fn default() -> Self {
        Self {
            rules: RuleSet::defaults().to_wire(),
            enabled: true,
        }
    }
}

/// In-memory settings with optional file persistence.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    current: Arc<RwLock<StoredSettings>>,
}

impl SettingsStore {
    /// Creates a memory-only store with the default settings.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            current: Arc::new(RwLock::new(StoredSettings::default())),
        }
    }

    /// Creates a store backed by the given file, loading it if present.
    ///
    /// A missing file is not an error; a malformed one falls back to the
    /// defaults with a warning. Either way the path is kept for saves.
    pub fn load_or_default(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    info!(path = %path.display(), "loaded settings");
                    settings
                }
                Err(e) => {
                    warn!("malformed settings file, using defaults: {}", e);
                    StoredSettings::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoredSettings::default(),
            Err(e) => {
                warn!("failed to read settings file, using defaults: {}", e);
                StoredSettings::default()
            }
        };
        Self {
            path: Some(path),
            current: Arc::new(RwLock::new(current)),
        }
    }

    /// Returns a copy of the current settings.
    pub fn current(&self) -> StoredSettings {
        self.current.read().unwrap().clone()
    }

    /// Parses the current settings into a rule set, falling back to the
    /// defaults if the stored rules are malformed.
    pub fn rule_set(&self) -> RuleSet {
        let settings = self.current();
        RuleSet::from_wire_or_default(&settings.rules, settings.enabled)
    }

    /// Replaces the current settings, writing them to the backing file if
    /// one is configured.
    pub fn save(&self, settings: StoredSettings) -> Result<(), SettingsError> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_string_pretty(&settings)?)?;
        }
        *self.current.write().unwrap() = settings;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_store_starts_with_defaults() {
        let store = SettingsStore::in_memory();
        let settings = store.current();
        assert!(settings.enabled);
        assert_eq!(store.rule_set(), RuleSet::defaults());
    }

    #[test]
    fn save_updates_current_settings() {
        let store = SettingsStore::in_memory();
        let saved = StoredSettings {
            rules: r#"[{"type": "title", "value": "ERP"}]"#.to_string(),
            enabled: false,
        };
        store.save(saved.clone()).unwrap();
        assert_eq!(store.current(), saved);
        assert!(!store.rule_set().enabled);
        assert_eq!(store.rule_set().len(), 1);
    }

    #[test]
    fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::load_or_default(&path);
        let saved = StoredSettings {
            rules: r#"[{"type": "hrefContains", "value": "/erp/"}]"#.to_string(),
            enabled: true,
        };
        store.save(saved.clone()).unwrap();

        let reloaded = SettingsStore::load_or_default(&path);
        assert_eq!(reloaded.current(), saved);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::load_or_default(dir.path().join("absent.json"));
        assert_eq!(store.current(), StoredSettings::default());
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();

        let store = SettingsStore::load_or_default(&path);
        assert_eq!(store.current(), StoredSettings::default());
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let store = SettingsStore::load_or_default(&path);
        store.save(StoredSettings::default()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn malformed_stored_rules_fall_back_in_rule_set() {
        let store = SettingsStore::in_memory();
        store
            .save(StoredSettings {
                rules: "not json".to_string(),
                enabled: false,
            })
            .unwrap();
        let rules = store.rule_set();
        assert_eq!(rules.rules, RuleSet::defaults().rules);
        assert!(!rules.enabled);
    }
}
