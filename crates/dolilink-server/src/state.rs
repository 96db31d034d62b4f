//! Application state for the admin API.

use std::sync::{Arc, RwLock};

use dolilink_core::engine::LinkEngine;
use dolilink_core::page::PageDocument;

use crate::settings::SettingsStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The link-patching engine.
    pub engine: LinkEngine,
    /// Settings persistence.
    pub settings: SettingsStore,
}

impl AppState {
    /// Creates application state, applying the store's rule set to the
    /// engine.
    pub fn new(engine: LinkEngine, settings: SettingsStore) -> Self {
        engine.set_rule_set(settings.rule_set());
        Self { engine, settings }
    }

    /// Creates state over a fresh empty document with memory-only
    /// settings. Used by tests.
    pub fn in_memory() -> Self {
        let doc = Arc::new(RwLock::new(PageDocument::new()));
        Self::new(LinkEngine::new(doc), SettingsStore::in_memory())
    }
}
