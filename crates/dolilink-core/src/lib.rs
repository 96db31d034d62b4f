//! Dolilink Core - same-tab link patching engine.
//!
//! This crate provides the engine behind Dolilink: it mirrors a page into
//! an owned document model, matches anchor links against configurable
//! rules, and patches matching links so they open in the current browsing
//! context instead of a new tab. Patches are fully reversible and tracked
//! for the admin surface.
//!
//! ## Components
//!
//! - [`rules`] - case-insensitive substring rules over link fields
//! - [`page`] - the in-memory page document with opaque node handles
//! - [`registry`] - the patch/unpatch lifecycle and click interception
//! - [`engine`] - scanning, dry runs, and the shared engine state
//! - [`watcher`] - debounced rescans driven by document mutations
//! - [`status`] - the read-only snapshot the admin collaborator polls
//! - [`remote`] - the settings-endpoint client with default fallback
//!
//! ## Example
//!
//! ```
//! use std::sync::{Arc, RwLock};
//!
//! use dolilink_core::engine::LinkEngine;
//! use dolilink_core::page::PageDocument;
//!
//! let doc = Arc::new(RwLock::new(PageDocument::new()));
//! {
//!     let mut doc = doc.write().unwrap();
//!     let root = doc.root();
//!     doc.append_link(root, "/dolibarr/index.php", "Dolibarr");
//! }
//!
//! let engine = LinkEngine::new(doc);
//! let outcome = engine.scan();
//! assert_eq!(outcome.newly_patched, 1);
//! ```

pub mod engine;
pub mod page;
pub mod registry;
pub mod remote;
pub mod rules;
pub mod status;
pub mod watcher;

pub use engine::{EngineConfig, LinkEngine, MatchedLink, ScanOutcome, TestOutcome};
pub use page::{ClickEvent, ClickOutcome, DocumentEvent, MouseButton, Navigation, NodeId, PageDocument};
pub use registry::{PatchRecord, PatchRegistry};
pub use remote::{SettingsClient, SettingsFetchError};
pub use rules::{LinkFields, LinkRule, RuleKind, RuleSet};
pub use status::{PatchedLink, StatusSnapshot};
pub use watcher::ChangeWatcher;
