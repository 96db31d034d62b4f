//! Patch registry: neutralizes a link's new-tab behavior and records enough
//! state to reverse it.
//!
//! Patching a link strips its `target` attribute, installs a capture-phase
//! click interceptor that forces same-document navigation, and marks the
//! element so rescans skip it. Every patch is recorded with the original
//! `target` value and the installed listener's identity, so unpatching
//! restores the element exactly and removes only the listener this registry
//! installed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::page::{ClickListener, ListenerId, MouseButton, NodeId, PageDocument};
use crate::rules::RuleSet;

/// Marker attribute set on patched elements.
pub const PATCHED_ATTR: &str = "data-dolilink-patched";

/// Marker attribute recording that a click handler is installed.
pub const HANDLER_ATTR: &str = "data-dolilink-handler";

/// One currently patched link.
#[derive(Debug, Clone)]
pub struct PatchRecord {
    /// Handle to the patched element. The registry does not own the
    /// element's lifetime; the handle may go stale when the element is
    /// detached from the document.
    pub node: NodeId,
    /// The href attribute at patch time.
    pub href: String,
    /// The trimmed text content at patch time.
    pub text: String,
    /// The title attribute at patch time.
    pub title: String,
    /// When the element was patched.
    pub patched_at: DateTime<Utc>,
    /// The `target` attribute before patching, `None` if it was absent.
    pub original_target: Option<String>,
    listener: ListenerId,
}

/// Tracks patched links and owns their installed interceptors.
#[derive(Debug, Default)]
pub struct PatchRegistry {
    records: Vec<PatchRecord>,
}

impl PatchRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current records in patch order.
    pub fn records(&self) -> &[PatchRecord] {
        &self.records
    }

    /// Returns the number of currently patched links.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no links are patched.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Patches a link if the rules match and it is not already patched.
    ///
    /// Returns false without touching the element when it already carries
    /// the patched marker or when no rule matches. Otherwise captures the
    /// original `target`, strips it, installs the same-tab click
    /// interceptor, sets the marker attributes, and records the patch.
    pub fn patch(&mut self, doc: &mut PageDocument, node: NodeId, rules: &RuleSet) -> bool {
        if doc.attr(node, PATCHED_ATTR).is_some() {
            return false;
        }
        let fields = match doc.link_fields(node) {
            Some(fields) => fields,
            None => return false,
        };
        if !rules.matches(&fields) {
            return false;
        }

        let original_target = doc.attr(node, "target").map(String::from);
        doc.remove_attr(node, "target");

        let listener = match doc.add_click_listener(node, same_tab_interceptor()) {
            Some(listener) => listener,
            None => return false,
        };
        doc.set_attr(node, PATCHED_ATTR, "1");
        doc.set_attr(node, HANDLER_ATTR, "attached");

        debug!(href = %fields.href, "patched link");
        self.records.push(PatchRecord {
            node,
            href: fields.href,
            text: fields.text.trim().to_string(),
            title: fields.title,
            patched_at: Utc::now(),
            original_target,
            listener,
        });
        true
    }

    /// Unpatches the link at `index`, restoring its pre-patch state.
    ///
    /// Returns false if no record exists at that index or the element is no
    /// longer attached to the document (the record is kept in that case).
    /// On success the record is removed and later records shift down one
    /// index; callers must not hold indices across mutations.
    pub fn unpatch(&mut self, doc: &mut PageDocument, index: usize) -> bool {
        match self.records.get(index) {
            Some(record) if doc.is_attached(record.node) => {}
            _ => return false,
        }
        let record = self.records.remove(index);
        restore(doc, &record);
        debug!(href = %record.href, "unpatched link");
        true
    }

    /// Unpatches every recorded link, best effort.
    ///
    /// Elements that are no longer attached are skipped; the collection is
    /// cleared regardless.
    pub fn unpatch_all(&mut self, doc: &mut PageDocument) {
        let records = std::mem::take(&mut self.records);
        for record in &records {
            if doc.is_attached(record.node) {
                restore(doc, record);
            }
        }
        debug!(count = records.len(), "cleared all patched links");
    }
}

/// Reverses a single patch: `target` back to its original value (or
/// removed if it was absent), marker attributes cleared, and exactly the
/// installed listener removed.
fn restore(doc: &mut PageDocument, record: &PatchRecord) {
    match &record.original_target {
        Some(target) => {
            doc.set_attr(record.node, "target", target.clone());
        }
        None => {
            doc.remove_attr(record.node, "target");
        }
    }
    doc.remove_attr(record.node, PATCHED_ATTR);
    doc.remove_attr(record.node, HANDLER_ATTR);
    doc.remove_click_listener(record.node, record.listener);
}

/// Builds the capture-phase click interceptor installed on patched links.
///
/// The interceptor abstains (letting default and later handlers proceed)
/// when the default action was already prevented, the click was not a plain
/// primary-button click, or the href is empty, an in-page fragment, or a
/// script pseudo-URL. Otherwise it prevents the default action, stops
/// propagation, and requests a same-document navigation to the current
/// href.
fn same_tab_interceptor() -> ClickListener {
    Arc::new(|event, href| {
        if event.default_prevented() {
            return;
        }
        if event.button != MouseButton::Primary {
            return;
        }
        if event.has_modifier() {
            return;
        }
        let href = href.unwrap_or("");
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            return;
        }
        event.prevent_default();
        event.stop_propagation();
        event.request_navigation(href);
    })
}
