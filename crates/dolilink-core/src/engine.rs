//! Scan engine: applies the active rule set to the document and owns the
//! shared engine state.
//!
//! [`LinkEngine`] is a clonable handle over the document and the mutable
//! engine state (rules, patch registry, last-scan time). All clones share
//! state; mutation is confined behind the two locks, and every patch or
//! unpatch holds the write locks for its whole duration, so scans never
//! interleave element-by-element.

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

use crate::page::{DocumentEvent, NodeId, PageDocument};
use crate::registry::{PatchRegistry, PATCHED_ATTR};
use crate::rules::RuleSet;
use crate::status::{PatchedLink, StatusSnapshot};

/// Marker attribute set on dry-run matches for transient highlighting.
pub const HIGHLIGHT_ATTR: &str = "data-dolilink-highlight";

/// Default settling delay between a document mutation and the rescan it
/// triggers.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(200);

/// Default duration a dry-run highlight stays on a matched link.
pub const DEFAULT_HIGHLIGHT_DURATION: Duration = Duration::from_secs(3);

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Settling delay used by the change watcher.
    pub settle_delay: Duration,
    /// How long dry-run highlights stay before reverting.
    pub highlight_duration: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            highlight_duration: DEFAULT_HIGHLIGHT_DURATION,
        }
    }
}

impl EngineConfig {
    /// Sets the settling delay.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Sets the highlight duration.
    pub fn with_highlight_duration(mut self, duration: Duration) -> Self {
        self.highlight_duration = duration;
        self
    }
}

/// Result of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    /// How many links this scan newly patched.
    pub newly_patched: usize,
}

/// A link matched by a dry run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedLink {
    /// The href attribute.
    pub href: String,
    /// The trimmed text content.
    pub text: String,
    /// The title attribute.
    pub title: String,
}

/// Result of a dry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    /// How many links matched.
    pub count: usize,
    /// The matched links, in document order.
    pub matched: Vec<MatchedLink>,
}

#[derive(Debug)]
struct EngineState {
    rules: RuleSet,
    registry: PatchRegistry,
    last_scan: Option<DateTime<Utc>>,
    highlighted: Vec<NodeId>,
}

/// Clonable handle to the link-patching engine.
#[derive(Clone)]
pub struct LinkEngine {
    doc: Arc<RwLock<PageDocument>>,
    state: Arc<RwLock<EngineState>>,
    config: EngineConfig,
}

impl fmt::Debug for LinkEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read().unwrap();
        f.debug_struct("LinkEngine")
            .field("enabled", &state.rules.enabled)
            .field("rules", &state.rules.len())
            .field("patched", &state.registry.len())
            .field("last_scan", &state.last_scan)
            .finish()
    }
}

impl LinkEngine {
    /// Creates an engine over the given document, starting with the
    /// built-in default rule set.
    pub fn new(doc: Arc<RwLock<PageDocument>>) -> Self {
        Self::with_config(doc, EngineConfig::default())
    }

    /// Creates an engine with a custom configuration.
    pub fn with_config(doc: Arc<RwLock<PageDocument>>, config: EngineConfig) -> Self {
        Self {
            doc,
            state: Arc::new(RwLock::new(EngineState {
                rules: RuleSet::defaults(),
                registry: PatchRegistry::new(),
                last_scan: None,
                highlighted: Vec::new(),
            })),
            config,
        }
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns a handle to the underlying document.
    pub fn document(&self) -> Arc<RwLock<PageDocument>> {
        Arc::clone(&self.doc)
    }

    /// Subscribes to the document's structural change events.
    pub fn subscribe(&self) -> UnboundedReceiver<DocumentEvent> {
        self.doc.write().unwrap().subscribe()
    }

    /// Replaces the active rule set.
    ///
    /// Does not rescan; callers decide when (the admin save handler
    /// rescans immediately, the startup path scans after loading).
    pub fn set_rule_set(&self, rules: RuleSet) {
        let mut state = self.state.write().unwrap();
        info!(rules = rules.len(), enabled = rules.enabled, "rule set replaced");
        state.rules = rules;
    }

    /// Returns a copy of the active rule set.
    pub fn rule_set(&self) -> RuleSet {
        self.state.read().unwrap().rules.clone()
    }

    /// Returns whether the active rule set is enabled.
    pub fn enabled(&self) -> bool {
        self.state.read().unwrap().rules.enabled
    }

    /// Returns the number of currently patched links.
    pub fn patched_count(&self) -> usize {
        self.state.read().unwrap().registry.len()
    }

    /// Returns when the last scan completed.
    pub fn last_scan(&self) -> Option<DateTime<Utc>> {
        self.state.read().unwrap().last_scan
    }

    /// Scans the document and patches every not-yet-patched link the rules
    /// match, in document order.
    ///
    /// A disabled rule set returns immediately with zero effect. An
    /// enabled scan stamps the last-scan time even when nothing matched;
    /// previously patched links are never re-examined, so repeated scans
    /// are safe.
    pub fn scan(&self) -> ScanOutcome {
        let mut doc = self.doc.write().unwrap();
        let mut state = self.state.write().unwrap();
        if !state.rules.enabled {
            debug!("rule set disabled, skipping scan");
            return ScanOutcome { newly_patched: 0 };
        }

        let rules = state.rules.clone();
        let candidates: Vec<NodeId> = doc
            .links()
            .into_iter()
            .filter(|id| doc.attr(*id, PATCHED_ATTR).is_none())
            .collect();

        let mut newly_patched = 0;
        for id in candidates {
            if state.registry.patch(&mut doc, id, &rules) {
                newly_patched += 1;
            }
        }
        state.last_scan = Some(Utc::now());

        if newly_patched > 0 {
            info!(
                newly_patched,
                total = state.registry.len(),
                "scan patched links"
            );
        } else {
            debug!("scan found no new links to patch");
        }
        ScanOutcome { newly_patched }
    }

    /// Evaluates the rules over every link (patched or not) without
    /// changing any patch state.
    ///
    /// Matched links get a transient highlight marker; call
    /// [`clear_highlights`](Self::clear_highlights) (or use
    /// [`test_rules_with_revert`](Self::test_rules_with_revert)) to remove
    /// it.
    pub fn test_rules(&self) -> TestOutcome {
        let mut doc = self.doc.write().unwrap();
        let mut state = self.state.write().unwrap();
        let rules = state.rules.clone();

        let mut matched = Vec::new();
        for id in doc.links() {
            let fields = match doc.link_fields(id) {
                Some(fields) => fields,
                None => continue,
            };
            if rules.matches(&fields) {
                doc.set_attr(id, HIGHLIGHT_ATTR, "1");
                state.highlighted.push(id);
                matched.push(MatchedLink {
                    href: fields.href,
                    text: fields.text.trim().to_string(),
                    title: fields.title,
                });
            }
        }
        debug!(count = matched.len(), "dry run evaluated rules");
        TestOutcome {
            count: matched.len(),
            matched,
        }
    }

    /// Runs a dry run and schedules the highlight markers to revert after
    /// the configured duration. Must be called within a tokio runtime.
    pub fn test_rules_with_revert(&self) -> TestOutcome {
        let outcome = self.test_rules();
        if outcome.count > 0 {
            let engine = self.clone();
            let duration = self.config.highlight_duration;
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                engine.clear_highlights();
            });
        }
        outcome
    }

    /// Removes all outstanding dry-run highlight markers.
    pub fn clear_highlights(&self) {
        let mut doc = self.doc.write().unwrap();
        let mut state = self.state.write().unwrap();
        for id in state.highlighted.drain(..) {
            doc.remove_attr(id, HIGHLIGHT_ATTR);
        }
    }

    /// Unpatches the link at `index`. See [`PatchRegistry::unpatch`] for
    /// the index-shift contract.
    pub fn unpatch_link(&self, index: usize) -> bool {
        let mut doc = self.doc.write().unwrap();
        let mut state = self.state.write().unwrap();
        state.registry.unpatch(&mut doc, index)
    }

    /// Unpatches every patched link, best effort.
    pub fn clear_all_patched(&self) {
        let mut doc = self.doc.write().unwrap();
        let mut state = self.state.write().unwrap();
        state.registry.unpatch_all(&mut doc);
    }

    /// Returns a copy-on-read snapshot of the engine's observable state.
    pub fn status(&self) -> StatusSnapshot {
        let state = self.state.read().unwrap();
        StatusSnapshot {
            last_scan: state.last_scan,
            enabled: state.rules.enabled,
            patched_count: state.registry.len(),
            patched_links: state
                .registry
                .records()
                .iter()
                .map(PatchedLink::from)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::ClickEvent;
    use crate::rules::LinkRule;

    fn new_engine() -> LinkEngine {
        LinkEngine::new(Arc::new(RwLock::new(PageDocument::new())))
    }

    fn seed_matching_link(engine: &LinkEngine, href: &str) -> NodeId {
        let doc = engine.document();
        let mut doc = doc.write().unwrap();
        let root = doc.root();
        doc.append_link(root, href, "Dolibarr")
    }

    #[test]
    fn scan_patches_matching_links_once() {
        let engine = new_engine();
        seed_matching_link(&engine, "/dolibarr/a");
        seed_matching_link(&engine, "/dolibarr/b");

        assert_eq!(engine.scan().newly_patched, 2);
        assert_eq!(engine.patched_count(), 2);

        // A second scan with no document change patches nothing further.
        assert_eq!(engine.scan().newly_patched, 0);
        assert_eq!(engine.patched_count(), 2);
    }

    #[test]
    fn scan_ignores_non_matching_links() {
        let engine = new_engine();
        {
            let doc = engine.document();
            let mut doc = doc.write().unwrap();
            let root = doc.root();
            doc.append_link(root, "/files/", "Files");
        }
        assert_eq!(engine.scan().newly_patched, 0);
        assert_eq!(engine.patched_count(), 0);
    }

    #[test]
    fn disabled_scan_has_zero_effect() {
        let engine = new_engine();
        seed_matching_link(&engine, "/dolibarr/a");
        engine.set_rule_set(RuleSet::defaults().with_enabled(false));

        assert_eq!(engine.scan().newly_patched, 0);
        assert_eq!(engine.patched_count(), 0);
        assert!(engine.last_scan().is_none());
    }

    #[test]
    fn enabled_scan_stamps_time_even_with_zero_matches() {
        let engine = new_engine();
        assert_eq!(engine.scan().newly_patched, 0);
        assert!(engine.last_scan().is_some());
    }

    #[test]
    fn scan_then_click_forces_same_tab() {
        let engine = new_engine();
        let link = seed_matching_link(&engine, "/dolibarr/index.php");
        {
            let doc = engine.document();
            doc.write().unwrap().set_attr(link, "target", "_blank");
        }
        engine.scan();

        let doc = engine.document();
        let outcome = doc
            .write()
            .unwrap()
            .dispatch_click(link, ClickEvent::primary())
            .unwrap();
        assert!(outcome.default_prevented);
        assert!(outcome.navigation.unwrap().is_same_tab());
    }

    #[test]
    fn dry_run_reports_matches_without_patching() {
        let engine = new_engine();
        let link = seed_matching_link(&engine, "/dolibarr/index.php");

        let outcome = engine.test_rules();
        assert_eq!(outcome.count, 1);
        assert_eq!(outcome.matched[0].href, "/dolibarr/index.php");
        assert_eq!(engine.patched_count(), 0);

        let doc = engine.document();
        let doc = doc.read().unwrap();
        assert_eq!(doc.attr(link, HIGHLIGHT_ATTR), Some("1"));
        assert_eq!(doc.listener_count(link), 0);
    }

    #[test]
    fn dry_run_examines_already_patched_links_too() {
        let engine = new_engine();
        seed_matching_link(&engine, "/dolibarr/index.php");
        engine.scan();
        assert_eq!(engine.patched_count(), 1);

        let outcome = engine.test_rules();
        assert_eq!(outcome.count, 1);
        assert_eq!(engine.patched_count(), 1);
    }

    #[test]
    fn dry_run_with_disabled_rules_matches_nothing() {
        let engine = new_engine();
        seed_matching_link(&engine, "/dolibarr/index.php");
        engine.set_rule_set(RuleSet::defaults().with_enabled(false));

        assert_eq!(engine.test_rules().count, 0);
    }

    #[test]
    fn clear_highlights_removes_markers() {
        let engine = new_engine();
        let link = seed_matching_link(&engine, "/dolibarr/index.php");
        engine.test_rules();
        engine.clear_highlights();

        let doc = engine.document();
        assert!(doc.read().unwrap().attr(link, HIGHLIGHT_ATTR).is_none());
    }

    #[tokio::test]
    async fn dry_run_highlights_revert_after_duration() {
        let doc = Arc::new(RwLock::new(PageDocument::new()));
        let engine = LinkEngine::with_config(
            doc.clone(),
            EngineConfig::default().with_highlight_duration(Duration::from_millis(30)),
        );
        let link = seed_matching_link(&engine, "/dolibarr/index.php");

        let outcome = engine.test_rules_with_revert();
        assert_eq!(outcome.count, 1);
        assert_eq!(doc.read().unwrap().attr(link, HIGHLIGHT_ATTR), Some("1"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(doc.read().unwrap().attr(link, HIGHLIGHT_ATTR).is_none());
    }

    #[test]
    fn unpatch_link_follows_index_shift_contract() {
        let engine = new_engine();
        seed_matching_link(&engine, "/dolibarr/a");
        seed_matching_link(&engine, "/dolibarr/b");
        engine.scan();

        assert!(engine.unpatch_link(0));
        let status = engine.status();
        assert_eq!(status.patched_count, 1);
        assert_eq!(status.patched_links[0].href, "/dolibarr/b");

        assert!(engine.unpatch_link(0));
        assert_eq!(engine.patched_count(), 0);
        assert!(!engine.unpatch_link(0));
    }

    #[test]
    fn clear_all_patched_empties_registry() {
        let engine = new_engine();
        seed_matching_link(&engine, "/dolibarr/a");
        seed_matching_link(&engine, "/dolibarr/b");
        engine.scan();

        engine.clear_all_patched();
        assert_eq!(engine.patched_count(), 0);
        assert_eq!(engine.status().patched_links.len(), 0);
    }

    #[test]
    fn status_reflects_registry_and_rules() {
        let engine = new_engine();
        seed_matching_link(&engine, "/dolibarr/index.php");

        let before = engine.status();
        assert!(before.enabled);
        assert_eq!(before.patched_count, 0);
        assert!(before.last_scan.is_none());

        engine.scan();
        let after = engine.status();
        assert_eq!(after.patched_count, 1);
        assert_eq!(after.patched_links[0].href, "/dolibarr/index.php");
        assert!(after.last_scan.is_some());
    }

    #[test]
    fn clones_share_state() {
        let engine = new_engine();
        let clone = engine.clone();
        seed_matching_link(&engine, "/dolibarr/index.php");

        engine.scan();
        assert_eq!(clone.patched_count(), 1);

        clone.set_rule_set(RuleSet {
            rules: vec![LinkRule::href_contains("/elsewhere/")],
            enabled: true,
        });
        assert_eq!(engine.rule_set().rules.len(), 1);
    }
}
