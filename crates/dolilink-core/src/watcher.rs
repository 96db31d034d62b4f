//! Change watcher: turns document mutations into debounced rescans.
//!
//! The watcher subscribes to the document's structural event stream. When
//! an attached subtree is or contains a link element, it re-arms a single
//! trailing-edge settle deadline; when the deadline expires it runs one
//! scan. Rapid mutation bursts therefore collapse to one scan instead of
//! scheduling one per batch.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::engine::LinkEngine;
use crate::page::DocumentEvent;

/// Background task watching the document for link-bearing mutations.
///
/// Runs for the lifetime of the page. [`shutdown`](Self::shutdown) aborts
/// the task; the watcher also stops on its own when the document drops its
/// event channel.
#[derive(Debug)]
pub struct ChangeWatcher {
    handle: JoinHandle<()>,
}

impl ChangeWatcher {
    /// Spawns a watcher for the engine's document. Must be called within a
    /// tokio runtime.
    pub fn spawn(engine: LinkEngine) -> Self {
        let events = engine.subscribe();
        let settle = engine.config().settle_delay;
        let handle = tokio::spawn(watch_loop(engine, events, settle));
        Self { handle }
    }

    /// Stops the watcher.
    pub fn shutdown(&self) {
        self.handle.abort();
    }

    /// Returns true once the watcher task has stopped.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

async fn watch_loop(
    engine: LinkEngine,
    mut events: UnboundedReceiver<DocumentEvent>,
    settle: Duration,
) {
    let mut deadline: Option<Instant> = None;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    if adds_link_content(&engine, &event) {
                        // Re-arm rather than stack: the latest mutation in a
                        // burst decides when the single scan runs.
                        deadline = Some(Instant::now() + settle);
                    }
                }
                None => break,
            },
            _ = sleep_until_deadline(deadline), if deadline.is_some() => {
                deadline = None;
                let outcome = engine.scan();
                debug!(
                    newly_patched = outcome.newly_patched,
                    "mutation-triggered scan complete"
                );
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(deadline).await;
    }
}

fn adds_link_content(engine: &LinkEngine, event: &DocumentEvent) -> bool {
    match event {
        DocumentEvent::SubtreeAttached { root } => {
            let doc = engine.document();
            let doc = doc.read().unwrap();
            doc.contains_link_element(*root)
        }
        DocumentEvent::SubtreeDetached { .. } => false,
    }
}
