//! Polling page feed for host-less runs.
//!
//! Without a live browser host, the page arrives as a JSON snapshot file of
//! its links. The source polls the file at an interval and appends links it
//! has not seen before to the document; those attachments drive the change
//! watcher exactly like in-page mutations would. Links that vanish from the
//! snapshot are left in the document; the registry's stale detection covers
//! elements the host actually removes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use dolilink_core::page::{NodeId, PageDocument, LINK_TAG};

/// One link in the page snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct PageLink {
    /// The link's href.
    pub href: String,
    /// The link's text content.
    #[serde(default)]
    pub text: String,
    /// The link's title attribute, if any.
    #[serde(default)]
    pub title: Option<String>,
    /// The link's target attribute, if any.
    #[serde(default)]
    pub target: Option<String>,
}

/// Background task feeding the document from a snapshot file.
#[derive(Debug)]
pub struct PageSource {
    handle: JoinHandle<()>,
}

impl PageSource {
    /// Spawns the polling task. Must be called within a tokio runtime.
    pub fn spawn(doc: Arc<RwLock<PageDocument>>, path: PathBuf, poll_interval: Duration) -> Self {
        let handle = tokio::spawn(poll_loop(doc, path, poll_interval));
        Self { handle }
    }

    /// Stops the polling task.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

async fn poll_loop(doc: Arc<RwLock<PageDocument>>, path: PathBuf, poll_interval: Duration) {
    let mut seen: HashSet<String> = HashSet::new();
    loop {
        match load_links(&path) {
            Ok(links) => {
                let fresh: Vec<PageLink> = links
                    .into_iter()
                    .filter(|link| seen.insert(link_key(link)))
                    .collect();
                if !fresh.is_empty() {
                    info!(count = fresh.len(), "new links in page snapshot");
                    let mut doc = doc.write().unwrap();
                    let root = doc.root();
                    for link in &fresh {
                        append(&mut doc, root, link);
                    }
                }
            }
            Err(e) => debug!("page snapshot unavailable: {}", e),
        }
        tokio::time::sleep(poll_interval).await;
    }
}

fn load_links(path: &Path) -> std::io::Result<Vec<PageLink>> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn link_key(link: &PageLink) -> String {
    format!(
        "{}\t{}\t{}\t{}",
        link.href,
        link.text,
        link.title.as_deref().unwrap_or(""),
        link.target.as_deref().unwrap_or("")
    )
}

fn append(doc: &mut PageDocument, root: NodeId, link: &PageLink) {
    // Build the element detached so every attribute is in place before the
    // attachment event fires.
    let node = doc.create_element(LINK_TAG);
    doc.set_attr(node, "href", link.href.as_str());
    doc.set_text(node, link.text.as_str());
    if let Some(title) = link.title.as_deref() {
        doc.set_attr(node, "title", title);
    }
    if let Some(target) = link.target.as_deref() {
        doc.set_attr(node, "target", target);
    }
    doc.append_child(root, node);
}

#[cfg(test)]
mod tests {
    use super::*;

    use dolilink_core::engine::{EngineConfig, LinkEngine};
    use dolilink_core::watcher::ChangeWatcher;

    const POLL: Duration = Duration::from_millis(20);
    const WAIT: Duration = Duration::from_millis(200);

    fn write_snapshot(path: &Path, json: &str) {
        std::fs::write(path, json).unwrap();
    }

    #[tokio::test]
    async fn snapshot_links_are_appended_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.json");
        write_snapshot(
            &path,
            r#"[
                {"href": "/dolibarr/a", "text": "a"},
                {"href": "/dolibarr/b", "text": "b", "target": "_blank"}
            ]"#,
        );

        let doc = Arc::new(RwLock::new(PageDocument::new()));
        let source = PageSource::spawn(doc.clone(), path, POLL);

        tokio::time::sleep(WAIT).await;
        // Several polls have run; each link appears exactly once.
        assert_eq!(doc.read().unwrap().links().len(), 2);
        source.shutdown();
    }

    #[tokio::test]
    async fn links_added_to_the_snapshot_appear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.json");
        write_snapshot(&path, r#"[{"href": "/dolibarr/a", "text": "a"}]"#);

        let doc = Arc::new(RwLock::new(PageDocument::new()));
        let source = PageSource::spawn(doc.clone(), path.clone(), POLL);
        tokio::time::sleep(WAIT).await;
        assert_eq!(doc.read().unwrap().links().len(), 1);

        write_snapshot(
            &path,
            r#"[
                {"href": "/dolibarr/a", "text": "a"},
                {"href": "/dolibarr/c", "text": "c"}
            ]"#,
        );
        tokio::time::sleep(WAIT).await;
        assert_eq!(doc.read().unwrap().links().len(), 2);
        source.shutdown();
    }

    #[tokio::test]
    async fn missing_snapshot_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");

        let doc = Arc::new(RwLock::new(PageDocument::new()));
        let source = PageSource::spawn(doc.clone(), path, POLL);
        tokio::time::sleep(WAIT).await;
        assert!(doc.read().unwrap().links().is_empty());
        source.shutdown();
    }

    #[tokio::test]
    async fn fed_links_are_patched_by_the_watcher() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.json");
        write_snapshot(
            &path,
            r#"[{"href": "/dolibarr/index.php", "text": "Dolibarr", "target": "_blank"}]"#,
        );

        let doc = Arc::new(RwLock::new(PageDocument::new()));
        let engine = LinkEngine::with_config(
            doc.clone(),
            EngineConfig::default().with_settle_delay(Duration::from_millis(20)),
        );
        let watcher = ChangeWatcher::spawn(engine.clone());
        let source = PageSource::spawn(doc.clone(), path, POLL);

        tokio::time::sleep(WAIT).await;
        assert_eq!(engine.patched_count(), 1);
        let status = engine.status();
        assert_eq!(status.patched_links[0].href, "/dolibarr/index.php");

        source.shutdown();
        watcher.shutdown();
    }
}
