//! Read-only status projection for the admin collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::PatchRecord;

/// One patched link as exposed to the admin collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchedLink {
    /// The href attribute at patch time.
    pub href: String,
    /// The trimmed text content at patch time.
    pub text: String,
    /// The title attribute at patch time.
    pub title: String,
    /// When the link was patched.
    pub patched_at: DateTime<Utc>,
}

impl From<&PatchRecord> for PatchedLink {
    fn from(record: &PatchRecord) -> Self {
        Self {
            href: record.href.clone(),
            text: record.text.clone(),
            title: record.title.clone(),
            patched_at: record.patched_at,
        }
    }
}

/// Snapshot of the engine's observable state.
///
/// Recomputed on every read; holds no references into the live registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// When the last scan completed, if any scan has run.
    pub last_scan: Option<DateTime<Utc>>,
    /// Whether the active rule set is enabled.
    pub enabled: bool,
    /// Number of currently patched links.
    pub patched_count: usize,
    /// Details of the currently patched links, in patch order.
    pub patched_links: Vec<PatchedLink>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_serializes_patched_links() {
        let snapshot = StatusSnapshot {
            last_scan: None,
            enabled: true,
            patched_count: 1,
            patched_links: vec![PatchedLink {
                href: "/dolibarr/".to_string(),
                text: "Dolibarr".to_string(),
                title: String::new(),
                patched_at: Utc::now(),
            }],
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["patched_count"], 1);
        assert_eq!(json["patched_links"][0]["href"], "/dolibarr/");
        assert!(json["last_scan"].is_null());
    }
}
