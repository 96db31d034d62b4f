//! API request and response models.
//!
//! The settings endpoints keep the original content-script wire shapes:
//! rules travel as a JSON-encoded array string next to a boolean enabled
//! flag, inside a `status`/`message` envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dolilink_core::engine::MatchedLink;
use dolilink_core::status::{PatchedLink, StatusSnapshot};

/// Response body for GET /api/settings.
#[derive(Debug, Serialize, Deserialize)]
pub struct SettingsResponse {
    /// `"success"` on the happy path.
    pub status: String,
    /// JSON-encoded rule array.
    pub rules: String,
    /// Whether link patching is enabled.
    pub enabled: bool,
}

/// Request body for POST /api/settings.
#[derive(Debug, Serialize, Deserialize)]
pub struct SaveSettingsRequest {
    /// JSON-encoded rule array.
    pub rules: String,
    /// Whether link patching is enabled.
    pub enabled: bool,
}

/// Response body for POST /api/settings.
#[derive(Debug, Serialize, Deserialize)]
pub struct SaveSettingsResponse {
    /// `"success"` or `"error"`.
    pub status: String,
    /// Present when `status` is `"error"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response body for GET /api/status.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub last_scan: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub patched_count: usize,
    pub patched_links: Vec<PatchedLink>,
}

impl From<StatusSnapshot> for StatusResponse {
    fn from(snapshot: StatusSnapshot) -> Self {
        Self {
            last_scan: snapshot.last_scan,
            enabled: snapshot.enabled,
            patched_count: snapshot.patched_count,
            patched_links: snapshot.patched_links,
        }
    }
}

/// Response body for POST /api/links/{index}/unpatch.
#[derive(Debug, Serialize)]
pub struct UnpatchResponse {
    /// Whether a link was unpatched at that index.
    pub success: bool,
}

/// Response body for POST /api/links/clear.
#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub success: bool,
}

/// Response body for POST /api/rules/test.
#[derive(Debug, Serialize)]
pub struct TestRulesResponse {
    /// Number of links the rules matched.
    pub count: usize,
    /// The matched links, in document order.
    pub links: Vec<MatchedLink>,
}
