//! Remote settings client.
//!
//! The engine's rule set lives behind an HTTP settings endpoint that
//! answers `{status, rules, enabled}` with the rules JSON-encoded as a
//! string. Any failure along the way (transport, non-success status,
//! malformed rules) degrades to the built-in defaults so startup can
//! proceed to its initial scan regardless.

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::rules::RuleSet;

/// Errors fetching the rule set from the settings endpoint.
#[derive(Debug, Error)]
pub enum SettingsFetchError {
    /// The HTTP request failed.
    #[error("settings request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status field.
    #[error("settings endpoint rejected the request: {0}")]
    Rejected(String),

    /// The rules payload was not a valid rule array.
    #[error("malformed rules payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct WireSettings {
    status: String,
    rules: String,
    enabled: bool,
}

/// HTTP client for the settings endpoint.
#[derive(Debug, Clone)]
pub struct SettingsClient {
    endpoint: String,
    client: reqwest::Client,
}

impl SettingsClient {
    /// Creates a client for the given settings endpoint URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Returns the endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetches the rule set from the endpoint.
    pub async fn fetch(&self) -> Result<RuleSet, SettingsFetchError> {
        let wire: WireSettings = self
            .client
            .get(&self.endpoint)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if wire.status != "success" {
            return Err(SettingsFetchError::Rejected(wire.status));
        }
        Ok(RuleSet::from_wire(&wire.rules, wire.enabled)?)
    }

    /// Fetches the rule set, falling back to the built-in defaults on any
    /// failure.
    pub async fn fetch_or_default(&self) -> RuleSet {
        match self.fetch().await {
            Ok(rules) => {
                info!(
                    rules = rules.len(),
                    enabled = rules.enabled,
                    "loaded rules from settings endpoint"
                );
                rules
            }
            Err(e) => {
                warn!("using default rules (settings endpoint unavailable): {}", e);
                RuleSet::defaults()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_endpoint_falls_back_to_defaults() {
        // Port 1 is essentially never listening.
        let client = SettingsClient::new("http://127.0.0.1:1/api/settings");
        let rules = client.fetch_or_default().await;
        assert_eq!(rules, RuleSet::defaults());
    }

    #[tokio::test]
    async fn unreachable_endpoint_reports_http_error() {
        let client = SettingsClient::new("http://127.0.0.1:1/api/settings");
        let err = client.fetch().await.unwrap_err();
        assert!(matches!(err, SettingsFetchError::Http(_)));
    }

    #[test]
    fn error_messages_name_the_failure() {
        let err = SettingsFetchError::Rejected("error".to_string());
        assert_eq!(
            err.to_string(),
            "settings endpoint rejected the request: error"
        );
    }

    #[test]
    fn client_keeps_endpoint() {
        let client = SettingsClient::new("http://localhost:1234/api/settings");
        assert_eq!(client.endpoint(), "http://localhost:1234/api/settings");
    }
}
